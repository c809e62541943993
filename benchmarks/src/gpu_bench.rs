use std::sync::Arc;

use burn::backend::wgpu::WgpuDevice;
use harness::gpu::{f32_bytes, f32_from_bytes, u32_bytes, u32_from_bytes};
use harness::{Backend, Error, GpuContext, KernelVariant, Result};
use tracing::debug;
use wgpu::{Buffer, BufferUsages, ComputePipeline};

use crate::histogram_bench::HistogramInput;
use crate::integration_bench::IntegrationInput;
use crate::matmul_bench::MatrixInput;
use crate::tensor;

// ---------------------------------------------------------------------------
// Data-parallel GPU kernels
//
// Each variant compiles its shader once, with the workgroup size baked in,
// and keeps its inputs resident on the device. Every invocation allocates a
// fresh output buffer, dispatches a grid-stride loop and reads the result
// back before returning.
// ---------------------------------------------------------------------------

/// Cap on dispatched workgroups; the grid-stride loops cover the rest.
const MAX_GROUPS: u32 = 4096;

/// Integration indices are split as `hi * 2^16 + lo` so both halves
/// convert to f32 exactly.
const COARSE_SHIFT: u32 = 16;

/// The raw compute context and the burn device, each on its own wgpu device.
pub struct GpuDevices {
    pub context: Arc<GpuContext>,
    pub tensor: WgpuDevice,
}

impl GpuDevices {
    pub fn new(context: Arc<GpuContext>) -> Result<Self> {
        Ok(Self {
            tensor: tensor::gpu_device()?,
            context,
        })
    }
}

/// Keeps the workgroup sizes the device can run and reports the others.
pub fn usable_blocks(context: &GpuContext, blocks: &[u32]) -> Vec<u32> {
    blocks
        .iter()
        .copied()
        .filter(|&block| {
            let ok = context.supports_workgroup(block);
            if !ok {
                eprintln!("  skipping workgroup size {}: not supported by {}", block, context.adapter_name());
            }
            ok
        })
        .collect()
}

fn groups_for(items: usize, block: u32) -> u32 {
    let needed = items.div_ceil(block as usize).max(1);
    needed.min(MAX_GROUPS as usize) as u32
}

// Flat invocation index over a possibly 2-D grid.
const INVOCATION_INDEX: &str = "gid.y * groups.x * BLOCK + gid.x";

fn wgsl_histogram(block: u32) -> String {
    format!(
        r#"
const BLOCK: u32 = {block}u;

struct Params {{
    n: u32,
    bucket_size: u32,
    buckets: u32,
    stride: u32,
}}

@group(0) @binding(0) var<storage, read> values: array<u32>;
@group(0) @binding(1) var<storage, read_write> counts: array<atomic<u32>>;
@group(0) @binding(2) var<uniform> params: Params;

@compute @workgroup_size({block})
fn main(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {{
    for (var i: u32 = {index}; i < params.n; i = i + params.stride) {{
        let bucket = values[i] / params.bucket_size;
        if (bucket < params.buckets) {{
            atomicAdd(&counts[bucket], 1u);
        }}
    }}
}}
"#,
        block = block,
        index = INVOCATION_INDEX,
    )
}

/// One output cell per invocation; the dot product is accumulated with
/// Kahan compensation and the compensation term is returned alongside.
fn wgsl_matmul(block: u32) -> String {
    format!(
        r#"
const BLOCK: u32 = {block}u;

struct Params {{
    size: u32,
    cells: u32,
    stride: u32,
    _pad: u32,
}}

@group(0) @binding(0) var<storage, read> left: array<f32>;
@group(0) @binding(1) var<storage, read> right: array<f32>;
@group(0) @binding(2) var<storage, read_write> result: array<vec2<f32>>;
@group(0) @binding(3) var<uniform> params: Params;

@compute @workgroup_size({block})
fn main(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {{
    let s = params.size;
    for (var idx: u32 = {index}; idx < params.cells; idx = idx + params.stride) {{
        let row = idx / s;
        let col = idx % s;
        var sum: f32 = 0.0;
        var c: f32 = 0.0;
        for (var k: u32 = 0u; k < s; k = k + 1u) {{
            let y = left[row * s + k] * right[k * s + col] - c;
            let t = sum + y;
            c = (t - sum) - y;
            sum = t;
        }}
        result[idx] = vec2<f32>(sum, c);
    }}
}}
"#,
        block = block,
        index = INVOCATION_INDEX,
    )
}

/// Grid-stride partial sums of sin at the midpoints, then a shared-memory
/// tree reduction to one partial per workgroup. `block` must be a power
/// of two.
fn wgsl_integration(block: u32) -> String {
    format!(
        r#"
const BLOCK: u32 = {block}u;

struct Params {{
    lower: f32,
    dx: f32,
    coarse_dx: f32,
    _pad0: f32,
    n: u32,
    stride: u32,
    _pad1: u32,
    _pad2: u32,
}}

@group(0) @binding(0) var<storage, read_write> partials: array<f32>;
@group(0) @binding(1) var<uniform> params: Params;

var<workgroup> scratch: array<f32, {block}>;

@compute @workgroup_size({block})
fn main(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(local_invocation_id) lid: vec3<u32>,
    @builtin(workgroup_id) wid: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {{
    var sum: f32 = 0.0;
    var c: f32 = 0.0;
    for (var i: u32 = {index}; i < params.n; i = i + params.stride) {{
        let x = params.lower
            + f32(i >> {shift}u) * params.coarse_dx
            + (f32(i & {mask}u) + 0.5) * params.dx;
        let y = sin(x) - c;
        let t = sum + y;
        c = (t - sum) - y;
        sum = t;
    }}
    scratch[lid.x] = sum;
    workgroupBarrier();

    for (var width: u32 = BLOCK / 2u; width > 0u; width = width >> 1u) {{
        if (lid.x < width) {{
            scratch[lid.x] = scratch[lid.x] + scratch[lid.x + width];
        }}
        workgroupBarrier();
    }}

    if (lid.x == 0u) {{
        partials[wid.y * groups.x + wid.x] = scratch[0];
    }}
}}
"#,
        block = block,
        index = INVOCATION_INDEX,
        shift = COARSE_SHIFT,
        mask = (1u32 << COARSE_SHIFT) - 1,
    )
}

fn as_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::InvalidInput(format!("{} {} exceeds the GPU index range", what, value)))
}

/// Loop bound for a grid-stride loop over `items`. The last index plus the
/// stride must not wrap in u32, or the loop would never exit.
fn loop_bound(items: usize, stride: u32, what: &str) -> Result<u32> {
    let n = as_u32(items, what)?;
    match n.checked_add(stride) {
        Some(_) => Ok(n),
        None => Err(Error::InvalidInput(format!(
            "{} {} with stride {} overflows the GPU loop index",
            what, n, stride
        ))),
    }
}

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

pub struct GpuHistogram {
    context: Arc<GpuContext>,
    pipeline: ComputePipeline,
    values: Buffer,
    params: Buffer,
    buckets: usize,
    grid: (u32, u32),
}

impl GpuHistogram {
    pub fn new(context: Arc<GpuContext>, input: &HistogramInput, block: u32) -> Result<Self> {
        let groups = groups_for(input.values().len(), block);
        let stride = groups * block;
        let n = loop_bound(input.values().len(), stride, "element count")?;
        let pipeline = context.compile("histogram", &wgsl_histogram(block))?;
        let values = context.upload("histogram_values", &u32_bytes(input.values()), BufferUsages::STORAGE);
        let params = context.upload(
            "histogram_params",
            &u32_bytes(&[n, input.bucket_size(), input.buckets() as u32, stride]),
            BufferUsages::UNIFORM,
        );
        debug!(block, groups, stride, "histogram kernel ready");
        Ok(Self {
            grid: context.grid(groups),
            context,
            pipeline,
            values,
            params,
            buckets: input.buckets(),
        })
    }
}

impl KernelVariant for GpuHistogram {
    type Answer = Vec<u32>;

    fn compute_answer(&self) -> Result<Vec<u32>> {
        let size = (self.buckets * 4) as u64;
        let counts = self.context.storage("histogram_counts", size);
        let bind_group = self
            .context
            .bind(&self.pipeline, &[&self.values, &counts, &self.params]);
        let bytes = self.context.run(&self.pipeline, &bind_group, self.grid, &counts, size);
        counts.destroy();
        Ok(u32_from_bytes(&bytes?))
    }

    fn backend(&self) -> Backend {
        Backend::DataParallelGpu
    }
}

// ---------------------------------------------------------------------------
// Matrix multiplication
// ---------------------------------------------------------------------------

pub struct GpuMatmul {
    context: Arc<GpuContext>,
    pipeline: ComputePipeline,
    left: Buffer,
    right: Buffer,
    params: Buffer,
    cells: usize,
    grid: (u32, u32),
}

impl GpuMatmul {
    pub fn new(context: Arc<GpuContext>, input: &MatrixInput, block: u32) -> Result<Self> {
        let size = as_u32(input.size(), "matrix size")?;
        let cells = input.size() * input.size();
        let groups = groups_for(cells, block);
        let stride = groups * block;
        let pipeline = context.compile("matmul", &wgsl_matmul(block))?;
        let left = context.upload(
            "matmul_left",
            &f32_bytes(input.left().iter().map(|&x| x as f32)),
            BufferUsages::STORAGE,
        );
        let right = context.upload(
            "matmul_right",
            &f32_bytes(input.right().iter().map(|&x| x as f32)),
            BufferUsages::STORAGE,
        );
        let params = context.upload(
            "matmul_params",
            &u32_bytes(&[size, loop_bound(cells, stride, "cell count")?, stride, 0]),
            BufferUsages::UNIFORM,
        );
        debug!(block, groups, stride, "matmul kernel ready");
        Ok(Self {
            grid: context.grid(groups),
            context,
            pipeline,
            left,
            right,
            params,
            cells,
        })
    }
}

impl KernelVariant for GpuMatmul {
    type Answer = Vec<f64>;

    fn compute_answer(&self) -> Result<Vec<f64>> {
        let size = (self.cells * 8) as u64;
        let result = self.context.storage("matmul_result", size);
        let bind_group = self
            .context
            .bind(&self.pipeline, &[&self.left, &self.right, &result, &self.params]);
        let bytes = self.context.run(&self.pipeline, &bind_group, self.grid, &result, size);
        result.destroy();
        let pairs = f32_from_bytes(&bytes?);
        Ok(pairs
            .chunks_exact(2)
            .map(|p| p[0] as f64 - p[1] as f64)
            .collect())
    }

    fn backend(&self) -> Backend {
        Backend::DataParallelGpu
    }
}

// ---------------------------------------------------------------------------
// Scalar integration
// ---------------------------------------------------------------------------

pub struct GpuIntegration {
    context: Arc<GpuContext>,
    pipeline: ComputePipeline,
    params: Buffer,
    dx: f64,
    groups: u32,
    grid: (u32, u32),
}

impl GpuIntegration {
    pub fn new(context: Arc<GpuContext>, input: IntegrationInput, block: u32) -> Result<Self> {
        if !block.is_power_of_two() {
            return Err(Error::InvalidInput(format!(
                "workgroup size {} is not a power of two",
                block
            )));
        }
        let groups = groups_for(input.intervals(), block);
        let stride = groups * block;
        let n = loop_bound(input.intervals(), stride, "interval count")?;
        let pipeline = context.compile("integration", &wgsl_integration(block))?;

        let coarse_dx = input.dx() * (1u64 << COARSE_SHIFT) as f64;
        let mut params = f32_bytes([input.lower() as f32, input.dx() as f32, coarse_dx as f32, 0.0]);
        params.extend(u32_bytes(&[n, stride, 0, 0]));
        let params = context.upload("integration_params", &params, BufferUsages::UNIFORM);
        debug!(block, groups, stride, "integration kernel ready");

        Ok(Self {
            grid: context.grid(groups),
            context,
            pipeline,
            params,
            dx: input.dx(),
            groups,
        })
    }
}

impl KernelVariant for GpuIntegration {
    type Answer = f64;

    fn compute_answer(&self) -> Result<f64> {
        let size = (self.groups as u64) * 4;
        let partials = self.context.storage("integration_partials", size);
        let bind_group = self.context.bind(&self.pipeline, &[&partials, &self.params]);
        let bytes = self.context.run(&self.pipeline, &bind_group, self.grid, &partials, size);
        partials.destroy();
        let sum: f64 = f32_from_bytes(&bytes?).iter().map(|&p| p as f64).sum();
        Ok(sum * self.dx)
    }

    fn backend(&self) -> Backend {
        Backend::DataParallelGpu
    }
}
