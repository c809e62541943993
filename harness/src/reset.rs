//! Calibration step run before every timed repeat.
//!
//! Without it, whichever backend runs first pays for a cold cache or an idle
//! device while later ones inherit the warm state. Both procedures below do
//! throwaway work whose only purpose is to leave the processor in the same
//! condition every time; their results are passed through `black_box` so
//! the compiler cannot elide them.

use std::hint::black_box;
use std::sync::Arc;

use tracing::debug;

use crate::gpu::{u32_bytes, u32_from_bytes, GpuContext};
use crate::{Error, ProcessorClass, Result};

/// `f64` elements in the CPU scratch buffer: 80 MB, beyond any last-level cache.
pub const CPU_SCRATCH_LEN: usize = 10_000_000;

/// Atomic increments issued by the accelerator reset kernel.
pub const GPU_RESET_INVOCATIONS: u32 = 100_000_000;

const GPU_RESET_WORKGROUP: u32 = 256;

// The dispatch grid overshoots by up to one row; the index check keeps the
// count exact.
const WGSL_RESET: &str = r#"
struct Params {
    invocations: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<storage, read_write> counter: atomic<u32>;
@group(0) @binding(1) var<uniform> params: Params;

@compute @workgroup_size(256)
fn main(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    let index = gid.y * groups.x * 256u + gid.x;
    if (index < params.invocations) {
        atomicAdd(&counter, 1u);
    }
}
"#;

/// Puts a processor into a comparable state before a repeat.
pub trait Reset {
    fn reset(&self, class: ProcessorClass) -> Result<()>;
}

pub struct ProcessorReset {
    scratch_len: usize,
    gpu: Option<GpuReset>,
}

struct GpuReset {
    context: Arc<GpuContext>,
    pipeline: wgpu::ComputePipeline,
    params: wgpu::Buffer,
    invocations: u32,
}

impl ProcessorReset {
    /// CPU-only reset with the default scratch size.
    pub fn cpu() -> Self {
        Self::with_scratch(CPU_SCRATCH_LEN)
    }

    pub fn with_scratch(scratch_len: usize) -> Self {
        Self {
            scratch_len,
            gpu: None,
        }
    }

    /// Enables the accelerator procedure on `context`.
    pub fn with_gpu(mut self, context: Arc<GpuContext>) -> Result<Self> {
        self.gpu = Some(GpuReset::new(context, GPU_RESET_INVOCATIONS)?);
        Ok(self)
    }

    fn reset_cpu(&self) {
        let junk = vec![1.0f64; self.scratch_len];
        let sum: f64 = black_box(&junk).iter().sum();
        black_box(sum);
        debug!(scratch_len = self.scratch_len, "cpu reset");
    }
}

impl Reset for ProcessorReset {
    fn reset(&self, class: ProcessorClass) -> Result<()> {
        match class {
            ProcessorClass::Cpu => {
                self.reset_cpu();
                Ok(())
            }
            ProcessorClass::Accelerator => match &self.gpu {
                Some(gpu) => gpu.reset(),
                None => Err(Error::gpu("accelerator reset requested without a device")),
            },
        }
    }
}

impl GpuReset {
    fn new(context: Arc<GpuContext>, invocations: u32) -> Result<Self> {
        let pipeline = context.compile("reset", WGSL_RESET)?;
        let params = context.upload(
            "reset_params",
            &u32_bytes(&[invocations, 0, 0, 0]),
            wgpu::BufferUsages::UNIFORM,
        );
        Ok(Self {
            context,
            pipeline,
            params,
            invocations,
        })
    }

    fn reset(&self) -> Result<()> {
        let count = self.increment()?;
        black_box(count);
        debug!(count, "gpu reset");
        Ok(())
    }

    // Runs the increment kernel and returns the final counter value.
    fn increment(&self) -> Result<u32> {
        let counter = self.context.storage("reset_counter", 4);
        let bind_group = self.context.bind(&self.pipeline, &[&counter, &self.params]);
        let grid = self
            .context
            .grid(self.invocations.div_ceil(GPU_RESET_WORKGROUP));
        let bytes = self
            .context
            .run(&self.pipeline, &bind_group, grid, &counter, 4);
        counter.destroy();

        Ok(u32_from_bytes(&bytes?).first().copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Option<Arc<GpuContext>> {
        match GpuContext::new() {
            Ok(c) => Some(Arc::new(c)),
            Err(Error::NoAdapter) => None,
            Err(e) => panic!("GPU init failed: {e}"),
        }
    }

    #[test]
    fn test_counter_matches_invocations_exactly() {
        let Some(context) = context() else { return };
        // Not a multiple of the workgroup size, so the last group is partial.
        let gpu = GpuReset::new(context, 1000).unwrap();
        assert_eq!(gpu.increment().unwrap(), 1000);
        assert_eq!(gpu.increment().unwrap(), 1000);
    }

    #[test]
    fn test_full_reset_ignores_grid_overshoot() {
        let Some(context) = context() else { return };
        let groups = GPU_RESET_INVOCATIONS.div_ceil(GPU_RESET_WORKGROUP);
        let (x, y) = context.grid(groups);
        assert!(x as u64 * y as u64 * GPU_RESET_WORKGROUP as u64 >= GPU_RESET_INVOCATIONS as u64);

        let gpu = GpuReset::new(context, GPU_RESET_INVOCATIONS).unwrap();
        assert_eq!(gpu.increment().unwrap(), GPU_RESET_INVOCATIONS);
    }
}
