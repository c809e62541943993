use pollster::block_on;
use tracing::{debug, info, info_span};
use wgpu::util::{BufferInitDescriptor, DeviceExt};
use wgpu::{
    BindGroup, BindGroupDescriptor, BindGroupEntry, Buffer, BufferDescriptor, BufferUsages,
    CommandEncoderDescriptor, ComputePassDescriptor, ComputePipeline, ComputePipelineDescriptor,
    DeviceDescriptor, ErrorFilter, InstanceDescriptor, PipelineCompilationOptions,
    PowerPreference, RequestAdapterOptions, ShaderModuleDescriptor, ShaderSource,
};

use crate::{Error, Result};

/// A wgpu device and queue shared by every accelerator kernel and by the
/// accelerator reset procedure.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
}

impl GpuContext {
    /// Acquires the high-performance adapter with its full limits.
    ///
    /// Returns `Error::NoAdapter` when the machine has no usable GPU.
    pub fn new() -> Result<Self> {
        let _span = info_span!("gpu_init").entered();

        let instance = wgpu::Instance::new(InstanceDescriptor::default());
        let adapter = block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            ..Default::default()
        }))
        .ok_or(Error::NoAdapter)?;
        let adapter_name = adapter.get_info().name;
        info!(adapter = %adapter_name, "GPU adapter acquired");

        let (device, queue) = block_on(adapter.request_device(
            &DeviceDescriptor {
                label: Some("harness"),
                required_limits: adapter.limits(),
                ..Default::default()
            },
            None,
        ))
        .map_err(|e| Error::gpu(format!("request_device: {e}")))?;
        info!("GPU device created");

        Ok(Self {
            device,
            queue,
            adapter_name,
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Whether a 1-D workgroup of `size` invocations fits the device.
    pub fn supports_workgroup(&self, size: u32) -> bool {
        let limits = self.limits();
        size > 0
            && size <= limits.max_compute_workgroup_size_x
            && size <= limits.max_compute_invocations_per_workgroup
    }

    /// Splits `groups` workgroups into an `(x, y)` grid that respects the
    /// per-dimension dispatch limit. The grid may overshoot by less than one
    /// row; shaders must bound-check.
    pub fn grid(&self, groups: u32) -> (u32, u32) {
        let max = self.limits().max_compute_workgroups_per_dimension.max(1);
        let groups = groups.max(1);
        if groups <= max {
            (groups, 1)
        } else {
            (max, groups.div_ceil(max))
        }
    }

    /// Compiles a WGSL compute shader with entry point `main`.
    pub fn compile(&self, label: &str, wgsl: &str) -> Result<ComputePipeline> {
        self.device.push_error_scope(ErrorFilter::Validation);
        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(label),
            source: ShaderSource::Wgsl(wgsl.into()),
        });
        let pipeline = self
            .device
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &module,
                entry_point: Some("main"),
                compilation_options: PipelineCompilationOptions::default(),
                cache: None,
            });
        if let Some(e) = block_on(self.device.pop_error_scope()) {
            return Err(Error::gpu(format!("{label}: {e}")));
        }
        debug!(label, shader_len = wgsl.len(), "GPU pipeline created");
        Ok(pipeline)
    }

    pub fn upload(&self, label: &str, contents: &[u8], usage: BufferUsages) -> Buffer {
        self.device.create_buffer_init(&BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        })
    }

    /// A zero-initialized storage buffer that can be copied back to the host.
    pub fn storage(&self, label: &str, size: u64) -> Buffer {
        self.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Binds `buffers` to group 0 in binding order.
    pub fn bind(&self, pipeline: &ComputePipeline, buffers: &[&Buffer]) -> BindGroup {
        let layout = pipeline.get_bind_group_layout(0);
        let entries: Vec<BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        self.device.create_bind_group(&BindGroupDescriptor {
            label: None,
            layout: &layout,
            entries: &entries,
        })
    }

    /// Runs one compute pass over `grid` workgroups, then copies the first
    /// `size` bytes of `output` back to the host. Blocks until the copy has
    /// landed, so the caller observes a fully synchronized device.
    pub fn run(
        &self,
        pipeline: &ComputePipeline,
        bind_group: &BindGroup,
        grid: (u32, u32),
        output: &Buffer,
        size: u64,
    ) -> Result<Vec<u8>> {
        self.device.push_error_scope(ErrorFilter::Validation);

        let staging = self.device.create_buffer(&BufferDescriptor {
            label: Some("staging"),
            size,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor { label: None });
        {
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(grid.0, grid.1, 1);
        }
        encoder.copy_buffer_to_buffer(output, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));
        debug!(x = grid.0, y = grid.1, size, "gpu_dispatch");

        let bytes = self.read_back(&staging, size);
        staging.destroy();

        if let Some(e) = block_on(self.device.pop_error_scope()) {
            return Err(Error::gpu(e.to_string()));
        }
        bytes
    }

    fn read_back(&self, staging: &Buffer, size: u64) -> Result<Vec<u8>> {
        let slice = staging.slice(..size);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| Error::gpu("map_async callback dropped"))?
            .map_err(|e| Error::gpu(format!("map_async: {e}")))?;

        let bytes = slice.get_mapped_range().to_vec();
        staging.unmap();
        debug!("gpu_readback_complete");
        Ok(bytes)
    }
}

/// Little-endian byte image of a `u32` slice, the layout WGSL storage
/// buffers expect.
pub fn u32_bytes(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn f32_bytes(values: impl IntoIterator<Item = f32>) -> Vec<u8> {
    values.into_iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn u32_from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn f32_from_bytes(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
