use std::sync::Arc;

use burn::backend::wgpu::{WgpuDevice, WgpuSetup};
use burn::tensor::backend::Backend as TensorBackend;
use burn::tensor::Tensor;
use harness::{Error, Result};

/// Portable backend on the host.
pub type Cpu = burn::backend::NdArray<f64>;

/// Portable backend on the accelerator.
pub type Gpu = burn::backend::wgpu::Wgpu;

/// Create a fresh wgpu device for burn, separate from the one the raw
/// compute kernels use.
pub fn gpu_device() -> Result<WgpuDevice> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        ..Default::default()
    }))
    .ok_or(Error::NoAdapter)?;
    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("tensor"),
            required_features: adapter.features(),
            required_limits: adapter.limits(),
            ..Default::default()
        },
        None,
    ))
    .map_err(|e| Error::gpu(format!("request_device: {e}")))?;
    let setup = WgpuSetup {
        instance: Arc::new(instance),
        adapter: Arc::new(adapter),
        device: Arc::new(device),
        queue: Arc::new(queue),
    };
    Ok(burn::backend::wgpu::init_device(setup, Default::default()))
}

/// Copies a float tensor back to the host as `f64`, whatever the backend's
/// element type.
pub fn read_f64<B: TensorBackend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f64>> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| Error::Backend(format!("tensor readback: {:?}", e)))
}
