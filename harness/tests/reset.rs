use std::sync::Arc;

use harness::{Error, GpuContext, ProcessorClass, ProcessorReset, Reset};

#[test]
fn test_cpu_reset_succeeds() {
    let reset = ProcessorReset::with_scratch(1 << 16);
    reset.reset(ProcessorClass::Cpu).unwrap();
    reset.reset(ProcessorClass::Cpu).unwrap();
}

#[test]
fn test_accelerator_reset_without_device_fails() {
    let reset = ProcessorReset::with_scratch(16);
    let err = reset.reset(ProcessorClass::Accelerator).unwrap_err();
    assert!(matches!(err, Error::Gpu { .. }));
    assert!(err.to_string().contains("reset.rs"));
}

#[test]
fn test_gpu_reset_when_available() {
    let context = match GpuContext::new() {
        Ok(c) => Arc::new(c),
        Err(Error::NoAdapter) => {
            eprintln!("SKIP: no GPU adapter");
            return;
        }
        Err(e) => panic!("GPU init failed: {e}"),
    };
    let reset = ProcessorReset::with_scratch(16).with_gpu(context).unwrap();
    reset.reset(ProcessorClass::Accelerator).unwrap();
    reset.reset(ProcessorClass::Cpu).unwrap();
}

#[test]
fn test_grid_respects_dimension_limit() {
    let context = match GpuContext::new() {
        Ok(c) => c,
        Err(Error::NoAdapter) => return,
        Err(e) => panic!("GPU init failed: {e}"),
    };
    let max = context.limits().max_compute_workgroups_per_dimension;
    assert_eq!(context.grid(10), (10, 1));
    let (x, y) = context.grid(max + 1);
    assert!(x <= max);
    assert!(x as u64 * y as u64 >= max as u64 + 1);
}
