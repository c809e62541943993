use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use harness::{Backend, Error, KernelVariant, ProcessorClass, Reset, Result, TimingHarness};
use quanta::{Clock, Mock};

/// Advances the mock clock by a known amount on every reset, so a harness
/// that accidentally timed the reset would report the wrong mean.
struct CountingReset {
    calls: Cell<u32>,
    mock: Arc<Mock>,
    classes: Cell<Option<ProcessorClass>>,
}

impl Reset for CountingReset {
    fn reset(&self, class: ProcessorClass) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        self.classes.set(Some(class));
        self.mock.increment(Duration::from_secs(1));
        Ok(())
    }
}

/// Invocation `i` (1-based) takes `10 * i` milliseconds and returns `i`.
struct SteppedKernel {
    calls: Cell<u32>,
    mock: Arc<Mock>,
    backend: Backend,
}

impl KernelVariant for SteppedKernel {
    type Answer = u32;

    fn compute_answer(&self) -> Result<u32> {
        let call = self.calls.get() + 1;
        self.calls.set(call);
        self.mock.increment(Duration::from_millis(10 * call as u64));
        Ok(call)
    }

    fn backend(&self) -> Backend {
        self.backend
    }
}

fn fixture(backend: Backend) -> (Clock, CountingReset, SteppedKernel) {
    let (clock, mock) = Clock::mock();
    let reset = CountingReset {
        calls: Cell::new(0),
        mock: mock.clone(),
        classes: Cell::new(None),
    };
    let kernel = SteppedKernel {
        calls: Cell::new(0),
        mock,
        backend,
    };
    (clock, reset, kernel)
}

#[test]
fn test_three_repeats_one_warmup() {
    let (clock, reset, kernel) = fixture(Backend::Serial);
    let harness = TimingHarness::with_clock(&reset, 3, 1, clock).unwrap();

    let measurement = harness.time(&kernel).unwrap();

    assert_eq!(kernel.calls.get(), 4);
    assert_eq!(reset.calls.get(), 4);
    // (20 + 30 + 40) / 3
    assert_eq!(measurement.elapsed, Duration::from_millis(30));
    assert!((measurement.seconds() - 0.030).abs() < 1e-12);
}

#[test]
fn test_answer_comes_from_last_invocation() {
    let (clock, reset, kernel) = fixture(Backend::Serial);
    let harness = TimingHarness::with_clock(&reset, 3, 1, clock).unwrap();

    let measurement = harness.time(&kernel).unwrap();
    assert_eq!(measurement.answer, 4);
}

#[test]
fn test_no_warmup_counts_every_repeat() {
    let (clock, reset, kernel) = fixture(Backend::Serial);
    let harness = TimingHarness::with_clock(&reset, 2, 0, clock).unwrap();

    let measurement = harness.time(&kernel).unwrap();
    assert_eq!(kernel.calls.get(), 2);
    assert_eq!(reset.calls.get(), 2);
    // (10 + 20) / 2
    assert_eq!(measurement.elapsed, Duration::from_millis(15));
}

#[test]
fn test_reset_receives_kernel_processor_class() {
    let (clock, reset, kernel) = fixture(Backend::DataParallelGpu);
    let harness = TimingHarness::with_clock(&reset, 1, 0, clock).unwrap();

    harness.time(&kernel).unwrap();
    assert_eq!(reset.classes.get(), Some(ProcessorClass::Accelerator));
}

#[test]
fn test_portable_gpu_resets_accelerator() {
    assert_eq!(Backend::PortableGpu.label(), "portable-gpu");
    assert_eq!(Backend::PortableGpu.processor_class(), ProcessorClass::Accelerator);
    assert_eq!(Backend::Portable.processor_class(), ProcessorClass::Cpu);

    let (clock, reset, kernel) = fixture(Backend::PortableGpu);
    let harness = TimingHarness::with_clock(&reset, 1, 0, clock).unwrap();
    harness.time(&kernel).unwrap();
    assert_eq!(reset.classes.get(), Some(ProcessorClass::Accelerator));
}

#[test]
fn test_zero_repeats_rejected() {
    let (clock, reset, _) = fixture(Backend::Serial);
    let result = TimingHarness::with_clock(&reset, 0, 1, clock);
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

struct FailingKernel;

impl KernelVariant for FailingKernel {
    type Answer = ();

    fn compute_answer(&self) -> Result<()> {
        Err(Error::Backend("worker panicked".into()))
    }

    fn backend(&self) -> Backend {
        Backend::TaskParallel
    }
}

#[test]
fn test_kernel_failure_propagates() {
    let (clock, reset, _) = fixture(Backend::Serial);
    let harness = TimingHarness::with_clock(&reset, 3, 1, clock).unwrap();

    let result = harness.time(&FailingKernel);
    assert!(matches!(result, Err(Error::Backend(_))));
    assert_eq!(reset.calls.get(), 1);
}
