//! Timing, verification and processor-reset machinery shared by every
//! benchmark problem.
//!
//! A benchmark supplies [`KernelVariant`] implementations; the
//! [`TimingHarness`] runs them between [`Reset`] calls and the [`Answer`]
//! checker compares their output to the serial oracle.

mod check;
mod error;
pub mod gpu;
mod kernel;
mod reset;
mod timing;

pub use check::{
    check_counts, check_elementwise, check_relative, Answer, ELEMENT_TOLERANCE,
    RELATIVE_TOLERANCE,
};
pub use error::{Error, Result};
pub use gpu::GpuContext;
pub use kernel::{Backend, KernelVariant, ProcessorClass};
pub use reset::{ProcessorReset, Reset, CPU_SCRATCH_LEN, GPU_RESET_INVOCATIONS};
pub use timing::{Measurement, TimingHarness};
