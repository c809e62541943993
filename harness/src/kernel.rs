use crate::Result;

/// Which reset procedure a backend needs before each timed repeat.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessorClass {
    Cpu,
    Accelerator,
}

/// Execution strategy behind a kernel variant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    Serial,
    TaskParallel,
    DataParallelCpu,
    DataParallelGpu,
    Portable,
    PortableGpu,
}

impl Backend {
    pub const fn label(self) -> &'static str {
        match self {
            Backend::Serial => "serial",
            Backend::TaskParallel => "task-parallel",
            Backend::DataParallelCpu => "data-parallel-cpu",
            Backend::DataParallelGpu => "data-parallel-gpu",
            Backend::Portable => "portable",
            Backend::PortableGpu => "portable-gpu",
        }
    }

    pub const fn processor_class(self) -> ProcessorClass {
        match self {
            Backend::DataParallelGpu | Backend::PortableGpu => ProcessorClass::Accelerator,
            _ => ProcessorClass::Cpu,
        }
    }
}

/// One (problem, backend, parallelism) combination.
///
/// `compute_answer` must not mutate the input it borrows and must return a
/// freshly allocated answer every call, so the harness can invoke it any
/// number of times and keep only the last result.
pub trait KernelVariant {
    type Answer;

    fn compute_answer(&self) -> Result<Self::Answer>;

    fn backend(&self) -> Backend;

    fn name(&self) -> &'static str {
        self.backend().label()
    }

    fn processor_class(&self) -> ProcessorClass {
        self.backend().processor_class()
    }
}
