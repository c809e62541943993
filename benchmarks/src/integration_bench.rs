use burn::tensor::backend::Backend as TensorBackend;
use burn::tensor::{ElementConversion, Int, Tensor};
use harness::{check_relative, Backend, Error, KernelVariant, Result, RELATIVE_TOLERANCE};
use rayon::prelude::*;
use tracing::info_span;

use crate::config::IntegrationConfig;
use crate::driver::Driver;
use crate::gpu_bench::{self, GpuDevices, GpuIntegration};
use crate::report::Degree;
use crate::tensor;
use crate::workers;

// ---------------------------------------------------------------------------
// Scalar Integration Benchmark
//
// Midpoint rule for the integral of sin over [a, b] with N equal intervals.
// Every backend sums sin(a + (i + 0.5) * dx) and scales by dx once.
// ---------------------------------------------------------------------------

const PROBLEM: &str = "integration";

/// Intervals per tensor evaluated by the portable backend at once.
const TENSOR_CHUNK: usize = 1 << 20;

#[derive(Copy, Clone, Debug)]
pub struct IntegrationInput {
    lower: f64,
    upper: f64,
    intervals: usize,
    dx: f64,
}

impl IntegrationInput {
    pub fn new(lower: f64, upper: f64, intervals: usize) -> Result<Self> {
        if intervals == 0 {
            return Err(Error::InvalidInput("integration needs at least one interval".into()));
        }
        if !lower.is_finite() || !upper.is_finite() || lower >= upper {
            return Err(Error::InvalidInput(format!(
                "[{}, {}] is not a valid integration interval",
                lower, upper
            )));
        }
        Ok(Self {
            lower,
            upper,
            intervals,
            dx: (upper - lower) / intervals as f64,
        })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn intervals(&self) -> usize {
        self.intervals
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// Closed form of the integral: `cos(a) - cos(b)`.
    pub fn analytic(&self) -> f64 {
        self.lower.cos() - self.upper.cos()
    }

    fn midpoint(&self, i: usize) -> f64 {
        self.lower + (i as f64 + 0.5) * self.dx
    }

    fn partial_sum(&self, start: usize, end: usize) -> f64 {
        (start..end).map(|i| self.midpoint(i).sin()).sum()
    }
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

pub struct SerialIntegration {
    input: IntegrationInput,
}

impl SerialIntegration {
    pub fn new(input: IntegrationInput) -> Self {
        Self { input }
    }
}

impl KernelVariant for SerialIntegration {
    type Answer = f64;

    fn compute_answer(&self) -> Result<f64> {
        Ok(self.input.partial_sum(0, self.input.intervals()) * self.input.dx())
    }

    fn backend(&self) -> Backend {
        Backend::Serial
    }
}

/// Parallel sum reduction over the interval indices.
pub struct RayonIntegration {
    input: IntegrationInput,
    pool: rayon::ThreadPool,
}

impl RayonIntegration {
    pub fn new(input: IntegrationInput, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Backend(e.to_string()))?;
        Ok(Self { input, pool })
    }
}

impl KernelVariant for RayonIntegration {
    type Answer = f64;

    fn compute_answer(&self) -> Result<f64> {
        let input = self.input;
        let sum: f64 = self.pool.install(|| {
            (0..input.intervals())
                .into_par_iter()
                .map(|i| input.midpoint(i).sin())
                .sum()
        });
        Ok(sum * input.dx())
    }

    fn backend(&self) -> Backend {
        Backend::TaskParallel
    }
}

/// One contiguous index range per scoped thread.
pub struct ThreadedIntegration {
    input: IntegrationInput,
    threads: usize,
}

impl ThreadedIntegration {
    pub fn new(input: IntegrationInput, threads: usize) -> Self {
        Self { input, threads }
    }
}

impl KernelVariant for ThreadedIntegration {
    type Answer = f64;

    fn compute_answer(&self) -> Result<f64> {
        let input = &self.input;
        let partials = workers::map_ranges(input.intervals(), self.threads, |start, end| {
            input.partial_sum(start, end)
        })?;
        Ok(partials.iter().sum::<f64>() * input.dx())
    }

    fn backend(&self) -> Backend {
        Backend::DataParallelCpu
    }
}

/// Builds midpoints from an index tensor chunk by chunk, so memory stays
/// bounded for any interval count. Chunk sums are added on the host in f64.
pub struct TensorIntegration<B: TensorBackend> {
    input: IntegrationInput,
    device: B::Device,
    backend: Backend,
}

impl<B: TensorBackend> TensorIntegration<B> {
    pub fn new(input: IntegrationInput, device: &B::Device, backend: Backend) -> Self {
        Self {
            input,
            device: device.clone(),
            backend,
        }
    }
}

impl<B: TensorBackend> KernelVariant for TensorIntegration<B> {
    type Answer = f64;

    fn compute_answer(&self) -> Result<f64> {
        let input = &self.input;
        let mut sum = 0.0f64;
        for start in (0..input.intervals()).step_by(TENSOR_CHUNK) {
            let len = TENSOR_CHUNK.min(input.intervals() - start);
            // Offsets within the chunk stay small enough for a 32-bit backend.
            let chunk: f64 = Tensor::<B, 1, Int>::arange(0..len as i64, &self.device)
                .float()
                .mul_scalar(input.dx())
                .add_scalar(input.midpoint(start))
                .sin()
                .sum()
                .into_scalar()
                .elem();
            sum += chunk;
        }
        Ok(sum * input.dx())
    }

    fn backend(&self) -> Backend {
        self.backend
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub fn run(driver: &mut Driver, cfg: &IntegrationConfig, gpu: Option<&GpuDevices>) -> Result<()> {
    let _span = info_span!("integration", intervals = cfg.intervals).entered();
    eprintln!("\n=== Scalar Integration Benchmark ===");
    eprintln!(
        "  sin over [{}, {}] with {} intervals",
        cfg.lower, cfg.upper, cfg.intervals
    );

    let input = IntegrationInput::new(cfg.lower, cfg.upper, cfg.intervals)?;
    let serial = SerialIntegration::new(input);
    let baseline = driver.baseline(PROBLEM, &serial)?;
    check_relative(input.analytic(), baseline.answer, RELATIVE_TOLERANCE, serial.name())?;

    println!("{}:", Backend::TaskParallel.label());
    for &threads in &cfg.threads {
        let kernel = RayonIntegration::new(input, threads)?;
        driver.compare(PROBLEM, &baseline, &kernel, Degree::Threads(threads))?;
    }

    println!("{}:", Backend::DataParallelCpu.label());
    for &threads in &cfg.threads {
        let kernel = ThreadedIntegration::new(input, threads);
        driver.compare(PROBLEM, &baseline, &kernel, Degree::Threads(threads))?;
    }

    if let Some(gpu) = gpu {
        println!("{}:", Backend::DataParallelGpu.label());
        for block in gpu_bench::usable_blocks(&gpu.context, &cfg.blocks) {
            let kernel = GpuIntegration::new(gpu.context.clone(), input, block)?;
            driver.compare(PROBLEM, &baseline, &kernel, Degree::Block(block))?;
        }
    }

    let portable = TensorIntegration::<tensor::Cpu>::new(input, &Default::default(), Backend::Portable);
    driver.compare(PROBLEM, &baseline, &portable, Degree::Fixed)?;
    if let Some(gpu) = gpu {
        let portable = TensorIntegration::<tensor::Gpu>::new(input, &gpu.tensor, Backend::PortableGpu);
        driver.compare(PROBLEM, &baseline, &portable, Degree::Fixed)?;
    }
    Ok(())
}
