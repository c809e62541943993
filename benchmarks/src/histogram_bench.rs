use burn::tensor::backend::Backend as TensorBackend;
use burn::tensor::{Int, Tensor, TensorData};
use harness::{Backend, Error, KernelVariant, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::info_span;

use crate::config::{HistogramConfig, INPUT_SEED};
use crate::driver::Driver;
use crate::gpu_bench::{self, GpuDevices, GpuHistogram};
use crate::report::Degree;
use crate::tensor;
use crate::workers;

// ---------------------------------------------------------------------------
// Histogram Benchmark
//
// N values in [0, N) are counted into B equal-width buckets. The canonical
// input is a shuffled permutation of 0..N, so with B | N every bucket ends
// up holding exactly N / B values.
// ---------------------------------------------------------------------------

const PROBLEM: &str = "histogram";

/// Rows the tensor histogram splits its input into.
const TENSOR_ROWS: usize = 256;

/// Validated histogram input. Every value maps to a bucket below `buckets`.
pub struct HistogramInput {
    values: Vec<u32>,
    buckets: usize,
    bucket_size: u32,
}

impl HistogramInput {
    pub fn new(values: Vec<u32>, buckets: usize) -> Result<Self> {
        if buckets == 0 {
            return Err(Error::InvalidInput("histogram needs at least one bucket".into()));
        }
        let n = values.len();
        if n > u32::MAX as usize {
            return Err(Error::InvalidInput(format!(
                "{} values do not fit the 32-bit value range",
                n
            )));
        }
        let bucket_size = (n / buckets) as u32;
        if bucket_size == 0 {
            return Err(Error::InvalidInput(format!(
                "{} values cannot fill {} buckets",
                n, buckets
            )));
        }
        if let Some(index) = values
            .iter()
            .position(|&v| (v / bucket_size) as usize >= buckets)
        {
            return Err(Error::InvalidInput(format!(
                "value {} at index {} falls outside the {} buckets",
                values[index], index, buckets
            )));
        }
        Ok(Self {
            values,
            buckets,
            bucket_size,
        })
    }

    /// `0..n` shuffled with a fixed seed.
    pub fn shuffled(n: usize, buckets: usize, seed: u64) -> Result<Self> {
        let n = u32::try_from(n)
            .map_err(|_| Error::InvalidInput(format!("{} values exceed the u32 range", n)))?;
        let mut values: Vec<u32> = (0..n).collect();
        values.shuffle(&mut StdRng::seed_from_u64(seed));
        Self::new(values, buckets)
    }

    pub fn values(&self) -> &[u32] {
        &self.values
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    pub fn bucket_size(&self) -> u32 {
        self.bucket_size
    }

    fn bucket(&self, value: u32) -> usize {
        (value / self.bucket_size) as usize
    }

    fn count_into(&self, values: &[u32], histogram: &mut [u32]) {
        for &v in values {
            histogram[self.bucket(v)] += 1;
        }
    }
}

/// Each bucket of the shuffled-permutation input must hold exactly N / B.
pub fn check_balanced(histogram: &[u32], expected: u32) -> Result<()> {
    match histogram.iter().position(|&count| count != expected) {
        Some(bucket) => Err(Error::UnbalancedBucket {
            bucket,
            expected,
            actual: histogram[bucket],
        }),
        None => Ok(()),
    }
}

fn merge(mut into: Vec<u32>, from: Vec<u32>) -> Vec<u32> {
    for (a, b) in into.iter_mut().zip(from) {
        *a += b;
    }
    into
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

pub struct SerialHistogram<'a> {
    input: &'a HistogramInput,
}

impl<'a> SerialHistogram<'a> {
    pub fn new(input: &'a HistogramInput) -> Self {
        Self { input }
    }
}

impl KernelVariant for SerialHistogram<'_> {
    type Answer = Vec<u32>;

    fn compute_answer(&self) -> Result<Vec<u32>> {
        let mut histogram = vec![0u32; self.input.buckets()];
        self.input.count_into(self.input.values(), &mut histogram);
        Ok(histogram)
    }

    fn backend(&self) -> Backend {
        Backend::Serial
    }
}

/// Work-stealing fold: each rayon split counts into its own buckets and the
/// partial histograms are summed pairwise.
pub struct RayonHistogram<'a> {
    input: &'a HistogramInput,
    pool: rayon::ThreadPool,
}

impl<'a> RayonHistogram<'a> {
    pub fn new(input: &'a HistogramInput, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Backend(e.to_string()))?;
        Ok(Self { input, pool })
    }
}

impl KernelVariant for RayonHistogram<'_> {
    type Answer = Vec<u32>;

    fn compute_answer(&self) -> Result<Vec<u32>> {
        let input = self.input;
        let b = input.buckets();
        let histogram = self.pool.install(|| {
            input
                .values()
                .par_iter()
                .fold(
                    || vec![0u32; b],
                    |mut local, &v| {
                        local[input.bucket(v)] += 1;
                        local
                    },
                )
                .reduce(|| vec![0u32; b], merge)
        });
        Ok(histogram)
    }

    fn backend(&self) -> Backend {
        Backend::TaskParallel
    }
}

/// Static chunks, one scoped thread each, local buckets merged at the end.
pub struct ThreadedHistogram<'a> {
    input: &'a HistogramInput,
    threads: usize,
}

impl<'a> ThreadedHistogram<'a> {
    pub fn new(input: &'a HistogramInput, threads: usize) -> Self {
        Self { input, threads }
    }
}

impl KernelVariant for ThreadedHistogram<'_> {
    type Answer = Vec<u32>;

    fn compute_answer(&self) -> Result<Vec<u32>> {
        let input = self.input;
        let b = input.buckets();
        let locals = workers::map_chunks(input.values(), self.threads, |_, part| {
            let mut local = vec![0u32; b];
            input.count_into(part, &mut local);
            local
        })?;
        Ok(locals.into_iter().fold(vec![0u32; b], merge))
    }

    fn backend(&self) -> Backend {
        Backend::DataParallelCpu
    }
}

/// Scatter-add of ones into per-row bucket tensors, summed over the rows.
///
/// The values are laid out as `TENSOR_ROWS` rows so the backend can scatter
/// rows in parallel. Padding lands in one extra bucket that is sliced off.
pub struct TensorHistogram<B: TensorBackend> {
    indices: Tensor<B, 2, Int>,
    buckets: usize,
    bucket_size: u32,
    backend: Backend,
}

impl<B: TensorBackend> TensorHistogram<B> {
    pub fn new(input: &HistogramInput, device: &B::Device, backend: Backend) -> Self {
        let cols = input.values().len().div_ceil(TENSOR_ROWS);
        let padding = input.buckets() as i64 * input.bucket_size() as i64;
        let mut data: Vec<i64> = input.values().iter().map(|&v| v as i64).collect();
        data.resize(TENSOR_ROWS * cols, padding);
        let data = TensorData::new(data, [TENSOR_ROWS, cols]).convert::<B::IntElem>();
        Self {
            indices: Tensor::<B, 2, Int>::from_data(data, device),
            buckets: input.buckets(),
            bucket_size: input.bucket_size(),
            backend,
        }
    }
}

impl<B: TensorBackend> KernelVariant for TensorHistogram<B> {
    type Answer = Vec<u32>;

    fn compute_answer(&self) -> Result<Vec<u32>> {
        let device = self.indices.device();
        let [rows, cols] = self.indices.dims();
        let buckets = self.indices.clone().div_scalar(self.bucket_size as i64);
        let counts = Tensor::<B, 2>::zeros([rows, self.buckets + 1], &device)
            .scatter(1, buckets, Tensor::ones([rows, cols], &device))
            .sum_dim(0)
            .slice([0..1, 0..self.buckets]);
        let counts = tensor::read_f64(counts)?;
        Ok(counts.into_iter().map(|c| c as u32).collect())
    }

    fn backend(&self) -> Backend {
        self.backend
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub fn run(driver: &mut Driver, cfg: &HistogramConfig, gpu: Option<&GpuDevices>) -> Result<()> {
    let _span = info_span!("histogram", elements = cfg.elements, buckets = cfg.buckets).entered();
    eprintln!("\n=== Histogram Benchmark ===");
    eprintln!("  {} values into {} buckets", cfg.elements, cfg.buckets);

    let input = HistogramInput::shuffled(cfg.elements, cfg.buckets, INPUT_SEED)?;

    let baseline = driver.baseline(PROBLEM, &SerialHistogram::new(&input))?;
    check_balanced(&baseline.answer, (cfg.elements / cfg.buckets) as u32)?;

    println!("{}:", Backend::TaskParallel.label());
    for &threads in &cfg.threads {
        let kernel = RayonHistogram::new(&input, threads)?;
        driver.compare(PROBLEM, &baseline, &kernel, Degree::Threads(threads))?;
    }

    println!("{}:", Backend::DataParallelCpu.label());
    for &threads in &cfg.threads {
        let kernel = ThreadedHistogram::new(&input, threads);
        driver.compare(PROBLEM, &baseline, &kernel, Degree::Threads(threads))?;
    }

    if let Some(gpu) = gpu {
        println!("{}:", Backend::DataParallelGpu.label());
        for block in gpu_bench::usable_blocks(&gpu.context, &cfg.blocks) {
            let kernel = GpuHistogram::new(gpu.context.clone(), &input, block)?;
            driver.compare(PROBLEM, &baseline, &kernel, Degree::Block(block))?;
        }
    }

    let portable = TensorHistogram::<tensor::Cpu>::new(&input, &Default::default(), Backend::Portable);
    driver.compare(PROBLEM, &baseline, &portable, Degree::Fixed)?;
    if let Some(gpu) = gpu {
        let portable = TensorHistogram::<tensor::Gpu>::new(&input, &gpu.tensor, Backend::PortableGpu);
        driver.compare(PROBLEM, &baseline, &portable, Degree::Fixed)?;
    }
    Ok(())
}
