use burn::tensor::backend::Backend as TensorBackend;
use burn::tensor::{Tensor, TensorData};
use harness::{Backend, Error, KernelVariant, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::info_span;

use crate::config::{MatmulConfig, INPUT_SEED};
use crate::driver::Driver;
use crate::gpu_bench::{self, GpuDevices, GpuMatmul};
use crate::report::Degree;
use crate::tensor;
use crate::workers;

const PROBLEM: &str = "matmul";

/// Two square row-major matrices of side `size`.
pub struct MatrixInput {
    left: Vec<f64>,
    right: Vec<f64>,
    size: usize,
}

impl MatrixInput {
    pub fn new(left: Vec<f64>, right: Vec<f64>, size: usize) -> Result<Self> {
        let expected = size * size;
        if size == 0 || left.len() != expected || right.len() != expected {
            return Err(Error::InvalidInput(format!(
                "matrices of {} and {} entries are not both {}x{}",
                left.len(),
                right.len(),
                size,
                size
            )));
        }
        Ok(Self { left, right, size })
    }

    /// Entries uniform in `[0, 1)` from a seeded generator.
    pub fn random(size: usize, seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let left = (0..size * size).map(|_| rng.gen::<f64>()).collect();
        let right = (0..size * size).map(|_| rng.gen::<f64>()).collect();
        Self::new(left, right, size)
    }

    pub fn left(&self) -> &[f64] {
        &self.left
    }

    pub fn right(&self) -> &[f64] {
        &self.right
    }

    pub fn size(&self) -> usize {
        self.size
    }

    // Fills one output row, summing over k in ascending order.
    fn row_into(&self, row: usize, out: &mut [f64]) {
        let s = self.size;
        let lhs = &self.left[row * s..(row + 1) * s];
        for (col, cell) in out.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (k, &a) in lhs.iter().enumerate() {
                sum += a * self.right[k * s + col];
            }
            *cell = sum;
        }
    }
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

pub struct SerialMatmul<'a> {
    input: &'a MatrixInput,
}

impl<'a> SerialMatmul<'a> {
    pub fn new(input: &'a MatrixInput) -> Self {
        Self { input }
    }
}

impl KernelVariant for SerialMatmul<'_> {
    type Answer = Vec<f64>;

    fn compute_answer(&self) -> Result<Vec<f64>> {
        let s = self.input.size();
        let mut result = vec![0.0; s * s];
        for (row, out) in result.chunks_exact_mut(s).enumerate() {
            self.input.row_into(row, out);
        }
        Ok(result)
    }

    fn backend(&self) -> Backend {
        Backend::Serial
    }
}

/// One rayon task per output row.
pub struct RayonMatmul<'a> {
    input: &'a MatrixInput,
    pool: rayon::ThreadPool,
}

impl<'a> RayonMatmul<'a> {
    pub fn new(input: &'a MatrixInput, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| Error::Backend(e.to_string()))?;
        Ok(Self { input, pool })
    }
}

impl KernelVariant for RayonMatmul<'_> {
    type Answer = Vec<f64>;

    fn compute_answer(&self) -> Result<Vec<f64>> {
        let input = self.input;
        let s = input.size();
        let mut result = vec![0.0; s * s];
        self.pool.install(|| {
            result
                .par_chunks_mut(s)
                .enumerate()
                .for_each(|(row, out)| input.row_into(row, out));
        });
        Ok(result)
    }

    fn backend(&self) -> Backend {
        Backend::TaskParallel
    }
}

/// Contiguous bands of rows, one scoped thread per band.
pub struct ThreadedMatmul<'a> {
    input: &'a MatrixInput,
    threads: usize,
}

impl<'a> ThreadedMatmul<'a> {
    pub fn new(input: &'a MatrixInput, threads: usize) -> Self {
        Self { input, threads }
    }
}

impl KernelVariant for ThreadedMatmul<'_> {
    type Answer = Vec<f64>;

    fn compute_answer(&self) -> Result<Vec<f64>> {
        let input = self.input;
        let s = input.size();
        let mut result = vec![0.0; s * s];
        workers::fill_chunks(&mut result, s, self.threads, |start, band| {
            let first_row = start / s;
            for (i, out) in band.chunks_exact_mut(s).enumerate() {
                input.row_into(first_row + i, out);
            }
        })?;
        Ok(result)
    }

    fn backend(&self) -> Backend {
        Backend::DataParallelCpu
    }
}

/// Dense `matmul` on a burn backend.
///
/// Both matrices are centered on their means before upload so a 32-bit
/// backend multiplies entries in `[-0.5, 0.5)`. The offsets come back in f64:
/// `(L' + a)(R' + b) = L'R' + b * rowsum(L') + a * colsum(R') + a * b * n`.
pub struct TensorMatmul<B: TensorBackend> {
    left: Tensor<B, 2>,
    right: Tensor<B, 2>,
    left_mean: f64,
    right_mean: f64,
    backend: Backend,
}

fn centered(values: &[f64]) -> (Vec<f64>, f64) {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (values.iter().map(|v| v - mean).collect(), mean)
}

impl<B: TensorBackend> TensorMatmul<B> {
    pub fn new(input: &MatrixInput, device: &B::Device, backend: Backend) -> Self {
        let s = input.size();
        let (left, left_mean) = centered(input.left());
        let (right, right_mean) = centered(input.right());
        let upload = |values: Vec<f64>| {
            let data = TensorData::new(values, [s, s]).convert::<B::FloatElem>();
            Tensor::<B, 2>::from_data(data, device)
        };
        Self {
            left: upload(left),
            right: upload(right),
            left_mean,
            right_mean,
            backend,
        }
    }
}

impl<B: TensorBackend> KernelVariant for TensorMatmul<B> {
    type Answer = Vec<f64>;

    fn compute_answer(&self) -> Result<Vec<f64>> {
        let [s, _] = self.left.dims();
        let product = tensor::read_f64(self.left.clone().matmul(self.right.clone()))?;
        let row_sums = tensor::read_f64(self.left.clone().sum_dim(1))?;
        let col_sums = tensor::read_f64(self.right.clone().sum_dim(0))?;

        let (a, b) = (self.left_mean, self.right_mean);
        let offset = a * b * s as f64;
        let mut result = product;
        for (row, out) in result.chunks_exact_mut(s).enumerate() {
            let row_term = b * row_sums[row];
            for (cell, &col_sum) in out.iter_mut().zip(&col_sums) {
                *cell += row_term + a * col_sum + offset;
            }
        }
        Ok(result)
    }

    fn backend(&self) -> Backend {
        self.backend
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub fn run(driver: &mut Driver, cfg: &MatmulConfig, gpu: Option<&GpuDevices>) -> Result<()> {
    let _span = info_span!("matmul", size = cfg.size).entered();
    eprintln!("\n=== Matrix Multiplication Benchmark ===");
    eprintln!("  {}x{} matrices", cfg.size, cfg.size);

    let input = MatrixInput::random(cfg.size, INPUT_SEED)?;
    let baseline = driver.baseline(PROBLEM, &SerialMatmul::new(&input))?;

    println!("{}:", Backend::TaskParallel.label());
    for &threads in &cfg.threads {
        let kernel = RayonMatmul::new(&input, threads)?;
        driver.compare(PROBLEM, &baseline, &kernel, Degree::Threads(threads))?;
    }

    println!("{}:", Backend::DataParallelCpu.label());
    for &threads in &cfg.threads {
        let kernel = ThreadedMatmul::new(&input, threads);
        driver.compare(PROBLEM, &baseline, &kernel, Degree::Threads(threads))?;
    }

    if let Some(gpu) = gpu {
        println!("{}:", Backend::DataParallelGpu.label());
        for block in gpu_bench::usable_blocks(&gpu.context, &cfg.blocks) {
            let kernel = GpuMatmul::new(gpu.context.clone(), &input, block)?;
            driver.compare(PROBLEM, &baseline, &kernel, Degree::Block(block))?;
        }
    }

    let portable = TensorMatmul::<tensor::Cpu>::new(&input, &Default::default(), Backend::Portable);
    driver.compare(PROBLEM, &baseline, &portable, Degree::Fixed)?;
    if let Some(gpu) = gpu {
        let portable = TensorMatmul::<tensor::Gpu>::new(&input, &gpu.tensor, Backend::PortableGpu);
        driver.compare(PROBLEM, &baseline, &portable, Degree::Fixed)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use harness::{check_elementwise, ProcessorReset, TimingHarness, ELEMENT_TOLERANCE};

    #[test]
    fn test_known_product() {
        // [1 2; 3 4] * [5 6; 7 8]
        let input = MatrixInput::new(vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0], 2).unwrap();
        let result = SerialMatmul::new(&input).compute_answer().unwrap();
        assert_eq!(result, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_identity_leaves_matrix_unchanged() {
        let s = 5;
        let identity: Vec<f64> = (0..s * s).map(|i| if i % (s + 1) == 0 { 1.0 } else { 0.0 }).collect();
        let other: Vec<f64> = (0..s * s).map(|i| i as f64 * 0.25).collect();
        let input = MatrixInput::new(identity, other.clone(), s).unwrap();
        assert_eq!(SerialMatmul::new(&input).compute_answer().unwrap(), other);
    }

    #[test]
    fn test_reference_insensitive_to_summation_order() {
        let input = MatrixInput::random(48, 3).unwrap();
        let s = input.size();
        let reference = SerialMatmul::new(&input).compute_answer().unwrap();

        let mut reversed = vec![0.0; s * s];
        for r in 0..s {
            for c in 0..s {
                reversed[r * s + c] = (0..s)
                    .rev()
                    .map(|k| input.left()[r * s + k] * input.right()[k * s + c])
                    .sum();
            }
        }
        check_elementwise(&reference, &reversed, ELEMENT_TOLERANCE, "reversed").unwrap();
    }

    #[test]
    fn test_random_entries_in_unit_interval() {
        let input = MatrixInput::random(16, 9).unwrap();
        assert!(input.left().iter().chain(input.right()).all(|&x| (0.0..1.0).contains(&x)));
        let again = MatrixInput::random(16, 9).unwrap();
        assert_eq!(input.left(), again.left());
    }

    #[test]
    fn test_rejects_mismatched_shapes() {
        assert!(MatrixInput::new(vec![1.0; 4], vec![1.0; 9], 2).is_err());
        assert!(MatrixInput::new(vec![], vec![], 0).is_err());
    }

    #[test]
    fn test_parallel_variants_match_reference() {
        let input = MatrixInput::random(37, 11).unwrap();
        let reference = SerialMatmul::new(&input).compute_answer().unwrap();

        for threads in [1, 4, 64] {
            let rayon = RayonMatmul::new(&input, threads).unwrap().compute_answer().unwrap();
            check_elementwise(&reference, &rayon, ELEMENT_TOLERANCE, "task-parallel").unwrap();
            let threaded = ThreadedMatmul::new(&input, threads).compute_answer().unwrap();
            check_elementwise(&reference, &threaded, ELEMENT_TOLERANCE, "data-parallel-cpu").unwrap();
        }
    }

    #[test]
    fn test_tensor_matches_reference() {
        let input = MatrixInput::random(33, 5).unwrap();
        let reference = SerialMatmul::new(&input).compute_answer().unwrap();
        let kernel = TensorMatmul::<tensor::Cpu>::new(&input, &Default::default(), Backend::Portable);
        let first = kernel.compute_answer().unwrap();
        check_elementwise(&reference, &first, ELEMENT_TOLERANCE, "portable").unwrap();
        assert_eq!(kernel.compute_answer().unwrap(), first);
    }

    #[test]
    fn test_tensor_restores_means() {
        // Constant matrices center to zero; the whole product is the offset term.
        let input = MatrixInput::new(vec![2.0; 9], vec![0.5; 9], 3).unwrap();
        let kernel = TensorMatmul::<tensor::Cpu>::new(&input, &Default::default(), Backend::Portable);
        let result = kernel.compute_answer().unwrap();
        check_elementwise(&[3.0; 9], &result, 1e-12, "portable").unwrap();
    }

    #[test]
    fn test_run_times_every_cpu_backend() {
        let reset = ProcessorReset::with_scratch(1024);
        let mut driver = Driver::new(TimingHarness::new(&reset, 1, 0).unwrap());
        let cfg = MatmulConfig {
            size: 24,
            threads: vec![1, 3],
            blocks: vec![16],
        };
        run(&mut driver, &cfg, None).unwrap();

        let rows = driver.rows();
        let backends: Vec<_> = rows.iter().map(|r| r.backend).collect();
        assert_eq!(
            backends,
            vec![
                "serial",
                "task-parallel",
                "task-parallel",
                "data-parallel-cpu",
                "data-parallel-cpu",
                "portable",
            ]
        );
        assert!(rows.iter().all(|r| r.problem == "matmul"));
        assert_eq!(rows[1].degree, Degree::Threads(1));
        assert_eq!(rows[4].degree, Degree::Threads(3));
        assert_eq!(rows[5].degree, Degree::Fixed);
    }
}
