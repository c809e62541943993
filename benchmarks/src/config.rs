/// Thread counts swept by the CPU backends.
pub const THREAD_SWEEP: &[usize] = &[1, 2, 4, 8, 16, 24];

/// Workgroup sizes swept by the GPU backend.
pub const BLOCK_SWEEP: &[u32] = &[4, 8, 16, 32, 64, 128, 256, 512];

/// Workgroup size used where a single GPU configuration is run.
pub const FIXED_BLOCK: u32 = 256;

pub const DEFAULT_REPEATS: u32 = 3;
pub const DEFAULT_WARMUP: u32 = 1;

/// Seed for every synthetic input, so runs are comparable.
pub const INPUT_SEED: u64 = 42;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Profile {
    /// Small inputs for smoke runs.
    Quick,
    /// The canonical problem sizes.
    Full,
}

impl Profile {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "quick" => Some(Profile::Quick),
            "full" => Some(Profile::Full),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HistogramConfig {
    pub elements: usize,
    pub buckets: usize,
    pub threads: Vec<usize>,
    pub blocks: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct MatmulConfig {
    pub size: usize,
    pub threads: Vec<usize>,
    pub blocks: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct IntegrationConfig {
    pub lower: f64,
    pub upper: f64,
    pub intervals: usize,
    pub threads: Vec<usize>,
    pub blocks: Vec<u32>,
}

/// Everything a run needs, fixed before the first kernel executes.
#[derive(Clone, Debug)]
pub struct Config {
    pub bench: String,
    pub profile: Profile,
    pub repeats: u32,
    pub warmup: u32,
    pub gpu: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bench: "all".to_string(),
            profile: Profile::Full,
            repeats: DEFAULT_REPEATS,
            warmup: DEFAULT_WARMUP,
            gpu: true,
        }
    }
}

impl Config {
    pub fn runs(&self, bench: &str) -> bool {
        self.bench == "all" || self.bench == bench
    }

    pub fn histogram(&self) -> HistogramConfig {
        let (elements, buckets) = match self.profile {
            Profile::Full => (10_000_000, 1_000),
            Profile::Quick => (100_000, 100),
        };
        HistogramConfig {
            elements,
            buckets,
            threads: THREAD_SWEEP.to_vec(),
            blocks: BLOCK_SWEEP.to_vec(),
        }
    }

    pub fn matmul(&self) -> MatmulConfig {
        let size = match self.profile {
            Profile::Full => 512 * 3,
            Profile::Quick => 128,
        };
        MatmulConfig {
            size,
            threads: vec![hardware_threads()],
            blocks: vec![FIXED_BLOCK],
        }
    }

    pub fn integration(&self) -> IntegrationConfig {
        let intervals = match self.profile {
            Profile::Full => 100_000_000,
            Profile::Quick => 1_000_000,
        };
        IntegrationConfig {
            lower: 0.0,
            upper: 1.314,
            intervals,
            threads: THREAD_SWEEP.to_vec(),
            blocks: BLOCK_SWEEP.to_vec(),
        }
    }
}

pub fn hardware_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .max(1)
}
