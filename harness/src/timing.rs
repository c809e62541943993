use std::time::Duration;

use quanta::Clock;
use tracing::{debug, info};

use crate::{Error, KernelVariant, Reset, Result};

/// Answer of the last repeat plus the mean duration of the counted repeats.
#[derive(Debug, Clone)]
pub struct Measurement<A> {
    pub answer: A,
    pub elapsed: Duration,
}

impl<A> Measurement<A> {
    pub fn seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// Drives repeated kernel invocations.
///
/// Every invocation, warm-up ones included, is preceded by a processor
/// reset. Only invocations after the first `warmup` are timed; the clock
/// starts after the reset and stops as soon as the kernel returns.
pub struct TimingHarness<'r> {
    reset: &'r dyn Reset,
    clock: Clock,
    repeats: u32,
    warmup: u32,
}

impl<'r> TimingHarness<'r> {
    pub fn new(reset: &'r dyn Reset, repeats: u32, warmup: u32) -> Result<Self> {
        Self::with_clock(reset, repeats, warmup, Clock::new())
    }

    pub fn with_clock(reset: &'r dyn Reset, repeats: u32, warmup: u32, clock: Clock) -> Result<Self> {
        if repeats == 0 {
            return Err(Error::InvalidInput("at least one timed repeat is required".into()));
        }
        Ok(Self {
            reset,
            clock,
            repeats,
            warmup,
        })
    }

    pub fn time<K: KernelVariant>(&self, kernel: &K) -> Result<Measurement<K::Answer>> {
        let class = kernel.processor_class();
        let mut total = Duration::ZERO;
        let mut answer = None;

        for repeat in 0..self.repeats + self.warmup {
            self.reset.reset(class)?;

            let counted = repeat >= self.warmup;
            let tic = self.clock.now();
            let result = kernel.compute_answer()?;
            let toc = self.clock.now();

            let sample = toc.duration_since(tic);
            if counted {
                total += sample;
            }
            debug!(kernel = kernel.name(), repeat, counted, ?sample, "repeat finished");
            answer = Some(result);
        }

        let elapsed = total / self.repeats;
        info!(kernel = kernel.name(), ?elapsed, repeats = self.repeats, "timing complete");

        // repeats >= 1, so the loop ran at least once.
        let answer = answer.ok_or_else(|| Error::InvalidInput("no repeats were run".into()))?;
        Ok(Measurement { answer, elapsed })
    }
}
