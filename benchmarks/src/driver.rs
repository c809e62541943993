use harness::{Answer, KernelVariant, Result, TimingHarness};
use tracing::info;

use crate::report::{Degree, Row};

/// The serial oracle's answer and time, fixed for one problem section.
pub struct Baseline<A> {
    pub answer: A,
    pub seconds: f64,
}

/// Times kernel variants against a baseline and keeps every row for the
/// closing summary.
pub struct Driver<'r> {
    harness: TimingHarness<'r>,
    rows: Vec<Row>,
}

impl<'r> Driver<'r> {
    pub fn new(harness: TimingHarness<'r>) -> Self {
        Self {
            harness,
            rows: Vec::new(),
        }
    }

    /// Times the reference kernel. Its answer becomes the oracle for every
    /// later comparison in the section.
    pub fn baseline<K: KernelVariant>(
        &mut self,
        problem: &'static str,
        kernel: &K,
    ) -> Result<Baseline<K::Answer>> {
        let measurement = self.harness.time(kernel)?;
        let seconds = measurement.seconds();
        self.record(Row {
            problem,
            backend: kernel.name(),
            degree: Degree::Baseline,
            seconds,
            speedup: 1.0,
        });
        Ok(Baseline {
            answer: measurement.answer,
            seconds,
        })
    }

    /// Times `kernel`, checks its answer against the baseline and records
    /// the speedup. A wrong answer aborts the run.
    pub fn compare<K>(
        &mut self,
        problem: &'static str,
        baseline: &Baseline<K::Answer>,
        kernel: &K,
        degree: Degree,
    ) -> Result<Row>
    where
        K: KernelVariant,
        K::Answer: Answer,
    {
        let measurement = self.harness.time(kernel)?;
        <K::Answer as Answer>::check(&baseline.answer, &measurement.answer, kernel.name())?;

        let seconds = measurement.seconds();
        let row = Row {
            problem,
            backend: kernel.name(),
            degree,
            seconds,
            speedup: baseline.seconds / seconds,
        };
        self.record(row.clone());
        Ok(row)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    fn record(&mut self, row: Row) {
        info!(
            problem = row.problem,
            backend = row.backend,
            seconds = row.seconds,
            speedup = row.speedup,
            "measured"
        );
        println!("{}", row.line());
        self.rows.push(row);
    }
}
