/// Parallelism parameter a measurement was taken with.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Degree {
    /// The serial reference run.
    Baseline,
    /// CPU worker threads.
    Threads(usize),
    /// GPU workgroup size.
    Block(u32),
    /// A backend with no tunable degree.
    Fixed,
}

impl Degree {
    /// `speedup / threads` as a percentage of ideal scaling. Only thread
    /// counts have a meaningful ideal.
    pub fn efficiency(self, speedup: f64) -> Option<f64> {
        match self {
            Degree::Threads(n) if n > 0 => Some(100.0 * speedup / n as f64),
            _ => None,
        }
    }

    fn column(self) -> String {
        match self {
            Degree::Baseline => "-".to_string(),
            Degree::Threads(n) => format!("{} thr", n),
            Degree::Block(n) => format!("{} blk", n),
            Degree::Fixed => "fixed".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Row {
    pub problem: &'static str,
    pub backend: &'static str,
    pub degree: Degree,
    pub seconds: f64,
    pub speedup: f64,
}

impl Row {
    /// One sweep line, in the format printed as the run progresses.
    pub fn line(&self) -> String {
        match self.degree {
            Degree::Threads(n) => format!(
                "{:3} : time {:8.2e} speedup {:8.2e} (%{:5.1} of ideal)",
                n,
                self.seconds,
                self.speedup,
                self.degree.efficiency(self.speedup).unwrap_or(0.0)
            ),
            Degree::Block(n) => format!(
                "{:3} : time {:8.2e} speedup {:8.2e}",
                n, self.seconds, self.speedup
            ),
            Degree::Baseline | Degree::Fixed => format!(
                "{} time {:8.2e} speedup {:8.2e}",
                self.backend, self.seconds, self.speedup
            ),
        }
    }
}

/// Print every row collected during the run as one table.
pub fn print_summary(rows: &[Row]) {
    let problem_w = 12;
    let backend_w = 18;
    let col_w = 10;

    println!();
    println!(
        "{:<problem_w$} {:<backend_w$} {:>col_w$} {:>col_w$} {:>col_w$} {:>col_w$}",
        "Problem", "Backend", "Degree", "Time", "Speedup", "Ideal",
        problem_w = problem_w, backend_w = backend_w, col_w = col_w
    );
    println!("{}", "-".repeat(problem_w + backend_w + col_w * 4 + 5));

    for r in rows {
        let ideal = match r.degree.efficiency(r.speedup) {
            Some(pct) => format!("{:.1}%", pct),
            None => "—".to_string(),
        };
        println!(
            "{:<problem_w$} {:<backend_w$} {:>col_w$} {:>col_w$} {:>col_w$} {:>col_w$}",
            r.problem,
            r.backend,
            r.degree.column(),
            format!("{:.3}s", r.seconds),
            format!("{:.2}x", r.speedup),
            ideal,
            problem_w = problem_w, backend_w = backend_w, col_w = col_w
        );
    }
    println!();
}
