mod config;
mod driver;
mod gpu_bench;
mod histogram_bench;
mod integration_bench;
mod matmul_bench;
mod report;
mod tensor;
mod workers;

use std::sync::Arc;

use harness::{Error, GpuContext, ProcessorReset, TimingHarness};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use config::{Config, Profile};
use driver::Driver;
use gpu_bench::GpuDevices;

fn print_usage() {
    eprintln!("Usage: benchmarks [OPTIONS]");
    eprintln!();
    eprintln!("  --bench <name>     Problem to run: histogram, matmul, integration, all (default: all)");
    eprintln!("  --profile <name>   Profile: quick, full (default: full)");
    eprintln!("  --repeats <n>      Timed repeats per measurement (default: 3)");
    eprintln!("  --warmup <n>       Untimed warm-up repeats (default: 1)");
    eprintln!("  --no-gpu           Skip the data-parallel GPU and portable GPU backends");
    eprintln!("  --help             Show this help");
}

fn usage_error(message: &str) -> ! {
    eprintln!("{}", message);
    print_usage();
    std::process::exit(2);
}

fn parse_count(flag: &str, value: Option<&String>) -> u32 {
    match value.map(|v| v.parse::<u32>()) {
        Some(Ok(n)) => n,
        _ => usage_error(&format!("{} expects a non-negative integer", flag)),
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("off")),
                ),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut cfg = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bench" => {
                i += 1;
                match args.get(i).map(String::as_str) {
                    Some(name @ ("histogram" | "matmul" | "integration" | "all")) => {
                        cfg.bench = name.to_string();
                    }
                    _ => usage_error("--bench expects histogram, matmul, integration or all"),
                }
            }
            "--profile" => {
                i += 1;
                match args.get(i).and_then(|p| Profile::parse(p)) {
                    Some(profile) => cfg.profile = profile,
                    None => usage_error("--profile expects quick or full"),
                }
            }
            "--repeats" => {
                i += 1;
                cfg.repeats = parse_count("--repeats", args.get(i));
            }
            "--warmup" => {
                i += 1;
                cfg.warmup = parse_count("--warmup", args.get(i));
            }
            "--no-gpu" => cfg.gpu = false,
            "--help" | "-h" => {
                print_usage();
                return;
            }
            other => usage_error(&format!("Unknown flag: {}", other)),
        }
        i += 1;
    }

    if let Err(e) = run(&cfg) {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cfg: &Config) -> harness::Result<()> {
    info!(?cfg, "starting");

    let gpu = if cfg.gpu {
        match GpuContext::new() {
            Ok(context) => {
                eprintln!("GPU: {}", context.adapter_name());
                Some(GpuDevices::new(Arc::new(context))?)
            }
            Err(Error::NoAdapter) => {
                eprintln!("No GPU adapter found; skipping the GPU backends");
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    let reset = match &gpu {
        Some(gpu) => ProcessorReset::cpu().with_gpu(gpu.context.clone())?,
        None => ProcessorReset::cpu(),
    };
    let harness = TimingHarness::new(&reset, cfg.repeats, cfg.warmup)?;
    let mut driver = Driver::new(harness);

    if cfg.runs("histogram") {
        histogram_bench::run(&mut driver, &cfg.histogram(), gpu.as_ref())?;
    }
    if cfg.runs("matmul") {
        matmul_bench::run(&mut driver, &cfg.matmul(), gpu.as_ref())?;
    }
    if cfg.runs("integration") {
        integration_bench::run(&mut driver, &cfg.integration(), gpu.as_ref())?;
    }

    report::print_summary(driver.rows());
    Ok(())
}
