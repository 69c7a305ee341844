use clap::Parser;
use hdrhistogram::Histogram;
use rand::Rng;
use std::time::Instant;
use sysinfo::System;

use simd_dispatch::{CapabilityDetector, Kernel};

#[derive(Parser, Debug)]
#[command(author, about = "Time every vector-add kernel this host can run", long_about = None)]
struct Args {
    /// Elements per buffer
    #[arg(short = 'n', long, default_value_t = 1 << 20)]
    len: usize,

    /// Timed iterations per kernel
    #[arg(short, long, default_value_t = 200, value_parser = clap::value_parser!(u64).range(1..))]
    iterations: u64,

    /// Pin the benchmark thread to this core
    #[arg(short, long)]
    core: Option<usize>,

    /// Also time the rayon-parallel variant
    #[arg(long)]
    parallel: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    if let Some(core) = args.core {
        let pinned = core_affinity::get_core_ids()
            .and_then(|ids| ids.get(core).copied())
            .map(core_affinity::set_for_current)
            .unwrap_or(false);
        if !pinned {
            tracing::warn!(core, "could not pin benchmark thread");
        }
    }

    let mut sys = System::new();
    sys.refresh_cpu();
    let brand = sys
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let tiers = CapabilityDetector::query();
    println!("=== Benchmark: N={}, iterations={} ===", args.len, args.iterations);
    println!("CPU: {}", brand);
    println!("Supported tiers: {} (mask {})", tiers, tiers.bits());

    // 1. Generate Data
    let mut rng = rand::thread_rng();
    let a: Vec<i32> = (0..args.len).map(|_| rng.gen()).collect();
    let b: Vec<i32> = (0..args.len).map(|_| rng.gen()).collect();
    let mut c = vec![0i32; args.len];

    // 2. Time every kernel
    for kernel in Kernel::available() {
        let hist = run(&kernel, &a, &b, &mut c, args.iterations, false)?;
        print_row(&kernel, "serial", &hist, args.len);
        if args.parallel {
            let hist = run(&kernel, &a, &b, &mut c, args.iterations, true)?;
            print_row(&kernel, "rayon", &hist, args.len);
        }
    }

    Ok(())
}

fn run(
    kernel: &Kernel,
    a: &[i32],
    b: &[i32],
    c: &mut [i32],
    iterations: u64,
    parallel: bool,
) -> Result<Histogram<u64>, Box<dyn std::error::Error>> {
    let mut hist = Histogram::<u64>::new(3)?;
    // Warm-up
    kernel.add(a, b, c)?;
    for _ in 0..iterations {
        let start = Instant::now();
        if parallel {
            kernel.par_add(a, b, c)?;
        } else {
            kernel.add(a, b, c)?;
        }
        hist.record(start.elapsed().as_nanos().max(1) as u64)?;
    }
    Ok(hist)
}

fn print_row(kernel: &Kernel, mode: &str, hist: &Histogram<u64>, len: usize) {
    if hist.is_empty() {
        return;
    }
    let p50 = hist.value_at_quantile(0.5);
    let gelem_per_s = len as f64 / p50 as f64;
    println!(
        "{:<7} {:<6} p50={:>10}ns p99={:>10}ns max={:>10}ns  {:.2} Gelem/s",
        kernel.tier().as_str(),
        mode,
        p50,
        hist.value_at_quantile(0.99),
        hist.max(),
        gelem_per_s
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(Args::try_parse_from(["benchmark", "--iterations", "0"]).is_err());
        let args = Args::try_parse_from(["benchmark", "-i", "1"]).unwrap();
        assert_eq!(args.iterations, 1);
        assert_eq!(Args::try_parse_from(["benchmark"]).unwrap().iterations, 200);
    }

    #[test]
    fn test_run_records_every_iteration() {
        let a = [1; 17];
        let b = [2; 17];
        let mut c = [0; 17];
        let hist = run(&Kernel::SCALAR, &a, &b, &mut c, 5, false).unwrap();
        assert_eq!(hist.len(), 5);
        assert!(hist.value_at_quantile(0.5) >= 1);
        assert_eq!(c, [3; 17]);
    }
}
