use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::time::Instant;
use tracing::Level;

use simd_dispatch::core::diagnostics::{Diagnostics, Report};
use simd_dispatch::{CapabilityDetector, DispatchError, Kernel, Tier};

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect SIMD tiers and run the matching vector-add kernel", long_about = None)]
struct Args {
    /// Number of elements per buffer
    #[arg(short, long, default_value_t = 1 << 25)]
    len: usize,

    /// Force a tier (scalar, sse4, avx2, avx512) instead of auto-selection
    #[arg(short, long)]
    tier: Option<Tier>,

    /// Print the detection report (and run result) as a single JSON object
    #[arg(long)]
    json: bool,

    /// Report detection results and exit
    #[arg(long)]
    detect_only: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Outcome of one kernel run plus its self-check.
#[derive(Debug, Clone, Serialize)]
struct RunSummary {
    tier: Tier,
    len: usize,
    elapsed_us: u128,
    passed: bool,
    /// First index that disagreed, and which check caught it.
    #[serde(skip_serializing_if = "Option::is_none")]
    mismatch: Option<Mismatch>,
}

#[derive(Debug, Clone, Serialize)]
struct Mismatch {
    index: usize,
    against: &'static str,
    expected: i32,
    actual: i32,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    #[serde(flatten)]
    report: &'a Report,
    #[serde(skip_serializing_if = "Option::is_none")]
    run: Option<&'a RunSummary>,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let detection = CapabilityDetector::detect();
    let report = Diagnostics::report(&detection);
    if !args.json {
        print!("{}", report);
    }

    let summary = if args.detect_only {
        None
    } else {
        let kernel = match args.tier {
            Some(tier) => Kernel::new(tier)?,
            None => Kernel::select(),
        };
        if !args.json {
            println!("using {}", kernel.tier());
        }
        Some(run_check(kernel, args.len)?)
    };

    if args.json {
        println!("{}", render_json(&report, summary.as_ref())?);
    } else if let Some(summary) = &summary {
        match &summary.mismatch {
            None => println!("check passed!"),
            Some(m) => println!(
                "check failed at {} against {}: z[i]={}, c[i]={}",
                m.index, m.against, m.expected, m.actual
            ),
        }
    }

    match summary {
        Some(summary) if !summary.passed => Ok(ExitCode::FAILURE),
        _ => Ok(ExitCode::SUCCESS),
    }
}

fn render_json(report: &Report, run: Option<&RunSummary>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&JsonOutput { report, run })
}

/// Fills `a[i] = 3i`, `b[i] = 2i`, runs `kernel`, then validates against a
/// rerun and against the scalar reference.
fn run_check(kernel: Kernel, n: usize) -> Result<RunSummary, DispatchError> {
    let a: Vec<i32> = (0..n).map(|i| (i as i32).wrapping_mul(3)).collect();
    let b: Vec<i32> = (0..n).map(|i| (i as i32).wrapping_mul(2)).collect();
    let mut c = vec![0i32; n];
    let mut z = vec![0i32; n];

    let start = Instant::now();
    kernel.add(&a, &b, &mut c)?;
    let elapsed = start.elapsed();
    tracing::info!(tier = %kernel.tier(), len = n, ?elapsed, "vector add complete");

    kernel.add(&a, &b, &mut z)?;
    let mut mismatch = first_mismatch(&c, &z, "rerun");
    if mismatch.is_none() {
        Kernel::SCALAR.add(&a, &b, &mut z)?;
        mismatch = first_mismatch(&c, &z, "scalar");
    }

    Ok(RunSummary {
        tier: kernel.tier(),
        len: n,
        elapsed_us: elapsed.as_micros(),
        passed: mismatch.is_none(),
        mismatch,
    })
}

fn first_mismatch(c: &[i32], z: &[i32], against: &'static str) -> Option<Mismatch> {
    c.iter().zip(z).position(|(x, y)| x != y).map(|index| Mismatch {
        index,
        against,
        expected: z[index],
        actual: c[index],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_check_passes_on_every_kernel() {
        for kernel in Kernel::available() {
            let summary = run_check(kernel, 33).unwrap();
            assert!(summary.passed, "{} kernel", kernel.tier());
            assert_eq!(summary.len, 33);
            assert!(summary.mismatch.is_none());
        }
    }

    #[test]
    fn test_json_output_is_one_parseable_object() {
        let report = Diagnostics::report(&CapabilityDetector::detect());
        let summary = run_check(Kernel::select(), 33).unwrap();

        let text = render_json(&report, Some(&summary)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tiers_bits"], report.tiers_bits);
        assert_eq!(value["run"]["passed"], true);
        assert_eq!(value["run"]["tier"], Kernel::select().tier().as_str());
        assert!(value["run"].get("mismatch").is_none());
    }

    #[test]
    fn test_json_detect_only_has_no_run() {
        let report = Diagnostics::report(&CapabilityDetector::detect());
        let text = render_json(&report, None).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert!(value.get("run").is_none());
        assert!(value["groups"].is_array());
    }

    #[test]
    fn test_first_mismatch_reports_index() {
        let m = first_mismatch(&[1, 2, 9], &[1, 2, 3], "scalar").unwrap();
        assert_eq!((m.index, m.expected, m.actual), (2, 3, 9));
        assert!(first_mismatch(&[1, 2], &[1, 2], "rerun").is_none());
    }
}
