use anyhow::Result;
use clap::Parser;
use mwcas_bench::driver::{run, Args, Report};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "mimalloc-allocator")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    };
    let csv = matches!(config.output, mwcas_bench::driver::config::OutputFormat::Csv);

    let report = run(config);
    print_report(&report, csv);
    Ok(())
}

fn print_report(report: &Report, csv: bool) {
    match report {
        Report::Throughput(t) => {
            for anomaly in &t.anomalies {
                tracing::warn!(?anomaly, "measurement anomaly");
            }
            if csv {
                write_csv_row(&[t.ops_per_sec.to_string()]);
            } else {
                println!("Throughput [Ops/s]: {}", t.ops_per_sec);
            }
        }
        Report::Latency(p) => {
            if csv {
                write_csv_row(&[
                    dur_us(p.min).to_string(),
                    dur_us(p.p90).to_string(),
                    dur_us(p.p95).to_string(),
                    dur_us(p.p99).to_string(),
                    dur_us(p.max).to_string(),
                ]);
            } else {
                println!("min [us]: {}", dur_us(p.min));
                println!("p90 [us]: {}", dur_us(p.p90));
                println!("p95 [us]: {}", dur_us(p.p95));
                println!("p99 [us]: {}", dur_us(p.p99));
                println!("max [us]: {}", dur_us(p.max));
            }
        }
    }
}

/// Emits one CSV row to stdout (spec.md §6: "CSV output emits a single
/// comma-separated row").
fn write_csv_row(fields: &[String]) {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(std::io::stdout());
    writer.write_record(fields).expect("stdout is writable");
    writer.flush().expect("stdout is writable");
}

fn dur_us(d: std::time::Duration) -> f64 {
    d.as_secs_f64() * 1_000_000.0
}
