//! CLI entrypoint for HAVFS sampling experiments.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use parking_lot::Mutex;

use havfs_harness::config::{IntervalOverrides, load_scheduler_config, resolve};
use havfs_harness::evaluation::{EvaluationReport, ReportFormat};
use havfs_harness::experiment::{
    ExperimentRunner, ModeKind, SamplingMode, ShutdownSignal, SystemClock,
    install_interrupt_handler,
};
use havfs_harness::exporter::PrometheusExporter;
use havfs_harness::record::{read_csv, write_csv};
use havfs_harness::replay::{load_trace, replay};
use havfs_harness::reporter::{
    ConsoleReporter, CsvReporter, DecisionLogReporter, PrometheusReporter, Reporter,
    SharedEmitter,
};
use havfs_harness::structured_log::{ArtifactIndex, LogEmitter, validate_log_file};
use havfs_harness::{DeviceKind, HarnessError};

/// Adaptive sampling experiments for heterogeneous devices.
#[derive(Debug, Parser)]
#[command(name = "havfs-harness")]
#[command(about = "Run, replay and evaluate HAVFS sampling experiments")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Sample a device for a fixed duration and record every cycle.
    Run {
        /// `fixed` or `havfs`. Falls back to $HAVFS_MODE, then `havfs`.
        #[arg(long)]
        mode: Option<String>,
        /// Device kind: `cpu`, `gpu` (simulated) or `npu`.
        #[arg(long, default_value = "cpu")]
        device: String,
        /// Interval for fixed mode, seconds.
        #[arg(long, default_value_t = 2.0)]
        fixed_interval: f64,
        /// Shortest adaptive interval, seconds (overrides config file).
        #[arg(long)]
        t_min: Option<f64>,
        /// Longest adaptive interval, seconds (overrides config file).
        #[arg(long)]
        t_max: Option<f64>,
        /// Experiment duration, seconds.
        #[arg(long, default_value_t = 30.0)]
        duration: f64,
        /// Output CSV path.
        #[arg(long, default_value = "experiments/run.csv")]
        output: PathBuf,
        /// Scheduler configuration JSON.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Structured JSONL log path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Serve Prometheus metrics on this address, e.g. `127.0.0.1:9108`.
        #[arg(long)]
        prometheus_addr: Option<String>,
        /// Record the monitor's own CPU and memory per cycle.
        #[arg(long)]
        measure_overhead: bool,
        /// Seed for the simulated GPU (decimal or 0x...).
        #[arg(long, default_value = "0x5EED")]
        seed: String,
        /// Do not print one line per cycle.
        #[arg(long)]
        quiet: bool,
    },
    /// Feed a recorded trace through a fresh scheduler without sleeping.
    Replay {
        /// CSV record file or plain utilization trace.
        #[arg(long)]
        input: PathBuf,
        /// Output CSV path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Scheduler configuration JSON.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Compare a fixed-mode run against an adaptive run.
    Evaluate {
        /// Fixed-mode CSV.
        #[arg(long)]
        fixed: PathBuf,
        /// Adaptive-mode CSV.
        #[arg(long)]
        havfs: PathBuf,
        /// Output format: `json` (default) or `plain`.
        #[arg(long, default_value = "json")]
        format: String,
        /// Output file path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

fn parse_seed(raw: &str) -> Result<u64, HarnessError> {
    let cleaned = raw.trim().replace('_', "");
    let parsed = match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse(),
    };
    parsed.map_err(|_| HarnessError::Usage(format!("invalid seed `{raw}`")))
}

fn write_or_print(output: Option<&Path>, body: &str) -> std::io::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, body)?;
            eprintln!("Wrote {}", path.display());
        }
        None => print!("{body}"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            mode,
            device,
            fixed_interval,
            t_min,
            t_max,
            duration,
            output,
            config,
            log,
            prometheus_addr,
            measure_overhead,
            seed,
            quiet,
        } => {
            let kind = match mode {
                Some(m) => ModeKind::from_str_loose(&m)
                    .ok_or_else(|| HarnessError::Usage(format!("unknown mode `{m}`")))?,
                None => ModeKind::from_env(),
            };
            let device_kind = DeviceKind::from_str_loose(&device)
                .ok_or_else(|| HarnessError::Usage(format!("unknown device `{device}`")))?;
            let scheduler_config = resolve(
                load_scheduler_config(config.as_deref())?,
                IntervalOverrides { t_min, t_max },
            )?;
            let run_id = format!(
                "run-{}",
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default()
            );

            eprintln!("==============================");
            eprintln!(">>> HAVFS experiment {run_id}");
            eprintln!("    device : {}", device_kind.as_str());
            eprintln!("    mode   : {}", kind.as_str());
            eprintln!("    output : {}", output.display());
            if kind == ModeKind::Havfs {
                eprintln!(
                    "    interval range = [{}, {}]",
                    scheduler_config.t_min, scheduler_config.t_max
                );
            }

            let mut collector = device_kind.build(parse_seed(&seed)?);
            let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();
            reporters.push(Box::new(CsvReporter::create(&output, measure_overhead)?));
            if !quiet {
                reporters.push(Box::new(ConsoleReporter::stdout()));
            }

            let exporter = match &prometheus_addr {
                Some(addr) => {
                    let exporter = Arc::new(PrometheusExporter::new(addr.clone()));
                    let bound = exporter.start()?;
                    eprintln!("    metrics: http://{bound}/metrics");
                    reporters.push(Box::new(PrometheusReporter::new(Arc::clone(&exporter))));
                    Some(exporter)
                }
                None => None,
            };

            let emitter: Option<SharedEmitter> = match &log {
                Some(path) => Some(Arc::new(Mutex::new(LogEmitter::to_file(path, &run_id)?))),
                None => None,
            };
            if let Some(emitter) = &emitter {
                reporters.push(Box::new(DecisionLogReporter::new(
                    Arc::clone(emitter),
                    kind.as_str(),
                )));
            }

            let mut runner = ExperimentRunner::new(
                run_id.clone(),
                SamplingMode::from_kind(kind, fixed_interval),
                scheduler_config,
                duration,
            )?
            .with_overhead_measurement(measure_overhead)
            .with_artifacts(
                std::iter::once(&output)
                    .chain(log.as_ref())
                    .map(|p| p.display().to_string())
                    .collect(),
            );
            if let Some(emitter) = &emitter {
                runner = runner.with_log(Arc::clone(emitter));
            }

            let shutdown = ShutdownSignal::new();
            install_interrupt_handler(&shutdown)?;
            let summary = runner.run(
                collector.as_mut(),
                &mut reporters,
                &SystemClock::new(),
                &shutdown,
            )?;
            drop(reporters);
            if let Some(exporter) = exporter {
                exporter.stop();
            }

            let mut index = ArtifactIndex::new(&run_id);
            index.add_file(&output, "csv")?;
            if let Some(path) = &log {
                index.add_file(path, "log")?;
            }
            let index_path = output.with_extension("artifacts.json");
            std::fs::write(&index_path, index.to_json()?)?;

            eprintln!("==============================");
            eprintln!(
                ">>> {:?}: {} cycles, {} high, mean interval {:.2}s",
                summary.outcome, summary.cycles, summary.high_cycles, summary.mean_interval
            );
            if summary.buffered_high_risk > 0 {
                eprintln!(
                    ">>> {} high-risk snapshots buffered",
                    summary.buffered_high_risk
                );
            }
            if summary.reporter_errors > 0 {
                eprintln!(">>> {} reporter errors", summary.reporter_errors);
            }
            eprintln!(">>> Saved CSV -> {}", output.display());
            eprintln!(">>> Artifact index -> {}", index_path.display());
        }
        Command::Replay {
            input,
            output,
            config,
        } => {
            eprintln!("Replaying {}", input.display());
            let samples = load_trace(&input)?;
            let cfg = resolve(
                load_scheduler_config(config.as_deref())?,
                IntervalOverrides::default(),
            )?;
            let outcome = replay(samples, cfg)?;
            let mut buf = Vec::new();
            write_csv(&mut buf, &outcome.records, false)?;
            write_or_print(output.as_deref(), &String::from_utf8_lossy(&buf))?;
            eprintln!(
                "Replayed {} samples: {} high ({:.1}%), {} transitions, intervals {:.2}..{:.2}s",
                outcome.stats.cycles,
                outcome.stats.high_cycles,
                outcome.stats.high_ratio() * 100.0,
                outcome.stats.transitions,
                outcome.stats.min_interval.unwrap_or(0.0),
                outcome.stats.max_interval.unwrap_or(0.0),
            );
        }
        Command::Evaluate {
            fixed,
            havfs,
            format,
            output,
        } => {
            let format = ReportFormat::from_str_loose(&format)
                .ok_or_else(|| HarnessError::Usage(format!("unknown format `{format}`")))?;
            let fixed_records = read_csv(&fixed)?;
            let havfs_records = read_csv(&havfs)?;
            let report = EvaluationReport::compare(&fixed_records, &havfs_records);
            let mut body = report.render(format)?;
            if !body.ends_with('\n') {
                body.push('\n');
            }
            write_or_print(output.as_deref(), &body)?;
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            if errors.is_empty() {
                eprintln!("{}: {lines} lines, all valid", log.display());
            } else {
                for err in &errors {
                    eprintln!("{err}");
                }
                return Err(format!(
                    "{}: {} validation errors in {lines} lines",
                    log.display(),
                    errors.len()
                )
                .into());
            }
        }
    }

    Ok(())
}
