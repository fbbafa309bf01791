//! Sampling experiment runner.
//!
//! One run = one collector, one sampling mode, any number of reporters.
//! Each cycle: collect, decide (or use the fixed interval), optionally
//! measure self-overhead, build a [`CycleRecord`], fan it out, then sleep
//! for the chosen interval. Sleeping goes through a [`Clock`] and wakes
//! early on [`ShutdownSignal`], so tests run instantly and Ctrl-C is
//! honored mid-interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use havfs_core::{Scheduler, SchedulerConfig};

use crate::collector::Collector;
use crate::error::HarnessError;
use crate::overhead::OverheadMeter;
use crate::record::{CycleRecord, RecordState};
use crate::reporter::{Reporter, SharedEmitter};
use crate::structured_log::{LogEntry, LogLevel, Outcome, events};

/// Environment variable selecting the mode when `--mode` is absent.
pub const MODE_ENV: &str = "HAVFS_MODE";

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Named sampling strategy, as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeKind {
    Fixed,
    #[default]
    Havfs,
}

impl ModeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Havfs => "havfs",
        }
    }

    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" | "baseline" => Some(Self::Fixed),
            "havfs" | "adaptive" => Some(Self::Havfs),
            _ => None,
        }
    }

    /// Mode from [`MODE_ENV`]; unset or unrecognized values give the default.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(MODE_ENV)
            .ok()
            .and_then(|v| Self::from_str_loose(&v))
            .unwrap_or_default()
    }
}

/// Sampling strategy for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingMode {
    /// Baseline: sample every `interval` seconds, no decision engine.
    Fixed { interval: f64 },
    /// Intervals chosen by the scheduler.
    Adaptive,
}

impl SamplingMode {
    #[must_use]
    pub fn from_kind(kind: ModeKind, fixed_interval: f64) -> Self {
        match kind {
            ModeKind::Fixed => Self::Fixed {
                interval: fixed_interval,
            },
            ModeKind::Havfs => Self::Adaptive,
        }
    }

    #[must_use]
    pub const fn kind(self) -> ModeKind {
        match self {
            Self::Fixed { .. } => ModeKind::Fixed,
            Self::Adaptive => ModeKind::Havfs,
        }
    }
}

// ---------------------------------------------------------------------------
// Shutdown + clock
// ---------------------------------------------------------------------------

/// Cloneable stop flag with a cancellable wait.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock() = true;
        cvar.notify_all();
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Wait up to `timeout`. Returns `true` if shutdown was signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut stopped = lock.lock();
        while !*stopped {
            if cvar.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_sig: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT/SIGTERM into `signal`. A watcher thread polls the flag set
/// by the handler, since only atomics are async-signal-safe.
#[allow(unsafe_code)]
pub fn install_interrupt_handler(signal: &ShutdownSignal) -> std::io::Result<()> {
    let handler = on_interrupt as extern "C" fn(libc::c_int) as libc::sighandler_t;
    for sig in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: the handler only stores to an atomic.
        if unsafe { libc::signal(sig, handler) } == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }
    let signal = signal.clone();
    std::thread::Builder::new()
        .name("havfs-signal".to_string())
        .spawn(move || {
            while !signal.is_triggered() {
                if INTERRUPTED.load(Ordering::SeqCst) {
                    signal.trigger();
                    break;
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        })?;
    Ok(())
}

/// Time source for the runner.
pub trait Clock {
    /// Wall-clock Unix seconds.
    fn unix_time(&self) -> f64;
    /// Seconds since the clock was created.
    fn elapsed(&self) -> f64;
    /// Sleep `seconds` unless shutdown fires first. Returns `false` if
    /// interrupted.
    fn sleep(&self, seconds: f64, shutdown: &ShutdownSignal) -> bool;
}

/// Real time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn unix_time(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn sleep(&self, seconds: f64, shutdown: &ShutdownSignal) -> bool {
        let d = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::ZERO);
        !shutdown.wait_timeout(d)
    }
}

/// Simulated time: `sleep` advances the clock instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    epoch: f64,
    now: Mutex<f64>,
}

impl ManualClock {
    #[must_use]
    pub fn new(epoch: f64) -> Self {
        Self {
            epoch,
            now: Mutex::new(0.0),
        }
    }

    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }
}

impl Clock for ManualClock {
    fn unix_time(&self) -> f64 {
        self.epoch + *self.now.lock()
    }

    fn elapsed(&self) -> f64 {
        *self.now.lock()
    }

    fn sleep(&self, seconds: f64, shutdown: &ShutdownSignal) -> bool {
        if shutdown.is_triggered() {
            return false;
        }
        self.advance(seconds.max(0.0));
        true
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Totals for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentSummary {
    pub run_id: String,
    pub mode: &'static str,
    pub device_id: String,
    pub cycles: u64,
    pub high_cycles: u64,
    pub mean_interval: f64,
    pub min_interval: Option<f64>,
    pub max_interval: Option<f64>,
    /// Elapsed run time, seconds.
    pub duration: f64,
    /// High-regime snapshots retained in the risk buffer at the end.
    pub buffered_high_risk: usize,
    pub sanitized_inputs: u64,
    pub reporter_errors: u64,
    pub outcome: Outcome,
}

/// Drives one collector through a sampling experiment.
pub struct ExperimentRunner {
    run_id: String,
    mode: SamplingMode,
    duration: f64,
    measure_overhead: bool,
    max_cycles: Option<u64>,
    scheduler: Option<Scheduler>,
    log: Option<SharedEmitter>,
    artifacts: Vec<String>,
}

impl ExperimentRunner {
    /// Validates the mode parameters; `config` is only used in adaptive mode.
    pub fn new(
        run_id: impl Into<String>,
        mode: SamplingMode,
        config: SchedulerConfig,
        duration: f64,
    ) -> Result<Self, HarnessError> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(HarnessError::Usage(format!(
                "duration must be a non-negative number of seconds, got {duration}"
            )));
        }
        let scheduler = match mode {
            SamplingMode::Fixed { interval } => {
                if !interval.is_finite() || interval <= 0.0 {
                    return Err(HarnessError::Usage(format!(
                        "fixed interval must be positive, got {interval}"
                    )));
                }
                None
            }
            SamplingMode::Adaptive => Some(Scheduler::new(config)?),
        };
        Ok(Self {
            run_id: run_id.into(),
            mode,
            duration,
            measure_overhead: false,
            max_cycles: None,
            scheduler,
            log: None,
            artifacts: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_overhead_measurement(mut self, enabled: bool) -> Self {
        self.measure_overhead = enabled;
        self
    }

    /// Stop after `n` cycles even if time remains.
    #[must_use]
    pub fn with_max_cycles(mut self, n: u64) -> Self {
        self.max_cycles = Some(n);
        self
    }

    #[must_use]
    pub fn with_log(mut self, emitter: SharedEmitter) -> Self {
        self.log = Some(emitter);
        self
    }

    /// Files this run writes; listed on the `experiment_end` event.
    #[must_use]
    pub fn with_artifacts(mut self, paths: Vec<String>) -> Self {
        self.artifacts = paths;
        self
    }

    /// The decision engine, in adaptive mode.
    #[must_use]
    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.scheduler.as_ref()
    }

    pub fn scheduler_mut(&mut self) -> Option<&mut Scheduler> {
        self.scheduler.as_mut()
    }

    fn log(&self, entry: LogEntry) {
        if let Some(log) = &self.log
            && let Err(err) = log.lock().emit_entry(entry)
        {
            eprintln!("[havfs] structured log write failed: {err}");
        }
    }

    fn trace_id(&self, device: &str) -> String {
        self.log
            .as_ref()
            .map(|l| l.lock().next_trace_id(device))
            .unwrap_or_default()
    }

    /// Run until the duration elapses, the collector is exhausted, the
    /// cycle cap is hit, or `shutdown` fires.
    pub fn run(
        &mut self,
        collector: &mut dyn Collector,
        reporters: &mut [Box<dyn Reporter>],
        clock: &dyn Clock,
        shutdown: &ShutdownSignal,
    ) -> Result<ExperimentSummary, HarnessError> {
        let device = collector.device_id().to_string();
        let mode_name = self.mode.kind().as_str();
        let start = clock.elapsed();

        let trace_id = self.trace_id(&device);
        self.log(
            LogEntry::new(trace_id, LogLevel::Info, events::EXPERIMENT_START)
                .with_device(&device)
                .with_mode(mode_name)
                .with_details(serde_json::json!({
                    "duration_s": self.duration,
                    "measure_overhead": self.measure_overhead,
                    "collector_supported": collector.is_supported(),
                    "fixed_interval": match self.mode {
                        SamplingMode::Fixed { interval } => Some(interval),
                        SamplingMode::Adaptive => None,
                    },
                })),
        );
        if !collector.is_supported() {
            eprintln!("[havfs] warning: collector {device} has no backend on this host; samples are zeroed");
        }

        let mut cycles = 0u64;
        let mut high_cycles = 0u64;
        let mut interval_sum = 0.0;
        let mut min_interval: Option<f64> = None;
        let mut max_interval: Option<f64> = None;
        let mut reporter_errors = 0u64;
        let mut outcome = Outcome::Completed;
        let mut meter = self.measure_overhead.then(OverheadMeter::new);

        loop {
            if shutdown.is_triggered() {
                outcome = Outcome::Cancelled;
                break;
            }
            if clock.elapsed() - start >= self.duration
                || collector.is_exhausted()
                || self.max_cycles.is_some_and(|max| cycles >= max)
            {
                break;
            }

            let snapshot = collector.collect();
            let timestamp = clock.unix_time();
            let elapsed = clock.elapsed() - start;

            let mut record = match (&mut self.scheduler, self.mode) {
                (Some(scheduler), SamplingMode::Adaptive) => {
                    let decision = scheduler.update(snapshot.clone());
                    CycleRecord::adaptive(timestamp, elapsed, snapshot, &decision)
                }
                (_, SamplingMode::Fixed { interval }) => {
                    CycleRecord::fixed(timestamp, elapsed, snapshot, interval)
                }
                (None, SamplingMode::Adaptive) => {
                    return Err(HarnessError::Usage(
                        "adaptive mode without a scheduler".to_string(),
                    ));
                }
            };
            // the window runs from the previous cycle's reading, sleep included
            if let Some(meter) = meter.as_mut() {
                record = record.with_overhead(meter.sample());
            }

            for reporter in reporters.iter_mut() {
                if let Err(err) = reporter.report(&record) {
                    reporter_errors += 1;
                    self.report_failure(&device, reporter.name(), &err);
                }
            }

            cycles += 1;
            if record.state == RecordState::High {
                high_cycles += 1;
            }
            interval_sum += record.interval;
            min_interval = Some(min_interval.map_or(record.interval, |m| m.min(record.interval)));
            max_interval = Some(max_interval.map_or(record.interval, |m| m.max(record.interval)));

            if !clock.sleep(record.interval, shutdown) {
                outcome = Outcome::Cancelled;
                break;
            }
        }

        for reporter in reporters.iter_mut() {
            if let Err(err) = reporter.flush() {
                reporter_errors += 1;
                self.report_failure(&device, reporter.name(), &err);
            }
        }

        let (buffered, sanitized) = self.scheduler.as_ref().map_or((0, 0), |s| {
            (s.risk_buffer().size(), s.stats().sanitized)
        });
        let summary = ExperimentSummary {
            run_id: self.run_id.clone(),
            mode: mode_name,
            device_id: device.clone(),
            cycles,
            high_cycles,
            mean_interval: if cycles == 0 {
                0.0
            } else {
                interval_sum / cycles as f64
            },
            min_interval,
            max_interval,
            duration: clock.elapsed() - start,
            buffered_high_risk: buffered,
            sanitized_inputs: sanitized,
            reporter_errors,
            outcome,
        };

        let trace_id = self.trace_id(&device);
        let mut end = LogEntry::new(trace_id, LogLevel::Info, events::EXPERIMENT_END)
            .with_device(&device)
            .with_mode(mode_name)
            .with_outcome(outcome)
            .with_details(serde_json::to_value(&summary)?);
        if !self.artifacts.is_empty() {
            end = end.with_artifacts(self.artifacts.clone());
        }
        self.log(end);
        if let Some(log) = &self.log {
            log.lock().flush()?;
        }
        Ok(summary)
    }

    fn report_failure(&self, device: &str, reporter: &str, err: &crate::error::ReportError) {
        eprintln!("[havfs] reporter {reporter} failed: {err}");
        let trace_id = self.trace_id(device);
        self.log(
            LogEntry::new(trace_id, LogLevel::Warn, events::REPORTER_ERROR)
                .with_device(device)
                .with_details(serde_json::json!({
                    "reporter": reporter,
                    "error": err.to_string(),
                })),
        );
    }
}
