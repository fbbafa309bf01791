//! Device metric collectors.
//!
//! A [`Collector`] produces one [`MetricsSnapshot`] per sampling cycle.
//! Acquisition is best-effort: a collector that cannot read its source
//! returns a zeroed snapshot rather than failing the cycle.

use std::fs;
use std::path::PathBuf;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use havfs_core::MetricsSnapshot;

/// Source of per-cycle device observations.
pub trait Collector: Send {
    fn device_id(&self) -> &str;

    fn collect(&mut self) -> MetricsSnapshot;

    /// `false` for collectors with no usable backend on this host.
    fn is_supported(&self) -> bool {
        true
    }

    /// `true` once a finite source has nothing left to deliver.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Device family selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Npu,
}

impl DeviceKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Npu => "npu",
        }
    }

    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Some(Self::Cpu),
            "gpu" => Some(Self::Gpu),
            "npu" => Some(Self::Npu),
            _ => None,
        }
    }

    /// Conventional first device id, e.g. `gpu0`.
    #[must_use]
    pub fn default_device_id(self) -> String {
        format!("{}0", self.as_str())
    }

    /// Build the collector for this device kind. `seed` only affects the
    /// simulated GPU.
    #[must_use]
    pub fn build(self, seed: u64) -> Box<dyn Collector> {
        let id = self.default_device_id();
        match self {
            Self::Cpu => Box::new(CpuCollector::new(id)),
            Self::Gpu => Box::new(SimulatedGpuCollector::new(id, seed)),
            Self::Npu => Box::new(NpuCollector::new(id)),
        }
    }
}

// ---------------------------------------------------------------------------
// CPU
// ---------------------------------------------------------------------------

/// Placeholder until a sensor backend exists.
pub const CPU_PLACEHOLDER_TEMPERATURE: f64 = 50.0;
/// Placeholder until a power backend exists.
pub const CPU_PLACEHOLDER_POWER: f64 = 30.0;

/// Aggregate jiffies from the first `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

impl CpuTimes {
    /// Busy percent between `prev` and `self`; `None` if no time elapsed.
    #[must_use]
    pub fn utilization_since(&self, prev: &CpuTimes) -> Option<f64> {
        let total = self.total.checked_sub(prev.total)?;
        let idle = self.idle.checked_sub(prev.idle)?;
        if total == 0 {
            return None;
        }
        let busy = total.saturating_sub(idle);
        Some((busy as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
    }
}

/// Parse the aggregate `cpu` line. Idle time includes iowait.
#[must_use]
pub fn parse_proc_stat(text: &str) -> Option<CpuTimes> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() < 4 {
        return None;
    }
    // guest and guest_nice are already counted in user and nice
    let counted = &fields[..fields.len().min(8)];
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        idle,
        total: counted.iter().sum(),
    })
}

/// Used memory percent from `/proc/meminfo` (`MemTotal` vs `MemAvailable`).
#[must_use]
pub fn parse_meminfo(text: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        let line = text.lines().find(|l| l.starts_with(name))?;
        line.split_whitespace().nth(1)?.parse().ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total <= 0.0 {
        return None;
    }
    Some(((1.0 - available / total) * 100.0).clamp(0.0, 100.0))
}

/// Host CPU collector backed by procfs.
#[derive(Debug)]
pub struct CpuCollector {
    device_id: String,
    proc_root: PathBuf,
    prev: Option<CpuTimes>,
}

impl CpuCollector {
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> Self {
        Self::with_proc_root(device_id, "/proc")
    }

    /// Read `stat` and `meminfo` from `root` instead of `/proc`.
    #[must_use]
    pub fn with_proc_root(device_id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            device_id: device_id.into(),
            proc_root: root.into(),
            prev: None,
        }
    }

    fn read_utilization(&mut self) -> Option<f64> {
        let text = fs::read_to_string(self.proc_root.join("stat")).ok()?;
        let now = parse_proc_stat(&text)?;
        // first call measures since boot
        let prev = self.prev.replace(now).unwrap_or(CpuTimes { idle: 0, total: 0 });
        now.utilization_since(&prev)
    }

    fn read_memory(&self) -> Option<f64> {
        let text = fs::read_to_string(self.proc_root.join("meminfo")).ok()?;
        parse_meminfo(&text)
    }
}

impl Collector for CpuCollector {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn collect(&mut self) -> MetricsSnapshot {
        let Some(util) = self.read_utilization() else {
            return MetricsSnapshot::zeroed(&self.device_id);
        };
        MetricsSnapshot::new(&self.device_id, util)
            .with_temperature(CPU_PLACEHOLDER_TEMPERATURE)
            .with_power(CPU_PLACEHOLDER_POWER)
            .with_memory_usage(self.read_memory().unwrap_or(0.0))
    }
}

// ---------------------------------------------------------------------------
// Simulated GPU
// ---------------------------------------------------------------------------

/// Stand-in GPU producing uniformly random metrics from a seeded generator.
#[derive(Debug, Clone)]
pub struct SimulatedGpuCollector {
    device_id: String,
    rng: StdRng,
}

impl SimulatedGpuCollector {
    #[must_use]
    pub fn new(device_id: impl Into<String>, seed: u64) -> Self {
        Self {
            device_id: device_id.into(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Collector for SimulatedGpuCollector {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn collect(&mut self) -> MetricsSnapshot {
        let utilization = self.rng.gen_range(0.0..100.0);
        let temperature = self.rng.gen_range(40.0..85.0);
        let power = self.rng.gen_range(50.0..200.0);
        let memory = self.rng.gen_range(0.0..100.0);
        let bandwidth = self.rng.gen_range(20.0..90.0);
        MetricsSnapshot::new(&self.device_id, utilization)
            .with_temperature(temperature)
            .with_power(power)
            .with_memory_usage(memory)
            .with_bandwidth(bandwidth)
    }
}

// ---------------------------------------------------------------------------
// NPU
// ---------------------------------------------------------------------------

/// NPU slot with no vendor backend: always zeroed.
#[derive(Debug, Clone)]
pub struct NpuCollector {
    device_id: String,
}

impl NpuCollector {
    #[must_use]
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }
}

impl Collector for NpuCollector {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn collect(&mut self) -> MetricsSnapshot {
        MetricsSnapshot::zeroed(&self.device_id)
    }

    fn is_supported(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Trace replay
// ---------------------------------------------------------------------------

/// Replays a recorded sequence of snapshots, then repeats the last one.
#[derive(Debug, Clone)]
pub struct TraceCollector {
    device_id: String,
    samples: Vec<MetricsSnapshot>,
    pos: usize,
}

impl TraceCollector {
    #[must_use]
    pub fn new(device_id: impl Into<String>, samples: Vec<MetricsSnapshot>) -> Self {
        Self {
            device_id: device_id.into(),
            samples,
            pos: 0,
        }
    }

    /// Trace of bare utilization values.
    #[must_use]
    pub fn from_utilization(device_id: impl Into<String>, values: &[f64]) -> Self {
        let device_id = device_id.into();
        let samples = values
            .iter()
            .map(|&u| MetricsSnapshot::new(&device_id, u))
            .collect();
        Self::new(device_id, samples)
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.samples.len().saturating_sub(self.pos)
    }
}

impl Collector for TraceCollector {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn collect(&mut self) -> MetricsSnapshot {
        let snap = match self.samples.get(self.pos) {
            Some(s) => s.clone(),
            None => match self.samples.last() {
                Some(last) => last.clone(),
                None => MetricsSnapshot::zeroed(&self.device_id),
            },
        };
        self.pos = self.pos.saturating_add(1);
        snap
    }

    fn is_exhausted(&self) -> bool {
        self.pos >= self.samples.len()
    }
}
