//! Self-overhead measurement for the monitoring process.
//!
//! The meter is read once per cycle. Each reading reports process CPU time
//! over wall time since the previous reading, so the window spans the
//! whole cycle including its sleep. Memory is the peak resident set.

use std::time::Instant;

use crate::record::Overhead;

/// Process CPU time and peak RSS at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageSample {
    /// User plus system CPU seconds.
    pub cpu_seconds: f64,
    /// Peak resident set, MiB.
    pub max_rss_mb: f64,
}

#[allow(unsafe_code)]
fn getrusage_self() -> Option<UsageSample> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: `usage` is a valid, writable rusage for the duration of the call.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: getrusage returned 0 and filled the struct.
    let usage = unsafe { usage.assume_init() };
    let tv = |t: libc::timeval| t.tv_sec as f64 + t.tv_usec as f64 / 1e6;
    Some(UsageSample {
        cpu_seconds: tv(usage.ru_utime) + tv(usage.ru_stime),
        // Linux reports ru_maxrss in KiB
        max_rss_mb: usage.ru_maxrss as f64 / 1024.0,
    })
}

/// Current usage of this process, or `None` if the kernel refused.
#[must_use]
pub fn sample_self() -> Option<UsageSample> {
    getrusage_self()
}

/// CPU percent and memory between two samples `wall_seconds` apart.
#[must_use]
pub fn overhead_between(start: UsageSample, end: UsageSample, wall_seconds: f64) -> Overhead {
    let cpu = if wall_seconds > 0.0 {
        ((end.cpu_seconds - start.cpu_seconds).max(0.0) / wall_seconds * 100.0).max(0.0)
    } else {
        0.0
    };
    Overhead {
        cpu_percent: cpu,
        mem_mb: end.max_rss_mb,
    }
}

/// Rolling per-cycle meter. The first [`OverheadMeter::sample`] has no
/// window yet and reports 0% CPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverheadMeter {
    last: Option<(Instant, UsageSample)>,
}

impl OverheadMeter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overhead since the previous call; zero if usage was unreadable.
    pub fn sample(&mut self) -> Overhead {
        let now = Instant::now();
        let Some(current) = sample_self() else {
            self.last = None;
            return Overhead {
                cpu_percent: 0.0,
                mem_mb: 0.0,
            };
        };
        let overhead = match self.last {
            Some((at, previous)) => {
                overhead_between(previous, current, now.duration_since(at).as_secs_f64())
            }
            None => Overhead {
                cpu_percent: 0.0,
                mem_mb: current.max_rss_mb,
            },
        };
        self.last = Some((now, current));
        overhead
    }
}
