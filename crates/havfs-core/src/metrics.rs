//! Per-cycle device metrics as delivered by a collector.

/// One observation of a device, produced once per sampling cycle.
///
/// Only `utilization` drives the decision engine. The remaining fields are
/// carried through untouched so that buffered snapshots and exported
/// records keep the full picture.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub device_id: String,
    /// Load, percent.
    pub utilization: f64,
    /// Degrees Celsius.
    #[cfg_attr(feature = "serde", serde(default))]
    pub temperature: f64,
    /// Watts.
    #[cfg_attr(feature = "serde", serde(default))]
    pub power: f64,
    /// Memory occupancy, percent.
    #[cfg_attr(feature = "serde", serde(default))]
    pub memory_usage: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bandwidth: f64,
}

impl MetricsSnapshot {
    /// Snapshot with only utilization set; every optional field is zero.
    #[must_use]
    pub fn new(device_id: impl Into<String>, utilization: f64) -> Self {
        Self {
            device_id: device_id.into(),
            utilization,
            temperature: 0.0,
            power: 0.0,
            memory_usage: 0.0,
            bandwidth: 0.0,
        }
    }

    /// All-zero snapshot, the best-effort value a collector returns when
    /// acquisition fails.
    #[must_use]
    pub fn zeroed(device_id: impl Into<String>) -> Self {
        Self::new(device_id, 0.0)
    }

    #[must_use]
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = celsius;
        self
    }

    #[must_use]
    pub fn with_power(mut self, watts: f64) -> Self {
        self.power = watts;
        self
    }

    #[must_use]
    pub fn with_memory_usage(mut self, percent: f64) -> Self {
        self.memory_usage = percent;
        self
    }

    #[must_use]
    pub fn with_bandwidth(mut self, bandwidth: f64) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Short human-readable summary for debug output.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "util={:.1}%, temp={:.1}, power={:.1}, mem={:.1}, bw={:.1}",
            self.utilization, self.temperature, self.power, self.memory_usage, self.bandwidth
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeroed_has_only_device_id() {
        let s = MetricsSnapshot::zeroed("npu0");
        assert_eq!(s.device_id, "npu0");
        assert_eq!(s.utilization, 0.0);
        assert_eq!(s.temperature, 0.0);
        assert_eq!(s.bandwidth, 0.0);
    }

    #[test]
    fn builders_set_optional_fields() {
        let s = MetricsSnapshot::new("gpu0", 42.0)
            .with_temperature(61.5)
            .with_power(180.0)
            .with_memory_usage(33.0)
            .with_bandwidth(70.0);
        assert_eq!(s.summary(), "util=42.0%, temp=61.5, power=180.0, mem=33.0, bw=70.0");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn optional_fields_default_when_missing() {
        let s: MetricsSnapshot =
            serde_json::from_str(r#"{"device_id":"cpu0","utilization":12.5}"#).unwrap();
        assert_eq!(s, MetricsSnapshot::new("cpu0", 12.5));
    }
}
