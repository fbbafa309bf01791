//! Prometheus text-format exporter.
//!
//! The exporter is an explicitly constructed object owned by the entry
//! point and shared by `Arc`: [`PrometheusExporter::start`] binds and
//! spawns the accept thread, [`PrometheusExporter::stop`] (or drop) joins
//! it. Gauges are updated through [`PrometheusExporter::publish`] from the
//! sampling loop and read by the HTTP thread under a `parking_lot::RwLock`.
//!
//! Served at `GET /metrics`; any other path returns 404.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::error::HarnessError;
use crate::record::{CycleRecord, RecordState};

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
struct DeviceGauges {
    utilization: f64,
    temperature: f64,
    power: f64,
    memory_usage: f64,
    bandwidth: f64,
    risk_score: f64,
    interval: f64,
    high: bool,
    cycles: u64,
}

type Registry = Arc<RwLock<BTreeMap<String, DeviceGauges>>>;

/// HTTP endpoint exposing the latest per-device sampling state.
pub struct PrometheusExporter {
    addr: String,
    registry: Registry,
    stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl PrometheusExporter {
    /// Exporter for `addr` (e.g. `127.0.0.1:9108`); nothing is bound yet.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            registry: Arc::new(RwLock::new(BTreeMap::new())),
            stop: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    /// Bind and start serving. Returns the bound address (useful with port 0).
    pub fn start(&self) -> Result<SocketAddr, HarnessError> {
        let mut handle_slot = self.handle.lock();
        if let Some(addr) = *self.local_addr.lock() {
            return Ok(addr);
        }
        let bind_err = |source| HarnessError::ExporterBind {
            addr: self.addr.clone(),
            source,
        };
        let listener = TcpListener::bind(&self.addr).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        let local = listener.local_addr().map_err(bind_err)?;

        self.stop.store(false, Ordering::SeqCst);
        let registry = Arc::clone(&self.registry);
        let stop = Arc::clone(&self.stop);
        let handle = std::thread::Builder::new()
            .name("havfs-exporter".to_string())
            .spawn(move || accept_loop(&listener, &registry, &stop))?;

        *handle_slot = Some(handle);
        *self.local_addr.lock() = Some(local);
        Ok(local)
    }

    /// Stop serving and join the accept thread. Idempotent.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
        *self.local_addr.lock() = None;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Update gauges from one cycle.
    pub fn publish(&self, record: &CycleRecord) {
        let mut registry = self.registry.write();
        let g = registry.entry(record.metrics.device_id.clone()).or_default();
        g.utilization = record.metrics.utilization;
        g.temperature = record.metrics.temperature;
        g.power = record.metrics.power;
        g.memory_usage = record.metrics.memory_usage;
        g.bandwidth = record.metrics.bandwidth;
        g.risk_score = record.risk_score;
        g.interval = record.interval;
        g.high = record.state == RecordState::High;
        g.cycles += 1;
    }

    /// Current exposition text.
    #[must_use]
    pub fn render(&self) -> String {
        render(&self.registry.read())
    }
}

impl Drop for PrometheusExporter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render(registry: &BTreeMap<String, DeviceGauges>) -> String {
    type Getter = fn(&DeviceGauges) -> f64;
    let families: [(&str, &str, &str, Getter); 9] = [
        ("havfs_utilization_percent", "gauge", "Device utilization, percent.", |g| g.utilization),
        ("havfs_temperature_celsius", "gauge", "Device temperature.", |g| g.temperature),
        ("havfs_power_watts", "gauge", "Device power draw.", |g| g.power),
        ("havfs_memory_usage_percent", "gauge", "Device memory occupancy, percent.", |g| g.memory_usage),
        ("havfs_bandwidth", "gauge", "Device bandwidth.", |g| g.bandwidth),
        ("havfs_risk_score", "gauge", "Fused sampling risk, 0-100.", |g| g.risk_score),
        ("havfs_sampling_interval_seconds", "gauge", "Interval chosen after the last sample.", |g| g.interval),
        ("havfs_high_regime", "gauge", "1 while the device is in the HIGH regime.", |g| {
            if g.high { 1.0 } else { 0.0 }
        }),
        ("havfs_cycles_total", "counter", "Sampling cycles observed.", |g| g.cycles as f64),
    ];

    let mut out = String::new();
    for (name, kind, help, get) in families {
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} {kind}");
        for (device, gauges) in registry {
            let _ = writeln!(out, "{name}{{device=\"{}\"}} {}", escape_label(device), get(gauges));
        }
    }
    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn accept_loop(listener: &TcpListener, registry: &Registry, stop: &AtomicBool) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = serve(stream, registry) {
                    eprintln!("[exporter] connection error: {err}");
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                eprintln!("[exporter] accept failed: {err}");
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn serve(stream: TcpStream, registry: &Registry) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    // drain headers
    let mut line = String::new();
    while reader.read_line(&mut line)? > 2 {
        line.clear();
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    let (status, content_type, body) = if method == "GET" && path == "/metrics" {
        ("200 OK", "text/plain; version=0.0.4", render(&registry.read()))
    } else {
        ("404 Not Found", "text/plain", "not found\n".to_string())
    };

    let mut stream = stream;
    write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )?;
    stream.flush()
}
