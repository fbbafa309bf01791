//! Behavioral properties of the scheduler over long observation sequences.
//!
//! Run: cargo test -p havfs-core --test scheduler_properties_test

use havfs_core::{
    FusedRisk, FusionWeights, HysteresisStateMachine, MetricsSnapshot, RegimeState, Scheduler,
    SchedulerConfig, TrendPredictor,
};

#[derive(Clone, Copy, Debug)]
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform in [low, high).
    fn gen_f64(&mut self, low: f64, high: f64) -> f64 {
        let unit = (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
        low + unit * (high - low)
    }
}

fn snap(x: f64) -> MetricsSnapshot {
    MetricsSnapshot::new("cpu0", x)
}

fn default_scheduler() -> Scheduler {
    Scheduler::new(SchedulerConfig::default().with_interval_bounds(0.5, 5.0)).unwrap()
}

#[test]
fn interval_and_risk_stay_bounded_on_random_traces() {
    for seed in [0xDEAD_BEEF_u64, 0x1234_5678, 0xC0FF_EE00, 42, 7] {
        let mut rng = XorShift64::new(seed);
        let mut s = default_scheduler();
        for step in 0..5_000 {
            // mix calm stretches, bursts and values far past every scale
            let x = match step % 200 {
                0..=120 => rng.gen_f64(0.0, 30.0),
                121..=180 => rng.gen_f64(0.0, 100.0),
                _ => rng.gen_f64(0.0, 1e6),
            };
            let d = s.update(snap(x));
            assert!(
                (0.5..=5.0).contains(&d.interval),
                "seed={seed:#x} step={step} interval={}",
                d.interval
            );
            assert!(
                (0.0..=100.0).contains(&d.risk_percent),
                "seed={seed:#x} step={step} risk={}",
                d.risk_percent
            );
        }
    }
}

#[test]
fn interval_never_grows_faster_than_increase_step() {
    let mut rng = XorShift64::new(0xFEED_FACE);
    let mut s = default_scheduler();
    let mut prev = s.current_interval();
    for _ in 0..5_000 {
        let d = s.update(snap(rng.gen_f64(0.0, 100.0)));
        assert!(d.interval - prev <= 0.2 + 1e-9, "{prev} -> {}", d.interval);
        assert!(d.interval >= prev * 0.5 - 1e-9, "{prev} -> {}", d.interval);
        prev = d.interval;
    }
}

#[test]
fn constant_input_makes_predictor_exact() {
    let mut p = TrendPredictor::new(0.6, 0.3).unwrap();
    for _ in 0..100 {
        assert_eq!(p.update(37.25), 37.25);
        assert_eq!(p.level(), Some(37.25));
        assert_eq!(p.trend(), Some(0.0));
    }
}

#[test]
fn dead_band_risk_never_flips_regime() {
    let mut rng = XorShift64::new(0xABCD);
    for start_high in [false, true] {
        let mut fsm = HysteresisStateMachine::new(0.4, 0.2).unwrap();
        if start_high {
            fsm.update(FusedRisk::MAX);
        }
        let expected = fsm.state();
        for _ in 0..10_000 {
            // strictly inside (0.2, 0.4)
            let r = rng.gen_f64(0.200_001, 0.399_999);
            assert_eq!(fsm.update(FusedRisk::new(r)), expected);
        }
    }
}

#[test]
fn scenario_steady_load_stays_low_near_t_max() {
    let mut s = default_scheduler();
    let mut last = None;
    for _ in 0..20 {
        let d = s.update(snap(10.0));
        assert_eq!(d.regime, RegimeState::Low);
        // pressure term alone: 0.2 * 10 / 100
        assert!((d.risk_percent - 2.0).abs() < 1e-9);
        last = Some(d);
    }
    let last = last.unwrap();
    // target = t_max - 0.02 * (t_max - t_min)
    assert!((last.interval - 4.91).abs() < 1e-9, "{}", last.interval);
    assert!(5.0 - last.interval <= 0.02 * 4.5 + 1e-9);
    assert_eq!(s.risk_buffer().size(), 0);
}

#[test]
fn scenario_spike_enters_high_with_multiplicative_drop() {
    let mut s = default_scheduler();
    for _ in 0..20 {
        s.update(snap(10.0));
    }
    let before = s.current_interval();
    let d = s.update(snap(95.0));

    assert_eq!(d.components.anomaly, 15.0);
    assert_eq!(d.components.jump, 85.0);
    assert!((d.components.norm_anomaly - 0.75).abs() < 1e-12);
    assert_eq!(d.components.norm_jump, 1.0);
    assert!(d.risk_percent > 40.0, "risk={}", d.risk_percent);
    assert_eq!(d.regime, RegimeState::High);

    let target = 5.0 - d.risk_percent / 100.0 * 4.5;
    let expected = target.max(before * 0.5);
    assert!((d.interval - expected).abs() < 1e-12);
    assert!(d.interval < before);

    assert_eq!(s.risk_buffer().size(), 1);
    assert_eq!(s.risk_buffer().iter().next().unwrap().utilization, 95.0);
}

#[test]
fn scenario_recovery_exits_only_below_exit_threshold() {
    let mut s = default_scheduler();
    for _ in 0..20 {
        s.update(snap(10.0));
    }
    s.update(snap(95.0));
    assert_eq!(s.regime(), RegimeState::High);

    let mut prev_interval = s.current_interval();
    let mut prev_regime = RegimeState::High;
    let mut exited_at = None;
    for cycle in 0..200 {
        let d = s.update(snap(10.0));
        assert!(d.interval - prev_interval <= 0.2 + 1e-9);
        if prev_regime == RegimeState::High && d.regime == RegimeState::Low {
            assert!(d.risk_percent < 20.0, "left HIGH at risk {}", d.risk_percent);
            exited_at.get_or_insert(cycle);
        }
        if d.regime == RegimeState::High {
            assert!(
                d.risk_percent >= 20.0,
                "stayed HIGH at risk {} on cycle {cycle}",
                d.risk_percent
            );
        }
        prev_interval = d.interval;
        prev_regime = d.regime;
    }
    assert!(exited_at.is_some());
    assert_eq!(s.regime(), RegimeState::Low);
    assert!((s.current_interval() - 4.91).abs() < 1e-9);
    assert_eq!(s.stats().transitions, 2);
}

#[test]
fn buffer_keeps_most_recent_high_snapshots() {
    let capacity = 8;
    let extra = 5;
    let mut s = Scheduler::new(SchedulerConfig::default().with_buffer_capacity(capacity)).unwrap();
    // x = 100 -> 0.3 * 1 + 0.2 * 1 = 0.5 every cycle: HIGH throughout
    for i in 0..capacity + extra {
        let d = s.update(MetricsSnapshot::new("gpu0", 100.0).with_temperature(i as f64));
        assert_eq!(d.regime, RegimeState::High);
    }
    let buf = s.risk_buffer();
    assert_eq!(buf.size(), capacity);
    let temps: Vec<f64> = buf.iter().map(|m| m.temperature).collect();
    let expected: Vec<f64> = (extra..capacity + extra).map(|i| i as f64).collect();
    assert_eq!(temps, expected);

    // an external flush empties the buffer but keeps the lifetime count
    let flushed = s.risk_buffer_mut().drain();
    assert_eq!(flushed.len(), capacity);
    assert!(s.risk_buffer().is_empty());
    assert_eq!(s.risk_buffer().total_stored(), (capacity + extra) as u64);
}

#[test]
fn invalid_configs_fail_before_update() {
    let bad = [
        SchedulerConfig::default().with_thresholds(0.2, 0.2),
        SchedulerConfig::default().with_thresholds(0.2, 0.4),
        SchedulerConfig::default().with_weights(FusionWeights::new(0.5, 0.5, 0.5, 0.0)),
        SchedulerConfig::default().with_interval_bounds(5.0, 0.5),
        SchedulerConfig::default().with_interval_bounds(2.0, 2.0),
        SchedulerConfig::default().with_smoothing(0.0, 0.5),
    ];
    for cfg in bad {
        assert!(Scheduler::new(cfg.clone()).is_err(), "{cfg:?}");
    }
}

#[test]
fn independent_devices_on_threads_match_sequential_runs() {
    let traces: Vec<Vec<f64>> = (0..4u64)
        .map(|seed| {
            let mut rng = XorShift64::new(seed + 1);
            (0..500).map(|_| rng.gen_f64(0.0, 100.0)).collect()
        })
        .collect();

    let sequential: Vec<Vec<(f64, f64, RegimeState)>> = traces
        .iter()
        .map(|trace| {
            let mut s = default_scheduler();
            trace.iter().map(|&x| s.update(snap(x)).as_tuple()).collect()
        })
        .collect();

    let parallel: Vec<Vec<(f64, f64, RegimeState)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = traces
            .iter()
            .map(|trace| {
                scope.spawn(move || {
                    let mut s = default_scheduler();
                    trace
                        .iter()
                        .map(|&x| s.update(snap(x)).as_tuple())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(sequential, parallel);
}
