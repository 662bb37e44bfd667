//! Integration tests for the device state machines through the public API.

mod common;

use std::sync::Arc;

use microgrid_sim::devices::battery::BatteryMode;
use microgrid_sim::devices::types::{PowerObserver, RecloserStatusObserver};
use microgrid_sim::sim::controller::BalanceController;
use tracing::Span;

#[test]
fn program_pq_discharge_drains_soc_over_one_interval() {
    let interval_ms = 1_000;
    let (battery, rec, clock) = common::battery();
    battery.tick();

    battery.set_mode_control(BatteryMode::ProgramPq).unwrap();
    battery.set_power_setpoint(10.0);
    let snap = battery.snapshot();
    assert_eq!(snap.mode, BatteryMode::ProgramPq);
    assert_eq!(snap.power_kw, 10.0);

    clock.advance(interval_ms);
    battery.tick();

    let expected = 0.5 - 10.0 * (interval_ms as f64 / 3_600_000.0) / 100.0;
    assert!((battery.snapshot().soc - expected).abs() < 1e-12);
    assert_eq!(rec.reads.lock().last(), Some(&10.0));
}

#[test]
fn illegal_transition_from_standby_leaves_mode_and_publishes_nothing() {
    let (battery, rec, _) = common::battery();
    assert!(battery.set_mode_control(BatteryMode::LeavingIslanded).is_err());
    assert_eq!(battery.snapshot().mode, BatteryMode::MaintainStandby);
    assert!(rec.reads.lock().is_empty());
}

#[test]
fn battery_event_reports_charging_and_soc_percent() {
    let (battery, rec, _) = common::battery();
    battery.set_power_setpoint(-5.0);
    battery.set_mode_control(BatteryMode::ProgramPq).unwrap();
    let events = rec.events.lock().clone();
    assert_eq!(events, vec![(true, BatteryMode::ProgramPq, 50.0)]);
}

#[test]
fn recloser_aggregates_same_tick_contributors() {
    let (recloser, rec) = common::recloser();
    recloser.update_battery_power("bat", 20.0);
    recloser.update_solar_power("pv", 15.0);
    recloser.update_load_power("load", -25.0);
    assert!((rec.last_read().unwrap() - 10.0).abs() < 1e-9);
}

#[test]
fn open_recloser_publishes_zero_and_close_restores_sum() {
    let (recloser, rec) = common::recloser();
    recloser.update_battery_power("bat", 50.0);
    recloser.update_load_power("load", -30.0);
    recloser.update_solar_power("pv", 10.0);

    recloser.handle_open();
    assert_eq!(rec.last_read(), Some(0.0));
    recloser.push();
    assert_eq!(rec.last_read(), Some(0.0));

    recloser.handle_close();
    assert!((rec.last_read().unwrap() - 30.0).abs() < 1e-9);
    assert_eq!(rec.events.lock().clone(), vec![false, false, true]);
}

// Setpoints follow the inferred balancing policy: battery = -(solar + load).
#[test]
fn balancer_islands_battery_and_cancels_recloser_flow() {
    let (battery, _, _) = common::battery();
    let (recloser, _) = common::recloser();
    let balancer = BalanceController::new(
        Box::new(common::DirectIssuer(battery.clone())),
        0.0,
        Span::none(),
    );
    let observers: [&dyn PowerObserver; 2] = [&*recloser, &balancer];

    balancer.update_recloser_status(true);
    for o in observers {
        o.update_solar_power("pv", 15.0);
        o.update_load_power("load", -25.0);
    }
    assert_eq!(battery.snapshot().mode, BatteryMode::MaintainStandby);

    recloser.handle_open();
    balancer.update_recloser_status(false);
    let snap = battery.snapshot();
    assert_eq!(snap.mode, BatteryMode::Islanded);
    assert!((snap.power_kw - 10.0).abs() < 1e-9);

    // What the recloser would carry if it were closed is now zero.
    recloser.update_battery_power("bat", snap.power_kw);
    assert!(recloser.contributors().net_kw().abs() < 1e-9);

    for o in observers {
        o.update_solar_power("pv", 40.0);
    }
    assert!((battery.snapshot().power_kw + 15.0).abs() < 1e-9);

    recloser.handle_close();
    balancer.update_recloser_status(true);
    assert_eq!(battery.snapshot().mode, BatteryMode::MaintainStandby);
}

#[test]
fn balancer_setpoint_is_clamped_by_battery_limits() {
    let (battery, _, _) = common::battery();
    let balancer = BalanceController::new(
        Box::new(common::DirectIssuer(battery.clone())),
        0.0,
        Span::none(),
    );
    balancer.update_recloser_status(false);
    balancer.update_load_power("load", -80.0);
    assert_eq!(battery.snapshot().power_kw, 50.0);
    assert_eq!(balancer.snapshot().last_setpoint_kw, Some(80.0));

    balancer.update_solar_power("pv", 200.0);
    assert_eq!(battery.snapshot().power_kw, -25.0);
}

#[test]
fn devices_are_independent_across_threads() {
    let (battery, rec, clock) = common::battery();
    battery.set_mode_control(BatteryMode::ProgramPq).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let battery = Arc::clone(&battery);
            let clock = clock.clone();
            std::thread::spawn(move || {
                for j in 0..100 {
                    if (i + j) % 2 == 0 {
                        battery.set_power_setpoint(f64::from(j) - 50.0);
                    } else {
                        clock.advance(10);
                        battery.tick();
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let (lo, hi) = battery.spec().soc_bounds();
    let snap = battery.snapshot();
    assert!(snap.soc >= lo && snap.soc <= hi);
    assert_eq!(rec.reads.lock().len(), rec.events.lock().len());
}
