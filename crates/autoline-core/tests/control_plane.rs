//! Integration tests for the engine control plane.
//!
//! Each test builds an [`Engine`] over the default line and drives it
//! through its public API only, the way the scheduler and an API layer
//! would.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use autoline_core::{
    ControlError, Engine, EngineConfig, InMemoryRecipeCatalog, MemoryHistorySink, NewCarrier,
    seed,
};
use autoline_types::{
    Cart, CartId, Chamber, ChamberId, ChamberPatch, Direction, FaultKind, LinePatch, LogLevel,
    ProcessPhase, PumpName, StepStatus, SystemState, ValveAction, ValveName, ValveState,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

fn quiet_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.simulation.seed = Some(2024);
    config.simulation.noise_enabled = false;
    config.actuation.min_delay_ms = 0;
    config.actuation.max_delay_ms = 0;
    config
}

async fn make_engine(config: EngineConfig) -> Arc<Engine> {
    make_engine_with(config, Arc::new(MemoryHistorySink::new(10_000))).await
}

async fn make_engine_with(config: EngineConfig, sink: Arc<MemoryHistorySink>) -> Arc<Engine> {
    let engine = Engine::new(
        config,
        Arc::new(InMemoryRecipeCatalog::with_defaults()),
        sink,
    );
    engine.add_line(seed::default_line()).await.unwrap();
    Arc::new(engine)
}

fn chamber<'a>(snapshot: &'a SystemState, id: &str) -> &'a Chamber {
    snapshot
        .lines
        .iter()
        .flat_map(|l| l.all_chambers())
        .find(|c| c.id.as_str() == id)
        .unwrap()
}

fn cart<'a>(snapshot: &'a SystemState, id: &CartId) -> &'a Cart {
    snapshot.carts.iter().find(|c| &c.id == id).unwrap()
}

fn active_steps(cart: &Cart) -> usize {
    cart.steps
        .iter()
        .filter(|s| s.status == StepStatus::Active)
        .count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creations_admit_one_carrier() {
    let engine = make_engine(quiet_config()).await;
    let target = ChamberId::new("c-jl");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let target = target.clone();
            tokio::spawn(async move {
                engine
                    .create_carrier(&target, &NewCarrier::default())
                    .await
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, ControlError::ChamberOccupied { .. }))
    );

    let snapshot = engine.snapshot().await;
    assert_eq!(snapshot.carts.len(), 1);
    assert_eq!(chamber(&snapshot, "c-jl").cart_ids.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn valve_opens_only_after_actuation_delay() {
    let mut config = quiet_config();
    config.actuation.min_delay_ms = 500;
    config.actuation.max_delay_ms = 1_000;
    let engine = make_engine(config).await;
    let target = ChamberId::new("c-jl");

    let pending = {
        let engine = Arc::clone(&engine);
        let target = target.clone();
        tokio::spawn(async move {
            engine
                .set_valve(&target, ValveName::TransferValve, ValveAction::Open)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(400)).await;
    // The lock is free while the valve actuates.
    engine.tick_for(1.0).await.unwrap();
    let valve = chamber(&engine.snapshot().await, "c-jl").valves.transfer_valve;
    assert_eq!(valve, ValveState::Closed);

    tokio::time::sleep(Duration::from_millis(700)).await;
    pending.await.unwrap().unwrap();
    let valve = chamber(&engine.snapshot().await, "c-jl").valves.transfer_valve;
    assert_eq!(valve, ValveState::Open);
}

#[tokio::test(start_paused = true)]
async fn pump_switches_only_after_actuation_delay() {
    let mut config = quiet_config();
    config.actuation.min_delay_ms = 500;
    config.actuation.max_delay_ms = 1_000;
    let engine = make_engine(config).await;
    let target = ChamberId::new("c-sz");

    let pending = {
        let engine = Arc::clone(&engine);
        let target = target.clone();
        tokio::spawn(async move { engine.set_pump(&target, PumpName::Molecular, true).await })
    };

    tokio::time::sleep(Duration::from_millis(400)).await;
    // Ticks and snapshots still get the lock while the pump spins up.
    engine.tick_for(1.0).await.unwrap();
    assert!(!chamber(&engine.snapshot().await, "c-sz").molecular_pump);
    assert!(engine.snapshot().await.operation_logs.is_empty());

    tokio::time::sleep(Duration::from_millis(700)).await;
    pending.await.unwrap().unwrap();
    let snapshot = engine.snapshot().await;
    assert!(chamber(&snapshot, "c-sz").molecular_pump);
    assert_eq!(snapshot.operation_logs.len(), 1);
}

#[tokio::test]
async fn anode_carrier_walks_the_whole_line() {
    let engine = make_engine(quiet_config()).await;
    for id in ["a-jl", "a-hk", "a-qs", "a-dj", "a-yf"] {
        engine
            .toggle_valve(&ChamberId::new(id), "transfer_valve", ValveAction::Open)
            .await
            .unwrap();
    }
    let created = engine
        .create_carrier(&ChamberId::new("a-jl"), &NewCarrier::default())
        .await
        .unwrap();
    assert_eq!(active_steps(&created), 1);

    let expected = [
        ("a-hk", ProcessPhase::Bake),
        ("a-qs", ProcessPhase::Scrub),
        ("a-dj", ProcessPhase::Dock),
        ("a-yf", ProcessPhase::Seal),
        ("a-cy", ProcessPhase::Unload),
    ];
    for (chamber_id, phase) in expected {
        let snapshot = engine
            .move_carrier(&created.id, Direction::Forward)
            .await
            .unwrap();
        let moved = cart(&snapshot, &created.id);
        assert_eq!(moved.location_chamber_id.as_str(), chamber_id);
        assert_eq!(moved.phase, Some(phase));
        assert_eq!(active_steps(moved), 1);
        engine.tick_for(1.0).await.unwrap();
    }

    let snapshot = engine.snapshot().await;
    let done = cart(&snapshot, &created.id);
    assert_eq!(done.next_task, "done");
    assert_eq!(
        done.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count(),
        5
    );

    let err = engine
        .move_carrier(&created.id, Direction::Forward)
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::OutOfRange { .. }));
}

#[tokio::test]
async fn rejected_move_leaves_state_unchanged() {
    let engine = make_engine(quiet_config()).await;
    let first = engine
        .create_carrier(&ChamberId::new("c-jl"), &NewCarrier::default())
        .await
        .unwrap();
    engine
        .create_carrier(&ChamberId::new("c-hk"), &NewCarrier::default())
        .await
        .unwrap();
    engine
        .toggle_valve(&ChamberId::new("c-jl"), "transfer_valve", ValveAction::Open)
        .await
        .unwrap();

    let before = engine.snapshot().await;
    let err = engine
        .move_carrier(&first.id, Direction::Forward)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ControlError::ChamberOccupied {
            chamber: ChamberId::new("c-hk"),
            capacity: 1,
        }
    );
    let after = engine.snapshot().await;
    assert_eq!(before.lines, after.lines);
    assert_eq!(before.carts, after.carts);
}

#[tokio::test]
async fn cleared_leak_returns_to_normal_leak_rate() {
    let config = quiet_config();
    let growth_leak = config.vacuum.growth_leak_rate;
    let engine = make_engine(config).await;
    let target = ChamberId::new("c-sz");

    engine
        .inject_fault(FaultKind::VacuumLeak, &target)
        .await
        .unwrap();
    let before = chamber(&engine.snapshot().await, "c-sz").high_vac_pressure;
    engine.tick_for(1.0).await.unwrap();
    let leaking = chamber(&engine.snapshot().await, "c-sz").high_vac_pressure;
    assert!(leaking - before > 50.0);

    assert_eq!(engine.clear_faults().await, 1);
    assert!(engine.snapshot().await.faults.is_empty());
    engine.tick_for(1.0).await.unwrap();
    let recovered = chamber(&engine.snapshot().await, "c-sz").high_vac_pressure;
    assert!((recovered - leaking - growth_leak).abs() < 1e-9);
}

#[tokio::test]
async fn pressure_and_heating_invariants_hold_over_many_ticks() {
    let engine = make_engine(quiet_config()).await;
    engine
        .update_chamber(
            &ChamberId::new("a-qs"),
            &ChamberPatch {
                target_temperature: Some(300.0),
                ..ChamberPatch::default()
            },
        )
        .await
        .unwrap();
    for pump in ["roughing", "molecular"] {
        engine
            .toggle_pump(&ChamberId::new("c-sz"), pump, true)
            .await
            .unwrap();
    }
    engine
        .toggle_valve(&ChamberId::new("a-cy"), "vent_valve", ValveAction::Open)
        .await
        .unwrap();
    engine.configure(30.0, false).await.unwrap();

    let mut last_gap = f64::INFINITY;
    for _ in 0..200 {
        engine.tick_for(1.0).await.unwrap();
        let snapshot = engine.snapshot().await;
        for c in snapshot.lines.iter().flat_map(|l| l.all_chambers()) {
            let pressure = c.high_vac_pressure;
            assert!((1e-9..=101_325.0).contains(&pressure), "{}", c.id);
        }
        let gap = (chamber(&snapshot, "a-qs").temperature - 300.0).abs();
        assert!(gap <= last_gap + 1e-9);
        last_gap = gap;
    }
    let snapshot = engine.snapshot().await;
    assert!(chamber(&snapshot, "c-sz").high_vac_pressure < 1e-3);
    assert!(chamber(&snapshot, "a-cy").high_vac_pressure > 100_000.0);
}

#[tokio::test]
async fn snapshot_serializes_for_the_dashboard() {
    let engine = make_engine(quiet_config()).await;
    engine
        .create_carrier(&ChamberId::new("c-hk"), &NewCarrier::default())
        .await
        .unwrap();
    engine.tick_for(1.0).await.unwrap();

    let value: Value = serde_json::to_value(engine.snapshot().await).unwrap();
    assert_eq!(value["lines"][0]["id"], "line-1");
    assert_eq!(value["lines"][0]["anode_chambers"][0]["type"], "load_lock");
    assert_eq!(value["carts"][0]["location_chamber_id"], "c-hk");
    assert_eq!(value["carts"][0]["phase"], "bake");
    assert_eq!(value["tick"], 1);
}

fn pick<'a, T>(rng: &mut StdRng, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.random_range(0..items.len()))
}

fn assert_consistent(snapshot: &SystemState) {
    let chambers: Vec<_> = snapshot
        .lines
        .iter()
        .flat_map(|l| l.all_chambers())
        .collect();
    for c in &snapshot.carts {
        assert!(active_steps(c) <= 1, "{} has two active steps", c.number);
        let located = chambers.iter().any(|ch| ch.id == c.location_chamber_id);
        assert!(located, "{} sits in an unknown chamber", c.number);
    }
    for ch in &chambers {
        let mut inside: Vec<_> = snapshot
            .carts
            .iter()
            .filter(|c| c.location_chamber_id == ch.id)
            .map(|c| c.id.clone())
            .collect();
        let mut mirrored = ch.cart_ids.clone();
        inside.sort();
        mirrored.sort();
        assert_eq!(inside, mirrored, "{}", ch.id);
        let occupants = u32::try_from(inside.len()).unwrap();
        assert!(occupants <= ch.max_cart_capacity, "{} over capacity", ch.id);
    }
}

#[tokio::test]
async fn random_operations_keep_step_and_capacity_invariants() {
    let engine = make_engine(quiet_config()).await;
    let mut rng = StdRng::seed_from_u64(7);
    let chamber_ids: Vec<ChamberId> = chamber_list(&engine.snapshot().await);
    let mut moves = Vec::new();

    for _ in 0..300 {
        let snapshot = engine.snapshot().await;
        let chamber_id = pick(&mut rng, &chamber_ids).unwrap().clone();
        let cart_id = pick(&mut rng, &snapshot.carts).map(|c| c.id.clone());
        match (rng.random_range(0..10u8), cart_id) {
            (0 | 1, _) | (_, None) => {
                let request = NewCarrier::default();
                let created = engine.create_carrier(&chamber_id, &request).await;
                let occupied = matches!(created, Err(ControlError::ChamberOccupied { .. }));
                assert!(created.is_ok() || occupied);
            }
            (2..=5, Some(cart_id)) => {
                let direction = if rng.random_bool(0.7) {
                    Direction::Forward
                } else {
                    Direction::Backward
                };
                moves.push(engine.move_carrier(&cart_id, direction).await.is_ok());
            }
            (6 | 7, Some(_)) => {
                let action = if rng.random_bool(0.7) {
                    ValveAction::Open
                } else {
                    ValveAction::Closed
                };
                engine
                    .set_valve(&chamber_id, ValveName::TransferValve, action)
                    .await
                    .unwrap();
            }
            (8, Some(cart_id)) => {
                engine.remove_carrier(&cart_id).await.unwrap();
            }
            (_, Some(_)) => {
                engine.tick_for(1.0).await.unwrap();
            }
        }
        assert_consistent(&engine.snapshot().await);
    }

    assert!(moves.iter().any(|ok| *ok));
    assert!(moves.iter().any(|ok| !*ok));
}

fn chamber_list(snapshot: &SystemState) -> Vec<ChamberId> {
    snapshot
        .lines
        .iter()
        .flat_map(|l| l.all_chambers())
        .map(|c| c.id.clone())
        .collect()
}

#[tokio::test]
async fn line_changes_reach_snapshot_and_history() {
    let sink = Arc::new(MemoryHistorySink::new(100));
    let engine = make_engine_with(quiet_config(), Arc::clone(&sink)).await;

    let pilot = engine.create_line("Pilot").await.unwrap();
    let copy = engine.duplicate_line(&pilot.id).await.unwrap();
    assert_eq!(copy.name, "Pilot (Copy)");
    let patch = LinePatch {
        name: Some("Pilot B".to_owned()),
        ..LinePatch::default()
    };
    engine.update_line(&copy.id, patch).await.unwrap();
    engine.delete_line(&pilot.id).await.unwrap();

    let snapshot = engine.snapshot().await;
    let names: Vec<_> = snapshot.lines.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, ["Line 1", "Pilot B"]);
    let levels: Vec<_> = snapshot.system_logs.iter().map(|e| e.level).collect();
    let expected = [
        LogLevel::Warn,
        LogLevel::Success,
        LogLevel::Success,
        LogLevel::Success,
    ];
    assert_eq!(levels, expected);

    let recorded: Vec<_> = sink.events().into_iter().map(|e| e.content).collect();
    assert_eq!(recorded.len(), 4);
    assert_eq!(
        recorded.first().map(String::as_str),
        Some("Created line Pilot")
    );

    assert_eq!(
        engine.delete_line(&pilot.id).await,
        Err(ControlError::LineNotFound(pilot.id.clone()))
    );
}
