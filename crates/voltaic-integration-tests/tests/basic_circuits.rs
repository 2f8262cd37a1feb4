//! End-to-end scenarios on the demonstration circuits.
//!
//! Each test builds one of the classic circuits, runs it through the full
//! step pipeline, and checks what a meter would read. Nodes that no source
//! drives are held with `set_terminal_voltage`, standing in for an external
//! solver. The file tests save circuits through `voltaic-data` and restore
//! them into a fresh simulator.

use std::path::{Path, PathBuf};

use voltaic_core::circuits::{self, ExampleCircuit};
use voltaic_core::component::{StateValue, keys};
use voltaic_core::config::SimConfig;
use voltaic_core::device::{Device, Switch};
use voltaic_core::graph::GroundSource;
use voltaic_core::serialize::StandardFactory;
use voltaic_core::simulator::Simulator;
use voltaic_core::test_utils::*;
use voltaic_data::{load_circuit, load_config, save_circuit};

fn make_test_dir(suffix: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "voltaic_integration_{suffix}_{}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cleanup(dir: &Path) {
    let _ = std::fs::remove_dir_all(dir);
}

fn run(sim: &mut Simulator, steps: usize) {
    for _ in 0..steps {
        sim.update(None);
    }
}

// ===========================================================================
// Every example
// ===========================================================================

#[test]
fn every_example_runs_with_ground_at_zero() {
    for circuit in ExampleCircuit::ALL {
        let mut sim = running_sim();
        circuit.build(&mut sim);
        run(&mut sim, 100);

        assert_eq!(sim.iteration(), 100, "{circuit}");
        assert_close(sim.simulation_time(), 0.1);
        let ground = sim.ground_node().unwrap_or_else(|| panic!("{circuit} has no ground"));
        assert_eq!(ground.voltage(), 0.0, "{circuit}");
    }
}

#[test]
fn every_example_survives_a_file_round_trip() {
    let dir = make_test_dir("examples_round_trip");
    for (i, circuit) in ExampleCircuit::ALL.into_iter().enumerate() {
        let mut sim = running_sim();
        circuit.build(&mut sim);
        run(&mut sim, 7);
        let snapshot = sim.to_snapshot();

        let ext = ["ron", "toml", "json"][i % 3];
        let path = dir.join(format!("{circuit}.{ext}"));
        save_circuit(&path, &snapshot).unwrap();

        let mut restored = Simulator::default();
        let loaded = load_circuit(&path).unwrap();
        assert_eq!(
            restored.load_snapshot(&loaded, &StandardFactory),
            sim.component_count(),
            "{circuit}"
        );
        assert_eq!(restored.to_snapshot(), snapshot, "{circuit}");
        assert_eq!(restored.ground_source(), Some(GroundSource::Restored));
    }
    cleanup(&dir);
}

// ===========================================================================
// Sources
// ===========================================================================

#[test]
fn dc_source_drives_its_node_after_the_first_step() {
    let mut sim = running_sim();
    let rc = circuits::rc_circuit(&mut sim);
    assert_eq!(sim.voltage_at(rc.source, "pos"), 0.0);

    sim.update(None);
    assert_eq!(sim.voltage_at(rc.source, "pos"), 5.0);
    assert_eq!(sim.voltage_at(rc.series, "p1"), 5.0);
    assert_eq!(sim.voltage_at(rc.source, "neg"), 0.0);
}

#[test]
fn rectifier_conducts_on_positive_half_cycle_only() {
    let mut sim = running_sim();
    let r = circuits::diode_rectifier(&mut sim);

    // 50 Hz peaks at 5 ms
    run(&mut sim, 5);
    assert_close(sim.voltage_at(r.source, "pos"), 10.0);

    // the diode sees the peak one step later
    sim.update(None);
    let diode = sim.component(r.series).unwrap().state();
    assert_eq!(diode.flag(keys::CONDUCTING), Some(true));
    assert_close(diode.current("anode").unwrap(), 1.0);

    // trough at 15 ms
    run(&mut sim, 9);
    assert_close(sim.voltage_at(r.source, "pos"), -10.0);
    sim.update(None);
    let diode = sim.component(r.series).unwrap().state();
    assert_eq!(diode.flag(keys::CONDUCTING), Some(false));
    assert_eq!(diode.current("anode"), Some(0.0));
}

// ===========================================================================
// Semiconductors with held nodes
// ===========================================================================

#[test]
fn led_lights_at_half_brightness() {
    let mut sim = running_sim();
    let led = circuits::led_circuit(&mut sim);
    assert!(sim.set_terminal_voltage(led.load, "anode", 2.001));
    run(&mut sim, 2);

    let state = sim.component(led.load).unwrap().state();
    assert_close(state.current("anode").unwrap(), 0.01);
    assert_close(state.scalar(keys::BRIGHTNESS).unwrap(), 0.5);
    assert_eq!(state.label(keys::COLOR), Some("red"));

    // the limiting resistor sees the supply on its other side
    assert_close(sim.current_at(led.series, "p1"), (5.0 - 2.001) / 220.0);
}

#[test]
fn bjt_regions_follow_held_junctions() {
    let mut sim = running_sim();
    let bjt = circuits::bjt_switch(&mut sim);
    run(&mut sim, 2);
    let region = |sim: &Simulator| {
        sim.component(bjt.transistor)
            .and_then(|c| c.state().label(keys::REGION).map(str::to_string))
    };
    // nothing drives the base node
    assert_eq!(region(&sim).as_deref(), Some("cutoff"));

    sim.set_terminal_voltage(bjt.transistor, "base", 1.7);
    sim.update(None);
    assert_eq!(region(&sim).as_deref(), Some("saturation"));

    sim.set_terminal_voltage(bjt.transistor, "collector", 5.0);
    sim.update(None);
    assert_eq!(region(&sim).as_deref(), Some("active"));
    // 1 mA of base current times a gain of 100
    assert_close(sim.current_at(bjt.transistor, "base"), 0.001);
    assert_close(sim.current_at(bjt.transistor, "collector"), 0.1);
    assert_close(sim.current_at(bjt.transistor, "emitter"), 0.101);
}

#[test]
fn closing_the_switch_passes_current() {
    let mut sim = running_sim();
    let sw = circuits::switch_circuit(&mut sim);
    run(&mut sim, 2);
    assert_eq!(sim.current_at(sw.switch, "p1"), 0.0);

    if let Some(Device::Switch(s)) = sim.device_mut(sw.switch) {
        s.toggle();
    }
    sim.update(None);
    let state = sim.component(sw.switch).unwrap().state();
    assert_eq!(state.get(keys::CLOSED), Some(&StateValue::Flag(true)));
    // 5 V across 0.01 ohm, limited to the 5 A rating
    assert_close(state.current("p1").unwrap(), Switch::default().max_current);
}

// ===========================================================================
// Configuration from files
// ===========================================================================

#[test]
fn config_file_sets_step_and_history() {
    let dir = make_test_dir("config_file");
    let path = dir.join("sim.toml");
    std::fs::write(&path, "time_step = 0.0005\nhistory_length = 3\n").unwrap();

    let config: SimConfig = load_config(&path).unwrap();
    let mut sim = Simulator::new(config);
    let rc = circuits::rc_circuit(&mut sim);
    sim.start();
    run(&mut sim, 10);

    assert_close(sim.simulation_time(), 0.005);
    let samples = sim.history(rc.series, keys::POWER, None);
    assert_eq!(samples.len(), 3);
    assert_close(samples[2].time, 0.0045);

    cleanup(&dir);
}
