//! RC charging example: a 5 V source charging 1 µF through 1 kΩ.
//!
//! Builds the circuit, runs 20 steps of 0.5 ms, and prints the resistor
//! current and capacitor charge after each step, then the recorded
//! history of the charge.
//!
//! Run with: `RUST_LOG=voltaic_core=debug cargo run -p voltaic-core --example rc_charging`

use tracing_subscriber::EnvFilter;
use voltaic_core::circuits;
use voltaic_core::component::keys;
use voltaic_core::config::SimConfig;
use voltaic_core::simulator::Simulator;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SimConfig {
        time_step: 0.0005,
        ..SimConfig::default()
    };
    let mut sim = Simulator::new(config);
    let rc = circuits::rc_circuit(&mut sim);
    println!(
        "built {} components into {} nodes",
        sim.component_count(),
        sim.node_count()
    );

    // --- Step the circuit ---

    sim.start();
    for _ in 0..20 {
        let stats = sim.update(None);
        let charge = sim
            .component(rc.load)
            .and_then(|c| c.state().scalar(keys::CHARGE))
            .unwrap_or(0.0);
        println!(
            "t={:.4} s  i_R={:.6} A  q_C={:.3e} C  (bottleneck: {})",
            stats.simulation_time,
            sim.current_at(rc.series, "p1"),
            charge,
            stats.profile.bottleneck_phase().0,
        );
    }

    // --- Inspect history ---

    let samples = sim.history(rc.load, keys::CHARGE, None);
    println!("\n{} charge samples recorded", samples.len());
    for sample in samples.iter().rev().take(3) {
        println!("  t={:.4} s  q={:.3e} C", sample.time, sample.value);
    }

    // --- Nodes ---

    for node in sim.nodes() {
        println!("{node}");
    }
}
