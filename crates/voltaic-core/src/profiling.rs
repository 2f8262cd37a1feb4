//! Profiling and diagnostic instrumentation for the simulator.
//!
//! - [`StepProfile`] captures per-phase timing from a step.
//! - [`NodeDiagnostic`] explains a node's current balance for debugging.

use std::time::Duration;

use crate::id::{NodeId, TerminalRef};

/// Per-phase wall-clock timing of one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepProfile {
    pub build: Duration,
    pub compute: Duration,
    pub commit: Duration,
    pub diagnostics: Duration,
    pub total: Duration,
}

impl StepProfile {
    /// Returns the name and duration of the slowest phase.
    pub fn bottleneck_phase(&self) -> (&'static str, Duration) {
        [
            ("build", self.build),
            ("compute", self.compute),
            ("commit", self.commit),
            ("diagnostics", self.diagnostics),
        ]
        .into_iter()
        .fold(("build", Duration::ZERO), |slowest, phase| {
            if phase.1 > slowest.1 { phase } else { slowest }
        })
    }
}

/// Breakdown of one node's current balance.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDiagnostic {
    pub node: NodeId,
    pub voltage: f64,
    pub is_ground: bool,
    /// (terminal, committed current) for each member.
    pub contributions: Vec<(TerminalRef, f64)>,
    pub current_sum: f64,
    /// Whether `|current_sum|` is within the configured epsilon.
    pub balanced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use crate::device::{Ground, Resistor};
    use crate::id::ComponentId;
    use crate::test_utils::*;

    #[test]
    fn bottleneck_picks_slowest_phase() {
        let profile = StepProfile {
            build: Duration::from_micros(5),
            compute: Duration::from_micros(40),
            commit: Duration::from_micros(10),
            diagnostics: Duration::from_micros(1),
            total: Duration::from_micros(56),
        };
        assert_eq!(
            profile.bottleneck_phase(),
            ("compute", Duration::from_micros(40))
        );
    }

    #[test]
    fn empty_profile_reports_build() {
        assert_eq!(
            StepProfile::default().bottleneck_phase(),
            ("build", Duration::ZERO)
        );
    }

    #[test]
    fn update_fills_profile_total() {
        let mut sim = running_sim();
        sim.add_component(Component::new(ComponentId(1), Resistor::default()));
        let stats = sim.update(None);
        let p = &stats.profile;
        assert!(p.total >= p.build + p.compute + p.commit);
    }

    #[test]
    fn diagnostic_lists_member_currents() {
        let mut sim = running_sim();
        let g = ComponentId(1);
        let r = ComponentId(2);
        sim.add_component(Component::new(g, Ground::default()));
        sim.add_component(Component::new(r, Resistor::new(100.0)));
        sim.connect(r, "p2", g, "gnd");
        sim.build_circuit();
        sim.set_terminal_voltage(r, "p1", 1.0);
        sim.update(None);

        let ground = sim.ground_node().unwrap().id();
        let diag = sim.diagnose_node(ground).unwrap();
        assert!(diag.is_ground);
        assert_eq!(diag.contributions.len(), 2);
        // ground lags one step behind the resistor
        assert!(!diag.balanced);
        assert_close(diag.current_sum, -0.01);

        sim.update(None);
        let diag = sim.diagnose_node(ground).unwrap();
        assert!(diag.balanced);
    }
}
