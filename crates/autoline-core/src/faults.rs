//! Fault overlay consulted by the thermal and vacuum models.
//!
//! A flat list of fault records. Injection appends, clearing empties the
//! list; a fault's effect lasts exactly as long as it is present and
//! active.

use autoline_types::{ChamberId, FaultId, FaultKind, LineId, SimulationFault};
use chrono::{DateTime, Utc};

/// The set of injected faults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultOverlay {
    faults: Vec<SimulationFault>,
}

impl FaultOverlay {
    /// Create an empty overlay.
    pub const fn new() -> Self {
        Self { faults: Vec::new() }
    }

    /// Append an active fault targeting `chamber`.
    pub fn inject(
        &mut self,
        kind: FaultKind,
        line: LineId,
        chamber: ChamberId,
        now: DateTime<Utc>,
    ) -> SimulationFault {
        let fault = SimulationFault {
            id: FaultId::new(),
            kind,
            description: describe(kind, &chamber),
            target_line_id: line,
            target_chamber_id: chamber,
            active: true,
            created_at: now,
        };
        self.faults.push(fault.clone());
        fault
    }

    /// Remove every fault. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.faults.len();
        self.faults.clear();
        count
    }

    /// All fault records.
    pub fn faults(&self) -> &[SimulationFault] {
        &self.faults
    }

    /// Whether an active fault of `kind` targets `chamber`.
    pub fn is_active(&self, chamber: &ChamberId, kind: FaultKind) -> bool {
        self.faults
            .iter()
            .any(|f| f.active && f.kind == kind && &f.target_chamber_id == chamber)
    }

    /// Drop faults whose target chamber fails `keep`. Returns how many
    /// were dropped.
    pub fn retain_targets(&mut self, keep: impl Fn(&ChamberId) -> bool) -> usize {
        let before = self.faults.len();
        self.faults.retain(|f| keep(&f.target_chamber_id));
        before.saturating_sub(self.faults.len())
    }
}

fn describe(kind: FaultKind, chamber: &ChamberId) -> String {
    let what = match kind {
        FaultKind::TempRunaway => "temperature runaway",
        FaultKind::VacuumLeak => "vacuum leak",
        FaultKind::PumpFailure => "pump failure",
        FaultKind::SensorFailure => "sensor failure",
    };
    format!("Injected {what} on chamber {chamber}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inject(overlay: &mut FaultOverlay, kind: FaultKind, chamber: &str) -> SimulationFault {
        let line = LineId::new("line-1");
        overlay.inject(kind, line, ChamberId::new(chamber), Utc::now())
    }

    #[test]
    fn inject_then_clear_empties_overlay() {
        let mut overlay = FaultOverlay::new();
        let chamber = ChamberId::new("a-hk");
        let fault = inject(&mut overlay, FaultKind::TempRunaway, "a-hk");
        assert!(fault.active);
        assert!(overlay.is_active(&chamber, FaultKind::TempRunaway));
        assert!(!overlay.is_active(&chamber, FaultKind::VacuumLeak));

        assert_eq!(overlay.clear(), 1);
        assert!(overlay.faults().is_empty());
        assert!(!overlay.is_active(&chamber, FaultKind::TempRunaway));
    }

    #[test]
    fn retain_targets_drops_faults_on_removed_chambers() {
        let mut overlay = FaultOverlay::new();
        inject(&mut overlay, FaultKind::VacuumLeak, "a-hk");
        inject(&mut overlay, FaultKind::PumpFailure, "c-sz");
        let dropped = overlay.retain_targets(|id| id.as_str() != "a-hk");
        assert_eq!(dropped, 1);
        assert_eq!(overlay.faults().len(), 1);
        assert!(overlay.is_active(&ChamberId::new("c-sz"), FaultKind::PumpFailure));
    }

    #[test]
    fn description_names_kind_and_chamber() {
        let mut overlay = FaultOverlay::new();
        let fault = overlay.inject(
            FaultKind::SensorFailure,
            LineId::new("line-1"),
            ChamberId::new("c-sz"),
            Utc::now(),
        );
        assert!(fault.description.contains("sensor failure"));
        assert!(fault.description.contains("c-sz"));
    }
}
