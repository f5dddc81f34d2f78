//! Carrier construction when material enters the line.
//!
//! Builds the step plan for the carrier's polarity from its recipe,
//! activates the step matching the entry chamber and fills the initial
//! telemetry, batch number and recipe label.

use autoline_types::{
    Cart, CartId, CartStatus, CartTelemetry, Chamber, Polarity, ProcessPhase, ProcessStep, Recipe,
    RecipeId, StepStatus,
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

use crate::transition::activate_phase;

/// Material descriptor used when none is supplied.
pub const UNSPECIFIED_MATERIAL: &str = "unspecified";

const FEED_SECS: u64 = 5 * 60;
const SCRUB_SECS: u64 = 4 * 3600;
const DOCK_SECS: u64 = 2 * 3600;
const SEAL_SECS: u64 = 3 * 3600;
const UNLOAD_SECS: u64 = 10 * 60;

/// Request to load material into a chamber.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewCarrier {
    /// Recipe to execute; the polarity default is used when unset.
    pub recipe_id: Option<RecipeId>,
    /// Batch number; generated when unset.
    pub batch_no: Option<String>,
    /// Material descriptor.
    pub material: Option<String>,
    /// Custom carrier name.
    pub name: Option<String>,
}

/// Build a carrier located in `chamber`.
///
/// `existing` is every carrier already on the lines; it feeds the display
/// number sequence.
pub fn build_carrier(
    request: &NewCarrier,
    chamber: &Chamber,
    recipe: &Recipe,
    existing: &[Cart],
    now: DateTime<Utc>,
) -> Cart {
    let polarity = chamber.polarity;
    let sequence = next_sequence(existing, polarity);
    let steps = plan_steps(polarity, recipe);
    let estimated_total_secs = steps
        .iter()
        .fold(0u64, |acc, s| acc.saturating_add(s.estimated_duration_secs));

    let (target_vacuum, vacuum) = match polarity {
        Polarity::Anode => (1e-6, 1e-5),
        Polarity::Cathode => (1e-8, 1e-7),
    };
    let mut telemetry = CartTelemetry {
        temperature: Some(chamber.temperature),
        vacuum: Some(vacuum),
        target_temp: Some(recipe.bake_target_temp),
        target_vacuum: Some(target_vacuum),
        ..CartTelemetry::default()
    };
    match polarity {
        Polarity::Anode => {
            telemetry.e_gun_voltage = Some(0.0);
            telemetry.e_gun_current = Some(0.0);
            telemetry.indium_temp = Some(chamber.temperature);
            telemetry.seal_pressure = Some(0.0);
        }
        Polarity::Cathode => {
            telemetry.cs_current = Some(0.0);
            telemetry.o2_pressure = Some(1e-7);
            telemetry.photo_current = Some(0.0);
            telemetry.growth_progress = Some(0.0);
        }
    }

    let batch_no = request.batch_no.clone().unwrap_or_else(|| {
        format!(
            "{}-{}-{sequence:03}",
            polarity.batch_prefix(),
            now.format("%y%m%d")
        )
    });

    let mut cart = Cart {
        id: CartId::generate(),
        number: format!("{}-{sequence:03}", polarity.number_prefix()),
        name: request.name.clone(),
        polarity,
        status: CartStatus::Normal,
        location_chamber_id: chamber.id.clone(),
        content: Some(
            request
                .material
                .clone()
                .unwrap_or_else(|| UNSPECIFIED_MATERIAL.to_owned()),
        ),
        recipe_id: Some(recipe.id.clone()),
        current_task: String::new(),
        next_task: String::new(),
        progress: 0.0,
        phase: None,
        steps,
        telemetry,
        recipe_version: Some(format!("{} ({})", recipe.name, recipe.version)),
        batch_no: Some(batch_no),
        loaded_at: Some(now),
        estimated_total_secs,
    };

    let entry_phase = ProcessPhase::for_chamber(chamber.chamber_type)
        .filter(|p| cart.steps.iter().any(|s| s.phase == *p))
        .unwrap_or(ProcessPhase::Feed);
    complete_steps_before(&mut cart, entry_phase, now);
    activate_phase(&mut cart, entry_phase, now);
    cart
}

/// One above the highest display number in use for `polarity`.
pub fn next_sequence(existing: &[Cart], polarity: Polarity) -> u32 {
    let prefix = format!("{}-", polarity.number_prefix());
    existing
        .iter()
        .filter_map(|c| c.number.strip_prefix(&prefix))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        .saturating_add(1)
}

/// Step plan for a polarity, in execution order.
pub fn plan_steps(polarity: Polarity, recipe: &Recipe) -> Vec<ProcessStep> {
    let bake = hours_to_secs(recipe.bake_duration_h);
    let phases: Vec<(ProcessPhase, u64)> = match polarity {
        Polarity::Anode => vec![
            (ProcessPhase::Feed, FEED_SECS),
            (ProcessPhase::Bake, bake),
            (ProcessPhase::Scrub, SCRUB_SECS),
            (ProcessPhase::Dock, DOCK_SECS),
            (ProcessPhase::Seal, SEAL_SECS),
            (ProcessPhase::Unload, UNLOAD_SECS),
        ],
        Polarity::Cathode => vec![
            (ProcessPhase::Feed, FEED_SECS),
            (ProcessPhase::Bake, bake),
            (ProcessPhase::Growth, hours_to_secs(recipe.growth_duration_h)),
            (ProcessPhase::Unload, UNLOAD_SECS),
        ],
    };
    phases
        .into_iter()
        .zip(1u32..)
        .map(|((phase, secs), n)| ProcessStep::pending(format!("s{n}"), phase, secs))
        .collect()
}

/// Mark every step ahead of `phase` as completed, as if it had just run
/// for its estimated duration.
fn complete_steps_before(cart: &mut Cart, phase: ProcessPhase, now: DateTime<Utc>) {
    for step in cart.steps.iter_mut().take_while(|s| s.phase != phase) {
        let secs = i64::try_from(step.estimated_duration_secs).unwrap_or(i64::MAX);
        step.status = StepStatus::Completed;
        step.started_at = TimeDelta::try_seconds(secs).and_then(|d| now.checked_sub_signed(d));
        step.ended_at = Some(now);
        step.duration_secs = Some(step.estimated_duration_secs);
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hours_to_secs(hours: f64) -> u64 {
    if hours.is_finite() && hours > 0.0 {
        (hours * 3600.0).round() as u64
    } else {
        0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use autoline_types::{ChamberType, LineId};

    use super::*;
    use crate::catalog::{default_anode_recipe, default_cathode_recipe};

    fn chamber(id: &str, polarity: Polarity, chamber_type: ChamberType) -> Chamber {
        Chamber::new(id, LineId::new("line-1"), "Entry", polarity, chamber_type)
    }

    #[test]
    fn anode_carrier_in_load_lock_starts_with_feed() {
        let now = Utc::now();
        let c = chamber("a-jl", Polarity::Anode, ChamberType::LoadLock);
        let recipe = default_anode_recipe();
        let cart = build_carrier(&NewCarrier::default(), &c, &recipe, &[], now);

        assert_eq!(cart.number, "A-001");
        assert!(cart.id.as_str().starts_with("cart-"));
        assert_eq!(cart.steps.len(), 6);
        assert_eq!(cart.phase, Some(ProcessPhase::Feed));
        assert_eq!(cart.current_task, "feed");
        assert_eq!(cart.next_task, "bake process");
        assert_eq!(cart.content.as_deref(), Some(UNSPECIFIED_MATERIAL));
        assert_eq!(
            cart.recipe_version.as_deref(),
            Some("Anode standard v1.0 (1.0)")
        );
        let expected_batch = format!("ANO-{}-001", now.format("%y%m%d"));
        assert_eq!(cart.batch_no.as_deref(), Some(expected_batch.as_str()));
        assert_eq!(
            cart.estimated_total_secs,
            300 + 54_000 + 14_400 + 7_200 + 10_800 + 600
        );
        assert!(cart.telemetry.e_gun_voltage.is_some());
        assert!(cart.telemetry.cs_current.is_none());
    }

    #[test]
    fn cathode_carrier_in_bake_chamber_completes_feed() {
        let now = Utc::now();
        let c = chamber("c-hk", Polarity::Cathode, ChamberType::Bake);
        let request = NewCarrier {
            batch_no: Some("CAT-CUSTOM".to_owned()),
            material: Some("GaAs wafer".to_owned()),
            ..NewCarrier::default()
        };
        let cart = build_carrier(&request, &c, &default_cathode_recipe(), &[], now);

        let statuses: Vec<_> = cart.steps.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Completed,
                StepStatus::Active,
                StepStatus::Pending,
                StepStatus::Pending,
            ]
        );
        assert_eq!(cart.steps.first().and_then(|s| s.duration_secs), Some(300));
        assert_eq!(cart.phase, Some(ProcessPhase::Bake));
        assert_eq!(cart.next_task, "growth process");
        assert_eq!(cart.batch_no.as_deref(), Some("CAT-CUSTOM"));
        assert_eq!(cart.content.as_deref(), Some("GaAs wafer"));
        assert_eq!(cart.telemetry.target_vacuum, Some(1e-8));
        assert_eq!(cart.telemetry.growth_progress, Some(0.0));
    }

    #[test]
    fn numbers_continue_from_highest_in_use() {
        let now = Utc::now();
        let c = chamber("a-jl", Polarity::Anode, ChamberType::LoadLock);
        let recipe = default_anode_recipe();
        let mut first = build_carrier(&NewCarrier::default(), &c, &recipe, &[], now);
        first.number = "A-007".to_owned();
        let cathode = build_carrier(
            &NewCarrier::default(),
            &chamber("c-jl", Polarity::Cathode, ChamberType::LoadLock),
            &default_cathode_recipe(),
            &[],
            now,
        );
        let existing = vec![first, cathode];
        assert_eq!(next_sequence(&existing, Polarity::Anode), 8);
        assert_eq!(next_sequence(&existing, Polarity::Cathode), 2);
    }

    #[test]
    fn phaseless_entry_chamber_activates_feed() {
        let c = chamber("a-tr", Polarity::Anode, ChamberType::Transfer);
        let recipe = default_anode_recipe();
        let cart = build_carrier(&NewCarrier::default(), &c, &recipe, &[], Utc::now());
        assert_eq!(cart.phase, Some(ProcessPhase::Feed));
        assert_eq!(
            cart.steps.iter().filter(|s| s.status == StepStatus::Active).count(),
            1
        );
    }
}
