//! Transition engine: carrier movement and the process-step state machine.
//!
//! A move is validated completely before anything is written, so a
//! rejected move leaves the entity graph untouched. On success the
//! carrier's active step is closed and the step for the destination
//! chamber's phase is activated, keeping at most one step active.

use autoline_types::{
    Cart, CartId, ChamberId, Direction, ProcessPhase, StepStatus, ValveName, ValveState,
};
use chrono::{DateTime, Utc};

use crate::clock::elapsed_whole_secs;
use crate::error::ControlError;
use crate::store::{ChamberPosition, ProcessState};

/// Next-task label once no steps remain.
pub const DONE_TASK: &str = "done";

/// Outcome of a successful move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    /// Chamber the carrier left.
    pub from: ChamberId,
    /// Chamber the carrier entered.
    pub to: ChamberId,
    /// Phase activated on arrival, if the chamber implies one.
    pub phase: Option<ProcessPhase>,
}

/// Move a carrier one chamber along its sequence.
pub fn move_carrier(
    state: &mut ProcessState,
    cart_id: &CartId,
    direction: Direction,
    now: DateTime<Utc>,
) -> Result<MoveReport, ControlError> {
    let cart = state
        .cart(cart_id)
        .ok_or_else(|| ControlError::CarrierNotFound(cart_id.clone()))?;
    let from = cart.location_chamber_id.clone();
    let position = state
        .position(&from)
        .ok_or_else(|| ControlError::ChamberNotFound(from.clone()))?;

    let target_ordinal = match direction {
        Direction::Forward => position.ordinal.checked_add(1),
        Direction::Backward => position.ordinal.checked_sub(1),
    }
    .ok_or_else(|| ControlError::OutOfRange {
        cart: cart_id.clone(),
    })?;
    let target_position = ChamberPosition {
        ordinal: target_ordinal,
        ..position
    };
    let target = state
        .chamber_at(target_position)
        .ok_or_else(|| ControlError::OutOfRange {
            cart: cart_id.clone(),
        })?;

    // Forward moves use the departed chamber's valve, backward moves the
    // destination's: the valve always belongs to the upstream chamber.
    let gate = match direction {
        Direction::Forward => state.chamber_at(position),
        Direction::Backward => Some(target),
    }
    .ok_or_else(|| ControlError::ChamberNotFound(from.clone()))?;
    if gate.valves.get(ValveName::TransferValve) != ValveState::Open {
        return Err(ControlError::ValveClosed {
            chamber: gate.id.clone(),
        });
    }

    let capacity = target.max_cart_capacity;
    let occupants = state.occupancy(&target.id, Some(cart_id));
    if u32::try_from(occupants).unwrap_or(u32::MAX) >= capacity {
        return Err(ControlError::ChamberOccupied {
            chamber: target.id.clone(),
            capacity,
        });
    }

    let to = target.id.clone();
    let phase = ProcessPhase::for_chamber(target.chamber_type);

    state.relocate_cart(cart_id, &from, &to);
    if let Some(cart) = state.cart_mut(cart_id) {
        close_active_steps(cart, now);
        match phase {
            Some(phase) => {
                activate_phase(cart, phase, now);
            }
            None => cart.phase = None,
        }
    }

    Ok(MoveReport { from, to, phase })
}

/// Complete every active step, stamping end time and duration.
pub fn close_active_steps(cart: &mut Cart, now: DateTime<Utc>) {
    for step in cart.steps.iter_mut().filter(|s| s.status == StepStatus::Active) {
        step.status = StepStatus::Completed;
        step.ended_at = Some(now);
        step.duration_secs = step.started_at.map(|start| elapsed_whole_secs(start, now));
    }
}

/// Activate the first step executing `phase` and refresh the task labels.
///
/// Returns `false` and leaves the carrier's tasks unchanged when the
/// recipe has no such step.
pub fn activate_phase(cart: &mut Cart, phase: ProcessPhase, now: DateTime<Utc>) -> bool {
    let Some(index) = cart.steps.iter().position(|s| s.phase == phase) else {
        cart.phase = None;
        return false;
    };
    let mut next_task = DONE_TASK.to_owned();
    if let Some(step) = cart.steps.get_mut(index) {
        step.status = StepStatus::Active;
        step.started_at = Some(now);
        step.ended_at = None;
        step.duration_secs = None;
        cart.current_task.clone_from(&step.name);
    }
    if let Some(next) = index.checked_add(1).and_then(|i| cart.steps.get(i)) {
        next_task.clone_from(&next.name);
    }
    cart.next_task = next_task;
    cart.phase = Some(phase);
    true
}
