//! Error types for control operations and the process state store.
//!
//! Every control operation either succeeds completely or fails with one of
//! these errors having mutated nothing.

use autoline_types::{CartId, ChamberId, LineId, RecipeId};

/// Errors returned by engine control operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    /// No carrier with the given id exists.
    #[error("carrier not found: {0}")]
    CarrierNotFound(CartId),

    /// No chamber with the given id exists in any line.
    #[error("chamber not found: {0}")]
    ChamberNotFound(ChamberId),

    /// No line with the given id exists.
    #[error("line not found: {0}")]
    LineNotFound(LineId),

    /// The line store refused a create, update, duplicate or delete.
    #[error("line change rejected")]
    LineRejected(#[source] StoreError),

    /// The requested move would leave the chamber sequence.
    #[error("carrier {cart} is at the end of its chamber sequence")]
    OutOfRange {
        /// The carrier that was asked to move.
        cart: CartId,
    },

    /// The transfer valve gating the move is not open.
    #[error("transfer valve of chamber {chamber} is not open")]
    ValveClosed {
        /// The chamber whose transfer valve blocks the move.
        chamber: ChamberId,
    },

    /// The destination chamber is already at capacity.
    #[error("chamber {chamber} is full (capacity {capacity})")]
    ChamberOccupied {
        /// The full chamber.
        chamber: ChamberId,
        /// Its declared capacity.
        capacity: u32,
    },

    /// The valve name is not one of the five chamber valves.
    #[error("unknown valve: {0}")]
    UnknownValve(String),

    /// The pump name is neither `molecular` nor `roughing`.
    #[error("unknown pump: {0}")]
    UnknownPump(String),

    /// The direction is neither `forward` nor `backward`.
    #[error("unknown direction: {0}")]
    UnknownDirection(String),

    /// The recipe is not in the catalog, or no default exists.
    #[error("recipe not found: {0}")]
    RecipeNotFound(String),

    /// A requested time multiplier is outside the accepted range.
    #[error("time multiplier {value} is outside (0, {max}]")]
    InvalidTimeMultiplier {
        /// The rejected value.
        value: f64,
        /// The configured maximum.
        max: f64,
    },
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownLine(id) => Self::LineNotFound(id),
            other => Self::LineRejected(other),
        }
    }
}

impl ControlError {
    /// Recipe lookup failure for an explicit id.
    pub fn recipe(id: &RecipeId) -> Self {
        Self::RecipeNotFound(id.to_string())
    }
}

/// Errors raised when lines are inserted, changed or removed in the
/// state store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A line must keep at least one chamber per polarity.
    #[error("line {line} has no {polarity} chambers")]
    EmptySequence {
        /// The rejected line.
        line: LineId,
        /// Which side is empty (`anode` or `cathode`).
        polarity: &'static str,
    },

    /// A chamber id is already used by another chamber.
    #[error("duplicate chamber id: {0}")]
    DuplicateChamber(ChamberId),

    /// A line id is already used by another line.
    #[error("duplicate line id: {0}")]
    DuplicateLine(LineId),

    /// No line with the given id exists.
    #[error("unknown line: {0}")]
    UnknownLine(LineId),

    /// The only remaining line cannot be deleted.
    #[error("the last line cannot be deleted")]
    LastLine,

    /// A chamber still holding carriers cannot be dropped.
    #[error("chamber {0} still holds carriers")]
    ChamberInUse(ChamberId),
}
