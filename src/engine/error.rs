use chrono::NaiveDate;

use crate::model::{InvalidSpan, ReservationId, RestrictionId, RoomId};
use crate::store::StoreError;

/// The record a `NotFound` error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Room(RoomId),
    Reservation(ReservationId),
    Restriction(RestrictionId),
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Room(id) => write!(f, "{id}"),
            Entity::Reservation(id) => write!(f, "{id}"),
            Entity::Restriction(id) => write!(f, "{id}"),
        }
    }
}

/// Where a reservation attempt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Submitted,
    Validated,
    Committed,
    /// Input was refused before anything was written.
    Rejected,
    /// The store refused or failed the commit.
    CommitFailed,
}

#[derive(Debug)]
pub enum EngineError {
    InvalidRange {
        start: NaiveDate,
        end: NaiveDate,
    },
    InvalidMonth {
        year: i32,
        month: u32,
    },
    Validation(validator::ValidationErrors),
    NotFound(Entity),
    /// The room is already restricted over (part of) the requested span.
    Conflict {
        room_id: RoomId,
        existing: Option<RestrictionId>,
    },
    InvalidOperation(&'static str),
    LimitExceeded(&'static str),
    Cancelled,
    TimedOut,
    Store(StoreError),
}

impl EngineError {
    /// Terminal state of a reservation attempt that ended in this error.
    pub fn attempt_state(&self) -> AttemptState {
        match self {
            EngineError::Conflict { .. } | EngineError::Store(_) => AttemptState::CommitFailed,
            _ => AttemptState::Rejected,
        }
    }

    /// Input errors are the caller's to fix and are raised before any store access.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidRange { .. }
                | EngineError::InvalidMonth { .. }
                | EngineError::Validation(_)
                | EngineError::LimitExceeded(_)
        )
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidRange { start, end } => {
                write!(f, "invalid date range: {start} is not before {end}")
            }
            EngineError::InvalidMonth { year, month } => {
                write!(f, "invalid calendar month: {year}-{month:02}")
            }
            EngineError::Validation(errors) => write!(f, "invalid guest details: {errors}"),
            EngineError::NotFound(entity) => write!(f, "not found: {entity}"),
            EngineError::Conflict { room_id, .. } => {
                write!(f, "{room_id} is no longer available for these dates")
            }
            EngineError::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Cancelled => write!(f, "request cancelled"),
            EngineError::TimedOut => write!(f, "request deadline exceeded"),
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Validation(e) => Some(e),
            EngineError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { room_id, existing } => EngineError::Conflict {
                room_id,
                existing: Some(existing),
            },
            StoreError::ReservationOverlap { room_id, .. } => EngineError::Conflict {
                room_id,
                existing: None,
            },
            StoreError::MissingRoom(id) => EngineError::NotFound(Entity::Room(id)),
            StoreError::MissingReservation(id) => EngineError::NotFound(Entity::Reservation(id)),
            StoreError::MissingRestriction(id) => EngineError::NotFound(Entity::Restriction(id)),
            StoreError::LimitExceeded(msg) => EngineError::LimitExceeded(msg),
            other => EngineError::Store(other),
        }
    }
}

impl From<InvalidSpan> for EngineError {
    fn from(e: InvalidSpan) -> Self {
        EngineError::InvalidRange {
            start: e.start,
            end: e.end,
        }
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(e: validator::ValidationErrors) -> Self {
        EngineError::Validation(e)
    }
}
