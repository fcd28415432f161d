mod journal;
mod memory;

pub use memory::MemoryStore;

use std::fmt;

use async_trait::async_trait;

use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The room already has a restriction overlapping the requested span.
    Conflict {
        room_id: RoomId,
        existing: RestrictionId,
    },
    /// Another reservation row of the room overlaps the span and has no
    /// restriction yet (a two-step commit in progress).
    ReservationOverlap {
        room_id: RoomId,
        existing: ReservationId,
    },
    MissingRoom(RoomId),
    MissingReservation(ReservationId),
    MissingRestriction(RestrictionId),
    LimitExceeded(&'static str),
    Journal(String),
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict { room_id, existing } => {
                write!(f, "{room_id} already restricted by {existing}")
            }
            StoreError::ReservationOverlap { room_id, existing } => {
                write!(f, "{room_id} has uncommitted {existing} over the same dates")
            }
            StoreError::MissingRoom(id) => write!(f, "no such room: {id}"),
            StoreError::MissingReservation(id) => write!(f, "no such reservation: {id}"),
            StoreError::MissingRestriction(id) => write!(f, "no such restriction: {id}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Journal(e) => write!(f, "journal error: {e}"),
            StoreError::Backend(e) => write!(f, "store backend error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence collaborator of the engine.
///
/// Implementations own every room, reservation and restriction record and
/// must enforce the overlap invariant atomically at insert time: of two
/// concurrent inserts over overlapping spans on one room, exactly one
/// succeeds and the other gets [`StoreError::Conflict`].
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Rooms in catalog order (ascending id).
    async fn all_rooms(&self) -> Result<Vec<Room>, StoreError>;

    async fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError>;

    /// Restrictions of `room_id` whose span overlaps `span`.
    async fn restrictions_overlapping(
        &self,
        room_id: RoomId,
        span: DateSpan,
    ) -> Result<Vec<RoomRestriction>, StoreError>;

    async fn restrictions_for_month(
        &self,
        room_id: RoomId,
        year: i32,
        month: u32,
    ) -> Result<Vec<RoomRestriction>, StoreError> {
        let Some(span) = DateSpan::month(year, month) else {
            return Ok(Vec::new());
        };
        self.restrictions_overlapping(room_id, span).await
    }

    async fn restriction(&self, id: RestrictionId) -> Result<Option<RoomRestriction>, StoreError>;

    /// Insert a reservation row alone. Fails with [`StoreError::Conflict`] if
    /// the span is already restricted, or [`StoreError::ReservationOverlap`]
    /// if another reservation row of the room overlaps it and has no paired
    /// restriction yet.
    async fn insert_reservation(&self, new: NewReservation) -> Result<ReservationId, StoreError>;

    async fn insert_restriction(&self, new: NewRestriction) -> Result<RestrictionId, StoreError>;

    /// Insert a reservation and its paired restriction as one unit.
    ///
    /// The default runs the two inserts in sequence and deletes the
    /// reservation again if the restriction insert fails. Stores with real
    /// transactions should override it.
    async fn commit_reservation(
        &self,
        new: NewReservation,
    ) -> Result<(ReservationId, RestrictionId), StoreError> {
        let room_id = new.room_id;
        let span = new.span;
        let reservation_id = self.insert_reservation(new).await?;
        let paired = NewRestriction {
            room_id,
            span,
            kind: RestrictionKind::Reservation { reservation_id },
        };
        match self.insert_restriction(paired).await {
            Ok(restriction_id) => Ok((reservation_id, restriction_id)),
            Err(e) => {
                if let Err(rollback) = self.delete_reservation(reservation_id).await {
                    tracing::error!(
                        "rollback of {reservation_id} failed after restriction insert error ({e}): {rollback}"
                    );
                    return Err(StoreError::Backend(format!(
                        "restriction insert failed ({e}) and rollback failed ({rollback})"
                    )));
                }
                Err(e)
            }
        }
    }

    async fn delete_restriction(&self, id: RestrictionId) -> Result<RoomRestriction, StoreError>;

    /// Delete a reservation together with its paired restriction, as one unit.
    async fn delete_reservation(&self, id: ReservationId) -> Result<Reservation, StoreError>;

    async fn mark_processed(&self, id: ReservationId, processed: bool) -> Result<(), StoreError>;

    async fn update_guest(&self, id: ReservationId, guest: GuestDetails) -> Result<(), StoreError>;

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// Reservations matching `filter`, oldest first.
    async fn reservations(&self, filter: ReservationFilter) -> Result<Vec<Reservation>, StoreError>;
}
