use chrono::NaiveDate;
use tracing::info;

use super::workflow::validate_guest;
use super::{Engine, EngineError, Entity, RequestContext};
use crate::limits::{MAX_BLOCK_DAYS, MAX_CALENDAR_EDITS};
use crate::model::*;
use crate::observability;

/// One checkbox change from the admin calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarEdit {
    AddBlock { room_id: RoomId, date: NaiveDate },
    RemoveBlock { restriction_id: RestrictionId },
}

#[derive(Debug)]
pub struct EditOutcome {
    pub edit: CalendarEdit,
    pub result: Result<(), EngineError>,
}

fn record<T>(op: &'static str, result: &Result<T, EngineError>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(observability::ADMIN_OPS_TOTAL, "op" => op, "status" => status).increment(1);
}

impl Engine {
    /// Block a single day, `[date, date + 1)`.
    pub async fn add_block(
        &self,
        ctx: &RequestContext,
        room_id: RoomId,
        date: NaiveDate,
    ) -> Result<RestrictionId, EngineError> {
        let span = DateSpan::single_day(date).ok_or(EngineError::InvalidRange { start: date, end: date })?;
        let result = self.insert_block(ctx, room_id, span).await;
        record("add_block", &result);
        result
    }

    /// Block `[start, end)` as one restriction.
    pub async fn add_block_range(
        &self,
        ctx: &RequestContext,
        room_id: RoomId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RestrictionId, EngineError> {
        let span = DateSpan::new(start, end)?;
        if span.nights() > MAX_BLOCK_DAYS {
            return Err(EngineError::LimitExceeded("block too long"));
        }
        let result = self.insert_block(ctx, room_id, span).await;
        record("add_block_range", &result);
        result
    }

    async fn insert_block(
        &self,
        ctx: &RequestContext,
        room_id: RoomId,
        span: DateSpan,
    ) -> Result<RestrictionId, EngineError> {
        let new = NewRestriction {
            room_id,
            span,
            kind: RestrictionKind::Block,
        };
        let id = ctx.write(self.store.insert_restriction(new)).await?;
        info!("{room_id} blocked over {span} ({id})");
        Ok(id)
    }

    /// Remove an admin block. Reservation restrictions go away only with their reservation.
    pub async fn remove_block(
        &self,
        ctx: &RequestContext,
        restriction_id: RestrictionId,
    ) -> Result<RoomRestriction, EngineError> {
        let result = self.remove_block_inner(ctx, restriction_id).await;
        record("remove_block", &result);
        result
    }

    async fn remove_block_inner(
        &self,
        ctx: &RequestContext,
        restriction_id: RestrictionId,
    ) -> Result<RoomRestriction, EngineError> {
        let restriction = ctx
            .read(self.store.restriction(restriction_id))
            .await?
            .ok_or(EngineError::NotFound(Entity::Restriction(restriction_id)))?;
        if !restriction.is_block() {
            return Err(EngineError::InvalidOperation(
                "restriction belongs to a reservation; delete the reservation instead",
            ));
        }
        let removed = ctx.write(self.store.delete_restriction(restriction_id)).await?;
        info!("{} unblocked over {} ({restriction_id})", removed.room_id, removed.span);
        Ok(removed)
    }

    pub async fn process_reservation(
        &self,
        ctx: &RequestContext,
        id: ReservationId,
        processed: bool,
    ) -> Result<(), EngineError> {
        let result = ctx.write(self.store.mark_processed(id, processed)).await;
        record("process_reservation", &result);
        if result.is_ok() {
            info!("{id} marked processed={processed}");
        }
        result
    }

    /// Delete a reservation and its paired restriction as one unit.
    pub async fn delete_reservation(
        &self,
        ctx: &RequestContext,
        id: ReservationId,
    ) -> Result<Reservation, EngineError> {
        let result = ctx.write(self.store.delete_reservation(id)).await;
        record("delete_reservation", &result);
        let reservation = result?;
        info!("{id} deleted, {} free again over {}", reservation.room_id, reservation.span);
        Ok(reservation)
    }

    pub async fn update_guest(
        &self,
        ctx: &RequestContext,
        id: ReservationId,
        guest: GuestDetails,
    ) -> Result<(), EngineError> {
        validate_guest(&guest)?;
        let result = ctx.write(self.store.update_guest(id, guest)).await;
        record("update_guest", &result);
        result
    }

    pub async fn reservation(&self, ctx: &RequestContext, id: ReservationId) -> Result<Reservation, EngineError> {
        ctx.read(self.store.reservation(id))
            .await?
            .ok_or(EngineError::NotFound(Entity::Reservation(id)))
    }

    /// Admin listings: `Pending` for new reservations, `All` for everything.
    pub async fn reservations(
        &self,
        ctx: &RequestContext,
        filter: ReservationFilter,
    ) -> Result<Vec<Reservation>, EngineError> {
        ctx.read(self.store.reservations(filter)).await
    }

    /// Apply the block changes of one calendar submission.
    ///
    /// Edits are independent: a failing edit does not stop the others, and
    /// each gets its own outcome, in input order.
    pub async fn apply_calendar_edits(
        &self,
        ctx: &RequestContext,
        edits: Vec<CalendarEdit>,
    ) -> Result<Vec<EditOutcome>, EngineError> {
        if edits.len() > MAX_CALENDAR_EDITS {
            return Err(EngineError::LimitExceeded("too many calendar edits"));
        }
        let mut outcomes = Vec::with_capacity(edits.len());
        for edit in edits {
            let result = match edit {
                CalendarEdit::AddBlock { room_id, date } => self.add_block(ctx, room_id, date).await.map(|_| ()),
                CalendarEdit::RemoveBlock { restriction_id } => {
                    self.remove_block(ctx, restriction_id).await.map(|_| ())
                }
            };
            outcomes.push(EditOutcome { edit, result });
        }
        Ok(outcomes)
    }
}
