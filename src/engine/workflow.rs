use std::time::Instant;

use chrono::NaiveDate;
use tracing::{debug, info, warn};
use validator::Validate;

use super::{AttemptState, Engine, EngineError, RequestContext};
use crate::limits::MAX_STAY_NIGHTS;
use crate::model::{Confirmation, DateSpan, GuestDetails, NewReservation, RoomId};
use crate::observability;

/// A guest's booking request, as extracted from the reservation form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub room_id: RoomId,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub guest: GuestDetails,
}

/// Form rules plus field length limits.
pub(super) fn validate_guest(guest: &GuestDetails) -> Result<(), EngineError> {
    guest.validate()?;
    Ok(())
}

pub(super) fn stay_span(start: NaiveDate, end: NaiveDate) -> Result<DateSpan, EngineError> {
    let span = DateSpan::new(start, end)?;
    if span.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(span)
}

fn outcome_label(state: AttemptState) -> &'static str {
    match state {
        AttemptState::Committed => "committed",
        AttemptState::Rejected => "rejected",
        AttemptState::CommitFailed => "commit_failed",
        AttemptState::Submitted | AttemptState::Validated => "incomplete",
    }
}

impl Engine {
    /// Validate a booking request and commit the reservation together with
    /// the restriction that blocks its dates.
    ///
    /// Losing a race to a concurrent booking yields `Conflict`; the engine
    /// never retries. The confirmation is also published on the notify hub.
    pub async fn make_reservation(
        &self,
        ctx: &RequestContext,
        request: ReservationRequest,
    ) -> Result<Confirmation, EngineError> {
        let started = Instant::now();
        let result = self.run_reservation(ctx, request).await;

        let state = match &result {
            Ok(_) => AttemptState::Committed,
            Err(e) => e.attempt_state(),
        };
        metrics::counter!(observability::RESERVATIONS_TOTAL, "outcome" => outcome_label(state))
            .increment(1);
        metrics::histogram!(observability::RESERVATION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn run_reservation(
        &self,
        ctx: &RequestContext,
        request: ReservationRequest,
    ) -> Result<Confirmation, EngineError> {
        let ReservationRequest {
            room_id,
            start,
            end,
            guest,
        } = request;
        debug!("reservation attempt for {room_id} {start}..{end}: {:?}", AttemptState::Submitted);

        // Input checks first, before any store access.
        let span = stay_span(start, end)?;
        validate_guest(&guest)?;
        let room = self.room(ctx, room_id).await?;
        debug!("reservation attempt for {room_id} {span}: {:?}", AttemptState::Validated);

        if !self.span_is_free(ctx, room_id, span).await? {
            debug!("{room_id} already restricted over {span}");
            return Err(EngineError::Conflict {
                room_id,
                existing: None,
            });
        }

        let new = NewReservation {
            room_id,
            span,
            guest,
        };
        let (reservation_id, restriction_id) = match ctx.write(self.store.commit_reservation(new.clone())).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("reservation for {room_id} {span} failed: {e}");
                return Err(e);
            }
        };

        let confirmation = Confirmation {
            reservation_id,
            restriction_id,
            room,
            span,
            guest: new.guest,
        };
        info!(
            "{reservation_id} committed for {} in {} ({span}, {} night(s))",
            confirmation.guest.full_name(),
            confirmation.room.name,
            span.nights()
        );
        self.notify.send_confirmation(&confirmation);
        Ok(confirmation)
    }
}
