use chrono::NaiveDate;
use futures::future::try_join_all;
use tracing::debug;

use super::{Engine, EngineError, Entity, RequestContext};
use crate::limits::MAX_QUERY_WINDOW_DAYS;
use crate::model::{DateSpan, Room, RoomId};
use crate::observability;

/// Validate a search range before anything touches the store.
pub(super) fn query_span(start: NaiveDate, end: NaiveDate) -> Result<DateSpan, EngineError> {
    let span = DateSpan::new(start, end)?;
    if span.nights() > MAX_QUERY_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("search window too long"));
    }
    Ok(span)
}

impl Engine {
    /// True iff no restriction of `room_id` overlaps `[start, end)`.
    pub async fn is_room_available(
        &self,
        ctx: &RequestContext,
        room_id: RoomId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, EngineError> {
        let span = query_span(start, end)?;
        metrics::counter!(observability::AVAILABILITY_QUERIES_TOTAL, "kind" => "room").increment(1);
        self.span_is_free(ctx, room_id, span).await
    }

    /// Rooms free over `[start, end)`, in catalog order. Empty when nothing qualifies.
    pub async fn available_rooms(
        &self,
        ctx: &RequestContext,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Room>, EngineError> {
        let span = query_span(start, end)?;
        metrics::counter!(observability::AVAILABILITY_QUERIES_TOTAL, "kind" => "search").increment(1);

        let rooms = ctx.read(self.store.all_rooms()).await?;
        let free = try_join_all(rooms.iter().map(|room| self.span_is_free(ctx, room.id, span))).await?;

        let available: Vec<Room> = rooms
            .into_iter()
            .zip(free)
            .filter_map(|(room, free)| free.then_some(room))
            .collect();
        debug!("{} room(s) free for {span}", available.len());
        Ok(available)
    }

    pub async fn room(&self, ctx: &RequestContext, id: RoomId) -> Result<Room, EngineError> {
        ctx.read(self.store.room(id))
            .await?
            .ok_or(EngineError::NotFound(Entity::Room(id)))
    }

    pub(super) async fn span_is_free(
        &self,
        ctx: &RequestContext,
        room_id: RoomId,
        span: DateSpan,
    ) -> Result<bool, EngineError> {
        let overlapping = ctx
            .read(self.store.restrictions_overlapping(room_id, span))
            .await?;
        Ok(overlapping.is_empty())
    }
}
