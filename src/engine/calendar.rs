use chrono::Datelike;
use futures::future::try_join_all;

use super::{Engine, EngineError, RequestContext};
use crate::limits::{MAX_CALENDAR_YEAR, MIN_CALENDAR_YEAR};
use crate::model::*;

/// The restriction covering an occupied day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayOwner {
    pub restriction_id: RestrictionId,
    pub kind: RestrictionKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomCalendar {
    pub room: Room,
    /// Index 0 is the 1st of the month.
    pub occupied: Vec<bool>,
    /// `Some` exactly where `occupied` is true.
    pub owners: Vec<Option<DayOwner>>,
}

impl RoomCalendar {
    pub fn owner(&self, day: u32) -> Option<&DayOwner> {
        let idx = usize::try_from(day.checked_sub(1)?).ok()?;
        self.owners.get(idx)?.as_ref()
    }
}

/// Day-by-room occupancy of one month, rooms in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthCalendar {
    pub year: i32,
    pub month: u32,
    pub days_in_month: u32,
    pub rooms: Vec<RoomCalendar>,
}

impl MonthCalendar {
    /// `(year, month)` of the preceding month.
    pub fn previous(&self) -> (i32, u32) {
        if self.month == 1 {
            (self.year - 1, 12)
        } else {
            (self.year, self.month - 1)
        }
    }

    /// `(year, month)` of the following month.
    pub fn next(&self) -> (i32, u32) {
        if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        }
    }
}

fn month_span(year: i32, month: u32) -> Result<DateSpan, EngineError> {
    if !(MIN_CALENDAR_YEAR..=MAX_CALENDAR_YEAR).contains(&year) {
        return Err(EngineError::InvalidMonth { year, month });
    }
    DateSpan::month(year, month).ok_or(EngineError::InvalidMonth { year, month })
}

fn room_calendar(room: Room, month: &DateSpan, restrictions: &[RoomRestriction]) -> RoomCalendar {
    let days = month.nights() as usize;
    let mut occupied = vec![false; days];
    let mut owners = vec![None; days];
    for restriction in restrictions {
        let Some(covered) = restriction.span.intersection(month) else {
            continue;
        };
        for day in covered.days() {
            let idx = day.day0() as usize;
            occupied[idx] = true;
            owners[idx] = Some(DayOwner {
                restriction_id: restriction.id,
                kind: restriction.kind,
            });
        }
    }
    RoomCalendar { room, occupied, owners }
}

impl Engine {
    /// Occupancy matrix of every room for one month, recomputed from the store.
    pub async fn month_calendar(
        &self,
        ctx: &RequestContext,
        year: i32,
        month: u32,
    ) -> Result<MonthCalendar, EngineError> {
        let span = month_span(year, month)?;
        let rooms = ctx.read(self.store.all_rooms()).await?;

        let per_room = try_join_all(
            rooms
                .iter()
                .map(|room| ctx.read(self.store.restrictions_for_month(room.id, year, month))),
        )
        .await?;

        let rooms = rooms
            .into_iter()
            .zip(per_room)
            .map(|(room, restrictions)| room_calendar(room, &span, &restrictions))
            .collect();

        Ok(MonthCalendar {
            year,
            month,
            days_in_month: span.nights() as u32,
            rooms,
        })
    }
}
