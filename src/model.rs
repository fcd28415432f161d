use std::fmt;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestrictionId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "room#{}", self.0)
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reservation#{}", self.0)
    }
}

impl fmt::Display for RestrictionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "restriction#{}", self.0)
    }
}

/// Rejected span bounds: `start` is not strictly before `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for InvalidSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "span start {} is not before end {}", self.start, self.end)
    }
}

impl std::error::Error for InvalidSpan {}

/// Half-open date interval `[start, end)`, day granularity. Never empty.
///
/// Decoding goes through [`DateSpan::new`], so a journal or payload can't
/// smuggle in an empty span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "SpanBounds")]
pub struct DateSpan {
    start: NaiveDate,
    end: NaiveDate,
}

/// Wire shape of a [`DateSpan`] before validation.
#[derive(Deserialize)]
struct SpanBounds {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<SpanBounds> for DateSpan {
    type Error = InvalidSpan;

    fn try_from(bounds: SpanBounds) -> Result<Self, InvalidSpan> {
        DateSpan::new(bounds.start, bounds.end)
    }
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidSpan> {
        if start >= end {
            return Err(InvalidSpan { start, end });
        }
        Ok(Self { start, end })
    }

    /// `[date, date + 1 day)`.
    pub fn single_day(date: NaiveDate) -> Option<Self> {
        date.succ_opt().map(|end| Self { start: date, end })
    }

    /// The whole calendar month. `None` for an invalid month or a date out of chrono's range.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let end = start.checked_add_months(Months::new(1))?;
        Some(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of nights (days) covered.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &DateSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Overlapping part of two spans, if any.
    pub fn intersection(&self, other: &DateSpan) -> Option<DateSpan> {
        DateSpan::new(self.start.max(other.start), self.end.min(other.end)).ok()
    }

    /// Every date in the span, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }
}

impl fmt::Display for DateSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
}

/// Why a room is unavailable over a restriction's span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestrictionKind {
    /// Paired 1:1 with a guest reservation.
    Reservation { reservation_id: ReservationId },
    /// Owner-created block (maintenance, private use).
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRestriction {
    pub id: RestrictionId,
    pub room_id: RoomId,
    pub span: DateSpan,
    pub kind: RestrictionKind,
}

impl RoomRestriction {
    pub fn is_block(&self) -> bool {
        matches!(self.kind, RestrictionKind::Block)
    }

    pub fn reservation_id(&self) -> Option<ReservationId> {
        match self.kind {
            RestrictionKind::Reservation { reservation_id } => Some(reservation_id),
            RestrictionKind::Block => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRestriction {
    pub room_id: RoomId,
    pub span: DateSpan,
    pub kind: RestrictionKind,
}

/// Guest-entered fields of a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct GuestDetails {
    #[validate(length(min = 3, max = 255, message = "first name must be at least 3 characters long"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 255, message = "last name is required"))]
    pub last_name: String,
    #[validate(email(message = "invalid email address"), length(max = 320))]
    pub email: String,
    #[validate(length(max = 64))]
    pub phone: String,
}

impl GuestDetails {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub room_id: RoomId,
    pub span: DateSpan,
    pub guest: GuestDetails,
    /// false = pending admin review.
    pub processed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub room_id: RoomId,
    pub span: DateSpan,
    pub guest: GuestDetails,
}

/// Result of a committed reservation, handed to rendering and mailing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub reservation_id: ReservationId,
    pub restriction_id: RestrictionId,
    pub room: Room,
    pub span: DateSpan,
    pub guest: GuestDetails,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReservationFilter {
    #[default]
    All,
    /// Not yet processed by an admin.
    Pending,
}

impl ReservationFilter {
    pub fn matches(&self, reservation: &Reservation) -> bool {
        match self {
            ReservationFilter::All => true,
            ReservationFilter::Pending => !reservation.processed,
        }
    }
}

/// Per-room restriction list.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room_id: RoomId,
    /// Sorted by `span.start`. Spans never overlap.
    pub restrictions: Vec<RoomRestriction>,
}

impl RoomState {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            restrictions: Vec::new(),
        }
    }

    /// Insert restriction maintaining sort order by span start.
    pub fn insert_restriction(&mut self, restriction: RoomRestriction) {
        let pos = self
            .restrictions
            .binary_search_by_key(&restriction.span.start(), |r| r.span.start())
            .unwrap_or_else(|e| e);
        self.restrictions.insert(pos, restriction);
    }

    pub fn remove_restriction(&mut self, id: RestrictionId) -> Option<RoomRestriction> {
        let pos = self.restrictions.iter().position(|r| r.id == id)?;
        Some(self.restrictions.remove(pos))
    }

    /// Restrictions whose span overlaps the query window.
    pub fn overlapping(&self, query: &DateSpan) -> impl Iterator<Item = &RoomRestriction> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .restrictions
            .partition_point(|r| r.span.start() < query.end());
        self.restrictions[..right_bound]
            .iter()
            .filter(move |r| r.span.end() > query.start())
    }

    pub fn restriction_for_reservation(&self, reservation_id: ReservationId) -> Option<&RoomRestriction> {
        self.restrictions
            .iter()
            .find(|r| r.reservation_id() == Some(reservation_id))
    }
}

/// Journal record format. One event is one atomic state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomAdded {
        room: Room,
    },
    /// Reservation row without its restriction (two-step stores, compaction).
    ReservationInserted {
        reservation: Reservation,
    },
    RestrictionAdded {
        restriction: RoomRestriction,
    },
    /// Reservation and its paired restriction, committed together.
    ReservationCommitted {
        reservation: Reservation,
        restriction: RoomRestriction,
    },
    RestrictionRemoved {
        id: RestrictionId,
        room_id: RoomId,
    },
    ReservationDeleted {
        id: ReservationId,
        room_id: RoomId,
        restriction_id: Option<RestrictionId>,
    },
    ReservationProcessed {
        id: ReservationId,
        room_id: RoomId,
        processed: bool,
        at: DateTime<Utc>,
    },
    GuestUpdated {
        id: ReservationId,
        room_id: RoomId,
        guest: GuestDetails,
        at: DateTime<Utc>,
    },
    /// Id counters at compaction time, so ids of dropped records are not reissued.
    IdsReserved {
        next_room: u32,
        next_reservation: u64,
        next_restriction: u64,
    },
}

impl Event {
    /// The room an event changes. `None` for store-wide bookkeeping.
    pub fn room_id(&self) -> Option<RoomId> {
        match self {
            Event::RoomAdded { room } => Some(room.id),
            Event::ReservationInserted { reservation } => Some(reservation.room_id),
            Event::RestrictionAdded { restriction } => Some(restriction.room_id),
            Event::ReservationCommitted { reservation, .. } => Some(reservation.room_id),
            Event::RestrictionRemoved { room_id, .. }
            | Event::ReservationDeleted { room_id, .. }
            | Event::ReservationProcessed { room_id, .. }
            | Event::GuestUpdated { room_id, .. } => Some(*room_id),
            Event::IdsReserved { .. } => None,
        }
    }
}
