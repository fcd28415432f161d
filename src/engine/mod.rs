mod admin;
mod availability;
mod calendar;
mod context;
mod error;
mod workflow;

pub use admin::{CalendarEdit, EditOutcome};
pub use calendar::{DayOwner, MonthCalendar, RoomCalendar};
pub use context::RequestContext;
pub use error::{AttemptState, EngineError, Entity};
pub use workflow::ReservationRequest;

use std::sync::Arc;

use crate::notify::NotifyHub;
use crate::store::ReservationStore;

/// Availability and reservation engine.
///
/// Holds no mutable state of its own: every call re-reads the store, and the
/// store alone enforces the overlap invariant. Share it behind an `Arc`.
pub struct Engine {
    store: Arc<dyn ReservationStore>,
    notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(store: Arc<dyn ReservationStore>, notify: Arc<NotifyHub>) -> Self {
        Self { store, notify }
    }
}
