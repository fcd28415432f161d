use std::collections::BTreeMap;
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info, warn};

use crate::limits::*;
use crate::model::*;
use crate::notify::NotifyHub;

use super::journal::Journal;
use super::{ReservationStore, StoreError};

type SharedRoomState = Arc<RwLock<RoomState>>;

/// Store that keeps every record in memory, optionally backed by a journal.
///
/// Each room's restrictions sit behind their own `RwLock`. Every mutation
/// takes the write lock of the room it touches, re-checks the overlap
/// invariant, journals one event and applies it, so check-and-insert is a
/// single atomic step per room.
///
/// Waiting for the lock can be abandoned at any time. Once an event is
/// handed to the journal, the rest of the write runs on its own task and
/// completes even if the caller's future is dropped.
pub struct MemoryStore {
    state: Arc<StoreState>,
}

struct StoreState {
    /// Room catalog in id order. Write-locked while a room is added and
    /// read-locked during compaction.
    catalog: RwLock<BTreeMap<RoomId, Room>>,
    rooms: DashMap<RoomId, SharedRoomState>,
    reservations: DashMap<ReservationId, Reservation>,
    /// Reverse lookup: restriction id → room id
    restriction_to_room: DashMap<RestrictionId, RoomId>,
    next_room_id: AtomicU32,
    next_reservation_id: AtomicU64,
    next_restriction_id: AtomicU64,
    journal: Option<Journal>,
    notify: Arc<NotifyHub>,
}

/// Drive a write on its own task and wait for it.
async fn detached<T, F>(write: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: Future<Output = Result<T, StoreError>> + Send + 'static,
{
    tokio::spawn(write)
        .await
        .map_err(|e| StoreError::Backend(format!("store write task failed: {e}")))?
}

impl MemoryStore {
    /// A store without a journal. State is lost on drop.
    pub fn new(notify: Arc<NotifyHub>) -> Self {
        Self {
            state: Arc::new(StoreState::new(notify)),
        }
    }

    /// Replay the journal at `path` and keep appending to it. Must run inside a tokio runtime.
    ///
    /// A replayed restriction that overlaps one already restored is skipped
    /// with a warning, together with its reservation if it has one.
    pub fn open(path: &Path, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let (journal, events) = Journal::open(path)?;
        let mut state = StoreState::new(notify);
        let mut catalog = BTreeMap::new();
        let mut skipped = 0usize;

        // Sole owner during replay: try_write always succeeds.
        for event in &events {
            state.observe_ids(event);
            match event {
                Event::RoomAdded { room } => {
                    state.register_room(&mut catalog, room.clone());
                }
                Event::IdsReserved { .. } => {}
                other => {
                    let Some(rs) = other.room_id().and_then(|id| state.get_room_state(id)) else {
                        continue;
                    };
                    let mut guard = rs.try_write().expect("replay: uncontended write");
                    let added = match other {
                        Event::RestrictionAdded { restriction }
                        | Event::ReservationCommitted { restriction, .. } => Some(restriction),
                        _ => None,
                    };
                    if let Some(restriction) = added {
                        if let Err(e) = check_no_conflict(&guard, &restriction.span) {
                            warn!("replay: skipping {} {}: {e}", restriction.id, restriction.span);
                            skipped += 1;
                            continue;
                        }
                    }
                    state.apply(&mut guard, other);
                }
            }
        }

        info!(
            "store replayed {} events: {} rooms, {} reservations, {skipped} skipped",
            events.len(),
            state.rooms.len(),
            state.reservations.len()
        );
        state.catalog = RwLock::new(catalog);
        state.journal = Some(journal);
        Ok(Self {
            state: Arc::new(state),
        })
    }

    /// Add a room to the catalog. Rooms are reference data managed by the
    /// administrative side; the engine never creates them.
    pub async fn add_room(&self, name: impl Into<String>) -> Result<Room, StoreError> {
        let name = name.into();
        if name.len() > MAX_ROOM_NAME_LEN {
            return Err(StoreError::LimitExceeded("room name too long"));
        }
        let state = self.state.clone();
        detached(async move { state.add_room(name).await }).await
    }

    pub fn room_count(&self) -> usize {
        self.state.rooms.len()
    }

    pub(crate) fn get_room_state(&self, id: RoomId) -> Option<SharedRoomState> {
        self.state.get_room_state(id)
    }

    fn room_state(&self, id: RoomId) -> Result<SharedRoomState, StoreError> {
        self.get_room_state(id).ok_or(StoreError::MissingRoom(id))
    }

    /// Journal + apply + notify, holding the room's write lock throughout.
    async fn persist_and_apply(
        &self,
        mut guard: OwnedRwLockWriteGuard<RoomState>,
        event: Event,
    ) -> Result<(), StoreError> {
        let state = self.state.clone();
        detached(async move {
            if let Some(journal) = &state.journal {
                journal.append(&event).await?;
            }
            state.apply(&mut guard, &event);
            state.notify.send(guard.room_id, &event);
            Ok(())
        })
        .await
    }

    /// Look up the room owning a reservation, then acquire its write lock.
    async fn reservation_write(
        &self,
        id: ReservationId,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, StoreError> {
        let room_id = self
            .state
            .reservations
            .get(&id)
            .map(|r| r.room_id)
            .ok_or(StoreError::MissingReservation(id))?;
        let guard = self.room_state(room_id)?.write_owned().await;
        // May have been deleted while we waited for the lock.
        if !self.state.reservations.contains_key(&id) {
            return Err(StoreError::MissingReservation(id));
        }
        Ok(guard)
    }

    /// Another reservation row on the room overlapping `span` that has no
    /// paired restriction yet. Caller holds the room's write lock.
    fn check_no_pending_overlap(&self, rs: &RoomState, span: &DateSpan) -> Result<(), StoreError> {
        let pending = self.state.reservations.iter().find_map(|e| {
            let r = e.value();
            (r.room_id == rs.room_id
                && r.span.overlaps(span)
                && rs.restriction_for_reservation(r.id).is_none())
            .then_some(r.id)
        });
        match pending {
            Some(existing) => Err(StoreError::ReservationOverlap {
                room_id: rs.room_id,
                existing,
            }),
            None => Ok(()),
        }
    }

    /// Rewrite the journal with the minimal event set that recreates the current state.
    /// No-op for a store without a journal.
    pub async fn compact_journal(&self) -> Result<(), StoreError> {
        let state = &self.state;
        let Some(journal) = &state.journal else {
            return Ok(());
        };

        // Hold the catalog and every room for the whole rewrite so that no
        // append can land between the snapshot and the file swap.
        let catalog = state.catalog.read().await;
        let mut guards = Vec::with_capacity(catalog.len());
        for id in catalog.keys() {
            if let Some(rs) = state.get_room_state(*id) {
                guards.push(rs.read_owned().await);
            }
        }

        let mut events = vec![Event::IdsReserved {
            next_room: state.next_room_id.load(Ordering::SeqCst),
            next_reservation: state.next_reservation_id.load(Ordering::SeqCst),
            next_restriction: state.next_restriction_id.load(Ordering::SeqCst),
        }];
        events.extend(catalog.values().map(|room| Event::RoomAdded { room: room.clone() }));

        let mut reservations: Vec<Reservation> =
            state.reservations.iter().map(|e| e.value().clone()).collect();
        reservations.sort_by_key(|r| r.id);

        let mut paired = std::collections::HashMap::new();
        for guard in &guards {
            for restriction in &guard.restrictions {
                match restriction.reservation_id() {
                    Some(rid) => {
                        paired.insert(rid, restriction.clone());
                    }
                    None => events.push(Event::RestrictionAdded {
                        restriction: restriction.clone(),
                    }),
                }
            }
        }
        for reservation in reservations {
            match paired.remove(&reservation.id) {
                Some(restriction) => events.push(Event::ReservationCommitted { reservation, restriction }),
                None => events.push(Event::ReservationInserted { reservation }),
            }
        }
        // Restrictions whose reservation row is gone; kept as-is.
        for restriction in paired.into_values() {
            events.push(Event::RestrictionAdded { restriction });
        }

        let count = events.len();
        journal.compact(events).await?;
        info!("journal compacted to {count} events");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        match &self.state.journal {
            Some(journal) => journal.appends_since_compact().await,
            None => 0,
        }
    }
}

impl StoreState {
    fn new(notify: Arc<NotifyHub>) -> Self {
        Self {
            catalog: RwLock::new(BTreeMap::new()),
            rooms: DashMap::new(),
            reservations: DashMap::new(),
            restriction_to_room: DashMap::new(),
            next_room_id: AtomicU32::new(1),
            next_reservation_id: AtomicU64::new(1),
            next_restriction_id: AtomicU64::new(1),
            journal: None,
            notify,
        }
    }

    async fn add_room(&self, name: String) -> Result<Room, StoreError> {
        let mut catalog = self.catalog.write().await;
        if catalog.len() >= MAX_ROOMS {
            return Err(StoreError::LimitExceeded("too many rooms"));
        }
        let room = Room {
            id: RoomId(self.next_room_id.fetch_add(1, Ordering::SeqCst)),
            name,
        };
        let event = Event::RoomAdded { room: room.clone() };
        if let Some(journal) = &self.journal {
            journal.append(&event).await?;
        }
        self.register_room(&mut catalog, room.clone());
        self.notify.send(room.id, &event);
        debug!("added {} ({})", room.id, room.name);
        Ok(room)
    }

    fn get_room_state(&self, id: RoomId) -> Option<SharedRoomState> {
        self.rooms.get(&id).map(|e| e.value().clone())
    }

    fn register_room(&self, catalog: &mut BTreeMap<RoomId, Room>, room: Room) {
        self.rooms
            .insert(room.id, Arc::new(RwLock::new(RoomState::new(room.id))));
        catalog.insert(room.id, room);
    }

    /// Keep id counters ahead of every id seen during replay.
    fn observe_ids(&mut self, event: &Event) {
        fn bump64(counter: &mut AtomicU64, seen: u64) {
            let next = counter.get_mut();
            *next = (*next).max(seen + 1);
        }
        match event {
            Event::RoomAdded { room } => {
                let next = self.next_room_id.get_mut();
                *next = (*next).max(room.id.0 + 1);
            }
            Event::ReservationInserted { reservation } => {
                bump64(&mut self.next_reservation_id, reservation.id.0);
            }
            Event::RestrictionAdded { restriction } => {
                bump64(&mut self.next_restriction_id, restriction.id.0);
            }
            Event::ReservationCommitted { reservation, restriction } => {
                bump64(&mut self.next_reservation_id, reservation.id.0);
                bump64(&mut self.next_restriction_id, restriction.id.0);
            }
            Event::IdsReserved {
                next_room,
                next_reservation,
                next_restriction,
            } => {
                let next = self.next_room_id.get_mut();
                *next = (*next).max(*next_room);
                let next = self.next_reservation_id.get_mut();
                *next = (*next).max(*next_reservation);
                let next = self.next_restriction_id.get_mut();
                *next = (*next).max(*next_restriction);
            }
            _ => {}
        }
    }

    /// Apply an event to a room (no locking, caller holds the room's write lock).
    fn apply(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::ReservationInserted { reservation } => {
                self.reservations.insert(reservation.id, reservation.clone());
            }
            Event::RestrictionAdded { restriction } => {
                self.restriction_to_room.insert(restriction.id, restriction.room_id);
                rs.insert_restriction(restriction.clone());
            }
            Event::ReservationCommitted { reservation, restriction } => {
                self.reservations.insert(reservation.id, reservation.clone());
                self.restriction_to_room.insert(restriction.id, restriction.room_id);
                rs.insert_restriction(restriction.clone());
            }
            Event::RestrictionRemoved { id, .. } => {
                rs.remove_restriction(*id);
                self.restriction_to_room.remove(id);
            }
            Event::ReservationDeleted { id, restriction_id, .. } => {
                if let Some(rid) = restriction_id {
                    rs.remove_restriction(*rid);
                    self.restriction_to_room.remove(rid);
                }
                self.reservations.remove(id);
            }
            Event::ReservationProcessed { id, processed, at, .. } => {
                if let Some(mut r) = self.reservations.get_mut(id) {
                    r.processed = *processed;
                    r.updated_at = *at;
                }
            }
            Event::GuestUpdated { id, guest, at, .. } => {
                if let Some(mut r) = self.reservations.get_mut(id) {
                    r.guest = guest.clone();
                    r.updated_at = *at;
                }
            }
            // Catalog changes and counters are handled at the store level, not here.
            Event::RoomAdded { .. } | Event::IdsReserved { .. } => {}
        }
    }

    fn new_reservation(&self, new: NewReservation) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: ReservationId(self.next_reservation_id.fetch_add(1, Ordering::SeqCst)),
            room_id: new.room_id,
            span: new.span,
            guest: new.guest,
            processed: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn new_restriction(&self, room_id: RoomId, span: DateSpan, kind: RestrictionKind) -> RoomRestriction {
        RoomRestriction {
            id: RestrictionId(self.next_restriction_id.fetch_add(1, Ordering::SeqCst)),
            room_id,
            span,
            kind,
        }
    }
}

/// Any restriction overlapping `span` blocks it.
fn check_no_conflict(rs: &RoomState, span: &DateSpan) -> Result<(), StoreError> {
    match rs.overlapping(span).next() {
        Some(existing) => Err(StoreError::Conflict {
            room_id: rs.room_id,
            existing: existing.id,
        }),
        None => Ok(()),
    }
}

fn check_capacity(rs: &RoomState) -> Result<(), StoreError> {
    if rs.restrictions.len() >= MAX_RESTRICTIONS_PER_ROOM {
        return Err(StoreError::LimitExceeded("too many restrictions on room"));
    }
    Ok(())
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn all_rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.state.catalog.read().await.values().cloned().collect())
    }

    async fn room(&self, id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.state.catalog.read().await.get(&id).cloned())
    }

    async fn restrictions_overlapping(
        &self,
        room_id: RoomId,
        span: DateSpan,
    ) -> Result<Vec<RoomRestriction>, StoreError> {
        let rs = self.room_state(room_id)?;
        let guard = rs.read().await;
        Ok(guard.overlapping(&span).cloned().collect())
    }

    async fn restriction(&self, id: RestrictionId) -> Result<Option<RoomRestriction>, StoreError> {
        let Some(room_id) = self.state.restriction_to_room.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        let rs = self.room_state(room_id)?;
        let guard = rs.read().await;
        Ok(guard.restrictions.iter().find(|r| r.id == id).cloned())
    }

    async fn insert_reservation(&self, new: NewReservation) -> Result<ReservationId, StoreError> {
        let guard = self.room_state(new.room_id)?.write_owned().await;
        check_no_conflict(&guard, &new.span)?;
        self.check_no_pending_overlap(&guard, &new.span)?;

        let reservation = self.state.new_reservation(new);
        let id = reservation.id;
        self.persist_and_apply(guard, Event::ReservationInserted { reservation })
            .await?;
        Ok(id)
    }

    async fn insert_restriction(&self, new: NewRestriction) -> Result<RestrictionId, StoreError> {
        let guard = self.room_state(new.room_id)?.write_owned().await;
        check_capacity(&guard)?;
        check_no_conflict(&guard, &new.span)?;

        let restriction = self.state.new_restriction(new.room_id, new.span, new.kind);
        let id = restriction.id;
        self.persist_and_apply(guard, Event::RestrictionAdded { restriction })
            .await?;
        Ok(id)
    }

    /// One lock, one journal record: both rows or neither.
    async fn commit_reservation(
        &self,
        new: NewReservation,
    ) -> Result<(ReservationId, RestrictionId), StoreError> {
        let guard = self.room_state(new.room_id)?.write_owned().await;
        check_capacity(&guard)?;
        check_no_conflict(&guard, &new.span)?;

        let reservation = self.state.new_reservation(new);
        let restriction = self.state.new_restriction(
            reservation.room_id,
            reservation.span,
            RestrictionKind::Reservation {
                reservation_id: reservation.id,
            },
        );
        let ids = (reservation.id, restriction.id);
        self.persist_and_apply(guard, Event::ReservationCommitted { reservation, restriction })
            .await?;
        Ok(ids)
    }

    async fn delete_restriction(&self, id: RestrictionId) -> Result<RoomRestriction, StoreError> {
        let room_id = self
            .state
            .restriction_to_room
            .get(&id)
            .map(|e| *e.value())
            .ok_or(StoreError::MissingRestriction(id))?;
        let guard = self.room_state(room_id)?.write_owned().await;
        let restriction = guard
            .restrictions
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::MissingRestriction(id))?;

        self.persist_and_apply(guard, Event::RestrictionRemoved { id, room_id })
            .await?;
        Ok(restriction)
    }

    async fn delete_reservation(&self, id: ReservationId) -> Result<Reservation, StoreError> {
        let guard = self.reservation_write(id).await?;
        let reservation = self
            .state
            .reservations
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::MissingReservation(id))?;
        let restriction_id = guard.restriction_for_reservation(id).map(|r| r.id);

        let event = Event::ReservationDeleted {
            id,
            room_id: reservation.room_id,
            restriction_id,
        };
        self.persist_and_apply(guard, event).await?;
        Ok(reservation)
    }

    async fn mark_processed(&self, id: ReservationId, processed: bool) -> Result<(), StoreError> {
        let guard = self.reservation_write(id).await?;
        let event = Event::ReservationProcessed {
            id,
            room_id: guard.room_id,
            processed,
            at: Utc::now(),
        };
        self.persist_and_apply(guard, event).await
    }

    async fn update_guest(&self, id: ReservationId, guest: GuestDetails) -> Result<(), StoreError> {
        let guard = self.reservation_write(id).await?;
        let event = Event::GuestUpdated {
            id,
            room_id: guard.room_id,
            guest,
            at: Utc::now(),
        };
        self.persist_and_apply(guard, event).await
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        Ok(self.state.reservations.get(&id).map(|r| r.value().clone()))
    }

    async fn reservations(&self, filter: ReservationFilter) -> Result<Vec<Reservation>, StoreError> {
        let mut out: Vec<Reservation> = self
            .state
            .reservations
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by_key(|r| r.id);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn span(a: &str, b: &str) -> DateSpan {
        DateSpan::new(a.parse().unwrap(), b.parse().unwrap()).unwrap()
    }

    fn guest() -> GuestDetails {
        GuestDetails {
            first_name: "John".into(),
            last_name: "Smith".into(),
            email: "john@smith.com".into(),
            phone: "555-111".into(),
        }
    }

    fn new_reservation(room_id: RoomId, s: DateSpan) -> NewReservation {
        NewReservation {
            room_id,
            span: s,
            guest: guest(),
        }
    }

    async fn store_with_room() -> (MemoryStore, RoomId) {
        let store = MemoryStore::new(Arc::new(NotifyHub::new()));
        let room = store.add_room("General's Quarters").await.unwrap();
        (store, room.id)
    }

    #[tokio::test]
    async fn rooms_are_listed_in_catalog_order() {
        let store = MemoryStore::new(Arc::new(NotifyHub::new()));
        store.add_room("General's Quarters").await.unwrap();
        store.add_room("Major's Suite").await.unwrap();
        let rooms = store.all_rooms().await.unwrap();
        let ids: Vec<_> = rooms.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RoomId(1), RoomId(2)]);
        assert_eq!(rooms[1].name, "Major's Suite");
        assert_eq!(store.room(RoomId(3)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn commit_inserts_paired_restriction() {
        let (store, room) = store_with_room().await;
        let (res_id, restr_id) = store
            .commit_reservation(new_reservation(room, span("2050-01-02", "2050-01-03")))
            .await
            .unwrap();

        let restriction = store.restriction(restr_id).await.unwrap().unwrap();
        assert_eq!(restriction.reservation_id(), Some(res_id));
        let reservation = store.reservation(res_id).await.unwrap().unwrap();
        assert!(!reservation.processed);
        assert_eq!(reservation.span, restriction.span);
    }

    #[tokio::test]
    async fn overlapping_insert_conflicts() {
        let (store, room) = store_with_room().await;
        store
            .commit_reservation(new_reservation(room, span("2050-01-02", "2050-01-05")))
            .await
            .unwrap();

        let err = store
            .insert_restriction(NewRestriction {
                room_id: room,
                span: span("2050-01-04", "2050-01-06"),
                kind: RestrictionKind::Block,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let err = store
            .insert_reservation(new_reservation(room, span("2050-01-01", "2050-01-03")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        // Checkout day is free.
        store
            .commit_reservation(new_reservation(room, span("2050-01-05", "2050-01-06")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_room_is_missing() {
        let (store, _) = store_with_room().await;
        let err = store
            .restrictions_overlapping(RoomId(42), span("2050-01-01", "2050-01-02"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::MissingRoom(RoomId(42)));
    }

    #[tokio::test]
    async fn delete_reservation_removes_pair() {
        let (store, room) = store_with_room().await;
        let (res_id, restr_id) = store
            .commit_reservation(new_reservation(room, span("2050-01-02", "2050-01-03")))
            .await
            .unwrap();

        let deleted = store.delete_reservation(res_id).await.unwrap();
        assert_eq!(deleted.id, res_id);
        assert_eq!(store.reservation(res_id).await.unwrap(), None);
        assert_eq!(store.restriction(restr_id).await.unwrap(), None);
        assert!(
            store
                .restrictions_overlapping(room, span("2050-01-01", "2050-02-01"))
                .await
                .unwrap()
                .is_empty()
        );

        let err = store.delete_reservation(res_id).await.unwrap_err();
        assert_eq!(err, StoreError::MissingReservation(res_id));
    }

    #[tokio::test]
    async fn processed_flag_and_filter() {
        let (store, room) = store_with_room().await;
        let (a, _) = store
            .commit_reservation(new_reservation(room, span("2050-01-02", "2050-01-03")))
            .await
            .unwrap();
        let (b, _) = store
            .commit_reservation(new_reservation(room, span("2050-01-03", "2050-01-04")))
            .await
            .unwrap();

        store.mark_processed(a, true).await.unwrap();

        let pending = store.reservations(ReservationFilter::Pending).await.unwrap();
        assert_eq!(pending.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b]);
        let all = store.reservations(ReservationFilter::All).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![a, b]);
        assert!(all[0].processed);
    }

    #[tokio::test]
    async fn month_query_includes_straddling_restrictions() {
        let (store, room) = store_with_room().await;
        store
            .insert_restriction(NewRestriction {
                room_id: room,
                span: span("2050-01-30", "2050-02-02"),
                kind: RestrictionKind::Block,
            })
            .await
            .unwrap();
        store
            .insert_restriction(NewRestriction {
                room_id: room,
                span: span("2050-03-01", "2050-03-02"),
                kind: RestrictionKind::Block,
            })
            .await
            .unwrap();

        assert_eq!(store.restrictions_for_month(room, 2050, 1).await.unwrap().len(), 1);
        assert_eq!(store.restrictions_for_month(room, 2050, 2).await.unwrap().len(), 1);
        assert_eq!(store.restrictions_for_month(room, 2050, 3).await.unwrap().len(), 1);
        assert!(store.restrictions_for_month(room, 2050, 13).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_guest_changes_fields() {
        let (store, room) = store_with_room().await;
        let (id, _) = store
            .commit_reservation(new_reservation(room, span("2050-01-02", "2050-01-03")))
            .await
            .unwrap();
        let mut changed = guest();
        changed.phone = "555-999".into();
        store.update_guest(id, changed.clone()).await.unwrap();
        assert_eq!(store.reservation(id).await.unwrap().unwrap().guest, changed);
    }

    #[tokio::test]
    async fn notifies_room_subscribers() {
        let notify = Arc::new(NotifyHub::new());
        let store = MemoryStore::new(notify.clone());
        let room = store.add_room("General's Quarters").await.unwrap();
        let mut rx = notify.subscribe(room.id);

        let date = NaiveDate::from_ymd_opt(2050, 1, 10).unwrap();
        store
            .insert_restriction(NewRestriction {
                room_id: room.id,
                span: DateSpan::single_day(date).unwrap(),
                kind: RestrictionKind::Block,
            })
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, Event::RestrictionAdded { .. }));
    }

    #[tokio::test]
    async fn compaction_keeps_ids_of_dropped_records_retired() {
        let dir = std::env::temp_dir().join("innkeep_test_memory");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("retired_ids.wal");
        let _ = std::fs::remove_file(&path);

        let (res_id, restr_id) = {
            let store = MemoryStore::open(&path, Arc::new(NotifyHub::new())).unwrap();
            let room = store.add_room("General's Quarters").await.unwrap();
            let ids = store
                .commit_reservation(new_reservation(room.id, span("2050-01-02", "2050-01-03")))
                .await
                .unwrap();
            store.delete_reservation(ids.0).await.unwrap();
            store.compact_journal().await.unwrap();
            ids
        };

        let store = MemoryStore::open(&path, Arc::new(NotifyHub::new())).unwrap();
        assert!(store.reservations(ReservationFilter::All).await.unwrap().is_empty());
        let (next_res, next_restr) = store
            .commit_reservation(new_reservation(RoomId(1), span("2050-01-02", "2050-01-03")))
            .await
            .unwrap();
        assert!(next_res > res_id);
        assert!(next_restr > restr_id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commits_same_span_one_wins() {
        let (store, room) = store_with_room().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .commit_reservation(new_reservation(room, span("2050-01-02", "2050-01-04")))
                    .await
            }));
        }

        let mut ok = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(StoreError::Conflict { .. }) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.reservations(ReservationFilter::All).await.unwrap().len(), 1);
    }

    fn journal_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("innkeep_test_memory");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn insert_reservation_refuses_overlapping_unpaired_row() {
        let (store, room) = store_with_room().await;
        let first = store
            .insert_reservation(new_reservation(room, span("2050-01-02", "2050-01-05")))
            .await
            .unwrap();

        let err = store
            .insert_reservation(new_reservation(room, span("2050-01-04", "2050-01-06")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::ReservationOverlap {
                room_id: room,
                existing: first,
            }
        );

        // Once paired, the restriction itself is what conflicts.
        store
            .insert_restriction(NewRestriction {
                room_id: room,
                span: span("2050-01-02", "2050-01-05"),
                kind: RestrictionKind::Reservation { reservation_id: first },
            })
            .await
            .unwrap();
        let err = store
            .insert_reservation(new_reservation(room, span("2050-01-04", "2050-01-06")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        store
            .insert_reservation(new_reservation(room, span("2050-01-05", "2050-01-06")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn replay_skips_restrictions_that_overlap() {
        let path = journal_path("overlap.wal");
        let room = Room {
            id: RoomId(1),
            name: "General's Quarters".into(),
        };
        let block = RoomRestriction {
            id: RestrictionId(1),
            room_id: room.id,
            span: span("2050-01-02", "2050-01-05"),
            kind: RestrictionKind::Block,
        };
        let now = Utc::now();
        let reservation = Reservation {
            id: ReservationId(1),
            room_id: room.id,
            span: span("2050-01-03", "2050-01-04"),
            guest: guest(),
            processed: false,
            created_at: now,
            updated_at: now,
        };
        let paired = RoomRestriction {
            id: RestrictionId(2),
            room_id: room.id,
            span: reservation.span,
            kind: RestrictionKind::Reservation {
                reservation_id: reservation.id,
            },
        };
        {
            let mut wal = crate::wal::Wal::open(&path).unwrap();
            wal.append(&Event::RoomAdded { room }).unwrap();
            wal.append(&Event::RestrictionAdded { restriction: block }).unwrap();
            wal.append(&Event::ReservationCommitted {
                reservation,
                restriction: paired,
            })
            .unwrap();
        }

        let store = MemoryStore::open(&path, Arc::new(NotifyHub::new())).unwrap();
        assert!(store.restriction(RestrictionId(1)).await.unwrap().is_some());
        assert!(store.restriction(RestrictionId(2)).await.unwrap().is_none());
        assert!(store.reservations(ReservationFilter::All).await.unwrap().is_empty());

        // Skipped ids stay retired.
        let (res_id, restr_id) = store
            .commit_reservation(new_reservation(RoomId(1), span("2050-01-10", "2050-01-11")))
            .await
            .unwrap();
        assert_eq!(res_id, ReservationId(2));
        assert_eq!(restr_id, RestrictionId(3));
    }

    #[tokio::test]
    async fn dropped_commit_still_lands_in_memory_and_journal() {
        use futures::FutureExt;

        let path = journal_path("dropped_commit.wal");
        {
            let store = MemoryStore::open(&path, Arc::new(NotifyHub::new())).unwrap();
            let room = store.add_room("General's Quarters").await.unwrap();

            // One poll gets the commit as far as the journal, then the caller goes away.
            let commit = store.commit_reservation(new_reservation(room.id, span("2050-01-02", "2050-01-05")));
            assert!(commit.now_or_never().is_none());

            let seen = store
                .restrictions_overlapping(room.id, span("2050-01-01", "2050-02-01"))
                .await
                .unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(store.reservations(ReservationFilter::All).await.unwrap().len(), 1);
        }

        let store = MemoryStore::open(&path, Arc::new(NotifyHub::new())).unwrap();
        let restored = store.reservations(ReservationFilter::All).await.unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].span, span("2050-01-02", "2050-01-05"));
    }
}
