use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Confirmation, Event, RoomId};

const CHANNEL_CAPACITY: usize = 256;

/// JSON payload handed to the mailer for a confirmation.
pub fn confirmation_payload(confirmation: &Confirmation) -> Result<String, serde_json::Error> {
    serde_json::to_string(confirmation)
}

/// Broadcast hub for store events per room, plus one channel carrying
/// confirmations of completed reservations.
pub struct NotifyHub {
    channels: DashMap<RoomId, broadcast::Sender<Event>>,
    confirmations: broadcast::Sender<Confirmation>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            confirmations: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to events of one room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: RoomId) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a room event. No-op if nobody is listening.
    pub fn send(&self, room_id: RoomId, event: &Event) {
        if let Some(sender) = self.channels.get(&room_id) {
            let _ = sender.send(event.clone());
        }
    }

    /// Subscribe to confirmations of every completed reservation.
    pub fn subscribe_confirmations(&self) -> broadcast::Receiver<Confirmation> {
        self.confirmations.subscribe()
    }

    pub fn send_confirmation(&self, confirmation: &Confirmation) {
        let _ = self.confirmations.send(confirmation.clone());
    }
}
