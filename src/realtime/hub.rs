//! Room-based broadcast hub.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::event::{CrmEvent, Room};

/// Fan-out of events to per-room broadcast channels.
#[derive(Clone)]
pub struct Hub {
    rooms: Arc<DashMap<Room, broadcast::Sender<Arc<CrmEvent>>>>,
    capacity: usize,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Join a room, creating its channel on first use.
    pub fn subscribe(&self, room: Room) -> broadcast::Receiver<Arc<CrmEvent>> {
        self.rooms
            .entry(room)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver an event to every room it belongs to.
    ///
    /// Returns the number of receivers reached.
    pub fn publish(&self, event: CrmEvent) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        for room in event.rooms() {
            if let Some(tx) = self.rooms.get(&room) {
                delivered += tx.send(event.clone()).unwrap_or(0);
            }
        }
        tracing::debug!(
            event = ?event.event_type,
            tenant = %event.tenant_id,
            delivered,
            "Published event"
        );
        delivered
    }

    /// Drop rooms nobody listens to.
    pub fn prune(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, tx| tx.receiver_count() > 0);
        before - self.rooms.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LeadId, TenantId};
    use crate::realtime::event::EventType;

    #[tokio::test]
    async fn test_tenant_and_lead_rooms() {
        let hub = Hub::new(16);
        let tenant = TenantId::new();
        let lead = LeadId::new();

        let mut tenant_rx = hub.subscribe(Room::Tenant(tenant));
        let mut lead_rx = hub.subscribe(Room::Lead(lead));
        let mut other_rx = hub.subscribe(Room::Tenant(TenantId::new()));

        let reached = hub.publish(CrmEvent::new(
            EventType::LeadUpdated,
            tenant,
            Some(lead),
            serde_json::json!({}),
        ));
        assert_eq!(reached, 2);
        assert_eq!(tenant_rx.recv().await.unwrap().lead_id, Some(lead));
        assert_eq!(lead_rx.recv().await.unwrap().tenant_id, tenant);
        assert!(other_rx.try_recv().is_err());
    }

    #[test]
    fn test_prune_removes_empty_rooms() {
        let hub = Hub::new(4);
        let rx = hub.subscribe(Room::Lead(LeadId::new()));
        let _kept = hub.subscribe(Room::Tenant(TenantId::new()));
        assert_eq!(hub.room_count(), 2);
        drop(rx);
        assert_eq!(hub.prune(), 1);
        assert_eq!(hub.room_count(), 1);
    }
}
