use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;
use uuid::Uuid;

pub const SERVICE_NAME: &str = "ride-dispatch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    RideEvents,
    DriverNotifications,
    UserNotifications,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::RideEvents => "ride-events",
            Channel::DriverNotifications => "driver-notifications",
            Channel::UserNotifications => "user-notifications",
        }
    }
}

/// Envelope carried by every published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub data: Value,
}

/// Fire-and-forget pub/sub fan-out over broadcast channels.
///
/// Delivery never gates the state transition that triggered it; a publish
/// with no live subscribers is dropped and logged.
pub struct EventBus {
    ride_events: broadcast::Sender<Event>,
    driver_notifications: broadcast::Sender<Event>,
    user_notifications: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (ride_events, _) = broadcast::channel(buffer);
        let (driver_notifications, _) = broadcast::channel(buffer);
        let (user_notifications, _) = broadcast::channel(buffer);

        Self {
            ride_events,
            driver_notifications,
            user_notifications,
        }
    }

    fn sender(&self, channel: Channel) -> &broadcast::Sender<Event> {
        match channel {
            Channel::RideEvents => &self.ride_events,
            Channel::DriverNotifications => &self.driver_notifications,
            Channel::UserNotifications => &self.user_notifications,
        }
    }

    pub fn publish(&self, channel: Channel, event_type: &str, data: Value) {
        let event = Event {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            timestamp: Utc::now(),
            service: SERVICE_NAME.to_string(),
            data,
        };

        match self.sender(channel).send(event) {
            Ok(receivers) => {
                debug!(channel = channel.as_str(), event_type, receivers, "event published");
            }
            Err(_) => {
                debug!(
                    channel = channel.as_str(),
                    event_type, "event dropped: no subscribers"
                );
            }
        }
    }

    pub fn subscribe(&self, channel: Channel) -> BroadcastStream<Event> {
        BroadcastStream::new(self.sender(channel).subscribe())
    }
}
