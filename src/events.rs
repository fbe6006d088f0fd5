//! Publishes domain events to NATS when a server is configured.
//!
//! Publishing is best effort: a failed publish is logged and never fails the
//! request that produced the event.

use crate::domain::events::DomainEvent;

#[derive(Clone, Debug, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// Publisher that only logs, for tests and NATS-less deployments.
    pub fn disabled() -> Self { Self::default() }

    /// Connects to `url` if given. A connection failure disables publishing.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else { return Self::disabled() };
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(%url, "Connected to NATS");
                Self::new(Some(client))
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "NATS unavailable, events will only be logged");
                Self::disabled()
            }
        }
    }

    pub async fn publish(&self, event: impl Into<DomainEvent>) {
        let event = event.into();
        let subject = event.subject();
        let Some(client) = &self.nats else {
            tracing::debug!(subject, ?event, "Event (not published)");
            return;
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(subject, error = %e, "Failed to encode event");
                return;
            }
        };
        if let Err(e) = client.publish(subject.to_string(), payload.into()).await {
            tracing::warn!(subject, error = %e, "Failed to publish event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OrderEvent;
    use crate::domain::value_objects::OrderId;

    #[tokio::test]
    async fn test_disabled_publisher_accepts_events() {
        let publisher = EventPublisher::connect(None).await;
        publisher.publish(OrderEvent::Shipped { order_id: OrderId::generate() }).await;
    }

    #[test]
    fn test_event_payload_shape() {
        let id = OrderId::generate();
        let event = DomainEvent::from(OrderEvent::Delivered { order_id: id });
        assert_eq!(event.subject(), "orders.delivered");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "delivered");
        assert_eq!(json["order_id"], id.to_string());
    }
}
