use super::{ActivationBroadcaster, ActivationNotification};
use crate::error::Result;
use crate::topology::FunctionIdentifier;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// In-process activation bus
///
/// One broadcast channel per function; every subscriber of a function
/// receives every activation of that function's scripts.
#[derive(Clone)]
pub struct ActivationBus {
    channels: Arc<DashMap<FunctionIdentifier, broadcast::Sender<ActivationNotification>>>,
    capacity: usize,
}

impl Default for ActivationBus {
    fn default() -> Self {
        Self::new(100)
    }
}

impl ActivationBus {
    /// `capacity` is the number of notifications a slow subscriber may fall
    /// behind before it lags
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Publish a notification, returning how many subscribers received it
    pub fn publish(&self, notification: ActivationNotification) -> usize {
        let Some(sender) = self.channels.get(&notification.function) else {
            tracing::debug!("No subscribers for {} activations", notification.function);
            return 0;
        };
        match sender.send(notification) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(notification)) => {
                tracing::debug!("No subscribers for {} activations", notification.function);
                0
            }
        }
    }

    /// Subscribe to activations of `function`
    pub fn subscribe(&self, function: FunctionIdentifier) -> broadcast::Receiver<ActivationNotification> {
        let sender = self.channels.entry(function).or_insert_with(|| {
            let (tx, _) = broadcast::channel(self.capacity);
            tx
        });
        sender.subscribe()
    }

    pub fn subscriber_count(&self, function: FunctionIdentifier) -> usize {
        self.channels
            .get(&function)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl ActivationBroadcaster for ActivationBus {
    fn broadcast(&self, notification: ActivationNotification) -> Result<()> {
        self.publish(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptScope;

    fn notification(function: FunctionIdentifier) -> ActivationNotification {
        ActivationNotification::new(&ScriptScope::global(function), "s-1", "v-1")
    }

    #[tokio::test]
    async fn test_delivers_to_every_subscriber_of_function() {
        let bus = ActivationBus::default();
        let mut first = bus.subscribe(FunctionIdentifier::LabelGeneration);
        let mut second = bus.subscribe(FunctionIdentifier::LabelGeneration);
        let mut other = bus.subscribe(FunctionIdentifier::DeviceManagement);

        assert_eq!(bus.publish(notification(FunctionIdentifier::LabelGeneration)), 2);

        assert_eq!(first.recv().await.unwrap().script_id, "s-1");
        assert_eq!(second.recv().await.unwrap().version_id, "v-1");
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = ActivationBus::default();
        assert_eq!(bus.publish(notification(FunctionIdentifier::LabelGeneration)), 0);
        assert!(bus
            .broadcast(notification(FunctionIdentifier::LabelGeneration))
            .is_ok());
        assert_eq!(bus.subscriber_count(FunctionIdentifier::LabelGeneration), 0);
    }
}
