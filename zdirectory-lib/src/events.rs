use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

/// Something the directory wants its listeners to know about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryEvent {
    /// A visitor asked to sign in
    SignInRequested,
    ProfilesRefreshed { count: usize },
    /// The prior snapshot is still being served
    RefreshFailed { error: String },
}

/// Typed publish/subscribe channel for [`DirectoryEvent`]s.
///
/// Cloning the bus shares the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DirectoryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Deliver `event` to every current subscriber and return how many there were.
    /// Nobody listening is fine.
    pub fn publish(&self, event: DirectoryEvent) -> usize {
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!(?event, "event published with no subscribers");
                0
            }
        }
    }

    /// Listen for events published from now on. Dropping the subscription unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

pub struct Subscription {
    receiver: broadcast::Receiver<DirectoryEvent>,
}

impl Subscription {
    /// Wait for the next event. `None` once the bus is gone.
    ///
    /// A subscriber that fell behind skips what it missed.
    pub async fn next(&mut self) -> Option<DirectoryEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-published event, without waiting
    pub fn try_next(&mut self) -> Option<DirectoryEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}
