use haru_shared::Uid;
use tokio::sync::broadcast;

/// Notifications for the navigation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The backend no longer recognises the signed-in user. The login flow
    /// must restart.
    ForcedSessionEnded { uid: Uid },
}

pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 16;

pub(crate) fn emit_event(tx: &broadcast::Sender<SessionEvent>, event: SessionEvent) {
    // No receivers is fine: nobody is listening yet.
    if tx.send(event).is_err() {
        tracing::debug!("session event dropped, no subscribers");
    }
}
