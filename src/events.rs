// Session events
//
// Lifecycle notifications broadcast to any number of observers (loggers,
// recorders, test harnesses) without them having to poll prompts.

use crate::clock::Timestamp;
use crate::prompt::PromptId;
use tokio::sync::broadcast;

/// Change events emitted by a running session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// The UI loop is up and the initial layout is about to run
    Started,

    /// A prompt finished setup and was registered
    PromptAdded { prompt: PromptId },

    /// A prompt received a value
    PromptAnswered {
        prompt: PromptId,
        round: u64,
        timestamp: Timestamp,
        /// False when the submission was ignored (answer already present)
        accepted: bool,
    },

    /// A prompt was reset for another round
    PromptReset {
        prompt: PromptId,
        round: u64,
        presented_at: Timestamp,
    },

    /// A prompt and its UI placement were removed
    PromptRemoved { prompt: PromptId },

    /// The session clock was swapped
    ClockReplaced,

    /// `close()` was requested; the loop exits after the current message
    Closing,

    /// Teardown finished
    Closed,
}

/// Broadcast hub for [`SessionEvent`]s.
///
/// Cloning shares the same channel. Sending with no subscribers is fine.
#[derive(Clone, Debug)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    /// Create a hub with a buffer of 100 events per subscriber
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn emit(&self, event: SessionEvent) {
        tracing::trace!("Session event: {:?}", event);
        // Ignore send errors - it's OK if no one is listening
        let _ = self.tx.send(event);
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
