use tokio::sync::mpsc;

use crate::errors::StreamError;
use crate::message::{ChatMessage, MessageId, SourceMap};

/// Live notifications emitted while a surface sends and assembles replies.
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceEvent {
    /// A message was appended to the transcript (user query, new assistant
    /// reply, or apology).
    MessageAdded { message: ChatMessage },
    /// The assistant message's display text changed.
    PartialText {
        message_id: MessageId,
        seq: u64,
        text: String,
    },
    /// The final body parsed; text and sources are now authoritative.
    Completed {
        message_id: MessageId,
        text: String,
        sources: SourceMap,
    },
    /// The stream ended but the body did not parse; partial text is kept.
    Degraded {
        message_id: Option<MessageId>,
        reason: String,
    },
    /// Opening or reading the stream failed.
    Failed { error: StreamError },
    /// The in-flight stream was cancelled by the caller.
    Cancelled { message_id: Option<MessageId> },
    /// The transcript was cleared.
    Reset,
}

/// Optional single-subscriber event channel.
///
/// Sends never block; a dropped receiver silently disables delivery.
#[derive(Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::UnboundedSender<SurfaceEvent>>,
}

impl EventSink {
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SurfaceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = Some(tx);
        rx
    }

    pub fn emit(&self, event: SurfaceEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
