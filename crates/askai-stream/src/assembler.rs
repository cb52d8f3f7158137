use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::decoder::Utf8Decoder;
use crate::errors::{ChatError, StreamError};
use crate::events::{EventSink, SurfaceEvent};
use crate::extract::{self, ResponseScanner};
use crate::message::{ChatMessage, MessageId, MessageLog, SourceMap};
use crate::transport::ByteStream;

/// Assistant text appended when a request or its stream fails.
pub const APOLOGY_TEXT: &str =
    "Sorry, I couldn't get a response right now. Please try again in a moment.";

/// How one reply stream ended.
#[derive(Clone, Debug, PartialEq)]
pub enum AssemblyOutcome {
    /// The final body parsed; the message holds `response` and its sources.
    Completed { message_id: MessageId },
    /// The body never parsed. The message (if any bytes arrived) keeps the
    /// best text recoverable from it and no sources.
    Degraded {
        message_id: Option<MessageId>,
        reason: String,
    },
    /// The transport failed. `partial` is the half-filled reply left in place,
    /// `apology` the error message appended after it.
    Failed {
        error: StreamError,
        partial: Option<MessageId>,
        apology: MessageId,
    },
    /// The caller aborted the stream; the partial reply is left as-is.
    Cancelled { message_id: Option<MessageId> },
}

impl AssemblyOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Turns a transport failure into `ChatError::Stream`; every other
    /// outcome is returned unchanged. The apology stays in the transcript.
    pub fn into_result(self) -> Result<Self, ChatError> {
        match self {
            Self::Failed { error, .. } => Err(ChatError::Stream(error)),
            other => Ok(other),
        }
    }
}

/// Per-request scratch state; dropped when the stream ends.
#[derive(Default)]
struct StreamAccumulator {
    decoder: Utf8Decoder,
    raw: String,
    scanner: ResponseScanner,
    shown: String,
    seq: u64,
}

impl StreamAccumulator {
    /// Writes `shown` to the message and announces it.
    fn show(&mut self, log: &mut MessageLog, events: &EventSink, message_id: &MessageId) {
        log.set_text(message_id, &self.shown);
        events.emit(SurfaceEvent::PartialText {
            message_id: message_id.clone(),
            seq: self.seq,
            text: self.shown.clone(),
        });
        self.seq = self.seq.saturating_add(1);
    }
}

/// Turns a raw reply body into a display-ready assistant message.
///
/// While bytes arrive the `response` string is decoded as far as it is
/// unambiguous and written to the message; once the body ends it is parsed
/// strictly and the message gets its final text and sources.
#[derive(Clone, Debug)]
pub struct StreamingResponseAssembler {
    throttle: Duration,
}

impl Default for StreamingResponseAssembler {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl StreamingResponseAssembler {
    /// Creates an assembler that pauses `throttle` after each partial update.
    pub fn new(throttle: Duration) -> Self {
        Self { throttle }
    }

    pub fn throttle(&self) -> Duration {
        self.throttle
    }

    /// Consumes `stream` into `log`, creating message `message_id` on the
    /// first byte.
    pub async fn assemble(
        &self,
        log: &mut MessageLog,
        message_id: MessageId,
        stream: ByteStream,
    ) -> AssemblyOutcome {
        let (_abort_tx, mut abort_rx) = watch::channel(false);
        self.assemble_with(log, message_id, stream, &EventSink::default(), &mut abort_rx)
            .await
    }

    pub(crate) async fn assemble_with(
        &self,
        log: &mut MessageLog,
        message_id: MessageId,
        mut stream: ByteStream,
        events: &EventSink,
        abort_rx: &mut watch::Receiver<bool>,
    ) -> AssemblyOutcome {
        let mut acc = StreamAccumulator::default();
        let mut started = false;
        let mut abort_open = true;

        loop {
            let next = tokio::select! {
                biased;
                changed = abort_rx.changed(), if abort_open => {
                    match changed {
                        Ok(()) if *abort_rx.borrow() => {
                            return record_cancel(events, started.then(|| message_id.clone()));
                        }
                        Ok(()) => continue,
                        Err(_) => {
                            abort_open = false;
                            continue;
                        }
                    }
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    if !started {
                        let message = ChatMessage::assistant(message_id.clone());
                        events.emit(SurfaceEvent::MessageAdded {
                            message: message.clone(),
                        });
                        log.push(message);
                        started = true;
                    }
                    let text = acc.decoder.push_chunk(&chunk);
                    acc.raw.push_str(&text);
                    debug!(message_id = %message_id, bytes = chunk.len(), buffered = acc.raw.len(), "reply chunk");

                    if let Some(text) = acc.scanner.advance(&acc.raw)
                        && text != acc.shown
                    {
                        acc.shown = text.to_string();
                        acc.show(log, events, &message_id);
                        if !self.throttle.is_zero() {
                            tokio::time::sleep(self.throttle).await;
                        }
                    }
                }
                Some(Err(err)) => {
                    let partial = started.then(|| message_id.clone());
                    return self.record_failure(log, events, partial, err);
                }
                None => break,
            }
        }

        if let Some(ch) = acc.decoder.finish() {
            acc.raw.push(ch);
        }
        if !started {
            let reason = "reply stream ended without any data".to_string();
            warn!("{reason}");
            events.emit(SurfaceEvent::Degraded {
                message_id: None,
                reason: reason.clone(),
            });
            return AssemblyOutcome::Degraded {
                message_id: None,
                reason,
            };
        }

        match extract::parse_final(&acc.raw) {
            Ok(reply) => {
                let sources = SourceMap::from_urls(reply.sources);
                if let Some(message) = log.get_mut(&message_id) {
                    message.text = reply.response.clone();
                    message.sources = sources.clone();
                }
                info!(message_id = %message_id, chars = reply.response.len(), sources = sources.len(), "reply completed");
                events.emit(SurfaceEvent::Completed {
                    message_id: message_id.clone(),
                    text: reply.response,
                    sources,
                });
                AssemblyOutcome::Completed { message_id }
            }
            Err(err) => {
                let reason = err.to_string();
                if let Some(text) = extract::marker_cut_response(&acc.raw)
                    && text != acc.shown
                {
                    acc.shown = text;
                    acc.show(log, events, &message_id);
                }
                warn!(message_id = %message_id, error = %reason, "final reply parse failed; keeping partial text");
                events.emit(SurfaceEvent::Degraded {
                    message_id: Some(message_id.clone()),
                    reason: reason.clone(),
                });
                AssemblyOutcome::Degraded {
                    message_id: Some(message_id),
                    reason,
                }
            }
        }
    }

    /// Appends the apology message for a failed request.
    pub(crate) fn record_failure(
        &self,
        log: &mut MessageLog,
        events: &EventSink,
        partial: Option<MessageId>,
        error: StreamError,
    ) -> AssemblyOutcome {
        warn!(error = %error, partial = ?partial, "reply stream failed");
        let apology = ChatMessage::assistant_text(MessageId::generate(), APOLOGY_TEXT);
        let apology_id = apology.id.clone();
        events.emit(SurfaceEvent::Failed {
            error: error.clone(),
        });
        events.emit(SurfaceEvent::MessageAdded {
            message: apology.clone(),
        });
        log.push(apology);
        AssemblyOutcome::Failed {
            error,
            partial,
            apology: apology_id,
        }
    }
}

/// Reports a stream given up by the caller; `message_id` is the partial
/// reply left in place, if one was started.
pub(crate) fn record_cancel(events: &EventSink, message_id: Option<MessageId>) -> AssemblyOutcome {
    info!(message_id = ?message_id, "reply stream cancelled");
    events.emit(SurfaceEvent::Cancelled {
        message_id: message_id.clone(),
    });
    AssemblyOutcome::Cancelled { message_id }
}
