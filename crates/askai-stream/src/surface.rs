use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{Instrument as _, debug, info, info_span};

use crate::assembler::{AssemblyOutcome, StreamingResponseAssembler, record_cancel};
use crate::config::ChatClientConfig;
use crate::errors::ChatError;
use crate::events::{EventSink, SurfaceEvent};
use crate::message::{ChatMessage, MessageId, MessageLog};
use crate::session::Session;
use crate::transport::{ChatRequest, ChatTransport, HttpChatTransport};

/// Handle used to cancel whatever reply stream is currently in flight.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Best-effort: a request still waiting for response headers is dropped
    /// at once, a streaming one stops at its next chunk boundary, and the send
    /// returns `AssemblyOutcome::Cancelled`. Calling this while nothing is in
    /// flight has no effect on later sends.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// One open chat: the session, the transcript and the transport behind it.
///
/// `send` and `refresh` take `&mut self`, so a surface consumes at most one
/// reply stream at a time. Use `abort_handle` to give up on the current one.
pub struct ChatSurface {
    transport: Arc<dyn ChatTransport>,
    session: Session,
    assembler: StreamingResponseAssembler,
    log: MessageLog,
    last_query: Option<String>,
    events: EventSink,
    abort_tx: Arc<watch::Sender<bool>>,
}

impl ChatSurface {
    /// Opens a surface with a freshly generated session.
    pub fn open(transport: Arc<dyn ChatTransport>) -> Self {
        Self::with_session(transport, Session::generate())
    }

    /// Opens a surface bound to an explicit session.
    pub fn with_session(transport: Arc<dyn ChatTransport>, session: Session) -> Self {
        let (abort_tx, _) = watch::channel(false);
        debug!(session_id = %session, "chat surface opened");
        Self {
            transport,
            session,
            assembler: StreamingResponseAssembler::default(),
            log: MessageLog::default(),
            last_query: None,
            events: EventSink::default(),
            abort_tx: Arc::new(abort_tx),
        }
    }

    /// Opens a surface over HTTP using `config` for the endpoint and throttle.
    pub fn from_config(config: ChatClientConfig) -> Result<Self, ChatError> {
        let throttle = config.update_throttle;
        let transport = HttpChatTransport::new(config)?;
        Ok(Self::open(Arc::new(transport)).with_assembler(StreamingResponseAssembler::new(throttle)))
    }

    /// Replaces the assembler (for example to change the update throttle).
    pub fn with_assembler(mut self, assembler: StreamingResponseAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn session(&self) -> Session {
        self.session
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.log.as_slice()
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    /// Starts delivering `SurfaceEvent`s to the returned receiver.
    ///
    /// Only the most recent subscriber receives events.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SurfaceEvent> {
        self.events.subscribe()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    /// Appends `query` as a user message and streams the assistant reply.
    ///
    /// Transport and parse failures are recovered into the transcript and
    /// reported through the outcome; `Err` means nothing was sent.
    pub async fn send(&mut self, query: impl Into<String>) -> Result<AssemblyOutcome, ChatError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(ChatError::Validation("query must not be empty".into()));
        }
        let message = ChatMessage::user(MessageId::generate(), query.clone());
        self.events.emit(SurfaceEvent::MessageAdded {
            message: message.clone(),
        });
        self.log.push(message);
        self.last_query = Some(query.clone());
        Ok(self.stream_reply(query).await)
    }

    /// Resends the last query as a brand-new request.
    ///
    /// Earlier messages are left untouched; a new assistant reply is appended.
    pub async fn refresh(&mut self) -> Result<AssemblyOutcome, ChatError> {
        let Some(query) = self.last_query.clone() else {
            return Err(ChatError::Validation("no previous query to retry".into()));
        };
        info!(session_id = %self.session, "retrying last query");
        Ok(self.stream_reply(query).await)
    }

    /// Clears the transcript and the last query. The session is kept.
    pub fn reset(&mut self) {
        self.log.clear();
        self.last_query = None;
        self.events.emit(SurfaceEvent::Reset);
        debug!(session_id = %self.session, "chat surface reset");
    }

    async fn stream_reply(&mut self, query: String) -> AssemblyOutcome {
        // A fresh receiver treats the reset flag as already seen, so only an
        // abort issued from here on cancels this stream.
        self.abort_tx.send_replace(false);
        let abort_rx = self.abort_tx.subscribe();

        let message_id = MessageId::generate();
        let span = info_span!("reply", session_id = %self.session, message_id = %message_id);
        let request = ChatRequest {
            query,
            session_id: self.session.to_string(),
        };
        self.run_reply(request, message_id, abort_rx)
            .instrument(span)
            .await
    }

    async fn run_reply(
        &mut self,
        request: ChatRequest,
        message_id: MessageId,
        mut abort_rx: watch::Receiver<bool>,
    ) -> AssemblyOutcome {
        let opened = tokio::select! {
            biased;
            true = abort_requested(&mut abort_rx) => return record_cancel(&self.events, None),
            opened = self.transport.open_stream(&request) => opened,
        };
        match opened {
            Ok(stream) => {
                self.assembler
                    .assemble_with(&mut self.log, message_id, stream, &self.events, &mut abort_rx)
                    .await
            }
            Err(err) => self
                .assembler
                .record_failure(&mut self.log, &self.events, None, err),
        }
    }
}

/// Resolves `true` once an abort is requested; `false` if the handle side is
/// gone.
async fn abort_requested(abort_rx: &mut watch::Receiver<bool>) -> bool {
    abort_rx.wait_for(|aborted| *aborted).await.is_ok()
}
