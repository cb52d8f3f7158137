//! Client for the "Ask AI" chat endpoint.
//!
//! The endpoint answers `POST {query, sessionId}` with a streamed body whose
//! complete content is `{"response": string, "sources": [string, ...]}`. The
//! body is not valid JSON until the last byte arrives, so the
//! [`StreamingResponseAssembler`] decodes the `response` string as far as it is
//! unambiguous for live display and parses the whole object once the stream
//! ends.
//!
//! # Usage
//!
//! ```no_run
//! use askai_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ChatError> {
//! let mut chat = ChatSurface::from_config(ChatClientConfig::from_env()?)?;
//! let mut events = chat.subscribe();
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         if let SurfaceEvent::PartialText { text, .. } = event {
//!             println!("{text}");
//!         }
//!     }
//! });
//!
//! match chat.send("What services do you offer?").await? {
//!     AssemblyOutcome::Completed { .. } => {}
//!     other => eprintln!("reply did not complete: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

/// Partial-text assembly of one reply stream.
pub mod assembler;
/// Endpoint configuration.
pub mod config;
mod decoder;
/// Public error types.
pub mod errors;
/// Live surface notifications.
pub mod events;
/// Incremental and final reading of the reply body.
pub mod extract;
/// Transcript types.
pub mod message;
/// Process-wide logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Session identifier.
pub mod session;
/// Chat surface: send, retry, reset, cancel.
pub mod surface;
/// Transport seam and the HTTP implementation.
pub mod transport;

pub use assembler::{APOLOGY_TEXT, AssemblyOutcome, StreamingResponseAssembler};
pub use config::ChatClientConfig;
pub use errors::{ChatError, FinalParseError, StreamError};
pub use events::SurfaceEvent;
pub use extract::{ChatReply, PartialResponse};
pub use message::{ChatMessage, MessageId, MessageLog, Role, SourceGroup, SourceMap};
pub use session::Session;
pub use surface::{AbortHandle, ChatSurface};
pub use transport::{ByteStream, ChatRequest, ChatTransport, HttpChatTransport};
