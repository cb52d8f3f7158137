//! Common imports for typical chat usage.
pub use crate::{
    AbortHandle, AssemblyOutcome, ChatClientConfig, ChatError, ChatMessage, ChatSurface,
    ChatTransport, MessageId, Role, Session, SourceMap, SurfaceEvent,
};
