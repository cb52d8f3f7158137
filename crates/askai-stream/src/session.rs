use std::fmt;
use std::str::FromStr;

use crate::errors::ChatError;

/// Client-generated identifier attached to every request from one chat opening.
///
/// The backend owns its meaning; this crate only creates and forwards it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Session(uuid::Uuid);

impl Session {
    /// Creates a fresh random session.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Wraps an existing identifier (for example one restored by the caller).
    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying identifier.
    pub fn id(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Session {
    type Err = ChatError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|e| ChatError::Validation(format!("invalid session id {value:?}: {e}")))
    }
}
