//! Context resolution: every store call is scoped to exactly one room stream.

use roomlog_core::RoomId;

use crate::errors::{EventStoreError, Result};
use crate::types::{Context, RoomEvent};

/// Anything a room context can be derived from.
pub trait ContextSource {
    /// Room id this value belongs to.
    fn room_id(&self) -> &str;
}

impl ContextSource for str {
    fn room_id(&self) -> &str {
        self
    }
}

impl ContextSource for String {
    fn room_id(&self) -> &str {
        self
    }
}

impl ContextSource for RoomId {
    fn room_id(&self) -> &str {
        self.as_str()
    }
}

impl ContextSource for RoomEvent {
    fn room_id(&self) -> &str {
        &self.context_id
    }
}

/// Derive the `(room, id)` context key.
///
/// Fails with a validation error when the derived id is empty.
pub fn resolve_context<S: ContextSource + ?Sized>(source: &S) -> Result<Context> {
    let room_id = source.room_id();
    if room_id.trim().is_empty() {
        return Err(EventStoreError::Validation(
            "cannot derive context: room id is empty".to_string(),
        ));
    }
    Ok(Context::room(room_id))
}
