//! Payload for event types that carry no data.

use serde::{Deserialize, Serialize};

/// Payload for `dmsg` and `drm` events: always `{}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyPayload {}
