use time::OffsetDateTime;

use crate::actor::ActorId;

/// Caller identity and clock for one request
///
/// Passed into every construction and validation call that needs a current
/// user or a current time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub actor_id: ActorId,
    /// Milliseconds since the unix epoch
    pub now: i64,
}

impl RequestContext {
    pub fn new(actor_id: ActorId) -> Self {
        Self::at(actor_id, now_millis())
    }

    pub fn at(actor_id: ActorId, now: i64) -> Self {
        Self { actor_id, now }
    }
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
