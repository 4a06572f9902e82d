use chrono::{DateTime, Utc};

/// Something an aggregate decided happened. Never mutated after creation.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, `<crate>.<aggregate>.<fact>`.
    fn event_type(&self) -> &'static str;

    /// Payload schema revision.
    fn version(&self) -> u32;

    /// Business time of the fact, not the time it was stored.
    fn occurred_at(&self) -> DateTime<Utc>;
}
