//! Identity shared by persisted records.

/// A record with a stable, strongly-typed identity.
///
/// Stores key their tables by [`Entity::id`], so the id must be cheap to copy
/// and totally ordered.
pub trait Entity {
    type Id: Copy + Ord + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;
}
