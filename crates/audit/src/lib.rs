//! Audit trail module.
//!
//! Entities opt in by implementing [`Auditable`]; the recorder turns a
//! before/after pair into an immutable [`AuditLogEntry`]. Persisting the entry
//! is the caller's job (it must share the transaction of the audited write).

pub mod context;
pub mod entry;
pub mod query;
pub mod recorder;
pub mod session;
pub mod snapshot;

pub use context::{AuditContext, RequestMeta};
pub use entry::{AuditAction, AuditEntryId, AuditLogEntry};
pub use query::AuditQuery;
pub use recorder::record_change;
pub use session::UserSession;
pub use snapshot::{AuditDiff, Auditable, FieldChange, FieldMap, diff_snapshots};
