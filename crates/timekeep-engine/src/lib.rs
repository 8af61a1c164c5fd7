//! Timekeep engine
//!
//! Attendance core for biometric terminals:
//! - Device registry with auto-registration and liveness
//! - Punch ingestion with storage-level deduplication
//! - Daily aggregation into one summary per employee and date
//! - Leave overlay applied on approval
//! - Enrollment migration between terminals with audit trail
//!
//! Components report what they do through an injected [`EngineObserver`].

pub mod aggregate;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod leave;
pub mod locks;
pub mod migration;
pub mod observe;
pub mod registry;
pub mod report;
pub mod storage;

pub use engine::Engine;
pub use error::{EngineError, ErrorKind};
pub use observe::{EngineEvent, EngineObserver, MemoryObserver, TracingObserver};
