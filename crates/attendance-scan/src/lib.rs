//! attendance-scan — Scan session for face attendance.
//!
//! Samples a [`FaceSource`] on a fixed interval, matches each descriptor
//! against the shared employee cache, and hands a stabilized match to a
//! [`CommitSink`] on explicit request.

pub mod commit;
pub mod session;
pub mod source;

pub use commit::{CapturedEvidence, CommitError, CommitReceipt, CommitRequest, CommitSink};
pub use session::{ScanSession, SessionError, SCAN_INTERVAL};
pub use source::{BlockingSource, FaceSource, ReplaySource, SourceError, SyncFaceSource};
pub use tokio_util::sync::CancellationToken;
