use attendance_core::MatchCandidate;
use chrono::{DateTime, Utc};
use std::future::Future;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommitError {
    /// The backend answered and refused the record.
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("transport: {0}")]
    Transport(String),
}

/// Photo captured at the moment of commit, attached as evidence.
#[derive(Debug, Clone)]
pub struct CapturedEvidence {
    pub photo: Vec<u8>,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub employee_code: String,
    pub candidate: MatchCandidate,
    pub evidence: Option<CapturedEvidence>,
}

/// What the backend recorded.
#[derive(Debug, Clone, Default)]
pub struct CommitReceipt {
    pub recorded_at: Option<String>,
    pub slot: Option<String>,
    pub raw: serde_json::Value,
}

/// Destination for committed attendance records.
pub trait CommitSink {
    fn commit(
        &self,
        request: CommitRequest,
    ) -> impl Future<Output = Result<CommitReceipt, CommitError>> + Send;
}
