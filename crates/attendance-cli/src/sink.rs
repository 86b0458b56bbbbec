use crate::evidence::{captured_info, photo_attachment};
use attendance_api::{ApiClient, AttendanceType, Gps, LogEntry, LogSource};
use attendance_scan::{CommitError, CommitReceipt, CommitRequest, CommitSink};

/// Commits stabilized face matches as `saveManualLog` entries.
pub struct ApiCommitSink<'a> {
    pub client: &'a ApiClient,
    pub kind: AttendanceType,
    pub device: String,
    pub gps: Option<Gps>,
}

pub fn face_log_entry(sink: &ApiCommitSink<'_>, request: &CommitRequest) -> LogEntry {
    let mut entry = LogEntry::new(&request.employee_code, sink.kind, LogSource::Face, &sink.device);
    entry.note = format!(
        "face match {} (distance {:.3})",
        request.candidate.full_name, request.candidate.distance
    );
    entry.gps = sink.gps;
    entry.captured = request.evidence.as_ref().map(captured_info);
    entry
}

impl CommitSink for ApiCommitSink<'_> {
    async fn commit(&self, request: CommitRequest) -> Result<CommitReceipt, CommitError> {
        let entry = face_log_entry(self, &request);
        let photo = request.evidence.map(photo_attachment);

        match self.client.save_log(&entry, photo, None).await {
            Ok(saved) => Ok(CommitReceipt {
                recorded_at: saved.recorded_at,
                slot: saved.slot,
                raw: saved.raw,
            }),
            Err(e) if e.is_domain() => Err(CommitError::Rejected(e.to_string())),
            Err(e) => Err(CommitError::Transport(e.to_string())),
        }
    }
}
