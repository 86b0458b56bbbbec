//! Face sources: where per-tick descriptors come from.

use attendance_core::{Descriptor, DescriptorError};
use serde_json::Value;
use std::collections::VecDeque;
use std::future::Future;
use std::io::BufRead;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error("detector failed: {0}")]
    Detector(String),
}

/// Capability to sample the camera once and describe the face in view.
///
/// `Ok(None)` means no face was detected in the frame.
pub trait FaceSource: Send {
    fn sample(&mut self) -> impl Future<Output = Result<Option<Descriptor>, SourceError>> + Send;
}

/// Synchronous camera-plus-detector step. Expected to block for a frame.
pub trait SyncFaceSource: Send + 'static {
    fn sample_blocking(&mut self) -> Result<Option<Descriptor>, SourceError>;
}

/// Runs a [`SyncFaceSource`] on the blocking thread pool, one frame at a
/// time, so capture and inference never stall the async runtime.
pub struct BlockingSource<S> {
    inner: Arc<Mutex<S>>,
}

impl<S: SyncFaceSource> BlockingSource<S> {
    pub fn new(source: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(source)),
        }
    }
}

impl<S: SyncFaceSource> FaceSource for BlockingSource<S> {
    async fn sample(&mut self) -> Result<Option<Descriptor>, SourceError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .sample_blocking()
        })
        .await
        .map_err(|e| SourceError::Detector(format!("sampling task failed: {e}")))?
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ReplaySample {
    NoFace,
    Face(Descriptor),
    Error(String),
}

/// Replays prerecorded detector output from a JSON-lines file.
///
/// Each non-blank line is one sample: an array of numbers (a face
/// descriptor), `null` (no face), or `{"error": "..."}` (a detector failure).
/// Lines starting with `#` are ignored.
#[derive(Debug)]
pub struct ReplaySource {
    samples: Vec<ReplaySample>,
    pending: VecDeque<ReplaySample>,
    looping: bool,
}

impl ReplaySource {
    pub fn open(path: &Path, looping: bool) -> Result<Self, SourceError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file), looping)
    }

    pub fn from_reader<R: BufRead>(reader: R, looping: bool) -> Result<Self, SourceError> {
        let mut samples = Vec::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let line_no = idx + 1;
            let value: Value = serde_json::from_str(trimmed).map_err(|e| SourceError::Malformed {
                line: line_no,
                reason: e.to_string(),
            })?;
            samples.push(parse_sample(value).map_err(|reason| SourceError::Malformed {
                line: line_no,
                reason,
            })?);
        }

        tracing::debug!(samples = samples.len(), looping, "replay source loaded");

        Ok(Self {
            pending: samples.iter().cloned().collect(),
            samples,
            looping,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn parse_sample(value: Value) -> Result<ReplaySample, String> {
    match value {
        Value::Null => Ok(ReplaySample::NoFace),
        Value::Object(ref map) if map.contains_key("error") => {
            let message = match &map["error"] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(ReplaySample::Error(message))
        }
        Value::Array(_) => Descriptor::from_json(&value)
            .map(ReplaySample::Face)
            .map_err(|e: DescriptorError| e.to_string()),
        other => Err(format!("unexpected sample: {other}")),
    }
}

impl ReplaySource {
    fn next_sample(&mut self) -> Result<Option<Descriptor>, SourceError> {
        if self.pending.is_empty() && self.looping {
            self.pending.extend(self.samples.iter().cloned());
        }
        match self.pending.pop_front() {
            Some(ReplaySample::Face(d)) => Ok(Some(d)),
            Some(ReplaySample::Error(msg)) => Err(SourceError::Detector(msg)),
            Some(ReplaySample::NoFace) | None => Ok(None),
        }
    }
}

impl FaceSource for ReplaySource {
    async fn sample(&mut self) -> Result<Option<Descriptor>, SourceError> {
        self.next_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn face_line(v: f32) -> String {
        serde_json::to_string(&vec![v; 64]).unwrap()
    }

    #[tokio::test]
    async fn test_replay_sample_kinds() {
        let input = format!(
            "# recorded at the front desk\n{}\n\nnull\n{{\"error\": \"camera busy\"}}\n",
            face_line(0.5)
        );
        let mut src = ReplaySource::from_reader(Cursor::new(input), false).unwrap();
        assert_eq!(src.len(), 3);

        assert_eq!(src.sample().await.unwrap().map(|d| d.len()), Some(64));
        assert!(src.sample().await.unwrap().is_none());
        assert!(matches!(src.sample().await, Err(SourceError::Detector(m)) if m == "camera busy"));
        // Exhausted, not looping: no face from here on.
        assert!(src.sample().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replay_loops() {
        let input = format!("{}\nnull\n", face_line(0.1));
        let mut src = ReplaySource::from_reader(Cursor::new(input), true).unwrap();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(src.sample().await.unwrap().is_some());
        }
        assert_eq!(seen, vec![true, false, true, false, true]);
    }

    #[test]
    fn test_replay_rejects_bad_line() {
        let input = format!("{}\n[1.0, 2.0]\n", face_line(0.1));
        let err = ReplaySource::from_reader(Cursor::new(input), false).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { line: 2, .. }));

        let err = ReplaySource::from_reader(Cursor::new("not json\n"), false).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_replay_open_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", face_line(0.2)).unwrap();
        let mut src = ReplaySource::open(file.path(), false).unwrap();
        assert!(src.sample().await.unwrap().is_some());
    }

    struct ThreadRecorder {
        threads: Arc<Mutex<Vec<std::thread::ThreadId>>>,
    }

    impl SyncFaceSource for ThreadRecorder {
        fn sample_blocking(&mut self) -> Result<Option<Descriptor>, SourceError> {
            self.threads.lock().unwrap().push(std::thread::current().id());
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(Some(Descriptor::new(vec![0.0; 64])))
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_blocking_source_runs_off_runtime_thread() {
        let threads = Arc::new(Mutex::new(Vec::new()));
        let mut src = BlockingSource::new(ThreadRecorder {
            threads: threads.clone(),
        });

        assert!(src.sample().await.unwrap().is_some());
        assert!(src.sample().await.unwrap().is_some());

        let runtime_thread = std::thread::current().id();
        let seen = threads.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|id| *id != runtime_thread));
    }

    struct PanickingSource;

    impl SyncFaceSource for PanickingSource {
        fn sample_blocking(&mut self) -> Result<Option<Descriptor>, SourceError> {
            panic!("detector crashed");
        }
    }

    #[tokio::test]
    async fn test_blocking_source_panic_is_detector_error() {
        let mut src = BlockingSource::new(PanickingSource);
        assert!(matches!(src.sample().await, Err(SourceError::Detector(_))));
    }
}
