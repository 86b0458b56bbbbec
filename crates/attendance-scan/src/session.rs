use crate::commit::{CapturedEvidence, CommitError, CommitReceipt, CommitRequest, CommitSink};
use crate::source::FaceSource;
use attendance_core::{
    EmployeeCache, EuclideanMatcher, MatchCandidate, Matcher, Observation, ScanStatus,
    StabilizationState, Stabilizer, StabilizerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Delay between detection ticks while scanning.
pub const SCAN_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no stabilized match to commit")]
    NotLocked,
    #[error("commit failed: {0}")]
    Commit(#[from] CommitError),
}

/// One scanning session: a face source, the shared employee gallery and the
/// debounce state that turns per-frame matches into a lock.
pub struct ScanSession<S, M = EuclideanMatcher> {
    source: S,
    matcher: M,
    cache: Arc<EmployeeCache>,
    stabilizer: Stabilizer,
    interval: Duration,
    status_tx: watch::Sender<ScanStatus>,
}

impl<S: FaceSource> ScanSession<S> {
    pub fn new(source: S, cache: Arc<EmployeeCache>) -> Self {
        Self::with_matcher(source, EuclideanMatcher, cache, StabilizerConfig::default())
    }
}

impl<S: FaceSource, M: Matcher> ScanSession<S, M> {
    pub fn with_matcher(
        source: S,
        matcher: M,
        cache: Arc<EmployeeCache>,
        config: StabilizerConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(ScanStatus::Searching);
        Self {
            source,
            matcher,
            cache,
            stabilizer: Stabilizer::new(config),
            interval: SCAN_INTERVAL,
            status_tx,
        }
    }

    /// Change the tick interval. Zero is clamped to one millisecond.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval.max(Duration::from_millis(1));
    }

    /// Receive every status published by [`run`](Self::run).
    pub fn subscribe(&self) -> watch::Receiver<ScanStatus> {
        self.status_tx.subscribe()
    }

    pub fn state(&self) -> &StabilizationState {
        self.stabilizer.state()
    }

    pub fn locked(&self) -> Option<&MatchCandidate> {
        self.stabilizer.locked()
    }

    /// Drop all stabilization progress.
    pub fn reset(&mut self) {
        self.stabilizer.reset();
        self.status_tx.send_replace(ScanStatus::Searching);
    }

    /// Run one detection-and-match step to completion.
    pub async fn tick(&mut self) -> ScanStatus {
        let observation = self.observe_frame().await;
        self.apply(observation)
    }

    /// Sample the source and match the descriptor without touching the
    /// stabilizer.
    async fn observe_frame(&mut self) -> Observation {
        match self.source.sample().await {
            Ok(None) => Observation::NoFace,
            Ok(Some(descriptor)) => {
                let gallery = self.cache.snapshot();
                Observation::Face(self.matcher.nearest(&descriptor, &gallery))
            }
            Err(e) => {
                tracing::warn!(error = %e, "face detection failed; continuing scan");
                Observation::DetectorError(e.to_string())
            }
        }
    }

    fn apply(&mut self, observation: Observation) -> ScanStatus {
        let status = self.stabilizer.observe(observation);
        tracing::debug!(%status, count = self.stabilizer.state().consecutive_count, "scan tick");
        status
    }

    /// Scan until cancelled.
    pub async fn run(&mut self, cancel: &CancellationToken) {
        self.drive(cancel, false).await;
    }

    /// Scan until a candidate is locked, returning it, or `None` if cancelled.
    ///
    /// The lock stays held by the session; commit it with
    /// [`commit`](Self::commit).
    pub async fn run_until_ready(&mut self, cancel: &CancellationToken) -> Option<MatchCandidate> {
        self.drive(cancel, true).await
    }

    async fn drive(
        &mut self,
        cancel: &CancellationToken,
        stop_when_ready: bool,
    ) -> Option<MatchCandidate> {
        self.reset();
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            employees = self.cache.len(),
            "scan started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let observation = self.observe_frame().await;

            // A frame that completed after stop was requested is discarded
            // before it reaches the stabilizer.
            if cancel.is_cancelled() {
                break;
            }

            let status = self.apply(observation);
            let ready = status.is_ready();
            self.status_tx.send_replace(status);

            if stop_when_ready && ready {
                let locked = self.stabilizer.locked().cloned();
                if let Some(c) = &locked {
                    tracing::info!(code = %c.code, distance = c.distance, "match stabilized");
                }
                return locked;
            }
        }

        tracing::info!("scan stopped");
        None
    }

    /// Submit the locked candidate to `sink`.
    ///
    /// The stabilizer is reset whether or not the submission succeeds, so the
    /// same face must stabilize again before another commit.
    pub async fn commit<C: CommitSink>(
        &mut self,
        sink: &C,
        evidence: Option<CapturedEvidence>,
    ) -> Result<CommitReceipt, SessionError> {
        let candidate = self
            .stabilizer
            .locked()
            .cloned()
            .ok_or(SessionError::NotLocked)?;

        let request = CommitRequest {
            employee_code: candidate.code.clone(),
            candidate,
            evidence,
        };
        let code = request.employee_code.clone();

        let result = sink.commit(request).await;
        self.reset();

        match &result {
            Ok(receipt) => tracing::info!(
                code = %code,
                recorded_at = receipt.recorded_at.as_deref().unwrap_or("-"),
                "attendance committed"
            ),
            Err(e) => tracing::warn!(code = %code, error = %e, "attendance commit failed"),
        }

        Ok(result?)
    }
}
