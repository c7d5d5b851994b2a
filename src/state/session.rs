//! Session state machine
//!
//! Owns the current image and the current result. Transitions:
//!
//! ```text
//! Idle -> Validating -> Ready -> Analyzing -> Complete | Error
//! ```
//!
//! `Complete` and `Error` only move on when a new image is selected (or on
//! `reset`). While `Analyzing`, a second `start_analysis` is a no-op and a
//! new selection is refused, so a late answer can never land on the wrong
//! image.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::data::{Image, Record, RecordClock};
use super::history::History;
use super::records::RecordStore;
use super::settings::Settings;
use crate::analysis::{AnalysisGateway, AnalysisResult};
use crate::error::{Error, Result};
use crate::media::loader;

/// Where a completed result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    /// Computed in this session
    Analysis,
    /// Loaded from history for display
    History,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Validating,
    Ready,
    Analyzing,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No image held; nothing to analyze
    Idle,
    /// An image is being read or checked
    Validating,
    /// Image held, no result yet
    Ready { image: Image },
    Analyzing { image: Image },
    Complete {
        image: Image,
        result: AnalysisResult,
        /// Id of the persisted record, `None` if persisting failed
        record_id: Option<String>,
        /// Non-blocking problem to surface next to the result
        warning: Option<String>,
        source: ResultSource,
    },
    Error { cause: Error },
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Validating => SessionPhase::Validating,
            SessionState::Ready { .. } => SessionPhase::Ready,
            SessionState::Analyzing { .. } => SessionPhase::Analyzing,
            SessionState::Complete { .. } => SessionPhase::Complete,
            SessionState::Error { .. } => SessionPhase::Error,
        }
    }

    pub fn image(&self) -> Option<&Image> {
        match self {
            SessionState::Ready { image }
            | SessionState::Analyzing { image }
            | SessionState::Complete { image, .. } => Some(image),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            SessionState::Complete { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Whether `start_analysis` would submit anything right now
    pub fn can_analyze(&self) -> bool {
        matches!(
            self,
            SessionState::Ready { .. } | SessionState::Complete { .. }
        )
    }

    fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::Validating | SessionState::Analyzing { .. }
        )
    }
}

/// Fresh ids tried when a record id is already taken
const PUT_ATTEMPTS: u32 = 8;

struct Inner {
    state: SessionState,
    /// Bumped on every selection and reset; work started under an older
    /// epoch must not touch the state
    epoch: u64,
}

pub struct Session {
    inner: Mutex<Inner>,
    gateway: AnalysisGateway,
    records: RecordStore,
    history: Arc<History>,
    settings: Arc<Settings>,
    clock: RecordClock,
}

impl Session {
    pub fn new(
        gateway: AnalysisGateway,
        records: RecordStore,
        history: Arc<History>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                epoch: 0,
            }),
            gateway,
            records,
            history,
            settings,
            clock: RecordClock::new(),
        }
    }

    /// Snapshot of the current state
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state.clone()
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.state.phase()
    }

    pub fn history(&self) -> &Arc<History> {
        &self.history
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    /// Hold `image` for analysis.
    ///
    /// On rejection the previous state is kept and `InvalidInput` returned.
    pub async fn select_image(&self, image: Image) -> Result<()> {
        let (previous, epoch) = self.begin_selection().await?;
        self.finish_selection(previous, epoch, Ok(image)).await
    }

    /// Read an image file and hold it for analysis
    pub async fn select_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let (previous, epoch) = self.begin_selection().await?;
        let loaded = loader::load_image(path.as_ref()).await;
        self.finish_selection(previous, epoch, loaded).await
    }

    async fn begin_selection(&self) -> Result<(SessionState, u64)> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_busy() {
            return Err(Error::Busy);
        }
        inner.epoch += 1;
        let previous = std::mem::replace(&mut inner.state, SessionState::Validating);
        Ok((previous, inner.epoch))
    }

    async fn finish_selection(
        &self,
        previous: SessionState,
        epoch: u64,
        loaded: Result<Image>,
    ) -> Result<()> {
        let checked = loaded.and_then(|image| image.check_admissible().map(|_| image));

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            // Reset while the file was being read
            return checked.map(|_| ());
        }

        match checked {
            Ok(image) => {
                tracing::info!(
                    bytes = image.bytes.len(),
                    media_type = %image.media_type,
                    "📷 Image ready for analysis"
                );
                inner.state = SessionState::Ready { image };
                Ok(())
            }
            Err(e) => {
                tracing::warn!("⚠️  Image rejected: {}", e);
                inner.state = previous;
                Err(e)
            }
        }
    }

    /// Submit the held image. Returns the state the session settled in.
    ///
    /// - already analyzing: no-op, returns the current state
    /// - no image held: `NoImageSelected`
    /// - gateway failure: `Error` state, nothing persisted
    /// - success: record persisted (best effort), history refreshed, `Complete`
    pub async fn start_analysis(&self) -> Result<SessionState> {
        let (image, epoch) = {
            let mut inner = self.inner.lock().await;
            let image = match &inner.state {
                SessionState::Analyzing { .. } => {
                    tracing::debug!("analysis already in flight, ignoring trigger");
                    return Ok(inner.state.clone());
                }
                SessionState::Validating => return Err(Error::Busy),
                SessionState::Ready { image } | SessionState::Complete { image, .. } => {
                    image.clone()
                }
                SessionState::Idle | SessionState::Error { .. } => {
                    return Err(Error::NoImageSelected)
                }
            };
            inner.state = SessionState::Analyzing {
                image: image.clone(),
            };
            (image, inner.epoch)
        };

        // Captured by value: later settings edits only affect the next run
        let config = self.settings.current().await;
        let outcome = self.gateway.analyze(&image, config).await;

        match outcome {
            Ok(result) => self.complete(image, result, epoch).await,
            Err(cause) => {
                let mut inner = self.inner.lock().await;
                if inner.epoch == epoch {
                    tracing::warn!("❌ Session failed: {}", cause);
                    inner.state = SessionState::Error { cause };
                }
                Ok(inner.state.clone())
            }
        }
    }

    async fn complete(
        &self,
        image: Image,
        result: AnalysisResult,
        epoch: u64,
    ) -> Result<SessionState> {
        if self.inner.lock().await.epoch != epoch {
            tracing::info!("session was reset during analysis, discarding result");
            return Ok(self.state().await);
        }

        let mut warnings = Vec::new();
        let record_id = match self.persist(&image, &result).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("⚠️  Result not saved to history: {}", e);
                warnings.push(format!("result not saved to history: {}", e));
                None
            }
        };

        if let Err(e) = self.history.refresh().await {
            tracing::warn!("⚠️  History refresh failed: {}", e);
            warnings.push(format!("history could not be refreshed: {}", e));
        }

        let mut inner = self.inner.lock().await;
        if inner.epoch == epoch {
            inner.state = SessionState::Complete {
                image,
                result,
                record_id,
                warning: (!warnings.is_empty()).then(|| warnings.join("; ")),
                source: ResultSource::Analysis,
            };
        }
        Ok(inner.state.clone())
    }

    /// Write a new record, taking a fresh id if another writer got there first
    async fn persist(&self, image: &Image, result: &AnalysisResult) -> Result<String> {
        if let Some(latest) = self.history.latest().await {
            self.clock.observe(latest.timestamp);
        }

        let mut attempts = 0;
        loop {
            let (id, timestamp) = self.clock.next();
            let record = Record {
                id,
                timestamp,
                image: image.clone(),
                result: result.clone(),
            };

            match self.records.put(&record).await {
                Ok(()) => return Ok(record.id),
                Err(Error::DuplicateRecord(id)) if attempts < PUT_ATTEMPTS => {
                    tracing::debug!(id = %id, "record id taken, retrying");
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Display a stored record. No analysis runs and no record is created.
    pub async fn show_record(&self, record: Record) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_busy() {
            return Err(Error::Busy);
        }
        inner.epoch += 1;
        inner.state = SessionState::Complete {
            image: record.image,
            result: record.result,
            record_id: Some(record.id),
            warning: None,
            source: ResultSource::History,
        };
        Ok(())
    }

    /// Clear the warning shown next to a completed result
    pub async fn dismiss_warning(&self) {
        if let SessionState::Complete { warning, .. } = &mut self.inner.lock().await.state {
            *warning = None;
        }
    }

    /// Drop any held image or result and go back to `Idle`
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.epoch += 1;
        inner.state = SessionState::Idle;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("gateway", &self.gateway)
            .field("records", &self.records)
            .finish()
    }
}
