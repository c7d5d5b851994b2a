//! Analysis gateway
//!
//! The gateway is the only way the session reaches a crack detector:
//! - admission checks run locally, before any detector is contacted
//! - one attempt per call, no retries
//! - every detector failure comes back as [`Error::AnalysisUnavailable`]
//!
//! Detectors implement [`CrackAnalyzer`]: [`remote::RemoteAnalyzer`] talks to
//! the HTTP endpoint, [`offline::OfflineAnalyzer`] is a seeded stand-in.

pub mod offline;
pub mod remote;
pub mod result;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::state::data::Image;
use crate::state::settings::AnalysisConfiguration;

pub use offline::OfflineAnalyzer;
pub use remote::RemoteAnalyzer;
pub use result::{AnalysisResult, CrackMetrics, Orientation, Recommendation, RiskLevel, Severity};

/// Something that can turn an image and a configuration into a verdict.
#[async_trait]
pub trait CrackAnalyzer: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Run one analysis. Only called for images that passed admission.
    async fn analyze(&self, image: &Image, config: &AnalysisConfiguration) -> Result<AnalysisResult>;
}

#[derive(Clone)]
pub struct AnalysisGateway {
    analyzer: Arc<dyn CrackAnalyzer>,
}

impl AnalysisGateway {
    pub fn new(analyzer: Arc<dyn CrackAnalyzer>) -> Self {
        Self { analyzer }
    }

    pub fn analyzer_name(&self) -> &'static str {
        self.analyzer.name()
    }

    /// Analyze `image` with a configuration captured by value.
    pub async fn analyze(
        &self,
        image: &Image,
        config: AnalysisConfiguration,
    ) -> Result<AnalysisResult> {
        image.check_admissible()?;

        tracing::info!(
            analyzer = self.analyzer.name(),
            bytes = image.bytes.len(),
            media_type = %image.media_type,
            sensitivity = %config.sensitivity,
            "🔍 Submitting image for analysis"
        );

        let started = Instant::now();
        let result = self
            .analyzer
            .analyze(image, &config)
            .await
            .map_err(|e| match e {
                Error::AnalysisUnavailable { .. } => e,
                other => Error::unavailable(other.to_string()),
            });

        match result {
            Ok(result) => {
                let result = if config.include_recommendations {
                    result
                } else {
                    result.without_recommendation()
                };
                tracing::info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "✅ Analysis complete: {}",
                    result.summary()
                );
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "❌ Analysis failed: {}",
                    e
                );
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for AnalysisGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisGateway")
            .field("analyzer", &self.analyzer.name())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted analyzers for gateway and session tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    /// Returns queued outcomes in order and counts calls
    #[derive(Default)]
    pub struct ScriptedAnalyzer {
        outcomes: Mutex<VecDeque<Result<AnalysisResult>>>,
        pub calls: AtomicUsize,
        pub seen: Mutex<Vec<AnalysisConfiguration>>,
        /// When set, each call waits for a notification before answering
        pub gate: Option<Arc<Notify>>,
    }

    impl ScriptedAnalyzer {
        pub fn new(outcomes: Vec<Result<AnalysisResult>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                ..Default::default()
            }
        }

        pub fn gated(outcomes: Vec<Result<AnalysisResult>>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::new(outcomes)
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CrackAnalyzer for ScriptedAnalyzer {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn analyze(
            &self,
            _image: &Image,
            config: &AnalysisConfiguration,
        ) -> Result<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(*config);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(AnalysisResult::NoCrack))
        }
    }

    pub fn severe_crack() -> AnalysisResult {
        AnalysisResult::StructuralCrack {
            severity: Severity::Severe,
            metrics: CrackMetrics {
                length_pixels: 240.0,
                width_pixels: 4.2,
                orientation: Orientation::Diagonal,
                pattern: Orientation::Diagonal.pattern().to_string(),
                physical: None,
            },
            recommendation: Some(Severity::Severe.recommendation()),
            overlay_image: None,
        }
    }
}
