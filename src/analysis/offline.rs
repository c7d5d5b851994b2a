//! Offline crack detector
//!
//! Produces plausible verdicts without a server. Everything random comes from
//! one seedable generator, so a fixed seed replays the same sequence of
//! results for the same sequence of configurations.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use super::result::{round2, AnalysisResult, CrackMetrics, Orientation, PhysicalSize, Severity};
use super::CrackAnalyzer;
use crate::error::Result;
use crate::state::data::Image;
use crate::state::settings::{AnalysisConfiguration, Sensitivity};

/// Width of the probability band, above the detection band, that yields a
/// non-structural feature instead of a crack
const NON_STRUCTURAL_BAND: f64 = 0.15;

const NON_STRUCTURAL_REASONS: [&str; 4] = [
    "Surface stain or discoloration",
    "Paint or plaster surface crazing",
    "Formwork joint line",
    "Shadow or texture edge",
];

const ORIENTATIONS: [Orientation; 4] = [
    Orientation::Vertical,
    Orientation::Horizontal,
    Orientation::Diagonal,
    Orientation::Irregular,
];

pub struct OfflineAnalyzer {
    rng: Mutex<StdRng>,
}

impl OfflineAnalyzer {
    /// Reproducible analyzer
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Analyzer seeded from OS entropy
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Chance that an image is reported as containing a crack
    pub fn detection_probability(sensitivity: Sensitivity) -> f64 {
        match sensitivity {
            Sensitivity::Low => 0.45,
            Sensitivity::Medium => 0.65,
            Sensitivity::High => 0.85,
        }
    }

    fn generate(&self, config: &AnalysisConfiguration) -> AnalysisResult {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());

        let roll: f64 = rng.gen();
        let detect = Self::detection_probability(config.sensitivity);

        if roll >= detect + NON_STRUCTURAL_BAND {
            return AnalysisResult::NoCrack;
        }

        if roll >= detect {
            let reason = NON_STRUCTURAL_REASONS[rng.gen_range(0..NON_STRUCTURAL_REASONS.len())];
            return AnalysisResult::NonStructuralFeature {
                reason: reason.to_string(),
            };
        }

        let length_pixels = round2(rng.gen_range(20.0..480.0));
        let width_pixels = round2(rng.gen_range(0.5..9.0));
        let orientation = ORIENTATIONS[rng.gen_range(0..ORIENTATIONS.len())];
        let severity = Severity::classify(width_pixels, length_pixels);

        AnalysisResult::StructuralCrack {
            severity,
            metrics: CrackMetrics {
                length_pixels,
                width_pixels,
                orientation,
                pattern: orientation.pattern().to_string(),
                physical: Some(PhysicalSize::from_pixels(
                    length_pixels,
                    width_pixels,
                    config.unit,
                )),
            },
            recommendation: config
                .include_recommendations
                .then(|| severity.recommendation()),
            overlay_image: None,
        }
    }
}

impl Default for OfflineAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CrackAnalyzer for OfflineAnalyzer {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn analyze(&self, _image: &Image, config: &AnalysisConfiguration) -> Result<AnalysisResult> {
        Ok(self.generate(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::settings::UnitSystem;

    fn image() -> Image {
        Image::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg")
    }

    async fn run(analyzer: &OfflineAnalyzer, config: AnalysisConfiguration, n: usize) -> Vec<AnalysisResult> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(analyzer.analyze(&image(), &config).await.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_same_seed_same_results() {
        let config = AnalysisConfiguration::default();
        let a = run(&OfflineAnalyzer::with_seed(42), config, 25).await;
        let b = run(&OfflineAnalyzer::with_seed(42), config, 25).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_results_follow_configuration() {
        let config = AnalysisConfiguration {
            sensitivity: Sensitivity::High,
            unit: UnitSystem::Imperial,
            include_recommendations: false,
        };
        let results = run(&OfflineAnalyzer::with_seed(7), config, 50).await;

        let mut cracks = 0;
        for result in &results {
            if let AnalysisResult::StructuralCrack {
                severity,
                metrics,
                recommendation,
                ..
            } = result
            {
                cracks += 1;
                assert!(recommendation.is_none());
                assert_eq!(metrics.physical.unwrap().unit, UnitSystem::Imperial);
                assert_eq!(
                    *severity,
                    Severity::classify(metrics.width_pixels, metrics.length_pixels)
                );
                assert_eq!(metrics.pattern, metrics.orientation.pattern());
            }
        }
        // 85% detection over 50 draws; zero would mean the band is broken
        assert!(cracks > 0);
    }

    #[tokio::test]
    async fn test_recommendation_matches_severity() {
        let config = AnalysisConfiguration::default();
        for result in run(&OfflineAnalyzer::with_seed(3), config, 40).await {
            if let AnalysisResult::StructuralCrack {
                severity,
                recommendation,
                ..
            } = &result
            {
                let rec = recommendation.as_ref().unwrap();
                assert_eq!(rec.risk_level, severity.risk_level());
            }
        }
    }

    #[test]
    fn test_sensitivity_raises_detection() {
        assert!(
            OfflineAnalyzer::detection_probability(Sensitivity::High)
                > OfflineAnalyzer::detection_probability(Sensitivity::Low)
        );
    }
}
