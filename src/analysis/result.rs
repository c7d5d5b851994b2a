//! Analysis outcome types and the severity/recommendation rules.
//!
//! The rules mirror what the remote detector applies server-side; the offline
//! analyzer uses them directly and the CLI uses [`Severity::risk_level`] to
//! label results that arrived without a recommendation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::data::base64_bytes;
use crate::state::settings::UnitSystem;

/// Nominal physical size of one image pixel, in millimetres
pub const MM_PER_PIXEL: f64 = 0.5;

const MM_PER_INCH: f64 = 25.4;

/// Outcome of one analysis attempt. Exactly one variant is populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    NoCrack,
    NonStructuralFeature {
        reason: String,
    },
    StructuralCrack {
        severity: Severity,
        metrics: CrackMetrics,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recommendation: Option<Recommendation>,
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "base64_bytes::option"
        )]
        overlay_image: Option<Vec<u8>>,
    },
}

impl AnalysisResult {
    pub fn is_structural(&self) -> bool {
        matches!(self, AnalysisResult::StructuralCrack { .. })
    }

    /// Risk level shown to the user: the recommendation's when present,
    /// otherwise derived from severity. `None` when no crack was found.
    pub fn risk_level(&self) -> Option<RiskLevel> {
        match self {
            AnalysisResult::StructuralCrack {
                severity,
                recommendation,
                ..
            } => Some(
                recommendation
                    .as_ref()
                    .map(|r| r.risk_level)
                    .unwrap_or_else(|| severity.risk_level()),
            ),
            _ => None,
        }
    }

    /// Drop the recommendation, if any
    pub fn without_recommendation(self) -> Self {
        match self {
            AnalysisResult::StructuralCrack {
                severity,
                metrics,
                overlay_image,
                ..
            } => AnalysisResult::StructuralCrack {
                severity,
                metrics,
                recommendation: None,
                overlay_image,
            },
            other => other,
        }
    }

    /// One-line summary for listings
    pub fn summary(&self) -> String {
        match self {
            AnalysisResult::NoCrack => "no crack detected".to_string(),
            AnalysisResult::NonStructuralFeature { reason } => {
                format!("non-structural feature ({})", reason)
            }
            AnalysisResult::StructuralCrack {
                severity, metrics, ..
            } => format!(
                "{} crack, {} ({:.0}px long)",
                severity, metrics.orientation, metrics.length_pixels
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Moderate,
    Severe,
    Critical,
}

impl Severity {
    /// Classify from crack dimensions in pixels
    pub fn classify(width_px: f64, length_px: f64) -> Self {
        if width_px < 1.5 && length_px < 80.0 {
            Severity::Low
        } else if width_px < 3.0 && length_px < 200.0 {
            Severity::Moderate
        } else if width_px < 6.0 {
            Severity::Severe
        } else {
            Severity::Critical
        }
    }

    pub fn risk_level(self) -> RiskLevel {
        match self {
            Severity::Low => RiskLevel::Low,
            Severity::Moderate => RiskLevel::Medium,
            Severity::Severe => RiskLevel::High,
            Severity::Critical => RiskLevel::Critical,
        }
    }

    /// Standard engineering recommendation for this severity
    pub fn recommendation(self) -> Recommendation {
        let (action, time, engineer) = match self {
            Severity::Low => ("Seal crack and monitor", "1-2 days", false),
            Severity::Moderate => ("Epoxy injection or surface repair", "3-7 days", true),
            Severity::Severe => ("Structural strengthening required", "2-4 weeks", true),
            Severity::Critical => (
                "Immediate evacuation and full structural assessment",
                "1-3 months",
                true,
            ),
        };

        Recommendation {
            risk_level: self.risk_level(),
            recommended_action: action.to_string(),
            engineer_required: engineer,
            estimated_repair_time: Some(time.to_string()),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
            Severity::Critical => "Critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Vertical,
    Horizontal,
    Diagonal,
    Irregular,
}

impl Orientation {
    /// Lenient parse used for detector responses; unknown labels are irregular
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "vertical" => Orientation::Vertical,
            "horizontal" => Orientation::Horizontal,
            "diagonal" => Orientation::Diagonal,
            _ => Orientation::Irregular,
        }
    }

    /// Typical crack pattern for this orientation
    pub fn pattern(self) -> &'static str {
        match self {
            Orientation::Vertical => "Shrinkage / load-induced crack",
            Orientation::Horizontal => "Settlement crack",
            Orientation::Diagonal => "Shear / structural crack",
            Orientation::Irregular => "Non-structural",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Orientation::Vertical => "vertical",
            Orientation::Horizontal => "horizontal",
            Orientation::Diagonal => "diagonal",
            Orientation::Irregular => "irregular",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrackMetrics {
    pub length_pixels: f64,
    pub width_pixels: f64,
    pub orientation: Orientation,
    pub pattern: String,
    /// Estimated real-world size in the configured unit system
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical: Option<PhysicalSize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSize {
    pub length: f64,
    pub width: f64,
    pub unit: UnitSystem,
}

impl PhysicalSize {
    /// Convert pixel measurements using [`MM_PER_PIXEL`], rounded to 2 decimals
    pub fn from_pixels(length_px: f64, width_px: f64, unit: UnitSystem) -> Self {
        let scale = match unit {
            UnitSystem::Metric => MM_PER_PIXEL,
            UnitSystem::Imperial => MM_PER_PIXEL / MM_PER_INCH,
        };

        Self {
            length: round2(length_px * scale),
            width: round2(width_px * scale),
            unit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub risk_level: RiskLevel,
    pub recommended_action: String,
    pub engineer_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_repair_time: Option<String>,
}

pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
