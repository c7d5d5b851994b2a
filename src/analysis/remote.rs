//! HTTP crack detector client
//!
//! `POST <endpoint>/analyze` with a multipart body: the image as part `file`,
//! plus `sensitivity`, `unit` and `include_recommendations` text parts. The
//! server is authoritative; this side only maps its answer.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::multipart;
use serde::Deserialize;
use std::time::Duration;

use super::result::{
    round2, AnalysisResult, CrackMetrics, Orientation, PhysicalSize, Recommendation, RiskLevel,
    Severity,
};
use super::CrackAnalyzer;
use crate::error::{Error, Result};
use crate::state::data::Image;
use crate::state::settings::AnalysisConfiguration;

/// Default detector endpoint (the reference server listens here)
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000";

pub struct RemoteAnalyzer {
    /// Base URL, without the `/analyze` path
    endpoint: String,
    /// HTTP client
    client: reqwest::Client,
}

impl RemoteAnalyzer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::unavailable(format!("could not build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn analyze_url(&self) -> String {
        format!("{}/analyze", self.endpoint.trim_end_matches('/'))
    }

    fn build_form(image: &Image, config: &AnalysisConfiguration) -> Result<multipart::Form> {
        let file_name = image
            .file_name
            .clone()
            .unwrap_or_else(|| "upload".to_string());

        let part = multipart::Part::bytes(image.bytes.clone())
            .file_name(file_name)
            .mime_str(&image.media_type)
            .map_err(|e| Error::invalid(format!("bad media type '{}': {}", image.media_type, e)))?;

        Ok(multipart::Form::new()
            .part("file", part)
            .text("sensitivity", config.sensitivity.to_string())
            .text("unit", config.unit.to_string())
            .text(
                "include_recommendations",
                config.include_recommendations.to_string(),
            ))
    }
}

#[async_trait]
impl CrackAnalyzer for RemoteAnalyzer {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn analyze(&self, image: &Image, config: &AnalysisConfiguration) -> Result<AnalysisResult> {
        let form = Self::build_form(image, config)?;

        let response = self
            .client
            .post(self.analyze_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::unavailable(format!("request to {} timed out", self.endpoint))
                } else {
                    Error::unavailable(format!("could not reach {}: {}", self.endpoint, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::unavailable(format!(
                "detector answered with HTTP {}",
                status
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::unavailable(format!("could not read response: {}", e)))?;

        parse_response(&body, config)
    }
}

/// Response document from the detector
#[derive(Debug, Deserialize)]
struct WireResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    crack_analysis: Option<WireMetrics>,
    #[serde(default)]
    engineering_recommendation: Option<WireRecommendation>,
    /// Base64-encoded overlay, when the detector draws one
    #[serde(default)]
    overlay_image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMetrics {
    length_pixels: f64,
    width_pixels: f64,
    #[serde(default)]
    orientation: Option<String>,
    #[serde(default)]
    pattern: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRecommendation {
    risk_level: RiskLevel,
    recommended_action: String,
    engineer_required: bool,
    #[serde(default)]
    estimated_repair_time: Option<String>,
}

/// Map a detector response body onto an [`AnalysisResult`]
pub fn parse_response(body: &str, config: &AnalysisConfiguration) -> Result<AnalysisResult> {
    let wire: WireResponse = serde_json::from_str(body)
        .map_err(|e| Error::unavailable(format!("malformed detector response: {}", e)))?;

    let status = wire.status.trim().to_ascii_uppercase().replace(' ', "_");
    match status.as_str() {
        "NO_CRACK" | "NO_CRACK_DETECTED" => Ok(AnalysisResult::NoCrack),

        "NON_STRUCTURAL_FEATURE" => Ok(AnalysisResult::NonStructuralFeature {
            reason: wire
                .reason
                .or(wire.message)
                .unwrap_or_else(|| "feature judged non-structural".to_string()),
        }),

        "STRUCTURAL_CRACK_DETECTED" | "CRACK_DETECTED" => {
            let metrics = wire.crack_analysis.ok_or_else(|| {
                Error::unavailable("crack reported without crack_analysis")
            })?;
            let orientation = metrics
                .orientation
                .as_deref()
                .map(Orientation::from_label)
                .unwrap_or(Orientation::Irregular);
            let severity = wire
                .severity
                .unwrap_or_else(|| Severity::classify(metrics.width_pixels, metrics.length_pixels));

            let overlay_image = match wire.overlay_image {
                Some(encoded) => Some(STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                    Error::unavailable(format!("malformed overlay image: {}", e))
                })?),
                None => None,
            };

            let recommendation = wire.engineering_recommendation.map(|r| Recommendation {
                risk_level: r.risk_level,
                recommended_action: r.recommended_action,
                engineer_required: r.engineer_required,
                estimated_repair_time: r.estimated_repair_time,
            });

            Ok(AnalysisResult::StructuralCrack {
                severity,
                metrics: CrackMetrics {
                    length_pixels: round2(metrics.length_pixels),
                    width_pixels: round2(metrics.width_pixels),
                    orientation,
                    pattern: metrics
                        .pattern
                        .unwrap_or_else(|| orientation.pattern().to_string()),
                    physical: Some(PhysicalSize::from_pixels(
                        metrics.length_pixels,
                        metrics.width_pixels,
                        config.unit,
                    )),
                },
                recommendation,
                overlay_image,
            })
        }

        "ERROR" => Err(Error::unavailable(
            wire.message
                .unwrap_or_else(|| "detector reported an error".to_string()),
        )),

        other => Err(Error::unavailable(format!(
            "unknown detector status '{}'",
            other
        ))),
    }
}
