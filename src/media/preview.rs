/// Export of stored records to disk
/// Writes the analyzed image, the overlay (if any) and the verdict as JSON
use image::ImageFormat;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::state::data::Record;
use crate::AnalysisResult;

/// Export a record into `dir`
/// Returns the paths of the written files
pub async fn export_record(record: Record, dir: PathBuf) -> Result<Vec<PathBuf>> {
    // Spawn blocking task for file I/O
    tokio::task::spawn_blocking(move || export_record_blocking(&record, &dir))
        .await
        .map_err(|e| Error::Io(format!("Task join error: {}", e)))?
}

/// Blocking version of the export
fn export_record_blocking(record: &Record, dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::new();

    let image_path = dir.join(format!(
        "{}.{}",
        record.id,
        extension_for(&record.image.media_type)
    ));
    write_file(&image_path, &record.image.bytes)?;
    written.push(image_path);

    if let AnalysisResult::StructuralCrack {
        overlay_image: Some(overlay),
        ..
    } = &record.result
    {
        let overlay_path = dir.join(format!("{}-overlay.png", record.id));
        write_file(&overlay_path, overlay)?;
        written.push(overlay_path);
    }

    let verdict_path = dir.join(format!("{}.json", record.id));
    let verdict = serde_json::json!({
        "id": record.id,
        "timestamp": record.timestamp,
        "media_type": record.image.media_type,
        "file_name": record.image.file_name,
        "result": record.result,
    });
    let json = serde_json::to_string_pretty(&verdict).map_err(|e| Error::Io(e.to_string()))?;
    write_file(&verdict_path, json.as_bytes())?;
    written.push(verdict_path);

    tracing::info!("📸 Exported record {} to {}", record.id, dir.display());
    Ok(written)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    Ok(())
}

/// File extension for a media type, "bin" when unknown
pub fn extension_for(media_type: &str) -> &'static str {
    ImageFormat::from_mime_type(media_type)
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

/// Default directory for exports
/// Returns ~/.local/share/crack-inspector/exports on Linux
pub fn default_export_dir() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    path.push("crack-inspector");
    path.push("exports");
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{CrackMetrics, Orientation, Severity};
    use crate::state::data::Image;

    fn record_with_overlay() -> Record {
        Record {
            id: "0000000001000-0000".to_string(),
            timestamp: 1000,
            image: Image::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "image/jpeg"),
            result: AnalysisResult::StructuralCrack {
                severity: Severity::Low,
                metrics: CrackMetrics {
                    length_pixels: 40.0,
                    width_pixels: 1.0,
                    orientation: Orientation::Vertical,
                    pattern: Orientation::Vertical.pattern().to_string(),
                    physical: None,
                },
                recommendation: None,
                overlay_image: Some(vec![0x89, b'P', b'N', b'G']),
            },
        }
    }

    #[tokio::test]
    async fn test_export_writes_all_parts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("exports");

        let written = export_record(record_with_overlay(), out.clone())
            .await
            .unwrap();

        assert_eq!(written.len(), 3);
        assert!(out.join("0000000001000-0000.jpg").exists());
        assert_eq!(
            fs::read(out.join("0000000001000-0000-overlay.png")).unwrap(),
            vec![0x89, b'P', b'N', b'G']
        );

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(out.join("0000000001000-0000.json")).unwrap())
                .unwrap();
        assert_eq!(json["result"]["kind"], "structural_crack");
        assert_eq!(json["result"]["severity"], "Low");
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/png"), "png");
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("application/x-unknown"), "bin");
    }
}
