//! Shared data structures for the application state
//!
//! These structs represent the data model that flows between
//! the analysis layer, the session and the record store.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::analysis::AnalysisResult;
use crate::error::{Error, Result, MAX_IMAGE_BYTES};

/// An image held in memory for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Raw file contents
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    /// Declared media type (e.g., "image/jpeg")
    pub media_type: String,
    /// Declared byte size, as reported by whoever produced the image
    pub size: u64,
    /// Original file name, when the image came from disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Image {
    /// Build an image whose declared size matches its payload
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        let size = bytes.len() as u64;
        Self {
            bytes,
            media_type: media_type.into(),
            size,
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Client-side admission check: an `image/*` media type and a
    /// non-empty payload of at most [`MAX_IMAGE_BYTES`], both declared and actual.
    pub fn check_admissible(&self) -> Result<()> {
        if !self.media_type.to_ascii_lowercase().starts_with("image/") {
            return Err(Error::invalid(format!(
                "unsupported media type '{}', expected an image",
                self.media_type
            )));
        }

        let actual = self.bytes.len() as u64;
        if actual == 0 || self.size == 0 {
            return Err(Error::invalid("image is empty"));
        }

        let largest = self.size.max(actual);
        if largest > MAX_IMAGE_BYTES {
            return Err(Error::invalid(format!(
                "image is {:.1} MiB, limit is {} MiB",
                largest as f64 / 1024.0 / 1024.0,
                MAX_IMAGE_BYTES / 1024 / 1024
            )));
        }

        Ok(())
    }
}

/// One persisted analysis outcome. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Time-derived unique id, lexicographically ordered by creation
    pub id: String,
    /// Creation instant in milliseconds since the Unix epoch
    pub timestamp: i64,
    pub image: Image,
    pub result: AnalysisResult,
}

impl Record {
    /// Newest first; equal timestamps fall back to the id, also newest first
    pub fn newest_first(a: &Record, b: &Record) -> std::cmp::Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// Highest per-millisecond sequence number; the id keeps four digits
const MAX_SEQ: u32 = 9_999;

/// Hands out record ids and timestamps.
///
/// Timestamps never go backwards, even if the wall clock does; records
/// created within the same millisecond get increasing sequence numbers.
/// Once a millisecond runs out of sequence numbers the clock moves on to the
/// next one, so ids always sort in creation order.
#[derive(Debug, Default)]
pub struct RecordClock {
    last: Mutex<(i64, u32)>,
}

impl RecordClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `(id, timestamp)` for a new record
    pub fn next(&self) -> (String, i64) {
        self.next_at(Utc::now().timestamp_millis())
    }

    /// Never hand out an id at or before a record created at `timestamp`,
    /// e.g. one written by another process.
    pub fn observe(&self, timestamp: i64) {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if timestamp >= last.0 {
            *last = (timestamp, MAX_SEQ);
        }
    }

    fn next_at(&self, now_ms: i64) -> (String, i64) {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let (prev, seq) = *last;
        let (timestamp, seq) = if now_ms > prev {
            (now_ms, 0)
        } else if seq < MAX_SEQ {
            (prev, seq + 1)
        } else {
            (prev + 1, 0)
        };
        *last = (timestamp, seq);

        (format!("{:013}-{:04}", timestamp, seq), timestamp)
    }
}

/// Base64 encoding for byte payloads embedded in JSON records
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }

    pub mod option {
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match bytes {
                Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<u8>>, D::Error> {
            let encoded = Option::<String>::deserialize(deserializer)?;
            encoded
                .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_accepts_small_jpeg() {
        let image = Image::new(vec![0xFF; 2 * 1024 * 1024], "image/jpeg");
        assert!(image.check_admissible().is_ok());
    }

    #[test]
    fn test_admission_rejects_oversized_and_non_image() {
        let big = Image::new(vec![0; 15 * 1024 * 1024], "image/png");
        assert!(matches!(big.check_admissible(), Err(Error::InvalidInput(_))));

        let pdf = Image::new(vec![1, 2, 3], "application/pdf");
        assert!(matches!(pdf.check_admissible(), Err(Error::InvalidInput(_))));

        // Declared size counts too, even if the payload itself is small
        let mut lying = Image::new(vec![1, 2, 3], "image/png");
        lying.size = MAX_IMAGE_BYTES + 1;
        assert!(matches!(lying.check_admissible(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_admission_limit_is_inclusive() {
        let exact = Image::new(vec![0; MAX_IMAGE_BYTES as usize], "image/png");
        assert!(exact.check_admissible().is_ok());
    }

    #[test]
    fn test_clock_is_monotonic_within_same_millisecond() {
        let clock = RecordClock::new();
        let (a, ta) = clock.next_at(1_000);
        let (b, tb) = clock.next_at(1_000);
        let (c, tc) = clock.next_at(999); // wall clock stepped back

        assert_eq!(ta, 1_000);
        assert_eq!(tb, 1_000);
        assert_eq!(tc, 1_000);
        assert!(a < b && b < c);

        let (d, td) = clock.next_at(1_001);
        assert_eq!(td, 1_001);
        assert_eq!(d, "0000000001001-0000");
    }

    #[test]
    fn test_clock_rolls_over_to_next_millisecond() {
        let clock = RecordClock::new();
        let mut ids = Vec::new();
        for _ in 0..=MAX_SEQ + 1 {
            ids.push(clock.next_at(5_000));
        }

        let (last_id, last_ts) = ids.last().unwrap();
        assert_eq!(*last_ts, 5_001);
        assert_eq!(last_id, "0000000005001-0000");
        assert!(ids.iter().all(|(id, _)| id.len() == 18));
        assert!(ids.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_clock_skips_past_observed_records() {
        // A second process starting in the same millisecond as a stored record
        let first = RecordClock::new();
        let (stored, stored_ts) = first.next_at(1_700_000_000_000);

        let second = RecordClock::new();
        second.observe(stored_ts);
        let (id, ts) = second.next_at(1_700_000_000_000);

        assert_ne!(id, stored);
        assert!(id > stored);
        assert!(ts >= stored_ts);

        // Observing something older changes nothing
        second.observe(1);
        assert!(second.next_at(1_700_000_000_000).0 > id);
    }

    #[test]
    fn test_image_json_embeds_base64() {
        let image = Image::new(b"abc".to_vec(), "image/png").with_file_name("wall.png");
        let json = serde_json::to_string(&image).unwrap();
        assert!(json.contains("\"YWJj\""));

        let restored: Image = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, image);
    }
}
