//! Structural crack assessment client.
//!
//! The crate sequences image selection, delegates analysis to a remote (or
//! offline) crack detector, persists each successful outcome as an immutable
//! [`Record`] in a namespaced key-value store, and keeps a sorted history view
//! in step with that store.
//!
//! - [`state`] - session state machine, history, settings and persistence
//! - [`analysis`] - analysis gateway and its collaborators
//! - [`media`] - reading images from disk and exporting stored ones

pub mod analysis;
pub mod config;
pub mod error;
pub mod media;
pub mod state;

pub use analysis::{AnalysisGateway, AnalysisResult, CrackAnalyzer};
pub use error::{Error, Result, MAX_IMAGE_BYTES};
pub use state::data::{Image, Record};
pub use state::history::History;
pub use state::session::{Session, SessionState};
pub use state::settings::{AnalysisConfiguration, Settings};
