/// State management module
///
/// This module handles all application state, including:
/// - The key-value store backends (library.rs, memory.rs)
/// - Shared data structures (data.rs)
/// - Record persistence under a key prefix (records.rs)
/// - The sorted history view (history.rs)
/// - The analysis session state machine (session.rs)
/// - Analysis parameters (settings.rs)

pub mod data;
pub mod history;
pub mod library;
pub mod memory;
pub mod records;
pub mod session;
pub mod settings;
