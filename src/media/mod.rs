/// Image file handling
///
/// This module handles:
/// - Reading an image file into memory for a session
/// - Detecting its media type from content or extension
/// - Exporting stored images and overlays back to disk

pub mod loader;
pub mod preview;
