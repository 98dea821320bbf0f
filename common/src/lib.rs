//! Common code shared between `detect_server` and `frame_sender`.
pub mod protocol;

/// Name of the multipart form field carrying the image.
pub const FILE_FIELD: &str = "file";
