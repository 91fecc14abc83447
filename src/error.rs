// ============================================================================
// ERRORS - everything a card can report to its caller
// ============================================================================

use std::path::PathBuf;

/// Errors raised while building, rendering or exporting a card.
#[derive(Debug)]
pub enum CardError {
    /// The source photo could not be read or decoded. Fatal for the card.
    PhotoLoad { path: PathBuf, reason: String },
    /// The LUT could not be read, decoded or has the wrong shape.
    /// Recoverable: the card falls back to the neutral LUT.
    LutLoad { path: PathBuf, reason: String },
    /// The shading program failed validation on the GPU backend.
    ShaderProgram(String),
    /// The photo window is degenerate.
    InvalidInset(String),
    /// Writing the rendered card failed.
    Encode(String),
    Io(std::io::Error),
}

impl std::fmt::Display for CardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CardError::PhotoLoad { path, reason } => {
                write!(f, "Failed to load photo '{}': {}", path.display(), reason)
            }
            CardError::LutLoad { path, reason } => {
                write!(f, "Failed to load LUT '{}': {}", path.display(), reason)
            }
            CardError::ShaderProgram(e) => write!(f, "Shader program error: {}", e),
            CardError::InvalidInset(e) => write!(f, "Invalid inset: {}", e),
            CardError::Encode(e) => write!(f, "Encode error: {}", e),
            CardError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for CardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CardError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CardError {
    fn from(e: std::io::Error) -> Self {
        CardError::Io(e)
    }
}

impl From<image::ImageError> for CardError {
    fn from(e: image::ImageError) -> Self {
        CardError::Encode(e.to_string())
    }
}
