use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Unsupported imposition count: {0}")]
    UnsupportedNup(u32),

    #[error("Rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(i32),

    #[error("Invalid page range: {0}")]
    InvalidRange(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Dangling reference to object {0} {1} R")]
    DanglingReference(u32, u16),

    #[error("Object {0} {1} was written twice")]
    DuplicateObject(u32, u16),

    #[error("Object {0} {1} was allocated but never written")]
    UnwrittenObject(u32, u16),

    #[error("Malformed document structure: {0}")]
    Structure(String),

    #[error("Content stream error: {0}")]
    Stream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RewriteError>;

impl RewriteError {
    /// Errors reported before any state was touched; the caller may retry.
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedNup(_)
                | Self::InvalidRotation(_)
                | Self::InvalidRange(_)
                | Self::InvalidParameter(_)
        )
    }

    /// Errors that abort `output()`; whatever was written must be discarded.
    pub fn is_fatal(&self) -> bool {
        !self.is_invalid_parameter()
    }
}
