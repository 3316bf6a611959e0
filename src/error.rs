use std::path::PathBuf;
use thiserror::Error;

/// A specialized `Result` type for automation operations.
pub type PilotResult<T> = Result<T, PilotError>;

/// The error type for all automation operations.
///
/// Configuration mistakes (unknown references, missing template assets,
/// malformed paths) are hard failures. A template that simply is not
/// visible on screen is *not* an error; the matcher reports that as an
/// absent point with a confidence score.
#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Key '{path}' already exists. Pass allow_overwrite to replace it.")]
    KeyConflict { path: String },

    #[error("Cannot set '{path}': segment '{segment}' is not a container")]
    NotAContainer { path: String, segment: String },

    #[error("Clickmap entry '{path}' not found")]
    EntryNotFound { path: String },

    #[error("Clickmap entry '{path}' is not a usable leaf object: {reason}")]
    MalformedEntry { path: String, reason: String },

    #[error("Unknown region_ref '{reference}' (no entry under _shared_match_regions)")]
    UnknownRegionRef { reference: String },

    #[error("Entry '{path}' carries both match_region and region_ref; supply exactly one")]
    AmbiguousRegion { path: String },

    #[error("Entry '{path}' has neither match_region nor region_ref")]
    MissingRegion { path: String },

    #[error("Region for '{path}' lies outside the {width}x{height} screenshot")]
    RegionOutOfBounds {
        path: String,
        width: u32,
        height: u32,
    },

    #[error("Template {path:?} is larger than its padded search region")]
    TemplateLargerThanRegion { path: PathBuf },

    #[error("Template not found: {path:?}")]
    TemplateNotFound { path: PathBuf },

    #[error("Failed to load template {path:?}: {reason}")]
    TemplateLoadFailed { path: PathBuf, reason: String },

    #[error("Unknown detector '{name}' referenced by '{path}'")]
    UnknownDetector { name: String, path: String },

    #[error("Multiple primary states matched in one frame: {first} and {second}")]
    MultiplePrimaryStates { first: String, second: String },

    #[error("State definitions invalid: {reason}")]
    InvalidStateDefinitions { reason: String },

    #[error("'{value}' is not a valid run state")]
    InvalidRunState { value: String },

    #[error("'{value}' is not a valid execution mode")]
    InvalidExecMode { value: String },

    #[error("Input dispatcher is stopped; request dropped")]
    DispatcherStopped,

    #[error("Device command '{command}' failed: {reason}")]
    DeviceCommand { command: String, reason: String },

    #[error("Screenshot capture produced undecodable data: {reason}")]
    ScreenshotDecodeFailed { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PilotError {
    /// True for errors that indicate a broken configuration rather than a
    /// transient device or detection condition.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            PilotError::KeyConflict { .. }
                | PilotError::NotAContainer { .. }
                | PilotError::EntryNotFound { .. }
                | PilotError::MalformedEntry { .. }
                | PilotError::UnknownRegionRef { .. }
                | PilotError::AmbiguousRegion { .. }
                | PilotError::MissingRegion { .. }
                | PilotError::TemplateNotFound { .. }
                | PilotError::TemplateLoadFailed { .. }
                | PilotError::UnknownDetector { .. }
                | PilotError::InvalidStateDefinitions { .. }
        )
    }
}
