//! # Error Types
//!
//! Session start failures are fatal and surfaced to the caller. Frame faults
//! are recovered locally by the placement controller. Catalog and config
//! errors happen before a session exists.

use std::path::PathBuf;

use mirage_shared::AnchorKey;
use thiserror::Error;

/// Errors returned by [`TrackingSession::start`](crate::TrackingSession::start).
///
/// Whatever the variant, no partially acquired resource is left held.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Camera permission denied or the device is busy.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// The tracking engine rejected its configuration.
    #[error("tracking engine initialization failed: {0}")]
    EngineInitFailed(String),

    /// `start()` was called on a session that is already running.
    #[error("tracking session is already running")]
    AlreadyRunning,
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// A malformed pose event. Discarded for the current tick only.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum FrameFault {
    /// A position or orientation component is NaN or infinite.
    #[error("non-finite pose for {0}")]
    NonFinite(AnchorKey),

    /// The orientation is not a unit quaternion.
    #[error("orientation for {key} is not unit length (|q|^2 = {norm_squared})")]
    Denormalized {
        /// Offending anchor.
        key: AnchorKey,
        /// Observed squared norm.
        norm_squared: f32,
    },

    /// The key does not belong to the active tracking mode.
    #[error("{0} is not valid in the active tracking mode")]
    ModeMismatch(AnchorKey),

    /// Marker index outside the loaded catalog.
    #[error("marker index {index} outside catalog of {catalog_len}")]
    UnknownMarker {
        /// Reported index.
        index: u16,
        /// Number of catalog entries.
        catalog_len: usize,
    },
}

/// Errors loading a target descriptor.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Descriptor could not be read.
    #[error("failed to read target descriptor {path}: {source}")]
    Io {
        /// Descriptor path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Descriptor is not valid TOML or has the wrong shape.
    #[error("malformed target descriptor: {0}")]
    Parse(#[from] toml::de::Error),

    /// Descriptor lists no targets.
    #[error("target descriptor lists no targets")]
    Empty,

    /// Two targets share a name.
    #[error("duplicate target name: {0}")]
    DuplicateName(String),

    /// Physical width is zero, negative or not finite.
    #[error("target {name} has invalid physical width {width_m}")]
    InvalidWidth {
        /// Target name.
        name: String,
        /// Declared width in meters.
        width_m: f32,
    },

    /// More targets than a marker index can address.
    #[error("target descriptor lists {0} targets, more than a marker index can address")]
    TooManyTargets(usize),
}

/// Result type for catalog loading.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors loading the runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Config is not valid TOML or has the wrong shape.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The referenced target descriptor failed to load.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Marker mode configured without a target descriptor.
    #[error("marker mode requires `session.catalog`")]
    MissingCatalog,
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
