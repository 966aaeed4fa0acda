//! Runtime configuration, loaded once at startup.
//!
//! ```toml
//! [session]
//! mode = "marker"              # or "surface_hit_test"
//! catalog = "targets.toml"     # relative to this file
//!
//! [render]
//! target_fps = 60
//! frame_budget_us = 16666
//! spin_radians_per_tick = 0.01
//!
//! [validation]
//! norm_tolerance = 0.001
//!
//! [engine]
//! frame_queue_capacity = 4
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::catalog::TargetCatalog;
use crate::engine::{SessionConfig, TrackingMode};
use crate::error::{ConfigError, ConfigResult};
use crate::placement::PoseValidation;
use crate::scheduler::RenderLoopConfig;
use crate::session::DEFAULT_FRAME_QUEUE_CAPACITY;

/// `[session]` section.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Tracking pipeline.
    pub mode: TrackingMode,
    /// Target descriptor path (marker mode).
    pub catalog: Option<PathBuf>,
}

/// `[engine]` section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Undelivered frames kept between ticks.
    pub frame_queue_capacity: usize,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self { frame_queue_capacity: DEFAULT_FRAME_QUEUE_CAPACITY }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MirageConfig {
    /// Session settings.
    pub session: SessionSection,
    /// Scheduler settings.
    pub render: RenderLoopConfig,
    /// Pose validation tolerances.
    pub validation: PoseValidation,
    /// Engine boundary settings.
    pub engine: EngineSection,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl MirageConfig {
    /// Parses configuration from TOML text. Relative catalog paths resolve
    /// against the working directory.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML or unknown mode names.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Loads configuration from a file. Relative catalog paths resolve
    /// against the file's directory.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`MirageConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let mut config = Self::from_toml_str(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf);

        tracing::info!(
            "Loaded config from {}: {:?} mode, {} fps target",
            path.display(),
            config.session.mode,
            config.render.target_fps
        );
        Ok(config)
    }

    /// Resolved path of the target descriptor, if one is configured.
    #[must_use]
    pub fn catalog_path(&self) -> Option<PathBuf> {
        let path = self.session.catalog.as_ref()?;
        match &self.base_dir {
            Some(base) if path.is_relative() => Some(base.join(path)),
            _ => Some(path.clone()),
        }
    }

    /// Builds the session configuration, loading the catalog in marker mode.
    ///
    /// Surface mode ignores any configured catalog.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingCatalog`] for marker mode without a catalog.
    /// - [`ConfigError::Catalog`] if the descriptor fails to load.
    pub fn session_config(&self) -> ConfigResult<SessionConfig> {
        match self.session.mode {
            TrackingMode::SurfaceHitTest => Ok(SessionConfig::surface_hit_test()),
            TrackingMode::Marker => {
                let path = self.catalog_path().ok_or(ConfigError::MissingCatalog)?;
                Ok(SessionConfig::marker(TargetCatalog::load(path)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = MirageConfig::from_toml_str("").unwrap();
        assert_eq!(config.session.mode, TrackingMode::SurfaceHitTest);
        assert_eq!(config.render, RenderLoopConfig::default());
        assert_eq!(config.validation, PoseValidation::default());
        assert_eq!(config.engine.frame_queue_capacity, DEFAULT_FRAME_QUEUE_CAPACITY);
    }

    #[test]
    fn test_partial_sections() {
        let config = MirageConfig::from_toml_str(
            "[render]\ntarget_fps = 30\n\n[validation]\nnorm_tolerance = 0.01\n",
        )
        .unwrap();
        assert_eq!(config.render.target_fps, 30);
        assert_eq!(config.render.frame_budget_us, 16_666);
        assert!((config.validation.norm_tolerance - 0.01).abs() < f32::EPSILON);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = MirageConfig::from_toml_str("[session]\nmode = \"slam\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_marker_mode_requires_catalog() {
        let config = MirageConfig::from_toml_str("[session]\nmode = \"marker\"\n").unwrap();
        assert!(matches!(config.session_config(), Err(ConfigError::MissingCatalog)));
    }

    #[test]
    fn test_surface_mode_session_config() {
        let config = MirageConfig::from_toml_str("").unwrap();
        assert_eq!(config.session_config().unwrap(), SessionConfig::surface_hit_test());
    }

    #[test]
    fn test_load_resolves_catalog_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("targets.toml"),
            "[[targets]]\nname = \"poster\"\nimage = \"poster.png\"\nphysical_width_m = 0.21\n",
        )
        .unwrap();
        let config_path = dir.path().join("mirage.toml");
        fs::write(&config_path, "[session]\nmode = \"marker\"\ncatalog = \"targets.toml\"\n")
            .unwrap();

        let config = MirageConfig::load(&config_path).unwrap();
        assert_eq!(config.catalog_path(), Some(dir.path().join("targets.toml")));

        let session = config.session_config().unwrap();
        assert_eq!(session.mode, TrackingMode::Marker);
        assert_eq!(session.catalog.unwrap().index_of("poster"), Some(0));
    }

    #[test]
    fn test_missing_catalog_file_is_catalog_error() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("mirage.toml");
        fs::write(&config_path, "[session]\nmode = \"marker\"\ncatalog = \"nope.toml\"\n").unwrap();

        let config = MirageConfig::load(&config_path).unwrap();
        assert!(matches!(config.session_config(), Err(ConfigError::Catalog(_))));
    }

    #[test]
    fn test_missing_config_file() {
        let err = MirageConfig::load("/definitely/not/here/mirage.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
