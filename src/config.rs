//! View configuration loaded from YAML.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::error::Error;

/// Tunables for the darkroom view.
///
/// Every field has a default so an empty document is a valid configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ViewConfig {
    /// Maximum working-area dimension in pixels. Larger windows are centered
    /// and the excess is padding only; zoom math never sees raw window
    /// coordinates beyond this.
    #[serde(default = "ViewConfig::default_max_working_size")]
    pub max_working_size: u32,

    /// Normalized pan increment applied per border-scroll tick.
    #[serde(default = "ViewConfig::default_border_scroll_step")]
    pub border_scroll_step: f32,

    /// Scroll-zoom step as a fraction of `(1 - fit_scale)`.
    #[serde(default = "ViewConfig::default_zoom_step_fraction")]
    pub zoom_step_fraction: f32,

    /// Snap to 1:1 when the free scale comes within this distance of 1.0.
    #[serde(default = "ViewConfig::default_one_to_one_snap")]
    pub one_to_one_snap: f32,

    /// Snap to Fit when the free scale comes within this distance of the
    /// fit scale.
    #[serde(default = "ViewConfig::default_fit_snap")]
    pub fit_snap: f32,

    /// Largest dimension of the preview pipe's output.
    #[serde(default = "ViewConfig::default_preview_max_dim")]
    pub preview_max_dim: u32,

    /// Background gray painted behind the image and into window padding.
    #[serde(default = "ViewConfig::default_background")]
    pub background: [u8; 3],
}

impl ViewConfig {
    fn default_max_working_size() -> u32 {
        2560
    }

    fn default_border_scroll_step() -> f32 {
        0.02
    }

    fn default_zoom_step_fraction() -> f32 {
        0.1
    }

    fn default_one_to_one_snap() -> f32 {
        0.01
    }

    fn default_fit_snap() -> f32 {
        0.01
    }

    fn default_preview_max_dim() -> u32 {
        1440
    }

    fn default_background() -> [u8; 3] {
        [51, 51, 51]
    }

    /// Check invariants that serde defaults alone cannot express.
    ///
    /// # Errors
    /// Returns a descriptive error for any out-of-range field.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_working_size > 0, "max-working-size must be positive");
        ensure!(self.preview_max_dim > 0, "preview-max-dim must be positive");
        ensure!(
            self.border_scroll_step > 0.0 && self.border_scroll_step < 1.0,
            "border-scroll-step must be in (0, 1)"
        );
        ensure!(
            self.zoom_step_fraction > 0.0 && self.zoom_step_fraction <= 1.0,
            "zoom-step-fraction must be in (0, 1]"
        );
        ensure!(self.one_to_one_snap >= 0.0, "one-to-one-snap must be non-negative");
        ensure!(self.fit_snap >= 0.0, "fit-snap must be non-negative");
        Ok(())
    }
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            max_working_size: Self::default_max_working_size(),
            border_scroll_step: Self::default_border_scroll_step(),
            zoom_step_fraction: Self::default_zoom_step_fraction(),
            one_to_one_snap: Self::default_one_to_one_snap(),
            fit_snap: Self::default_fit_snap(),
            preview_max_dim: Self::default_preview_max_dim(),
            background: Self::default_background(),
        }
    }
}

/// Load a [`ViewConfig`] from a YAML file.
///
/// # Errors
/// Returns [`Error::Io`] if the file cannot be read and [`Error::Config`]
/// if it does not parse.
pub fn from_yaml_file(path: &Path) -> Result<ViewConfig, Error> {
    let raw = std::fs::read_to_string(path)?;
    let cfg: ViewConfig = serde_yaml::from_str(&raw)?;
    Ok(cfg)
}

/// Load a configuration or fall back to defaults when `path` is `None`.
///
/// # Errors
/// Propagates load/validation failures for an explicitly given path.
pub fn load_or_default(path: Option<&Path>) -> Result<ViewConfig> {
    let cfg = match path {
        Some(p) => {
            from_yaml_file(p).with_context(|| format!("loading config from {}", p.display()))?
        }
        None => ViewConfig::default(),
    };
    cfg.validate().context("validating configuration")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg: ViewConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.max_working_size, 2560);
        assert_eq!(cfg.background, [51, 51, 51]);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_override() {
        let cfg: ViewConfig = serde_yaml::from_str("border-scroll-step: 0.05\npreview-max-dim: 720\n").unwrap();
        assert!((cfg.border_scroll_step - 0.05).abs() < f32::EPSILON);
        assert_eq!(cfg.preview_max_dim, 720);
        // untouched fields keep their defaults
        assert!((cfg.zoom_step_fraction - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_zero_step() {
        let cfg = ViewConfig {
            zoom_step_fraction: 0.0,
            ..ViewConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
