//! Compression settings (TOML)
//!
//! Every field has a default, so a settings file only needs the values it
//! overrides:
//!
//! ```toml
//! rotation_format = "quat_drop_w_variable"
//! translation_format = "vector3_variable"
//! scale_format = "vector3_96"
//! error_threshold = 0.005
//!
//! [vertex_distances]
//! default = 3.0
//! safe = 100.0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::error::{AnimError, Result};
use crate::format::{MAX_QUANTIZED_BITS, RangeReductionFlags, RotationFormat, VectorFormat};

/// Errors from reading a settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Invalid(#[from] AnimError),
}

/// Virtual vertex distances assigned to bones when the host does not give one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexDistances {
    /// Distance for ordinary bones (default: 3.0)
    #[serde(default = "default_vertex_distance")]
    pub default: f32,
    /// Distance for bones with sockets or keyed end effectors (default: 100.0)
    #[serde(default = "default_safe_vertex_distance")]
    pub safe: f32,
}

impl Default for VertexDistances {
    fn default() -> Self {
        Self {
            default: default_vertex_distance(),
            safe: default_safe_vertex_distance(),
        }
    }
}

impl VertexDistances {
    /// Distance for a bone, given whether it is a key bone
    pub fn for_bone(&self, key_bone: bool) -> f32 {
        if key_bone { self.safe } else { self.default }
    }
}

/// Clip compression settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionSettings {
    /// Rotation track format (default: quat_drop_w_variable)
    #[serde(default)]
    pub rotation_format: RotationFormat,
    /// Translation track format (default: vector3_variable)
    #[serde(default)]
    pub translation_format: VectorFormat,
    /// Scale track format (default: vector3_variable)
    #[serde(default)]
    pub scale_format: VectorFormat,
    /// Channels normalized to their own range (default: all)
    #[serde(default)]
    pub range_reduction: RangeReductionFlags,
    /// Maximum virtual vertex displacement in world units (default: 0.01)
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f32,
    /// Lowest width tried by the variable search (default: 3)
    #[serde(default = "default_min_bits")]
    pub min_bits: u8,
    /// Highest width tried by the variable search (default: 19)
    #[serde(default = "default_max_bits")]
    pub max_bits: u8,
    /// Angle in radians below which a rotation counts as unchanged
    #[serde(default = "default_constant_rotation_threshold_angle")]
    pub constant_rotation_threshold_angle: f32,
    /// Distance below which a translation counts as unchanged
    #[serde(default = "default_constant_translation_threshold")]
    pub constant_translation_threshold: f32,
    /// Per-component delta below which a scale counts as unchanged
    #[serde(default = "default_constant_scale_threshold")]
    pub constant_scale_threshold: f32,
    /// Vertex distances used when building skeletons from bone descriptions
    #[serde(default)]
    pub vertex_distances: VertexDistances,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            rotation_format: RotationFormat::default(),
            translation_format: VectorFormat::default(),
            scale_format: VectorFormat::default(),
            range_reduction: RangeReductionFlags::default(),
            error_threshold: default_error_threshold(),
            min_bits: default_min_bits(),
            max_bits: default_max_bits(),
            constant_rotation_threshold_angle: default_constant_rotation_threshold_angle(),
            constant_translation_threshold: default_constant_translation_threshold(),
            constant_scale_threshold: default_constant_scale_threshold(),
            vertex_distances: VertexDistances::default(),
        }
    }
}

fn default_vertex_distance() -> f32 {
    3.0
}
fn default_safe_vertex_distance() -> f32 {
    100.0
}
fn default_error_threshold() -> f32 {
    0.01
}
fn default_min_bits() -> u8 {
    3
}
fn default_max_bits() -> u8 {
    19
}
fn default_constant_rotation_threshold_angle() -> f32 {
    0.002_847_144_6
}
fn default_constant_translation_threshold() -> f32 {
    0.001
}
fn default_constant_scale_threshold() -> f32 {
    0.000_01
}

impl CompressionSettings {
    /// Settings with a different error threshold
    pub fn with_error_threshold(mut self, threshold: f32) -> Self {
        self.error_threshold = threshold;
        self
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, SettingsError> {
        let settings: Self = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate settings from a TOML file
    pub fn load(path: &Path) -> std::result::Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&text)?;
        tracing::debug!("Loaded compression settings from {:?}", path);
        Ok(settings)
    }

    /// Serialize to TOML text
    pub fn to_toml_string(&self) -> std::result::Result<String, SettingsError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.error_threshold.is_finite() && self.error_threshold > 0.0) {
            return Err(AnimError::InvalidSettings(format!(
                "error_threshold must be positive, got {}",
                self.error_threshold
            )));
        }
        if self.min_bits == 0 || self.max_bits > MAX_QUANTIZED_BITS {
            return Err(AnimError::InvalidSettings(format!(
                "bit range {}..={} outside 1..={}",
                self.min_bits, self.max_bits, MAX_QUANTIZED_BITS
            )));
        }
        if self.min_bits > self.max_bits {
            return Err(AnimError::InvalidSettings(format!(
                "min_bits {} greater than max_bits {}",
                self.min_bits, self.max_bits
            )));
        }
        let thresholds = [
            self.constant_rotation_threshold_angle,
            self.constant_translation_threshold,
            self.constant_scale_threshold,
        ];
        if thresholds.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(AnimError::InvalidSettings(
                "constant thresholds must be finite and non-negative".to_string(),
            ));
        }
        let distances = [self.vertex_distances.default, self.vertex_distances.safe];
        if distances.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(AnimError::InvalidSettings(
                "vertex distances must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_valid() {
        let settings = CompressionSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.error_threshold, 0.01);
        assert_eq!(settings.rotation_format, RotationFormat::QuatDropWVariable);
        assert_eq!(settings.range_reduction, RangeReductionFlags::all());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let settings = CompressionSettings::from_toml_str("").unwrap();
        assert_eq!(settings, CompressionSettings::default());
    }

    #[test]
    fn test_partial_toml() {
        let text = r#"
            rotation_format = "quat_drop_w_48"
            scale_format = "vector3_96"
            error_threshold = 0.005
            range_reduction = 3

            [vertex_distances]
            safe = 50.0
        "#;
        let settings = CompressionSettings::from_toml_str(text).unwrap();
        assert_eq!(settings.rotation_format, RotationFormat::QuatDropW48);
        assert_eq!(settings.translation_format, VectorFormat::Vector3Variable);
        assert_eq!(settings.scale_format, VectorFormat::Vector3_96);
        assert_eq!(settings.error_threshold, 0.005);
        assert_eq!(
            settings.range_reduction,
            RangeReductionFlags::ROTATIONS | RangeReductionFlags::TRANSLATIONS
        );
        assert_eq!(settings.vertex_distances.default, 3.0);
        assert_eq!(settings.vertex_distances.safe, 50.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = CompressionSettings::from_toml_str("error_threshold = 0.0").unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid(AnimError::InvalidSettings(_))
        ));

        let err = CompressionSettings::from_toml_str("min_bits = 10\nmax_bits = 4").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));

        let err = CompressionSettings::from_toml_str("max_bits = 24").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));

        let err = CompressionSettings::from_toml_str("rotation_format = \"quat_64\"").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn test_toml_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compression.toml");

        let settings = CompressionSettings {
            rotation_format: RotationFormat::QuatDropW96,
            error_threshold: 0.02,
            ..Default::default()
        };
        std::fs::write(&path, settings.to_toml_string().unwrap()).unwrap();

        let loaded = CompressionSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_vertex_distance_for_key_bones() {
        let distances = VertexDistances::default();
        assert_eq!(distances.for_bone(false), 3.0);
        assert_eq!(distances.for_bone(true), 100.0);
    }
}
