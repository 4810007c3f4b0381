//! Configuration of mesh resolution and asset repair.

use crate::errors::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Settings shared by the tree builder and the asset loader. Every field has a default, so a
/// TOML file only needs to list what differs.
///
/// ```toml
/// mesh_subfolder = "assets"
/// primitive_markers = ["box", "cylinder"]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Folder below the mesh root that holds bare mesh file names
    pub mesh_subfolder: String,
    /// References meaning "this link has no geometry"
    pub no_asset_markers: Vec<String>,
    /// References naming a primitive shape instead of a file
    pub primitive_markers: Vec<String>,
    /// Unit scale written into Collada files with an empty unit declaration
    pub default_unit_scale: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            mesh_subfolder: "meshes".to_string(),
            no_asset_markers: vec!["".to_string(), "none".to_string(), "null".to_string()],
            primitive_markers: ["box", "cylinder", "sphere", "capsule"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            default_unit_scale: 1.0,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub(crate) fn is_no_asset(&self, reference: &str) -> bool {
        self.no_asset_markers.iter().any(|m| m.eq_ignore_ascii_case(reference))
    }

    pub(crate) fn is_primitive(&self, reference: &str) -> bool {
        self.primitive_markers.iter().any(|m| m.eq_ignore_ascii_case(reference))
    }
}
