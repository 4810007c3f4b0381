/*! Rigid segment with a static visual offset and an optional mesh */

use crate::ViewerConfig;
use nalgebra::Isometry3;
use std::fmt;

/// What a link's visual refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshRef {
    /// A mesh file, relative to the mesh root (see [Link::mesh_location])
    Asset(String),
    /// A primitive shape marker such as `box`; rendering primitives is not handled here
    Primitive(String),
    None,
}

impl MeshRef {
    /// Classifies a declared reference. URI prefixes (`package://<pkg>/`, `file://`) are removed.
    pub fn parse(reference: &str, config: &ViewerConfig) -> Self {
        let reference = reference.trim();
        if config.is_no_asset(reference) {
            MeshRef::None
        } else if config.is_primitive(reference) {
            MeshRef::Primitive(reference.to_ascii_lowercase())
        } else {
            MeshRef::Asset(strip_uri(reference).to_string())
        }
    }
}

fn strip_uri(reference: &str) -> &str {
    if let Some(rest) = reference.strip_prefix("package://") {
        // The package name is not part of the layout below the mesh root
        rest.split_once('/').map(|(_, path)| path).unwrap_or(rest)
    } else if let Some(rest) = reference.strip_prefix("file://") {
        rest
    } else {
        reference
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    name: String,
    visual: Isometry3<f64>,
    mesh: MeshRef,
    pub(crate) parent_joint: Option<usize>,
    pub(crate) child_joints: Vec<usize>,
}

impl Link {
    pub fn new(name: impl Into<String>, visual: Isometry3<f64>, mesh: MeshRef) -> Self {
        Link {
            name: name.into(),
            visual,
            mesh,
            parent_joint: None,
            child_joints: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Static offset of the geometry relative to the link frame
    pub fn visual(&self) -> &Isometry3<f64> {
        &self.visual
    }

    pub fn mesh(&self) -> &MeshRef {
        &self.mesh
    }

    pub fn has_mesh(&self) -> bool {
        matches!(self.mesh, MeshRef::Asset(_))
    }

    /// Resolved index of the parent joint. `None` for the root (or an orphan).
    pub fn parent_joint(&self) -> Option<usize> {
        self.parent_joint
    }

    /// Resolved child joints in discovery order
    pub fn child_joints(&self) -> &[usize] {
        &self.child_joints
    }

    /// Location of the mesh below `mesh_root`.
    ///
    /// A reference containing a path separator is already relative to the mesh root; a bare
    /// file name lives in the configured mesh subfolder.
    pub fn mesh_location(&self, mesh_root: &str, config: &ViewerConfig) -> Option<String> {
        let MeshRef::Asset(reference) = &self.mesh else {
            return None;
        };
        let root = mesh_root.trim_end_matches('/');
        let location = if reference.contains('/') || reference.contains('\\') {
            join(root, reference.trim_start_matches('/'))
        } else {
            join(&join(root, &config.mesh_subfolder), reference)
        };
        Some(location)
    }
}

fn join(root: &str, path: &str) -> String {
    if root.is_empty() {
        path.to_string()
    } else if path.is_empty() {
        root.to_string()
    } else {
        format!("{root}/{path}")
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (children: {:?})", self.name, self.child_joints)
    }
}
