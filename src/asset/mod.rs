//! Loading of mesh assets.
//!
//! Two formats are supported: Collada (`.dae`) and STL (`.stl`, binary and ASCII). Anything else
//! is rejected by [MeshFormat::from_location] before fetching.
//!
//! # Orientation
//!
//! A loaded asset carries two rotations which are applied in this order:
//! 1. the *format correction*: Collada's declared `up_axis` (`Y_UP` identity, `Z_UP` −90° about
//!    X, `X_UP` +90° about Z) or the fixed −90° about X for STL, which has no orientation
//!    metadata,
//! 2. the *shared correction*: +90° about X for every format.
//!
//! [MeshAsset::placement] composes both. Vertices themselves are only scaled (Collada's `unit`),
//! never rotated.

pub mod collada;
pub mod source;
pub mod stl;

pub use source::{AssetSource, FileSource, MemorySource};

use crate::errors::AssetError;
use crate::ViewerConfig;
use itertools::Itertools;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use std::f64::consts::FRAC_PI_2;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Collada,
    Stl,
}

impl MeshFormat {
    /// Format by file suffix (case-insensitive, query and fragment ignored)
    pub fn from_location(location: &str) -> Result<Self, AssetError> {
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or(location)
            .to_ascii_lowercase();
        let file = path.rsplit(['/', '\\']).next().unwrap_or(&path);
        let extension = file.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        match extension {
            "dae" => Ok(MeshFormat::Collada),
            "stl" => Ok(MeshFormat::Stl),
            _ => Err(AssetError::UnsupportedFormat {
                location: location.to_string(),
                extension: extension.to_string(),
            }),
        }
    }
}

impl fmt::Display for MeshFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshFormat::Collada => write!(f, "Collada"),
            MeshFormat::Stl => write!(f, "STL"),
        }
    }
}

fn rotation(axis: nalgebra::Unit<Vector3<f64>>, angle: f64) -> Isometry3<f64> {
    Isometry3::from_parts(Translation3::identity(), UnitQuaternion::from_axis_angle(&axis, angle))
}

/// Rotation applied to assets of every format, after their format correction
pub fn shared_correction() -> Isometry3<f64> {
    rotation(Vector3::x_axis(), FRAC_PI_2)
}

/// Up axis declared by a Collada document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpAxis {
    X,
    #[default]
    Y,
    Z,
}

impl UpAxis {
    pub fn correction(&self) -> Isometry3<f64> {
        match self {
            UpAxis::X => rotation(Vector3::z_axis(), FRAC_PI_2),
            UpAxis::Y => Isometry3::identity(),
            UpAxis::Z => rotation(Vector3::x_axis(), -FRAC_PI_2),
        }
    }
}

/// The fixed correction for STL assets
pub fn stl_correction() -> Isometry3<f64> {
    rotation(Vector3::x_axis(), -FRAC_PI_2)
}

/// A parsed triangle mesh ready to be attached to a link
#[derive(Debug, Clone)]
pub struct MeshAsset {
    location: String,
    format: MeshFormat,
    vertices: Vec<Point3<f32>>,
    faces: Vec<[u32; 3]>,
    unit_scale: f64,
    format_correction: Isometry3<f64>,
    shared_correction: Isometry3<f64>,
}

impl MeshAsset {
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn format(&self) -> MeshFormat {
        self.format
    }

    /// Vertices scaled to meters
    pub fn vertices(&self) -> &[Point3<f32>] {
        &self.vertices
    }

    pub fn faces(&self) -> &[[u32; 3]] {
        &self.faces
    }

    pub fn unit_scale(&self) -> f64 {
        self.unit_scale
    }

    pub fn format_correction(&self) -> &Isometry3<f64> {
        &self.format_correction
    }

    pub fn shared_correction(&self) -> &Isometry3<f64> {
        &self.shared_correction
    }

    /// Transformation of the geometry relative to its link: format correction first, then the
    /// shared one.
    pub fn placement(&self) -> Isometry3<f64> {
        self.shared_correction * self.format_correction
    }
}

/// Parse fetched bytes into a [MeshAsset]. The format follows from the location's suffix.
pub fn load_mesh(location: &str, bytes: &[u8], config: &ViewerConfig) -> Result<MeshAsset, AssetError> {
    let format = MeshFormat::from_location(location)?;
    let (vertices, faces, unit_scale, format_correction) = match format {
        MeshFormat::Collada => {
            let mesh = collada::parse(bytes, config.default_unit_scale)?;
            let scale = mesh.unit as f32;
            let vertices = mesh.positions.into_iter().map(|p| p * scale).collect_vec();
            (vertices, mesh.faces, mesh.unit, mesh.up_axis.correction())
        }
        MeshFormat::Stl => {
            let (vertices, faces) = stl::parse(bytes)?;
            (vertices, faces, 1.0, stl_correction())
        }
    };
    tracing::debug!(location, %format, vertices = vertices.len(), faces = faces.len(), "mesh parsed");
    Ok(MeshAsset {
        location: location.to_string(),
        format,
        vertices,
        faces,
        unit_scale,
        format_correction,
        shared_correction: shared_correction(),
    })
}
