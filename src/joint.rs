/*! Parametrized rotational connector between two links */

use nalgebra::{Isometry3, Translation3, Unit, UnitQuaternion, Vector3};
use std::fmt;
use tracing::warn;

/// Kind of a joint. Only revolute and continuous joints move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JointType {
    Revolute,
    Continuous,
    Fixed,
    /// Any other tag (e.g., `prismatic`, `floating`) is kept but treated as rigid
    Other(String),
}

impl JointType {
    pub fn is_rotational(&self) -> bool {
        matches!(self, JointType::Revolute | JointType::Continuous)
    }
}

impl From<&str> for JointType {
    fn from(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "revolute" => JointType::Revolute,
            "continuous" => JointType::Continuous,
            "fixed" => JointType::Fixed,
            _ => JointType::Other(tag.to_string()),
        }
    }
}

impl fmt::Display for JointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointType::Revolute => write!(f, "revolute"),
            JointType::Continuous => write!(f, "continuous"),
            JointType::Fixed => write!(f, "fixed"),
            JointType::Other(tag) => write!(f, "{tag}"),
        }
    }
}

/// Builds a transformation from a translation and roll/pitch/yaw angles (fixed axes X, Y, Z).
pub fn transform_from_xyz_rpy(xyz: [f64; 3], rpy: [f64; 3]) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::new(xyz[0], xyz[1], xyz[2]),
        UnitQuaternion::from_euler_angles(rpy[0], rpy[1], rpy[2]),
    )
}

/// A joint connects a parent link to a child link.
///
/// The static `origin` defines the *pre* frame relative to the parent's attachment point. The
/// *post* frame follows after rotating by the current angle about `axis`; descendants hang
/// below the post frame. The angle is the only mutable state.
#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    name: String,
    joint_type: JointType,
    parent_name: String,
    child_name: String,
    lower: f64,
    upper: f64,
    axis: [f64; 3],
    origin: Isometry3<f64>,
    angle: f64,
    pub(crate) parent_link: Option<usize>,
    pub(crate) child_link: Option<usize>,
}

impl Joint {
    pub fn new(
        name: impl Into<String>,
        joint_type: JointType,
        parent: impl Into<String>,
        child: impl Into<String>,
        limits: (f64, f64),
        axis: [f64; 3],
        origin: Isometry3<f64>,
    ) -> Self {
        Joint {
            name: name.into(),
            joint_type,
            parent_name: parent.into(),
            child_name: child.into(),
            lower: limits.0,
            upper: limits.1,
            axis,
            origin,
            angle: 0.0,
            parent_link: None,
            child_link: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn joint_type(&self) -> &JointType {
        &self.joint_type
    }

    /// Declared name of the parent link
    pub fn parent_name(&self) -> &str {
        &self.parent_name
    }

    /// Declared name of the child link
    pub fn child_name(&self) -> &str {
        &self.child_name
    }

    /// Resolved index of the parent link (set by the tree builder)
    pub fn parent_link(&self) -> Option<usize> {
        self.parent_link
    }

    /// Resolved index of the child link (set by the tree builder)
    pub fn child_link(&self) -> Option<usize> {
        self.child_link
    }

    /// `(lower, upper)`. Only meaningful for rotational joints.
    pub fn limits(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }

    pub fn axis(&self) -> [f64; 3] {
        self.axis
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// The static offset from the parent attachment point to the pre frame
    pub fn origin(&self) -> &Isometry3<f64> {
        &self.origin
    }

    /// Transformation from the pre frame to the post frame. Identity for rigid joints and for
    /// a degenerate (zero) axis.
    pub fn motion(&self) -> Isometry3<f64> {
        let rotation = Unit::try_new(Vector3::from(self.axis), f64::EPSILON)
            .map(|axis| UnitQuaternion::from_axis_angle(&axis, self.angle))
            .unwrap_or_else(UnitQuaternion::identity);
        Isometry3::from_parts(Translation3::identity(), rotation)
    }

    /// Sets the absolute rotation about the axis. No-op for non-rotational joints and
    /// non-finite angles.
    pub fn set(&mut self, angle: f64) {
        if !angle.is_finite() {
            warn!(joint = %self.name, angle, "non-finite angle ignored");
            return;
        }
        if self.joint_type.is_rotational() {
            self.angle = angle;
        }
    }

    /// Maps a control value in `[-1, 1]` linearly onto the limit range and applies it with
    /// [Joint::set]. Values outside are clamped to the nearest limit, `NaN` is ignored.
    pub fn set_by_unit_scaling(&mut self, unit: f64) {
        let angle = if unit <= -1.0 {
            self.lower
        } else if unit >= 1.0 {
            self.upper
        } else {
            self.lower + ((unit + 1.0) / 2.0) * (self.upper - self.lower)
        };
        self.set(angle);
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}): {} -> {}, angle {:.3}",
            self.name, self.joint_type, self.parent_name, self.child_name, self.angle
        )
    }
}
