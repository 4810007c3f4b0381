//! The declarative description document: an ordered list of joints and an ordered list of
//! links, referencing each other by name.
//!
//! Numeric fields are kept as raw [serde_json::Value]s during deserialization so that malformed
//! input never fails the document; they go through [crate::coerce] when converted into
//! [Joint]s and [Link]s.

use crate::coerce::{coerce_scalar, coerce_triple};
use crate::errors::DescriptionError;
use crate::joint::{transform_from_xyz_rpy, Joint, JointType};
use crate::link::{Link, MeshRef};
use crate::ViewerConfig;
use itertools::Itertools;
use nalgebra::Isometry3;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JointDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub joint_type: String,
    #[serde(default)]
    pub parent: String,
    #[serde(default)]
    pub child: String,
    #[serde(default)]
    pub lower: Value,
    #[serde(default)]
    pub upper: Value,
    #[serde(default)]
    pub axis: Value,
    #[serde(default)]
    pub xyz: Value,
    #[serde(default)]
    pub rpy: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisualDescription {
    #[serde(default)]
    pub pos: Value,
    #[serde(default)]
    pub rot: Value,
    #[serde(default)]
    pub mesh: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LinkDescription {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub visual: Vec<VisualDescription>,
}

/// A whole description document. Unknown top-level keys are passed through as metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub joints: Vec<JointDescription>,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl JointDescription {
    pub fn to_joint(&self) -> Joint {
        let field = |suffix: &str| format!("joint `{}`.{suffix}", self.name);
        Joint::new(
            self.name.clone(),
            JointType::from(self.joint_type.as_str()),
            self.parent.clone(),
            self.child.clone(),
            (
                coerce_scalar(&self.lower, &field("lower")),
                coerce_scalar(&self.upper, &field("upper")),
            ),
            coerce_triple(&self.axis, &field("axis")),
            transform_from_xyz_rpy(
                coerce_triple(&self.xyz, &field("xyz")),
                coerce_triple(&self.rpy, &field("rpy")),
            ),
        )
    }
}

impl LinkDescription {
    /// Only the first visual is used
    pub fn to_link(&self, config: &ViewerConfig) -> Link {
        let field = |suffix: &str| format!("link `{}`.{suffix}", self.name);
        if self.visual.len() > 1 {
            debug!(link = %self.name, count = self.visual.len(), "ignoring additional visuals");
        }
        match self.visual.first() {
            Some(visual) => Link::new(
                self.name.clone(),
                transform_from_xyz_rpy(
                    coerce_triple(&visual.pos, &field("pos")),
                    coerce_triple(&visual.rot, &field("rot")),
                ),
                MeshRef::parse(visual.mesh.as_deref().unwrap_or_default(), config),
            ),
            None => Link::new(self.name.clone(), Isometry3::identity(), MeshRef::None),
        }
    }
}

impl Description {
    pub fn from_json_str(text: &str) -> Result<Self, DescriptionError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, DescriptionError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn joints(&self) -> Vec<Joint> {
        self.joints.iter().map(JointDescription::to_joint).collect_vec()
    }

    pub fn links(&self, config: &ViewerConfig) -> Vec<Link> {
        self.links.iter().map(|l| l.to_link(config)).collect_vec()
    }
}
