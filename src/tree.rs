/*! Construction of the kinematic tree from flat, name-referenced joints and links.
 *
 * Building happens in three passes:
 * 1. name resolution (last match wins for single-valued references, child joints accumulate in
 *    declaration order),
 * 2. root selection (first link without a parent joint),
 * 3. assembly of the transform hierarchy in an [ArenaTree], walking joint → child link → child
 *    joints from the root with an explicit stack.
 *
 * The resulting [Tree] owns joints, links and attached geometry. Only the load orchestrator
 * mutates it.
 */

use crate::arena::{ArenaIndex, ArenaTree};
use crate::asset::MeshAsset;
use crate::description::Description;
use crate::errors::TreeError;
use crate::forward::TransformationAccumulation;
use crate::joint::Joint;
use crate::link::Link;
use crate::ViewerConfig;
use itertools::Itertools;
use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};
use tracing_attributes::instrument;

/// The payload of a node in the transform hierarchy. Indices refer to [Tree::joints],
/// [Tree::links] and the attached meshes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    /// Root node: maps the description's Z-up convention to the renderer's Y-up convention
    Correction,
    /// Static origin of a joint (the *pre* frame)
    JointOrigin(usize),
    /// Current rotation of a joint (the *post* frame)
    JointMotion(usize),
    /// Visual offset of a link
    Link(usize),
    /// Geometry attached below a link
    Geometry(usize),
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// The fixed presentation rotation at the root: −90° about X.
pub fn coordinate_correction() -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::identity(),
        UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -std::f64::consts::FRAC_PI_2),
    )
}

/// Structural anomalies found while building. None of them fails the build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Links without a parent joint that were not chosen as root
    pub extra_roots: Vec<usize>,
    /// Joints not reachable from the root
    pub unreachable_joints: Vec<usize>,
    /// Links not reachable from the root
    pub unreachable_links: Vec<usize>,
    /// Number of joints or links reached a second time (back edges and duplicate claims)
    pub cycles_broken: usize,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.extra_roots.is_empty()
            && self.unreachable_joints.is_empty()
            && self.unreachable_links.is_empty()
            && self.cycles_broken == 0
    }
}

/// What [Tree::release] gave up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub meshes: usize,
    pub vertices: usize,
}

#[derive(Debug)]
struct AttachedMesh {
    link: usize,
    node: ArenaIndex,
    asset: MeshAsset,
}

/// Collects joints and links and builds a [Tree]
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    joints: Vec<Joint>,
    links: Vec<Link>,
    metadata: Map<String, Value>,
    color: [f32; 3],
}

impl TreeBuilder {
    pub fn new(joints: Vec<Joint>, links: Vec<Link>) -> Self {
        TreeBuilder {
            joints,
            links,
            metadata: Map::new(),
            color: [0.8, 0.8, 0.8],
        }
    }

    pub fn from_description(description: &Description, config: &ViewerConfig) -> Self {
        Self::new(description.joints(), description.links(config)).metadata(description.metadata.clone())
    }

    /// Data passed through to the tree untouched
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Display color for the renderer
    pub fn color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    #[instrument(skip(self), fields(joints = self.joints.len(), links = self.links.len()))]
    pub fn build(self) -> Result<(Tree, BuildReport), TreeError> {
        let TreeBuilder {
            mut joints,
            mut links,
            metadata,
            color,
        } = self;
        let mut report = BuildReport::default();

        resolve(&mut joints, &mut links);

        let mut candidates = links.iter().positions(|link| link.parent_joint.is_none());
        let root_link = candidates.next().ok_or(TreeError::NoRoot)?;
        report.extra_roots = candidates.collect_vec();
        if !report.extra_roots.is_empty() {
            warn!(
                root = links[root_link].name(),
                extra = ?report.extra_roots.iter().map(|&i| links[i].name()).collect_vec(),
                "multiple links without a parent joint, using the first"
            );
        }
        let root_joints = links[root_link].child_joints.clone();

        let mut arena = ArenaTree::new(Frame::Correction);
        let mut joint_frames = vec![None; joints.len()];
        let mut link_frames = vec![None; links.len()];
        let correction = arena.root();
        link_frames[root_link] = Some(arena.add(Frame::Link(root_link), correction)?);

        // Explicit stack instead of recursion. Children are pushed in reverse so the attachment
        // order equals a recursive pre-order walk.
        let mut visited = vec![false; joints.len()];
        let mut stack = root_joints.iter().rev().map(|&j| (j, correction)).collect_vec();
        while let Some((joint, parent)) = stack.pop() {
            if visited[joint] {
                warn!(joint = joints[joint].name(), "joint reached twice, skipping");
                report.cycles_broken += 1;
                continue;
            }
            visited[joint] = true;

            let pre = arena.add(Frame::JointOrigin(joint), parent)?;
            let post = arena.add(Frame::JointMotion(joint), pre)?;
            joint_frames[joint] = Some((pre, post));

            let Some(child) = joints[joint].child_link else {
                debug!(joint = joints[joint].name(), "child link unresolved, leaf");
                continue;
            };
            // A link reachable through several joints hangs below the first one visited
            if link_frames[child].is_some() {
                warn!(joint = joints[joint].name(), link = links[child].name(), "link reached twice, leaf");
                report.cycles_broken += 1;
                continue;
            }
            link_frames[child] = Some(arena.add(Frame::Link(child), post)?);
            stack.extend(links[child].child_joints.iter().rev().map(|&j| (j, post)));
        }

        report.unreachable_joints = joint_frames.iter().positions(Option::is_none).collect_vec();
        report.unreachable_links = link_frames.iter().positions(Option::is_none).collect_vec();
        if !report.unreachable_joints.is_empty() || !report.unreachable_links.is_empty() {
            debug!(
                joints = ?report.unreachable_joints,
                links = ?report.unreachable_links,
                "unreachable from root"
            );
        }
        info!(root = links[root_link].name(), nodes = arena.len(), "tree built");

        Ok((
            Tree {
                joints,
                links,
                metadata,
                color,
                arena,
                root_link,
                root_joints,
                joint_frames,
                link_frames,
                meshes: vec![],
            },
            report,
        ))
    }
}

/// Cross-references joints and links by name.
///
/// Name maps are built once. Inserting in declaration order into a map makes the last match
/// win; grouping keeps all child joints in declaration order.
fn resolve(joints: &mut [Joint], links: &mut [Link]) {
    let link_by_name: HashMap<String, usize> = links
        .iter()
        .enumerate()
        .map(|(i, link)| (link.name().to_string(), i))
        .collect();
    let joint_by_child: HashMap<String, usize> = joints
        .iter()
        .enumerate()
        .map(|(i, joint)| (joint.child_name().to_string(), i))
        .collect();
    let joints_by_parent: HashMap<String, Vec<usize>> = joints
        .iter()
        .enumerate()
        .map(|(i, joint)| (joint.parent_name().to_string(), i))
        .into_group_map();

    for link in links.iter_mut() {
        link.parent_joint = joint_by_child.get(link.name()).copied();
        link.child_joints = joints_by_parent.get(link.name()).cloned().unwrap_or_default();
    }
    for joint in joints.iter_mut() {
        joint.child_link = link_by_name.get(joint.child_name()).copied();
        joint.parent_link = link_by_name.get(joint.parent_name()).copied();
        if joint.child_link.is_none() || joint.parent_link.is_none() {
            debug!(joint = joint.name(), "dangling link reference");
        }
    }
}

/// A built kinematic tree.
///
/// Joints and links are kept in declaration order; the IK collaborator addresses joints by
/// that order (see [Tree::set_angles]).
#[derive(Debug)]
pub struct Tree {
    joints: Vec<Joint>,
    links: Vec<Link>,
    metadata: Map<String, Value>,
    color: [f32; 3],
    arena: ArenaTree<Frame>,
    root_link: usize,
    root_joints: Vec<usize>,
    joint_frames: Vec<Option<(ArenaIndex, ArenaIndex)>>,
    link_frames: Vec<Option<ArenaIndex>>,
    meshes: Vec<AttachedMesh>,
}

impl Tree {
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn joint(&self, index: usize) -> Option<&Joint> {
        self.joints.get(index)
    }

    pub fn link(&self, index: usize) -> Option<&Link> {
        self.links.get(index)
    }

    pub fn joint_by_name(&self, name: &str) -> Option<usize> {
        self.joints.iter().rposition(|j| j.name() == name)
    }

    pub fn link_by_name(&self, name: &str) -> Option<usize> {
        self.links.iter().rposition(|l| l.name() == name)
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn color(&self) -> [f32; 3] {
        self.color
    }

    pub fn root_link(&self) -> usize {
        self.root_link
    }

    /// Joints whose parent is the root link, in declaration order
    pub fn root_joints(&self) -> &[usize] {
        &self.root_joints
    }

    /// The attachable root node (the coordinate correction)
    pub fn root_node(&self) -> ArenaIndex {
        self.arena.root()
    }

    pub fn arena(&self) -> &ArenaTree<Frame> {
        &self.arena
    }

    /// `(pre, post)` frame nodes of a joint, `None` if unreachable
    pub fn joint_frames(&self, joint: usize) -> Option<(ArenaIndex, ArenaIndex)> {
        self.joint_frames.get(joint).copied().flatten()
    }

    /// Node of a link, `None` if unreachable
    pub fn link_frame(&self, link: usize) -> Option<ArenaIndex> {
        self.link_frames.get(link).copied().flatten()
    }

    pub fn set_joint(&mut self, joint: usize, angle: f64) -> Result<(), TreeError> {
        self.joints
            .get_mut(joint)
            .ok_or(TreeError::UnknownJoint(joint))?
            .set(angle);
        Ok(())
    }

    pub fn set_joint_by_unit_scaling(&mut self, joint: usize, unit: f64) -> Result<(), TreeError> {
        self.joints
            .get_mut(joint)
            .ok_or(TreeError::UnknownJoint(joint))?
            .set_by_unit_scaling(unit);
        Ok(())
    }

    /// Applies one angle per joint in declaration order
    pub fn set_angles(&mut self, angles: &[f64]) -> Result<(), TreeError> {
        if angles.len() != self.joints.len() {
            return Err(TreeError::AngleCount {
                expected: self.joints.len(),
                got: angles.len(),
            });
        }
        self.joints.iter_mut().zip(angles).for_each(|(joint, angle)| joint.set(*angle));
        Ok(())
    }

    pub fn angles(&self) -> Vec<f64> {
        self.joints.iter().map(Joint::angle).collect_vec()
    }

    fn local(&self, frame: &Frame) -> Isometry3<f64> {
        match *frame {
            Frame::Correction => coordinate_correction(),
            Frame::JointOrigin(j) => *self.joints[j].origin(),
            Frame::JointMotion(j) => self.joints[j].motion(),
            Frame::Link(l) => *self.links[l].visual(),
            Frame::Geometry(m) => self.meshes[m].asset.placement(),
        }
    }

    /// World transformation of every arena node (indexed by [ArenaIndex]) in the renderer's
    /// convention, i.e. including the root correction.
    pub fn world_transforms(&self) -> Vec<Isometry3<f64>> {
        let mut result = vec![Isometry3::identity(); self.arena.len()];
        self.arena
            .iter_depth()
            .accumulate(|frame| self.local(frame), self.arena.max_depth())
            .for_each(|(node, trafo)| result[node.index().0] = trafo);
        result
    }

    /// Like [Tree::world_transforms] but in the description's own frame (correction undone).
    /// This is what an IK collaborator expects.
    pub fn native_transforms(&self) -> Vec<Isometry3<f64>> {
        let undo = coordinate_correction().inverse();
        self.world_transforms().into_iter().map(|t| undo * t).collect_vec()
    }

    /// Post frame of a joint in the renderer's convention
    pub fn joint_world(&self, joint: usize) -> Option<Isometry3<f64>> {
        let (_, post) = self.joint_frames(joint)?;
        self.world_transforms().get(post.0).copied()
    }

    /// Frame of a link in the renderer's convention
    pub fn link_world(&self, link: usize) -> Option<Isometry3<f64>> {
        let node = self.link_frame(link)?;
        self.world_transforms().get(node.0).copied()
    }

    /// Attaches loaded geometry below a link's node
    pub fn attach_mesh(&mut self, link: usize, asset: MeshAsset) -> Result<ArenaIndex, TreeError> {
        let parent = self.link_frame(link).ok_or(TreeError::UnknownLink(link))?;
        let node = self.arena.add(Frame::Geometry(self.meshes.len()), parent)?;
        debug!(link = self.links[link].name(), location = asset.location(), "mesh attached");
        self.meshes.push(AttachedMesh { link, node, asset });
        Ok(node)
    }

    /// Geometry attached to a link (there is at most one per load)
    pub fn mesh(&self, link: usize) -> Option<(&MeshAsset, ArenaIndex)> {
        self.meshes
            .iter()
            .find(|m| m.link == link)
            .map(|m| (&m.asset, m.node))
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Releases everything the tree owns. Consumes the tree, so this happens exactly once.
    pub fn release(self) -> ReleaseSummary {
        let summary = ReleaseSummary {
            meshes: self.meshes.len(),
            vertices: self.meshes.iter().map(|m| m.asset.vertices().len()).sum(),
        };
        debug!(meshes = summary.meshes, vertices = summary.vertices, "tree released");
        summary
    }
}
