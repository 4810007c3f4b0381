//! Implementation of an
//! [arena allocated](https://en.wikipedia.org/wiki/Region-based_memory_management)
//! tree of transform frames. Nodes only know their children: every node is attached exactly once
//! and ownership is purely hierarchical.

use super::iterables::Nodelike;
use super::DepthFirstIterator;
use crate::errors::TreeError;
use core::fmt;

#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone, PartialOrd, Ord)]
pub struct ArenaIndex(pub usize);

impl fmt::Display for ArenaIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node structure to be used in an arena allocated tree. Fields are used to speed up iteration
#[derive(Debug, Clone)]
pub struct ArenaNode<Load> {
    /// The user-defined load that the node owns
    pub(super) load: Load,
    /// Index in the arena allocation
    pub(super) index: ArenaIndex,
    /// references for children
    pub(super) children: Vec<ArenaIndex>,
    /// Depth in the tree
    depth: usize,
}

impl<Load> ArenaNode<Load> {
    pub fn index(&self) -> ArenaIndex {
        self.index
    }

    pub fn children(&self) -> &[ArenaIndex] {
        &self.children
    }
}

impl<Load> Nodelike<Load> for ArenaNode<Load> {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn get(&self) -> &Load {
        &self.load
    }

    fn depth(&self) -> usize {
        self.depth
    }
}

impl<Load> fmt::Display for ArenaNode<Load>
where
    Load: fmt::Display,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Arena index {}, children: {:?}, payload: {} ",
            self.index, self.children, self.load
        )
    }
}

/// Iterable tree that uses arena allocation.
///
/// The first node is the root. Nodes are appended as they are attached, so storage order is
/// insertion order; use [ArenaTree::iter_depth] for a depth-first traversal.
#[derive(Debug, Clone)]
pub struct ArenaTree<Load> {
    /// Memory allocated area for nodes
    pub(crate) nodes: Vec<ArenaNode<Load>>,

    /// Largest depth of any node (used to size accumulation stacks)
    pub(super) max_depth: usize,
}

impl<Load> ArenaTree<Load> {
    /// Creates a tree holding just its root
    pub fn new(root_load: Load) -> Self {
        ArenaTree {
            nodes: vec![ArenaNode {
                load: root_load,
                index: ArenaIndex(0),
                children: vec![],
                depth: 0,
            }],
            max_depth: 0,
        }
    }

    pub fn root(&self) -> ArenaIndex {
        ArenaIndex(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn node(&self, index: ArenaIndex) -> Option<&ArenaNode<Load>> {
        self.nodes.get(index.0)
    }

    pub fn nodes(&self) -> &[ArenaNode<Load>] {
        &self.nodes
    }

    pub fn load_mut(&mut self, index: ArenaIndex) -> Option<&mut Load> {
        self.nodes.get_mut(index.0).map(|node| &mut node.load)
    }

    /// Depth-first traversal starting at the root
    pub fn iter_depth(&self) -> DepthFirstIterator<'_, Load> {
        DepthFirstIterator::new(self, self.root())
    }

    /// Depth-first traversal of the sub-tree below (and including) `root`
    pub fn iter_depth_sub(&self, root: ArenaIndex) -> DepthFirstIterator<'_, Load> {
        DepthFirstIterator::new(self, root)
    }

    /// Appends a new node below `parent` and returns its index
    pub fn add(&mut self, load: Load, parent: ArenaIndex) -> Result<ArenaIndex, TreeError> {
        let index = ArenaIndex(self.nodes.len());
        let parent = self
            .nodes
            .get_mut(parent.0)
            .ok_or(TreeError::ReferenceOutOfBound(parent.0))?;

        parent.children.push(index);
        let depth = parent.depth + 1;
        self.max_depth = self.max_depth.max(depth);

        self.nodes.push(ArenaNode {
            load,
            index,
            children: vec![],
            depth,
        });
        Ok(index)
    }
}
