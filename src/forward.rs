/*! Forward kinematics: accumulation of local frame transformations along a depth-first walk */

use crate::arena::{ArenaNode, Nodelike};
use nalgebra::Isometry3;

/// Trait that adds an `accumulate` function for accumulating transformations from direct path
/// from a root to a node.
/// Implemented for an iterator over nodes but should only be used on a depth-first iteration
/// (not enforced!)
pub trait TransformationAccumulation<'a, Load: 'a> {
    /// `local` computes a node's transformation relative to its parent. The result pairs each
    /// node with its transformation relative to the traversal root.
    fn accumulate<F>(self, local: F, max_depth: usize) -> impl Iterator<Item = (&'a ArenaNode<Load>, Isometry3<f64>)>
    where
        F: Fn(&Load) -> Isometry3<f64>;
}

impl<'a, Load, T> TransformationAccumulation<'a, Load> for T
where
    Load: 'a,
    T: Iterator<Item = &'a ArenaNode<Load>>,
{
    fn accumulate<F>(self, local: F, max_depth: usize) -> impl Iterator<Item = (&'a ArenaNode<Load>, Isometry3<f64>)>
    where
        F: Fn(&Load) -> Isometry3<f64>,
    {
        let mut base_depth = None;
        self.scan(
            Vec::<Isometry3<f64>>::with_capacity(max_depth + 1),
            move |stack, node| {
                // Depths are relative to the first node (sub-tree traversals)
                let depth = node.depth() - *base_depth.get_or_insert(node.depth());
                stack.truncate(depth);
                let current = match stack.last() {
                    Some(parent) => parent * local(node.get()),
                    None => local(node.get()),
                };
                stack.push(current);
                Some((node, current))
            },
        )
    }
}
