//! Definition of the interfaces for tree iteration

/// Container that holds data in an arena tree
pub trait Nodelike<Load> {
    fn is_leaf(&self) -> bool;
    fn get(&self) -> &Load;

    /// Get the node's distance to its root node. Required for computing accumulations.
    fn depth(&self) -> usize;
}
