//! Depth-first traversal of an [ArenaTree]

use super::{ArenaIndex, ArenaNode, ArenaTree};

/// Iterator for a depth-first iteration. Keeps a stack of child iterators instead of recursing.
pub struct DepthFirstIterator<'a, Load> {
    tree: &'a ArenaTree<Load>,
    stack: Vec<std::slice::Iter<'a, ArenaIndex>>,
    root: Option<ArenaIndex>,
}

impl<'a, Load> DepthFirstIterator<'a, Load> {
    pub fn new(tree: &'a ArenaTree<Load>, root: ArenaIndex) -> Self {
        let stack = Vec::with_capacity(tree.max_depth + 1);
        DepthFirstIterator {
            tree,
            stack,
            root: Some(root),
        }
    }
}

impl<'a, Load> Iterator for DepthFirstIterator<'a, Load> {
    type Item = &'a ArenaNode<Load>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            let root = self.tree.nodes.get(root.0)?;
            self.stack.push(root.children.iter());
            return Some(root);
        }
        while let Some(last) = self.stack.last_mut() {
            if let Some(child_ref) = last.next() {
                let node = &self.tree.nodes[child_ref.0];
                self.stack.push(node.children.iter());
                return Some(node);
            }
            self.stack.pop();
        }
        None
    }
}
