//! [Arena memory allocated](https://en.wikipedia.org/wiki/Region-based_memory_management)
//! tree structures for depth-first traversal of transform frames.

pub mod depth;
pub mod directed;
pub mod iterables;

pub use depth::DepthFirstIterator;
pub use directed::{ArenaIndex, ArenaNode, ArenaTree};
pub use iterables::Nodelike;
