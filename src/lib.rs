//! ## About
//!
//! This crate turns a flat robot description (joints and links that reference each other by
//! name) into a kinematic tree of transform frames, computes forward kinematics, and loads mesh
//! assets (Collada and STL) for its links. Loads are asynchronous and may overlap: every request
//! is tagged with a generation and only the most recently issued one becomes visible.
//!
//! See [TreeBuilder] for building a tree by hand and [Viewer] for the complete loading pipeline.
//!
//! ## Input
//!
//! Descriptions are JSON documents (see [description]) or URDF files (see [urdf]). Malformed
//! numbers never fail a load, they are coerced to `0` (see [coerce]).
//!
//! ## Naming conventions
//! * Traits – adjectives that indicate capability and behavior
//! * Structs – substantives that indicate entities implementing a behavior
//! * Methods – imperative forms with the exception of getters and factories, which
//!             are uses substantives (i.e., omit a `get_` prefix) much like the standard library.
//!             Callback methods have a `on_` prefix

pub mod arena;
pub mod asset;
pub mod coerce;
pub mod config;
pub mod description;
pub mod errors;
pub mod forward;
pub mod joint;
pub mod link;
pub mod orchestrator;
pub mod tree;
pub mod urdf;

pub use arena::{ArenaIndex, ArenaNode, ArenaTree, Nodelike};
pub use asset::{AssetSource, FileSource, MemorySource, MeshAsset, MeshFormat};
pub use config::ViewerConfig;
pub use description::Description;
pub use errors::{AssetError, ConfigError, DescriptionError, LoadError, TreeError};
pub use forward::TransformationAccumulation;
pub use joint::{Joint, JointType};
pub use link::{Link, MeshRef};
pub use orchestrator::{
    Generation, LoadEvent, LoadOrchestrator, LoadReport, LoadRequest, LoadStatus, LoadToken, Viewer,
};
pub use tree::{BuildReport, Frame, Tree, TreeBuilder};
