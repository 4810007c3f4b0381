//! Provides the error types used throughout this crate.
//!
//! Malformed numbers and dangling name references are not errors (see [crate::coerce] and
//! [crate::tree]). Only a missing root and an unsupported mesh format are fatal to a load.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building or driving a [crate::Tree]
#[derive(Error, Debug, PartialEq)]
pub enum TreeError {
    #[error("No link without a parent joint, cannot select a root")]
    NoRoot,
    #[error("Expected {expected} joint angles, got {got}")]
    AngleCount { expected: usize, got: usize },
    #[error("Joint index {0} is out of bound")]
    UnknownJoint(usize),
    #[error("Link index {0} is out of bound")]
    UnknownLink(usize),
    #[error("Arena index {0} is out of bound")]
    ReferenceOutOfBound(usize),
}

/// Errors raised for a single mesh asset. They never invalidate the tree the asset belongs to.
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Unsupported mesh format `{extension}` for {location}")]
    UnsupportedFormat { location: String, extension: String },
    #[error("Cannot fetch {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Asset not found: {0}")]
    NotFound(String),
    #[error("Invalid STL data: {0}")]
    InvalidStl(String),
    #[error("Invalid Collada data: {0}")]
    InvalidCollada(String),
    #[error("Error raised by `quick-xml`: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl AssetError {
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, AssetError::UnsupportedFormat { .. })
    }
}

/// Errors raised while reading a description document
#[derive(Error, Debug)]
pub enum DescriptionError {
    #[error("Error raised by `serde_json`: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Error raised by `quick-xml`: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("Malformed XML attribute: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
    #[error("Missing element `{element}` in {context}")]
    MissingElement { element: String, context: String },
    #[error("Description is not valid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),
}

/// Errors raised while reading a [crate::ViewerConfig]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error raised by `toml`: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors that fail a whole load request
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cannot fetch description {location}: {source}")]
    DescriptionFetch {
        location: String,
        #[source]
        source: AssetError,
    },
    #[error("Cannot parse description: {0}")]
    Description(#[from] DescriptionError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error("Link `{link}` references an unsupported mesh: {source}")]
    UnsupportedFormat {
        link: String,
        #[source]
        source: AssetError,
    },
}
