// Copyright 2026 the Prebake authors. MIT license.

//! Prebake runs the dynamic code-generation parts of a module set ahead
//! of time and emits an equivalent module set that performs no runtime
//! code generation.
//!
//! The pipeline is a message bus of lifecycle stages: entry specifiers
//! enter the [`graph::ModuleSet`] unresolved, the [`gatherer::Gatherer`]
//! promotes them to resolved, and the [`rewriter::Rewriter`] parses,
//! links and rewrites them. Value traffic during early execution flows
//! through the recorder in the `prebake_object_graph` crate.

pub mod analyzer;
pub mod ast;
pub mod diagnostics;
pub mod file_fetcher;
pub mod gatherer;
pub mod graph;
pub mod module;
pub mod prebakery;
pub mod resolver;
pub mod rewriter;
pub mod specifier;

pub mod errors {
  pub use anyhow::anyhow;
  pub use anyhow::Error as AnyError;
}

pub use prebake_object_graph as object_graph;

pub use crate::errors::AnyError;
pub use crate::prebakery::PrebakeOptions;
pub use crate::prebakery::PrebakeOutput;
pub use crate::prebakery::Prebakery;
