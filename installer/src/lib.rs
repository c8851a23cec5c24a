//! Jamoma installer library.
//!
//! This crate provides the core functionality for building, staging, and
//! installing the Jamoma module suite. It is used by the `jamoma-installer`
//! CLI binary and can be consumed programmatically for testing or custom
//! installation workflows.
//!
//! # Modules
//!
//! - [`builder`] - External build command delegation
//! - [`catalog`] - The module table
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Configuration file discovery and parsing
//! - [`descriptor`] - Artifact descriptors and template expansion
//! - [`dirs`] - Directory resolution abstraction for per-user paths
//! - [`error`] - Semantic error types with recovery hints
//! - [`fsops`] - Typed filesystem primitives
//! - [`graph`] - Dependency ordering of modules
//! - [`linker`] - Alias creation and pruning
//! - [`lock`] - Exclusive lock over the installation root
//! - [`manifest`] - Per-module staging manifests
//! - [`output`] - Progress and dry-run formatting
//! - [`pipeline`] - Build, staging, and installation orchestration
//! - [`platform`] - Platform resolution and capability matrix
//! - [`promoter`] - Stage-to-stage artifact promotion
//! - [`report`] - Warnings and the run report
//! - [`root`] - Installation root management
//! - [`stage`] - Stages and their locations

pub mod builder;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod descriptor;
pub mod dirs;
pub mod error;
pub mod fsops;
pub mod graph;
pub mod linker;
pub mod lock;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod platform;
pub mod promoter;
pub mod report;
pub mod root;
pub mod stage;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
