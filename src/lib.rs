//! # ghcr-prune
//!
//! Deletes untagged container image versions from GitHub Packages without breaking the
//! multi-platform manifest lists that still reference them.
//!
//! A run first marks every digest referenced by a tagged manifest list in any package in scope,
//! then deletes the untagged versions whose digest was never marked. See [`Pruner`].
mod config;
pub use config::{parse_bool, Config, FileConfig, OwnerType};

mod errors;
pub use errors::{Error, Result};

mod oci_digest;
pub use oci_digest::OciDigest;

pub mod catalog;
pub mod collector;
pub mod deleter;
pub mod github;
pub mod reachability;
pub mod registry;
pub mod resolver;
pub mod services;

mod pruner;
pub use pruner::{Phase, Pruner};

#[cfg(test)]
pub(crate) mod testing;
