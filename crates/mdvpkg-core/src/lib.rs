//! Core value types shared across mdvpkg crates.
//!
//! This crate provides the foundational, dependency-light types used
//! throughout the daemon:
//! - [`RpmVersion`] and the RPM vercmp ordering rules
//! - [`RpmArtifact`], the full package-version record
//! - [`Capability`], the `NAME[COND VER]` dependency token grammar
//! - the shared [`Error`]/[`Result`] taxonomy

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod artifact;
pub mod capability;
pub mod error;
pub mod version;

pub use artifact::RpmArtifact;
pub use capability::{Capability, CapabilityCondition};
pub use error::{Error, Result};
pub use version::RpmVersion;
