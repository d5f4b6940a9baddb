//! Out step of a registry image resource
//!
//! Pushes a `docker save` tarball to its primary reference with retries,
//! applies any additional tags, optionally signs every pushed reference with
//! notary, and reports the image digest.

pub mod cli;
pub mod config;
pub mod digest;
pub mod error;
pub mod image;
pub mod logging;
pub mod orchestrator;
pub mod output;
pub mod plan;
pub mod reference;
pub mod registry;
pub mod trust;

pub use error::{OutError, Result};
