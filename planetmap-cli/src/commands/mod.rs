//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`init`] - Write the default configuration file
//! - [`render`] - Render one layer over a bounding box to an image
//! - [`sources`] - List the map sources offered by the configured servers

pub mod init;
pub mod render;
pub mod sources;
