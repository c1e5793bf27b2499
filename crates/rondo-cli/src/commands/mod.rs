//! CLI command implementations.

pub mod common;
pub mod info;
pub mod play;
pub mod plugins;
pub mod render;
pub mod routing;
