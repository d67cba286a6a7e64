//! spacemig remote - concrete collaborators
//!
//! - [`ManagementClient`]: [`spacemig_core::ResourceClient`] over the content management HTTP API
//! - [`CommandExecutor`]: [`spacemig_core::StepExecutor`] that spawns the migration CLI

#![warn(unreachable_pub)]

mod wire;

pub mod command;
pub mod management;

pub use command::CommandExecutor;
pub use management::{ManagementClient, DEFAULT_API_URL};
