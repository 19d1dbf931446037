//! plugify-gen library - expose modules for testing
//!
//! The binary in `main.rs` only parses arguments and dispatches here.

pub mod commands;
pub mod common;
pub mod errors;

pub use common::GlobalOpts;
