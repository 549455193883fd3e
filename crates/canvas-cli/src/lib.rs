//! Command-line front end for the canvas completion pipeline.
//!
//! Split from main.rs so the config and output helpers can be tested.

pub mod config;
pub mod logging;
pub mod output;
