//! # Hub Node
//!
//! The `hub` binary's library half: command line, configuration assembly,
//! logging, outbound adapters and component wiring.

#![warn(clippy::all)]
#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod cli;
pub mod client;
pub mod logging;
pub mod node;

pub use node::{load_config, HubNode};
