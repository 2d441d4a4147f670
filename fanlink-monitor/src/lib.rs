//! # fanlink-monitor — console monitor for networked ceiling fans
//!
//! Reads a TOML file listing fans, keeps a reconnecting connection to each
//! and prints every state change and connection phase they report. Command
//! lines typed on stdin are forwarded to the named fan.
//!
//! ## Modes
//!
//! - **Monitor** (default): run until Ctrl-C, text or `--json` output.
//! - **Probe**: try each fan once with the probe timeout and exit.
//! - **Gen-config**: print an example configuration.

pub mod config;
pub mod service;
