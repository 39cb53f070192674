//! Relayhost library
//!
//! Provisions relay game sessions through a remote control plane or a local
//! container runtime, and tears them down again.

pub mod api;
pub mod container;
pub mod control_plane;
pub mod joincode;
pub mod orchestrator;
pub mod process;
pub mod scanner;
pub mod session;
pub mod settings;
