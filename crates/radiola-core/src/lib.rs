//! Shared model and storage for the Radiola player.

pub mod config;
pub mod net;
pub mod platform;
pub mod protocol;
pub mod secrets;
pub mod settings;
pub mod songs;
pub mod state;
pub mod worker;
