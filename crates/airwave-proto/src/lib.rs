//! Shared data model, wire protocol and configuration for airwave.

pub mod config;
pub mod genres;
pub mod platform;
pub mod protocol;
pub mod station;
