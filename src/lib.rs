//! subembed - soft-subtitle embedding sessions
//!
//! Collects one video and any number of subtitle files per user, then
//! stream-copies them into a single container with one tagged subtitle track
//! per file. This library crate exposes the session core for the binary and
//! for integration testing.

pub mod caption;
pub mod collaborators;
pub mod config;
pub mod session;
pub mod transfer;
