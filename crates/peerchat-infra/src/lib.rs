//! Infrastructure layer for peerchat.
//!
//! Contains implementations of the port traits defined in `peerchat-core`:
//! the SQLite-backed `MessageLog`, the HTTP country lookup, and the
//! `config.toml` loader with data-directory resolution.

pub mod config;
pub mod geo;
pub mod sqlite;
