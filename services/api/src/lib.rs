//! Fast Pass API Library Crate
//!
//! This library contains the HTTP surface of the voice skill: configuration,
//! shared state, handlers, and routing. The `api` binary is a thin wrapper
//! around this library.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
