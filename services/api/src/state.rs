//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the skill and the
//! settings the HTTP layer consults before dispatching to it.

use fastpass_core::Skill;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub skill: Arc<Skill>,
    /// Application id that inbound envelopes must carry, if verification is on.
    pub skill_id: Option<Arc<str>>,
}

impl AppState {
    pub fn new(skill: Skill, skill_id: Option<String>) -> Self {
        Self {
            skill: Arc::new(skill),
            skill_id: skill_id.map(Arc::from),
        }
    }
}
