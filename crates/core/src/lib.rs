pub mod envelope;
pub mod history;
pub mod llm_client;
pub mod phrases;
pub mod skill;
pub mod speech;

pub use skill::{Skill, SkillError, SkillRequest};
