//! Voice Platform Envelope Types
//!
//! Serde models for the JSON request and response envelopes exchanged with
//! the voice platform. Only the fields the skill reads or writes are modeled;
//! everything else in the inbound envelope is ignored on deserialization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const ENVELOPE_VERSION: &str = "1.0";

/// The full request body posted by the voice platform.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestEnvelope {
    #[serde(default)]
    pub version: String,
    pub session: Option<Session>,
    pub request: Request,
}

impl RequestEnvelope {
    /// The application id the platform says this request is addressed to.
    pub fn application_id(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|s| s.application.as_ref())
            .map(|a| a.application_id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub new: bool,
    pub session_id: String,
    pub application: Option<Application>,
    /// Attributes the skill returned on the previous turn of this session.
    #[serde(default)]
    pub attributes: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub application_id: String,
}

/// The request body. Kept as a flat struct rather than a tagged enum so that
/// request types the skill doesn't know about still deserialize.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(rename = "type")]
    pub request_type: String,
    pub request_id: Option<String>,
    pub locale: Option<String>,
    pub intent: Option<Intent>,
    /// Present on `SessionEndedRequest`.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Intent {
    pub name: String,
    #[serde(default)]
    pub slots: HashMap<String, Slot>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Slot {
    pub name: String,
    pub value: Option<String>,
}

impl Request {
    /// Returns the value of the named slot, if the request carries an intent
    /// with that slot filled in.
    pub fn slot_value(&self, slot: &str) -> Option<&str> {
        self.intent
            .as_ref()
            .and_then(|i| i.slots.get(slot))
            .and_then(|s| s.value.as_deref())
    }

    pub fn intent_name(&self) -> Option<&str> {
        self.intent.as_ref().map(|i| i.name.as_str())
    }
}

/// The response body returned to the voice platform.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub version: String,
    #[serde(default)]
    pub session_attributes: Map<String, Value>,
    pub response: SkillResponse,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_speech: Option<OutputSpeech>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reprompt: Option<Reprompt>,
    /// `None` leaves the decision to the platform's default for the request type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_end_session: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum OutputSpeech {
    #[serde(rename = "SSML")]
    Ssml { ssml: String },
}

impl OutputSpeech {
    pub fn ssml(&self) -> &str {
        match self {
            OutputSpeech::Ssml { ssml } => ssml,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reprompt {
    pub output_speech: OutputSpeech,
}
