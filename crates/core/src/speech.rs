//! Speech Response Formatting
//!
//! Wraps plain text in SSML voice tags and assembles the response body the
//! voice platform expects.

use crate::envelope::{OutputSpeech, Reprompt, SkillResponse};

pub const DEFAULT_VOICE: &str = "Salli";

/// The synthesized voice every utterance is spoken in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    name: String,
}

impl Voice {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders `text` as a complete SSML document in this voice.
    pub fn ssml(&self, text: &str) -> OutputSpeech {
        OutputSpeech::Ssml {
            ssml: format!(
                "<speak><voice name=\"{}\">{}</voice></speak>",
                escape_xml(&self.name),
                escape_xml(text)
            ),
        }
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new(DEFAULT_VOICE)
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Builds a `SkillResponse` one piece at a time.
#[derive(Debug)]
pub struct ResponseBuilder<'a> {
    voice: &'a Voice,
    response: SkillResponse,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(voice: &'a Voice) -> Self {
        Self {
            voice,
            response: SkillResponse::default(),
        }
    }

    pub fn speak(mut self, text: &str) -> Self {
        self.response.output_speech = Some(self.voice.ssml(text));
        self
    }

    /// Sets the reprompt and keeps the session open to hear the reply.
    pub fn ask(mut self, text: &str) -> Self {
        self.response.reprompt = Some(Reprompt {
            output_speech: self.voice.ssml(text),
        });
        self.response.should_end_session = Some(false);
        self
    }

    pub fn end_session(mut self, end: bool) -> Self {
        self.response.should_end_session = Some(end);
        self
    }

    pub fn build(self) -> SkillResponse {
        self.response
    }
}
