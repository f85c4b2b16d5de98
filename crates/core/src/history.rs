//! Session History Store
//!
//! The voice platform round-trips a JSON attribute map with every turn of a
//! session. This module owns the `chat_history` entry of that map: an
//! append-only list of question/answer exchanges that is replayed to the
//! completion service on each query.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Attribute key under which the exchanges are stored.
pub const CHAT_HISTORY_KEY: &str = "chat_history";

/// Maximum number of exchanges replayed into a prompt.
pub const REPLAY_LIMIT: usize = 50;

/// One completed question/answer turn.
///
/// Stored on the wire as a two-element array `["question", "answer"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

impl Exchange {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

impl From<(String, String)> for Exchange {
    fn from((question, answer): (String, String)) -> Self {
        Self { question, answer }
    }
}

impl From<Exchange> for (String, String) {
    fn from(exchange: Exchange) -> Self {
        (exchange.question, exchange.answer)
    }
}

/// The session attribute map for a single invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionAttributes {
    attributes: Map<String, Value>,
}

impl SessionAttributes {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    /// Resets the history to an empty sequence, discarding anything stored.
    pub fn initialize_history(&mut self) {
        self.attributes
            .insert(CHAT_HISTORY_KEY.to_string(), Value::Array(Vec::new()));
    }

    /// Initializes the history only if it is absent or not a list of exchanges.
    pub fn ensure_history(&mut self) {
        match self.attributes.get(CHAT_HISTORY_KEY) {
            None => self.initialize_history(),
            Some(value) if parse_exchanges(value).is_none() => {
                warn!(value = %value, "Discarding malformed chat history");
                self.initialize_history();
            }
            Some(_) => {}
        }
    }

    /// Appends one exchange to the end of the history.
    pub fn append_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.ensure_history();
        if let Some(Value::Array(history)) = self.attributes.get_mut(CHAT_HISTORY_KEY) {
            history.push(Value::Array(vec![
                Value::String(question.into()),
                Value::String(answer.into()),
            ]));
        }
    }

    /// Returns the last `limit` exchanges in insertion order.
    ///
    /// An absent or malformed history reads as empty.
    pub fn recent_exchanges(&self, limit: usize) -> Vec<Exchange> {
        let mut exchanges = self
            .attributes
            .get(CHAT_HISTORY_KEY)
            .and_then(parse_exchanges)
            .unwrap_or_default();
        let skip = exchanges.len().saturating_sub(limit);
        exchanges.drain(..skip);
        exchanges
    }

    pub fn history_len(&self) -> usize {
        self.attributes
            .get(CHAT_HISTORY_KEY)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.attributes
    }
}

impl From<Map<String, Value>> for SessionAttributes {
    fn from(attributes: Map<String, Value>) -> Self {
        Self::new(attributes)
    }
}

fn parse_exchanges(value: &Value) -> Option<Vec<Exchange>> {
    Vec::<Exchange>::deserialize(value).ok()
}
