//! Request Dispatch
//!
//! Turns a platform request envelope into a response envelope. Each request
//! is classified into a `SkillRequest`, handed to exactly one handler, and any
//! handler fault is converted into a spoken diagnostic by the fallback so the
//! platform always receives a valid response.

use crate::envelope::{ENVELOPE_VERSION, Request, RequestEnvelope, ResponseEnvelope, SkillResponse};
use crate::history::{REPLAY_LIMIT, SessionAttributes};
use crate::llm_client::CompletionClient;
use crate::phrases::goodbye_phrase;
use crate::speech::{ResponseBuilder, Voice};
use std::sync::Arc;
use tracing::{error, info, instrument};

pub const LAUNCH_REQUEST: &str = "LaunchRequest";
pub const INTENT_REQUEST: &str = "IntentRequest";
pub const QUERY_INTENT: &str = "GptQueryIntent";
pub const CANCEL_INTENT: &str = "AMAZON.CancelIntent";
pub const STOP_INTENT: &str = "AMAZON.StopIntent";
pub const QUERY_SLOT: &str = "query";

pub const GREETING: &str = "What's up?";
pub const FOLLOW_UP: &str = "Anything else?";
pub const FALLBACK_PHRASE: &str = "Fast pass is broken, something went wrong, check them logs";

/// Faults raised by a handler. All of them end up in the fallback.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("no handler for request type '{request_type}' (intent: {intent:?})")]
    Unhandled {
        request_type: String,
        intent: Option<String>,
    },
    #[error("intent '{intent}' is missing a value for slot '{slot}'")]
    MissingSlot { intent: String, slot: String },
}

/// The requests the skill knows how to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillRequest {
    Launch,
    Query { query: Option<String> },
    CancelOrStop,
    Unhandled {
        request_type: String,
        intent: Option<String>,
    },
}

impl From<&Request> for SkillRequest {
    fn from(request: &Request) -> Self {
        match (request.request_type.as_str(), request.intent_name()) {
            (LAUNCH_REQUEST, _) => SkillRequest::Launch,
            (INTENT_REQUEST, Some(QUERY_INTENT)) => SkillRequest::Query {
                query: request.slot_value(QUERY_SLOT).map(str::to_string),
            },
            (INTENT_REQUEST, Some(CANCEL_INTENT | STOP_INTENT)) => SkillRequest::CancelOrStop,
            (request_type, intent) => SkillRequest::Unhandled {
                request_type: request_type.to_string(),
                intent: intent.map(str::to_string),
            },
        }
    }
}

/// True when the utterance is exactly "no", ignoring case and surrounding
/// whitespace. Deliberately literal: "nah" and "no thanks" do not match.
pub fn is_declining(query: &str) -> bool {
    query.trim().to_lowercase() == "no"
}

/// The skill: shared, immutable, and safe to call from many requests at once.
pub struct Skill {
    completion: Arc<dyn CompletionClient>,
    voice: Voice,
    history_limit: usize,
}

impl Skill {
    pub fn new(completion: Arc<dyn CompletionClient>, voice: Voice) -> Self {
        Self {
            completion,
            voice,
            history_limit: REPLAY_LIMIT,
        }
    }

    pub fn voice(&self) -> &Voice {
        &self.voice
    }

    /// Answers one platform request. Never fails.
    #[instrument(
        name = "skill_request",
        skip_all,
        fields(
            request_id = envelope.request.request_id.as_deref().unwrap_or_default(),
            request_type = %envelope.request.request_type,
        )
    )]
    pub async fn handle(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let mut attributes: SessionAttributes = envelope
            .session
            .and_then(|s| s.attributes)
            .unwrap_or_default()
            .into();

        let request = SkillRequest::from(&envelope.request);
        info!(request = ?request, "Dispatching request");

        let result = match request {
            SkillRequest::Launch => Ok(self.handle_launch(&mut attributes)),
            SkillRequest::Query { query } => self.handle_query(query, &mut attributes).await,
            SkillRequest::CancelOrStop => Ok(self.handle_cancel_or_stop()),
            SkillRequest::Unhandled {
                request_type,
                intent,
            } => Err(SkillError::Unhandled {
                request_type,
                intent,
            }),
        };

        let response = result.unwrap_or_else(|e| self.handle_error(&e));

        ResponseEnvelope {
            version: ENVELOPE_VERSION.to_string(),
            session_attributes: attributes.into_map(),
            response,
        }
    }

    fn handle_launch(&self, attributes: &mut SessionAttributes) -> SkillResponse {
        attributes.initialize_history();
        ResponseBuilder::new(&self.voice)
            .speak(GREETING)
            .ask(GREETING)
            .build()
    }

    async fn handle_query(
        &self,
        query: Option<String>,
        attributes: &mut SessionAttributes,
    ) -> Result<SkillResponse, SkillError> {
        let query = query.ok_or_else(|| SkillError::MissingSlot {
            intent: QUERY_INTENT.to_string(),
            slot: QUERY_SLOT.to_string(),
        })?;

        if is_declining(&query) {
            info!("User declined a follow-up; ending session");
            return Ok(ResponseBuilder::new(&self.voice)
                .speak(goodbye_phrase())
                .end_session(true)
                .build());
        }

        attributes.ensure_history();
        let history = attributes.recent_exchanges(self.history_limit);
        let answer = self.completion.complete(&history, &query).await;
        attributes.append_exchange(query, answer.as_str());

        Ok(ResponseBuilder::new(&self.voice)
            .speak(&answer)
            .ask(FOLLOW_UP)
            .build())
    }

    fn handle_cancel_or_stop(&self) -> SkillResponse {
        ResponseBuilder::new(&self.voice)
            .speak(goodbye_phrase())
            .build()
    }

    fn handle_error(&self, err: &SkillError) -> SkillResponse {
        error!(error = ?err, "Request failed: {err}");
        ResponseBuilder::new(&self.voice)
            .speak(FALLBACK_PHRASE)
            .ask(FALLBACK_PHRASE)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{CHAT_HISTORY_KEY, Exchange};
    use crate::llm_client::MockCompletionClient;
    use crate::phrases::GOODBYE_PHRASES;
    use serde_json::{Value, json};

    fn envelope(request: Value, attributes: Option<Value>) -> RequestEnvelope {
        let mut session = json!({
            "new": attributes.is_none(),
            "sessionId": "session-1",
            "application": { "applicationId": "skill-1" }
        });
        if let Some(attributes) = attributes {
            session["attributes"] = attributes;
        }
        serde_json::from_value(json!({
            "version": "1.0",
            "session": session,
            "request": request
        }))
        .unwrap()
    }

    fn query_request(query: &str) -> Value {
        json!({
            "type": "IntentRequest",
            "requestId": "req-1",
            "intent": {
                "name": "GptQueryIntent",
                "slots": { "query": { "name": "query", "value": query } }
            }
        })
    }

    fn intent_request(name: &str) -> Value {
        json!({ "type": "IntentRequest", "requestId": "req-1", "intent": { "name": name } })
    }

    fn skill_with(mock: MockCompletionClient) -> Skill {
        Skill::new(Arc::new(mock), Voice::default())
    }

    fn spoken(response: &ResponseEnvelope) -> &str {
        response.response.output_speech.as_ref().unwrap().ssml()
    }

    fn history_of(response: &ResponseEnvelope) -> Vec<Exchange> {
        SessionAttributes::new(response.session_attributes.clone()).recent_exchanges(usize::MAX)
    }

    #[test]
    fn test_classifies_requests() {
        let launch: Request =
            serde_json::from_value(json!({ "type": "LaunchRequest" })).unwrap();
        assert_eq!(SkillRequest::from(&launch), SkillRequest::Launch);

        let query: Request = serde_json::from_value(query_request("hi")).unwrap();
        assert_eq!(
            SkillRequest::from(&query),
            SkillRequest::Query {
                query: Some("hi".to_string())
            }
        );

        for name in [CANCEL_INTENT, STOP_INTENT] {
            let request: Request = serde_json::from_value(intent_request(name)).unwrap();
            assert_eq!(SkillRequest::from(&request), SkillRequest::CancelOrStop);
        }

        let help: Request = serde_json::from_value(intent_request("AMAZON.HelpIntent")).unwrap();
        assert_eq!(
            SkillRequest::from(&help),
            SkillRequest::Unhandled {
                request_type: "IntentRequest".to_string(),
                intent: Some("AMAZON.HelpIntent".to_string()),
            }
        );
    }

    #[test]
    fn test_is_declining_is_literal() {
        assert!(is_declining("no"));
        assert!(is_declining("  No \n"));
        assert!(is_declining("NO"));
        assert!(!is_declining("no thanks"));
        assert!(!is_declining("nah"));
        assert!(!is_declining("n o"));
        assert!(!is_declining(""));
    }

    #[tokio::test]
    async fn test_launch_resets_history_and_greets() {
        let mut mock = MockCompletionClient::new();
        mock.expect_complete().never();
        let skill = skill_with(mock);

        let request = envelope(
            json!({ "type": "LaunchRequest", "requestId": "req-0" }),
            Some(json!({ "chat_history": [["old", "stale"]] })),
        );
        let response = skill.handle(request).await;

        assert_eq!(response.session_attributes.get(CHAT_HISTORY_KEY), Some(&json!([])));
        assert!(spoken(&response).contains(GREETING));
        assert_eq!(response.response.should_end_session, Some(false));
        assert!(response.response.reprompt.is_some());
    }

    #[tokio::test]
    async fn test_query_calls_completion_and_appends() {
        let mut mock = MockCompletionClient::new();
        mock.expect_complete()
            .withf(|history, question| {
                history == [Exchange::new("first", "one")] && question == "what is rust"
            })
            .times(1)
            .returning(|_, _| "A systems language.".to_string());
        let skill = skill_with(mock);

        let request = envelope(
            query_request("what is rust"),
            Some(json!({ "chat_history": [["first", "one"]] })),
        );
        let response = skill.handle(request).await;

        assert!(spoken(&response).contains("A systems language."));
        let reprompt = response.response.reprompt.as_ref().unwrap();
        assert!(reprompt.output_speech.ssml().contains(FOLLOW_UP));
        assert_eq!(response.response.should_end_session, Some(false));
        assert_eq!(
            history_of(&response),
            vec![
                Exchange::new("first", "one"),
                Exchange::new("what is rust", "A systems language."),
            ]
        );
    }

    #[tokio::test]
    async fn test_query_without_history_initializes_lazily() {
        let mut mock = MockCompletionClient::new();
        mock.expect_complete()
            .withf(|history, _| history.is_empty())
            .times(1)
            .returning(|_, _| "Hello.".to_string());
        let skill = skill_with(mock);

        let response = skill.handle(envelope(query_request("hi"), None)).await;

        assert_eq!(history_of(&response), vec![Exchange::new("hi", "Hello.")]);
    }

    #[tokio::test]
    async fn test_query_replays_only_recent_exchanges() {
        let stored: Vec<Value> = (0..60).map(|i| json!([format!("q{i}"), format!("a{i}")])).collect();

        let mut mock = MockCompletionClient::new();
        mock.expect_complete()
            .withf(|history, _| {
                history.len() == REPLAY_LIMIT
                    && history[0].question == "q10"
                    && history[REPLAY_LIMIT - 1].question == "q59"
            })
            .times(1)
            .returning(|_, _| "ok".to_string());
        let skill = skill_with(mock);

        let response = skill
            .handle(envelope(query_request("next"), Some(json!({ "chat_history": stored }))))
            .await;

        // The stored history keeps growing; only the replay is capped.
        assert_eq!(history_of(&response).len(), 61);
    }

    #[tokio::test]
    async fn test_literal_no_ends_session_without_completion() {
        for utterance in ["no", " No ", "NO\t"] {
            let mut mock = MockCompletionClient::new();
            mock.expect_complete().never();
            let skill = skill_with(mock);

            let response = skill
                .handle(envelope(
                    query_request(utterance),
                    Some(json!({ "chat_history": [["q", "a"]] })),
                ))
                .await;

            assert!(GOODBYE_PHRASES.iter().any(|p| spoken(&response).contains(p)));
            assert_eq!(response.response.should_end_session, Some(true));
            assert!(response.response.reprompt.is_none());
            assert_eq!(history_of(&response), vec![Exchange::new("q", "a")]);
        }
    }

    #[tokio::test]
    async fn test_no_thanks_takes_completion_path() {
        let mut mock = MockCompletionClient::new();
        mock.expect_complete()
            .withf(|_, question| question == "no thanks")
            .times(1)
            .returning(|_, _| "Alright.".to_string());
        let skill = skill_with(mock);

        let response = skill.handle(envelope(query_request("no thanks"), None)).await;

        assert!(spoken(&response).contains("Alright."));
        assert_eq!(response.response.should_end_session, Some(false));
    }

    #[tokio::test]
    async fn test_completion_error_text_is_spoken() {
        let mut mock = MockCompletionClient::new();
        mock.expect_complete()
            .returning(|_, _| "Error 401: invalid key".to_string());
        let skill = skill_with(mock);

        let response = skill.handle(envelope(query_request("hi"), None)).await;

        assert!(spoken(&response).contains("Error 401: invalid key"));
        assert_eq!(response.response.should_end_session, Some(false));
    }

    #[tokio::test]
    async fn test_cancel_and_stop_say_goodbye() {
        for name in [CANCEL_INTENT, STOP_INTENT] {
            let mut mock = MockCompletionClient::new();
            mock.expect_complete().never();
            let skill = skill_with(mock);

            let response = skill.handle(envelope(intent_request(name), None)).await;

            assert!(GOODBYE_PHRASES.iter().any(|p| spoken(&response).contains(p)));
            assert_eq!(response.response.should_end_session, None);
            assert!(response.response.reprompt.is_none());
        }
    }

    #[tokio::test]
    async fn test_missing_slot_falls_back() {
        let mut mock = MockCompletionClient::new();
        mock.expect_complete().never();
        let skill = skill_with(mock);

        let request = envelope(
            json!({
                "type": "IntentRequest",
                "intent": { "name": "GptQueryIntent", "slots": { "query": { "name": "query" } } }
            }),
            Some(json!({ "chat_history": [["q", "a"]] })),
        );
        let response = skill.handle(request).await;

        assert!(spoken(&response).contains(FALLBACK_PHRASE));
        assert_eq!(response.response.should_end_session, Some(false));
        // Attributes survive the fault untouched.
        assert_eq!(history_of(&response), vec![Exchange::new("q", "a")]);
    }

    #[tokio::test]
    async fn test_unrouted_requests_fall_back() {
        let mut mock = MockCompletionClient::new();
        mock.expect_complete().never();
        let skill = skill_with(mock);

        for request in [
            intent_request("AMAZON.HelpIntent"),
            json!({ "type": "SessionEndedRequest", "reason": "USER_INITIATED" }),
        ] {
            let response = skill.handle(envelope(request, None)).await;
            assert!(spoken(&response).contains(FALLBACK_PHRASE));
            assert_ne!(response.response.should_end_session, Some(true));
        }
    }
}
