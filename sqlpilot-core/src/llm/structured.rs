//! Structured replies: fenced JSON decoding with a single re-ask.

use super::{TextGenerator, strip_code_fences};
use crate::Result;
use crate::error::SqlPilotError;
use crate::resilience::LlmHandler;
use serde::de::DeserializeOwned;

/// Appended to the user prompt when a reply could not be decoded.
const REASK_SUFFIX: &str = "\n\nYour previous reply could not be parsed. \
Reply with only the requested JSON object, without commentary or markdown.";

/// Decodes a JSON object from a model reply.
///
/// Code fences and a leading `json` tag are removed first; if the remainder
/// still carries prose around the object, the outermost `{...}` span is used.
///
/// # Errors
/// Returns the `serde_json` error when no decodable object is found.
pub fn decode_json_reply<T: DeserializeOwned>(reply: &str) -> serde_json::Result<T> {
    let text = strip_code_fences(reply);
    match serde_json::from_str(&text) {
        Ok(value) => Ok(value),
        Err(error) => match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => serde_json::from_str(&text[start..=end]),
            _ => Err(error),
        },
    }
}

/// Sends one prompt pair through `handler` and returns the raw reply.
///
/// # Errors
/// Returns [`SqlPilotError::Handler`] when the handler gives up.
pub(crate) async fn complete(
    llm: &dyn TextGenerator,
    handler: &LlmHandler,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<String> {
    Ok(handler
        .call(|| llm.complete(system_prompt, user_prompt))
        .await?)
}

/// Asks for a structured reply, re-asking once when `decode` rejects it.
///
/// `stage` names the pipeline stage in logs and in the final error.
///
/// # Errors
/// Returns [`SqlPilotError::LlmResponse`] when the re-asked reply still does
/// not decode, or the handler error when a call fails.
pub(crate) async fn ask_structured<T, D>(
    llm: &dyn TextGenerator,
    handler: &LlmHandler,
    stage: &str,
    system_prompt: &str,
    user_prompt: &str,
    decode: D,
) -> Result<T>
where
    D: Fn(&str) -> std::result::Result<T, String>,
{
    let reply = complete(llm, handler, system_prompt, user_prompt).await?;
    let first_error = match decode(&reply) {
        Ok(value) => return Ok(value),
        Err(error) => error,
    };

    tracing::warn!(stage, error = %first_error, "Model reply did not decode, asking again");

    let retry_prompt = format!("{}{}", user_prompt, REASK_SUFFIX);
    let reply = complete(llm, handler, system_prompt, &retry_prompt).await?;
    decode(&reply).map_err(|error| {
        SqlPilotError::llm_response(format!("{} reply could not be decoded: {}", stage, error))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        answer: u32,
    }

    struct Scripted {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for Scripted {
        async fn complete(&self, _system: &str, user: &str) -> std::result::Result<String, LlmError> {
            self.prompts.lock().unwrap().push(user.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LlmError::new("script exhausted"))
        }
    }

    fn decode(reply: &str) -> std::result::Result<Reply, String> {
        decode_json_reply(reply).map_err(|e| e.to_string())
    }

    #[test]
    fn test_decode_json_reply_tolerates_noise() {
        let reply: Reply = decode_json_reply("```json\n{\"answer\": 1}\n```").unwrap();
        assert_eq!(reply.answer, 1);

        let reply: Reply = decode_json_reply("Sure! {\"answer\": 2} Hope it helps").unwrap();
        assert_eq!(reply.answer, 2);

        assert!(decode_json_reply::<Reply>("no json here").is_err());
    }

    #[tokio::test]
    async fn test_reasks_exactly_once() {
        let llm = Scripted::new(&["not json", "{\"answer\": 42}"]);
        let handler = LlmHandler::default();

        let reply = ask_structured(&llm, &handler, "intent", "sys", "question", decode)
            .await
            .unwrap();
        assert_eq!(reply, Reply { answer: 42 });

        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].starts_with("question"));
        assert!(prompts[1].contains("could not be parsed"));
    }

    #[tokio::test]
    async fn test_second_decode_failure_is_llm_response_error() {
        let llm = Scripted::new(&["nope", "still nope", "{\"answer\": 1}"]);
        let handler = LlmHandler::default();

        let error = ask_structured(&llm, &handler, "intent", "sys", "question", decode)
            .await
            .unwrap_err();
        assert!(matches!(error, SqlPilotError::LlmResponse { .. }));
        assert_eq!(llm.prompts.lock().unwrap().len(), 2);
    }
}
