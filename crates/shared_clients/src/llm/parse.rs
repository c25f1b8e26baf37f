//! Interpreting what comes back from the completion service: the HTTP body
//! itself, and the free text the model wrote inside it.

use super::error::LlmError;
use reqwest::StatusCode;
use serde_json::Value;

/// Model output that was supposed to be JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmJson {
    /// The whole reply parsed as JSON.
    Parsed(Value),
    /// JSON found inside a Markdown code fence or surrounding prose.
    Fenced(Value),
    Unparseable(String),
}

impl LlmJson {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Parsed(v) | Self::Fenced(v) => Some(v),
            Self::Unparseable(_) => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Parsed(v) | Self::Fenced(v) => Some(v),
            Self::Unparseable(_) => None,
        }
    }
}

pub fn parse_llm_json(text: &str) -> LlmJson {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return LlmJson::Parsed(value);
    }

    let unfenced = strip_code_fences(trimmed);
    if unfenced != trimmed {
        if let Ok(value) = serde_json::from_str::<Value>(&unfenced) {
            return LlmJson::Fenced(value);
        }
    }

    // last resort: the outermost {...} span
    if let (Some(start), Some(end)) = (unfenced.find('{'), unfenced.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<Value>(&unfenced[start..=end]) {
                return LlmJson::Fenced(value);
            }
        }
    }

    LlmJson::Unparseable(text.to_string())
}

const FENCE_TAGS: &[&str] = &["sql", "json", "postgresql", "postgres", "pgsql"];

/// Remove a surrounding Markdown code fence (```` ```sql ... ``` ````) if
/// present. Text without a fence is returned trimmed.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after_open = &trimmed[start + 3..];
    let body_start = match after_open.find('\n') {
        // an info string is a single word (`sql`, `json`); anything else on
        // the opening line is already part of the body
        Some(nl) if !after_open[..nl].trim().contains(char::is_whitespace) => nl + 1,
        Some(_) => 0,
        None => {
            let tag_len = after_open.find(char::is_whitespace).unwrap_or(0);
            let tag = after_open[..tag_len].to_ascii_lowercase();
            if FENCE_TAGS.contains(&tag.as_str()) {
                tag_len
            } else {
                0
            }
        }
    };
    let body = &after_open[body_start..];
    let body = match body.find("```") {
        Some(end) => &body[..end],
        None => body,
    };
    body.trim().to_string()
}

/// Pull the assistant message out of a completion response body.
///
/// Accepts the `choices[0].message.content` shape and the
/// `message.content` shape. An `error` member is a protocol error whatever
/// the status code says.
pub(crate) fn parse_completion(status: StatusCode, body: &[u8]) -> Result<String, LlmError> {
    let json: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) if status.is_success() => {
            return Err(LlmError::parse(format!("response body is not JSON: {e}")))
        }
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            return Err(LlmError::protocol(
                Some(status.as_u16()),
                format!("status {}: {}", status, text.trim()),
            ));
        }
    };

    if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| error.as_str().map(str::to_string))
            .unwrap_or_else(|| error.to_string());
        return Err(LlmError::protocol(Some(status.as_u16()), message));
    }

    if !status.is_success() {
        return Err(LlmError::protocol(
            Some(status.as_u16()),
            format!("status {}: {}", status, json),
        ));
    }

    let content = json
        .pointer("/choices/0/message/content")
        .or_else(|| json.pointer("/message/content"))
        .and_then(Value::as_str);

    match content {
        Some(text) => Ok(text.to_string()),
        None => Err(LlmError::parse(format!(
            "no completion content in response: {}",
            common::utils::truncate_chars(&json.to_string(), 300)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_is_parsed() {
        let out = parse_llm_json(r#"{"tables": ["orders"], "reasoning": "sales"}"#);
        assert_eq!(out, LlmJson::Parsed(json!({"tables": ["orders"], "reasoning": "sales"})));
    }

    #[test]
    fn fenced_json_is_recognised() {
        let out = parse_llm_json("```json\n{\"tables\": []}\n```");
        assert_eq!(out, LlmJson::Fenced(json!({"tables": []})));
    }

    #[test]
    fn json_inside_prose_is_recognised() {
        let out = parse_llm_json("Sure! Here you go: {\"tables\": [\"a\"]} hope it helps");
        assert_eq!(out, LlmJson::Fenced(json!({"tables": ["a"]})));
    }

    #[test]
    fn garbage_is_unparseable() {
        let out = parse_llm_json("I cannot help with that");
        assert!(matches!(out, LlmJson::Unparseable(_)));
        assert!(out.value().is_none());
    }

    #[test]
    fn strips_sql_fence() {
        let sql = strip_code_fences("```sql\nSELECT * FROM orders\nLIMIT 10\n```");
        assert_eq!(sql, "SELECT * FROM orders\nLIMIT 10");
    }

    #[test]
    fn strips_single_line_fence() {
        assert_eq!(strip_code_fences("```SELECT 1```"), "SELECT 1");
        assert_eq!(strip_code_fences("```sql SELECT 1```"), "SELECT 1");
        assert_eq!(strip_code_fences("``` SELECT 1 ```"), "SELECT 1");
    }

    #[test]
    fn unfenced_text_is_trimmed() {
        assert_eq!(strip_code_fences("  SELECT 1  \n"), "SELECT 1");
    }

    #[test]
    fn completion_shapes() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        let ollama = json!({"message": {"role": "assistant", "content": "hello"}, "done": true});
        assert_eq!(
            parse_completion(StatusCode::OK, openai.to_string().as_bytes()).unwrap(),
            "hi"
        );
        assert_eq!(
            parse_completion(StatusCode::OK, ollama.to_string().as_bytes()).unwrap(),
            "hello"
        );
    }

    #[test]
    fn error_payload_is_protocol_error_even_on_200() {
        let body = json!({"error": {"message": "model overloaded"}});
        let err = parse_completion(StatusCode::OK, body.to_string().as_bytes()).unwrap_err();
        match err {
            LlmError::Protocol { status, context } => {
                assert_eq!(status, Some(200));
                assert_eq!(context.message(), "model overloaded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_shape_is_parse_error() {
        let err = parse_completion(StatusCode::OK, br#"{"result": 1}"#).unwrap_err();
        assert!(matches!(err, LlmError::Parse { .. }));
    }

    #[test]
    fn non_json_error_status_is_protocol_error() {
        let err = parse_completion(StatusCode::BAD_GATEWAY, b"upstream down").unwrap_err();
        assert!(matches!(err, LlmError::Protocol { status: Some(502), .. }));
    }
}
