//! Uniform response wrapper.
//!
//! Success: `{"result": .., "success": true[, "next": ..]}`.
//! Failure: `{"error": .., "success": false}`.

use serde_json::Value;

use crate::handler::Payload;

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success { result: Value, next: Option<String> },
    Failure { error: String },
}

impl Envelope {
    pub fn success(result: Value) -> Self {
        Envelope::Success { result, next: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Envelope::Failure {
            error: error.into(),
        }
    }

    /// Attach a pagination link. No-op on failures.
    pub fn with_next(self, link: Option<String>) -> Self {
        match self {
            Envelope::Success { result, .. } => Envelope::Success { result, next: link },
            failure => failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }

    pub fn into_payload(self) -> Payload {
        let mut out = Payload::new();
        match self {
            Envelope::Success { result, next } => {
                if let Some(next) = next {
                    out.insert("next".into(), Value::String(next));
                }
                out.insert("result".into(), result);
                out.insert("success".into(), Value::Bool(true));
            }
            Envelope::Failure { error } => {
                out.insert("error".into(), Value::String(error));
                out.insert("success".into(), Value::Bool(false));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_shape() {
        let env = Envelope::success(json!({"foo": "bar"}));
        assert_eq!(
            serde_json::to_string(&env.into_payload()).unwrap(),
            r#"{"result":{"foo":"bar"},"success":true}"#
        );
    }

    #[test]
    fn list_with_next() {
        let env = Envelope::success(json!([{"foo": "hello"}]))
            .with_next(Some("http://foo.com?next=cursor123".into()));
        assert_eq!(
            serde_json::to_string(&env.into_payload()).unwrap(),
            r#"{"next":"http://foo.com?next=cursor123","result":[{"foo":"hello"}],"success":true}"#
        );
    }

    #[test]
    fn failure_shape_ignores_next() {
        let env = Envelope::failure("couldn't create").with_next(Some("x".into()));
        assert!(!env.is_success());
        assert_eq!(
            serde_json::to_string(&env.into_payload()).unwrap(),
            r#"{"error":"couldn't create","success":false}"#
        );
    }
}
