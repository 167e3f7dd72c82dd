//! Structured result returned by the synchronous inference endpoints.

use serde::Serialize;

use crate::error::{Error, ErrorKind, Result};

use super::Prediction;

/// `{success: true, result: [...]}` or `{success: false, error, kind}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
}

impl InferenceOutcome {
    /// Failure result for `error`.
    #[must_use]
    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
            kind: Some(error.kind()),
        }
    }
}

impl From<Result<Prediction>> for InferenceOutcome {
    fn from(result: Result<Prediction>) -> Self {
        match result {
            Ok(prediction) => Self {
                success: true,
                result: Some(prediction.scores),
                error: None,
                kind: None,
            },
            Err(e) => Self::failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_success_shape() {
        let outcome = InferenceOutcome::from(Ok(Prediction {
            scores: vec![0.25, 0.75],
        }));

        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"success": true, "result": [0.25, 0.75]})
        );
    }

    #[test]
    fn test_failure_shape() {
        let outcome = InferenceOutcome::from(Err(Error::EmptyImage));

        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"success": false, "error": "image payload is empty", "kind": "decode"})
        );
    }
}
