//! Verification decision derived from classifier scores.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Scores strictly above this verify the submission.
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Outcome reported to the backend for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "VERIFIED")]
    Verified,
    #[serde(rename = "REJECTED_BY_ML")]
    RejectedByMl,
}

impl Decision {
    /// Classify a single score against [`DECISION_THRESHOLD`].
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score > DECISION_THRESHOLD {
            Self::Verified
        } else {
            Self::RejectedByMl
        }
    }

    /// Wire name of the decision.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Verified => "VERIFIED",
            Self::RejectedByMl => "REJECTED_BY_ML",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
