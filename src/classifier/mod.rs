pub mod http;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::NormalizedVector;

pub use http::HttpClassifier;

/// What the remote classifier reported for one vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: u32,
    pub confidence: Option<f32>,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The request never completed (connection refused, timeout, reset)
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("classifier returned status {status}: {detail}")]
    Service { status: u16, detail: String },

    #[error("malformed classifier response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
}

/// Which side of the round trip failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport,
    Service,
}

impl ClassifierError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ClassifierError::Transport(_) => FailureKind::Transport,
            // a 2xx with an unreadable body still means the server answered
            ClassifierError::Service { .. } | ClassifierError::MalformedResponse(_) => {
                FailureKind::Service
            }
        }
    }
}

/// Remote digit classifier the pipeline sends its vector to
pub trait ClassifierClient: Send + Sync {
    fn classify(
        &self,
        vector: &NormalizedVector,
    ) -> impl Future<Output = Result<Classification, ClassifierError>> + Send;
}
