use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use super::{Classification, ClassifierClient, ClassifierError};
use crate::config::ClassifierConfig;
use crate::models::NormalizedVector;

/// Longest slice of a non-JSON error body kept for the log
const MAX_DETAIL_LEN: usize = 200;

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    image: &'a [f32],
}

#[derive(Deserialize)]
struct ClassifyResponse {
    prediction: u32,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    encrypted: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Classifier reached over HTTP: `POST {"image": [...]}` → `{"prediction": n, "confidence": x}`
#[derive(Debug, Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &ClassifierConfig) -> anyhow::Result<Self> {
        Self::new(config.endpoint.clone(), config.timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ClassifierClient for HttpClassifier {
    async fn classify(
        &self,
        vector: &NormalizedVector,
    ) -> Result<Classification, ClassifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&ClassifyRequest {
                image: vector.as_slice(),
            })
            .send()
            .await
            .map_err(|e| ClassifierError::Transport(Box::new(e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClassifierError::Transport(Box::new(e)))?;

        if !status.is_success() {
            return Err(ClassifierError::Service {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        let parsed: ClassifyResponse = serde_json::from_slice(&body)?;
        debug!(
            "classifier at {} answered {} (confidence {:?}, encrypted {})",
            self.endpoint, parsed.prediction, parsed.confidence, parsed.encrypted
        );

        Ok(Classification {
            label: parsed.prediction,
            confidence: parsed.confidence,
        })
    }
}

/// Pull `detail` out of an error body, falling back to the raw text
fn error_detail(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            if text.is_empty() {
                "no details".to_string()
            } else {
                text.chars().take(MAX_DETAIL_LEN).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_prefers_json_field() {
        assert_eq!(
            error_detail(br#"{"detail": "Expected 784 pixels, got 3"}"#),
            "Expected 784 pixels, got 3"
        );
        assert_eq!(error_detail(br#"{"detail": ["a", 1]}"#), r#"["a",1]"#);
    }

    #[test]
    fn detail_falls_back_to_text() {
        assert_eq!(error_detail(b"  Bad Gateway \n"), "Bad Gateway");
        assert_eq!(error_detail(b""), "no details");
    }
}
