//! Face recognition service proxy
//!
//! Thin retrying client for the external recognition service. The model
//! itself is opaque; this module only ships photos out and stores whatever
//! detected-child list comes back. Recognition is optional: when the
//! service is unconfigured or failing, photos are stored untagged.

use crate::config::RecognitionConfig;
use crate::db::backoff_delay;
use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Detected-child list stored alongside a photo
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recognition {
    pub child_ids: Vec<i32>,
    pub confidence: f64,
}

/// Encode raw image bytes as the data-URL form the service expects
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

#[derive(Serialize)]
struct BatchRecognizeRequest<'a> {
    class_id: i32,
    images: &'a [String],
}

/// HTTP client for the recognition service
pub struct RecognitionClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl RecognitionClient {
    pub fn new(config: &RecognitionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    /// Recognize children in a batch of images (data-URL encoded)
    pub async fn batch_recognize(
        &self,
        class_id: i32,
        images: &[String],
    ) -> Result<Recognition> {
        let url = format!("{}/batch_recognize", self.base_url);
        let body = BatchRecognizeRequest { class_id, images };

        let mut attempt = 1u32;
        loop {
            match self.try_recognize(&url, &body).await {
                Ok(recognition) => return Ok(recognition),
                Err(e) if attempt < self.max_retries => {
                    let delay = backoff_delay(attempt);
                    tracing::warn!(
                        "recognition attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        self.max_retries,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("recognition failed after {} attempts: {}", attempt, e);
                    return Err(Error::ServiceUnavailable(
                        "recognition service unreachable".to_string(),
                    ));
                }
            }
        }
    }

    async fn try_recognize(
        &self,
        url: &str,
        body: &BatchRecognizeRequest<'_>,
    ) -> Result<Recognition> {
        let response = self.client.post(url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(Error::ServiceUnavailable(format!(
                "recognition service returned {}",
                response.status()
            )));
        }
        Ok(response.json::<Recognition>().await?)
    }

    /// Liveness probe of the recognition service; single attempt
    pub async fn health(&self) -> Result<serde_json::Value> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!("recognition health check failed: {}", e);
            Error::ServiceUnavailable("recognition service unreachable".to_string())
        })?;
        if !response.status().is_success() {
            return Err(Error::ServiceUnavailable(format!(
                "recognition service returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_encoding() {
        let url = to_data_url("image/png", b"abc");
        assert_eq!(url, "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_recognition_round_trip() {
        let raw = r#"{"child_ids":[1,3],"confidence":0.92}"#;
        let parsed: Recognition = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.child_ids, vec![1, 3]);
        assert!(parsed.confidence > 0.9);
    }
}
