use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http_client::HttpClient;

/// Labels below this confidence (percent) are ignored.
pub const MIN_CONFIDENCE: f32 = 70.0;
/// Most labels kept per image.
pub const MAX_LABELS: usize = 10;

const CLASSIFIABLE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png"];

/// Returns ranked labels for a stored image. Every failure degrades to an empty
/// list; classification never aborts ingestion.
#[async_trait]
pub trait LabelClassifier: Send + Sync {
    async fn classify(&self, bucket: &str, key: &str) -> Vec<String>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectLabelsRequest<'a> {
    image: ImageSource<'a>,
    max_labels: usize,
    min_confidence: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ImageSource<'a> {
    s3_object: S3ObjectRef<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct S3ObjectRef<'a> {
    bucket: &'a str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DetectLabelsResponse {
    #[serde(default)]
    labels: Vec<DetectedLabel>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DetectedLabel {
    pub name: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Classifier backed by an HTTP labeling service speaking the DetectLabels shape.
pub struct HttpLabelClassifier {
    http: HttpClient,
    endpoint: String,
}

impl HttpLabelClassifier {
    pub fn new(http: HttpClient, endpoint: String) -> Self {
        Self { http, endpoint }
    }

    async fn detect(&self, bucket: &str, key: &str) -> Result<Vec<DetectedLabel>, String> {
        let request = DetectLabelsRequest {
            image: ImageSource {
                s3_object: S3ObjectRef { bucket, name: key },
            },
            max_labels: MAX_LABELS,
            min_confidence: MIN_CONFIDENCE,
        };

        let response = self
            .http
            .post_json(&self.endpoint, &request)
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("service returned {} - {}", status, body));
        }

        let parsed: DetectLabelsResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response: {}", e))?;
        Ok(parsed.labels)
    }
}

#[async_trait]
impl LabelClassifier for HttpLabelClassifier {
    async fn classify(&self, bucket: &str, key: &str) -> Vec<String> {
        if !has_classifiable_extension(key) {
            tracing::warn!("Skipping classification of {}: not a JPEG or PNG key", key);
            return Vec::new();
        }

        tracing::info!("Detecting labels: bucket={}, key={}", bucket, key);
        match self.detect(bucket, key).await {
            Ok(detected) => {
                let labels = filter_labels(detected);
                tracing::info!("Extracted labels for {}: {:?}", key, labels);
                labels
            }
            Err(e) => {
                tracing::warn!("Label detection failed for {}: {}", key, e);
                Vec::new()
            }
        }
    }
}

/// Used when no labeling service is configured.
#[derive(Debug, Default)]
pub struct DisabledClassifier;

#[async_trait]
impl LabelClassifier for DisabledClassifier {
    async fn classify(&self, _bucket: &str, key: &str) -> Vec<String> {
        tracing::debug!("Labeling service not configured, no labels for {}", key);
        Vec::new()
    }
}

/// Keeps confident, non-empty labels in service order, capped at [`MAX_LABELS`].
pub fn filter_labels(detected: Vec<DetectedLabel>) -> Vec<String> {
    detected
        .into_iter()
        .filter(|label| label.confidence >= MIN_CONFIDENCE)
        .map(|label| label.name.trim().to_string())
        .filter(|name| !name.is_empty())
        .take(MAX_LABELS)
        .collect()
}

fn has_classifiable_extension(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    CLASSIFIABLE_EXTENSIONS.iter().any(|ext| key.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;

    fn label(name: &str, confidence: f32) -> DetectedLabel {
        DetectedLabel {
            name: name.to_string(),
            confidence,
        }
    }

    async fn spawn_label_service(response: Value) -> String {
        let app = Router::new().route(
            "/labels",
            post(move |Json(request): Json<Value>| {
                let response = response.clone();
                async move {
                    assert_eq!(request["MaxLabels"], 10);
                    assert_eq!(request["Image"]["S3Object"]["Bucket"], "lf-bucket");
                    Json(response)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/labels", addr)
    }

    #[test]
    fn test_filter_labels_applies_threshold_and_cap() {
        let mut detected = vec![label("Bag", 99.0), label("Blurry", 69.9), label("Leather", 70.0)];
        detected.extend((0..20).map(|i| label(&format!("Extra{}", i), 80.0)));

        let labels = filter_labels(detected);
        assert_eq!(labels.len(), MAX_LABELS);
        assert_eq!(labels[0], "Bag");
        assert_eq!(labels[1], "Leather");
        assert!(!labels.contains(&"Blurry".to_string()));
    }

    #[test]
    fn test_classifiable_extension() {
        assert!(has_classifiable_extension("items/x_photo.JPG"));
        assert!(has_classifiable_extension("items/x_photo.png"));
        assert!(!has_classifiable_extension("items/x_photo.gif"));
    }

    #[tokio::test]
    async fn test_http_classifier_reads_service_labels() {
        let endpoint = spawn_label_service(json!({
            "Labels": [
                {"Name": "Bag", "Confidence": 97.5},
                {"Name": "Shadow", "Confidence": 40.0},
                {"Name": "Handbag", "Confidence": 88.0}
            ]
        }))
        .await;
        let classifier =
            HttpLabelClassifier::new(HttpClient::new(Duration::from_secs(5)).unwrap(), endpoint);

        let labels = classifier.classify("lf-bucket", "items/1_bag.jpg").await;
        assert_eq!(labels, vec!["Bag".to_string(), "Handbag".to_string()]);
    }

    #[tokio::test]
    async fn test_http_classifier_skips_unsupported_keys() {
        let endpoint = spawn_label_service(json!({"Labels": [{"Name": "Bag", "Confidence": 99.0}]})).await;
        let classifier =
            HttpLabelClassifier::new(HttpClient::new(Duration::from_secs(5)).unwrap(), endpoint);

        assert!(classifier.classify("lf-bucket", "items/1_bag.gif").await.is_empty());
    }

    #[tokio::test]
    async fn test_http_classifier_degrades_when_service_is_down() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let classifier = HttpLabelClassifier::new(
            HttpClient::new(Duration::from_secs(2)).unwrap(),
            format!("http://{}/labels", addr),
        );
        assert!(classifier.classify("lf-bucket", "items/1_bag.jpg").await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_classifier_returns_nothing() {
        assert!(DisabledClassifier.classify("b", "items/a.jpg").await.is_empty());
    }
}
