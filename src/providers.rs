use std::{future::Future, io::Cursor, pin::Pin};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageBuffer, Rgba};
use serde::{Deserialize, Serialize};

use crate::error::GenerateError;

pub const PNG: &str = "image/png";

pub type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<ImageResult, GenerateError>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResult {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub prompt_used: String,
    pub model: String,
}

impl ImageResult {
    /// `data:` URI suitable for an `<img src>`.
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.bytes))
    }
}

pub trait ImageProvider: Send + Sync {
    /// One request, no retry. Any failure is returned, never panics.
    fn generate<'a>(&'a self, prompt: &'a str) -> GenerateFuture<'a>;
    fn name(&self) -> &'static str;
}

#[derive(Serialize)]
struct PredictReq<'a> {
    instances: [Instance<'a>; 1],
    parameters: Parameters,
}
#[derive(Serialize)]
struct Instance<'a> {
    prompt: &'a str,
}
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    sample_count: u32,
}

#[derive(Deserialize)]
struct PredictResp {
    #[serde(default)]
    predictions: Option<Vec<Option<Prediction>>>,
}
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

/// Google Imagen `:predict` endpoint.
pub struct ImagenProvider {
    client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: String,
}

impl ImagenProvider {
    pub fn new(api_base: String, model: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:predict", self.api_base, self.model)
    }
}

impl ImageProvider for ImagenProvider {
    fn name(&self) -> &'static str { "imagen" }

    fn generate<'a>(&'a self, prompt: &'a str) -> GenerateFuture<'a> {
        Box::pin(async move {
            let req = PredictReq {
                instances: [Instance { prompt }],
                parameters: Parameters { sample_count: 1 },
            };
            let endpoint = self.endpoint();
            tracing::debug!(%endpoint, model = %self.model, "sending predict request");

            let resp = self.client.post(&endpoint)
                .query(&[("key", self.api_key.as_str())])
                .json(&req)
                .send()
                .await?;

            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                tracing::warn!(status = status.as_u16(), "image endpoint returned an error");
                return Err(GenerateError::Upstream { status: status.as_u16(), body });
            }

            let (bytes, mime_type) = decode_predictions(&body)?;
            Ok(ImageResult {
                bytes,
                mime_type,
                prompt_used: prompt.to_string(),
                model: self.model.clone(),
            })
        })
    }
}

/// Pulls `predictions[0].bytesBase64Encoded` out of a predict response.
pub fn decode_predictions(body: &str) -> Result<(Vec<u8>, String), GenerateError> {
    let parsed: PredictResp = serde_json::from_str(body)
        .map_err(|e| GenerateError::MalformedResponse(format!("invalid response JSON: {e}")))?;
    let first = parsed
        .predictions
        .and_then(|p| p.into_iter().next().flatten())
        .ok_or_else(GenerateError::no_image_data)?;
    let b64 = first.bytes_base64_encoded.filter(|s| !s.is_empty()).ok_or_else(GenerateError::no_image_data)?;
    let bytes = STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| GenerateError::MalformedResponse(format!("invalid image data: {e}")))?;
    Ok((bytes, first.mime_type.unwrap_or_else(|| PNG.to_string())))
}

/// Offline provider: renders a small PNG seeded by the prompt.
pub struct MockProvider;

impl ImageProvider for MockProvider {
    fn name(&self) -> &'static str { "mock" }

    fn generate<'a>(&'a self, prompt: &'a str) -> GenerateFuture<'a> {
        Box::pin(async move {
            let seed = prompt.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
            let (w, h) = (256u32, 256u32);
            let mut img = ImageBuffer::<Rgba<u8>, Vec<u8>>::new(w, h);
            for (x, y, p) in img.enumerate_pixels_mut() {
                let v = ((x ^ y) & 0xFF) as u8;
                *p = Rgba([v, 255 - v, seed, 255]);
            }
            let mut png_bytes: Vec<u8> = Vec::new();
            image::DynamicImage::ImageRgba8(img)
                .write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)
                .map_err(|e| GenerateError::MalformedResponse(format!("encode error: {e}")))?;

            Ok(ImageResult {
                bytes: png_bytes,
                mime_type: PNG.to_string(),
                prompt_used: prompt.to_string(),
                model: "mock".to_string(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Bytes, http::{StatusCode, Uri}, response::IntoResponse, Router};
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Seen {
        uri: Option<String>,
        body: Option<serde_json::Value>,
    }

    /// Serves `status`/`body` for every request and records what came in.
    async fn upstream(status: StatusCode, body: &'static str) -> (String, Arc<Mutex<Seen>>) {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let rec = seen.clone();
        let app = Router::new().fallback(move |uri: Uri, req_body: Bytes| {
            let rec = rec.clone();
            async move {
                let mut s = rec.lock();
                s.uri = Some(uri.to_string());
                s.body = serde_json::from_slice(&req_body).ok();
                (status, body).into_response()
            }
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{addr}"), seen)
    }

    fn provider(base: String) -> ImagenProvider {
        ImagenProvider::new(base, "imagen-3.0-generate-002".into(), "test-key".into())
    }

    #[tokio::test]
    async fn sends_predict_request_and_decodes_image() {
        let (base, seen) = upstream(StatusCode::OK, r#"{"predictions":[{"bytesBase64Encoded":"QUJD"}]}"#).await;
        let res = provider(base).generate("a whale").await.unwrap();
        assert_eq!(res.bytes, b"ABC");
        assert_eq!(res.mime_type, PNG);
        assert_eq!(res.prompt_used, "a whale");

        let s = seen.lock();
        assert_eq!(
            s.uri.as_deref(),
            Some("/v1beta/models/imagen-3.0-generate-002:predict?key=test-key")
        );
        assert_eq!(
            s.body,
            Some(serde_json::json!({"instances":[{"prompt":"a whale"}],"parameters":{"sampleCount":1}}))
        );
    }

    #[tokio::test]
    async fn non_success_status_carries_raw_body() {
        let (base, _) = upstream(StatusCode::INTERNAL_SERVER_ERROR, "quota exceeded").await;
        let err = provider(base).generate("x").await.unwrap_err();
        assert_eq!(err, GenerateError::Upstream { status: 500, body: "quota exceeded".into() });
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[tokio::test]
    async fn missing_image_field_is_malformed() {
        let (base, _) = upstream(StatusCode::OK, r#"{"predictions":[{}]}"#).await;
        let err = provider(base).generate("x").await.unwrap_err();
        assert_eq!(err.to_string(), "No image data");
    }

    #[tokio::test]
    async fn connection_failure_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = provider(format!("http://{addr}")).generate("x").await.unwrap_err();
        assert!(matches!(err, GenerateError::Transport(_)));
        assert!(!err.to_string().contains("test-key"));
    }

    #[test]
    fn empty_predictions_is_no_image_data() {
        assert_eq!(decode_predictions(r#"{"predictions":[]}"#).unwrap_err(), GenerateError::no_image_data());
        assert_eq!(decode_predictions("{}").unwrap_err(), GenerateError::no_image_data());
    }

    #[test]
    fn null_predictions_is_no_image_data() {
        assert_eq!(decode_predictions(r#"{"predictions":null}"#).unwrap_err(), GenerateError::no_image_data());
        assert_eq!(decode_predictions(r#"{"predictions":[null]}"#).unwrap_err(), GenerateError::no_image_data());
        assert_eq!(
            decode_predictions(r#"{"predictions":[{"bytesBase64Encoded":null}]}"#).unwrap_err(),
            GenerateError::no_image_data()
        );
    }

    #[test]
    fn non_json_body_is_malformed() {
        match decode_predictions("<html>") {
            Err(GenerateError::MalformedResponse(msg)) => assert!(msg.starts_with("invalid response JSON:")),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn bad_base64_is_malformed() {
        match decode_predictions(r#"{"predictions":[{"bytesBase64Encoded":"@@@"}]}"#) {
            Err(GenerateError::MalformedResponse(msg)) => assert!(msg.starts_with("invalid image data:")),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn data_uri_is_png_base64() {
        let r = ImageResult { bytes: b"ABC".to_vec(), mime_type: PNG.into(), prompt_used: String::new(), model: "m".into() };
        assert_eq!(r.data_uri(), "data:image/png;base64,QUJD");
    }

    #[tokio::test]
    async fn mock_provider_renders_png() {
        let res = MockProvider.generate("gm").await.unwrap();
        assert_eq!(&res.bytes[..4], b"\x89PNG");
        assert_eq!(res.model, "mock");
    }
}
