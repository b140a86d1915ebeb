#![cfg(feature = "predict-api")]

//! HTTP prediction client.
//!
//! Submits the uploaded image as `multipart/form-data` (field `file`) to
//! `POST {base_url}/predict` and maps the JSON response onto findings.
//!
//! The client is responsible for:
//! - Encoding the upload as a single-part multipart body
//! - Surfacing transport, HTTP status and decode failures as errors
//!
//! The client MUST NOT:
//! - Retry failed requests
//! - Return partial results for a failed request

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::detect::prediction::PredictResponse;
use crate::detect::result::Analysis;
use crate::detect::source::{DetectionContext, DetectionSource, SourceCapability};
use crate::ingest::UploadedImage;

const PREDICT_PATH: &str = "predict";
const UPLOAD_FIELD: &str = "file";

#[derive(Clone, Debug)]
pub struct PredictApiConfig {
    /// Base URL of the prediction service, e.g. `http://127.0.0.1:8000`.
    pub base_url: String,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl Default for PredictApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct PredictApiSource {
    endpoint: String,
    agent: ureq::Agent,
    requests: u64,
}

impl PredictApiSource {
    pub fn new(config: PredictApiConfig) -> Result<Self> {
        let endpoint = predict_endpoint(&config.base_url)?;
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            endpoint,
            agent,
            requests: 0,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn submit(&mut self, image: &UploadedImage) -> Result<Analysis> {
        let boundary = format!("----roadvision{:016x}", rand::random::<u64>());
        let body = encode_multipart(&boundary, UPLOAD_FIELD, image);
        self.requests += 1;
        log::info!(
            "PredictApiSource: POST {} ({} bytes, request #{})",
            self.endpoint,
            body.len(),
            self.requests
        );

        let response = match self
            .agent
            .post(&self.endpoint)
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={}", boundary),
            )
            .send_bytes(&body)
        {
            Ok(response) => response,
            Err(ureq::Error::Status(code, response)) => {
                return Err(anyhow!(
                    "prediction endpoint returned HTTP {} {}",
                    code,
                    response.status_text()
                ))
            }
            Err(err) => {
                return Err(err).with_context(|| format!("send image to {}", self.endpoint))
            }
        };

        let raw = response
            .into_string()
            .context("read prediction response")?;
        Ok(PredictResponse::parse(&raw)?.into_analysis())
    }
}

impl DetectionSource for PredictApiSource {
    fn name(&self) -> &'static str {
        "api"
    }

    fn supports(&self, capability: SourceCapability) -> bool {
        matches!(capability, SourceCapability::ImageAnalysis)
    }

    fn produce(&mut self, ctx: &DetectionContext<'_>) -> Result<Analysis> {
        let image = ctx
            .image
            .ok_or_else(|| anyhow!("prediction API requires an uploaded image"))?;
        self.submit(image)
    }
}

fn predict_endpoint(base_url: &str) -> Result<String> {
    let url = Url::parse(base_url).context("parse prediction API base url")?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(anyhow!(
                "unsupported prediction API scheme '{}'; expected http(s)",
                other
            ))
        }
    }
    Ok(format!(
        "{}/{}",
        url.as_str().trim_end_matches('/'),
        PREDICT_PATH
    ))
}

/// Single file part, CRLF line endings.
fn encode_multipart(boundary: &str, field: &str, image: &UploadedImage) -> Vec<u8> {
    let file_name = image.file_name().replace('"', "_");
    let mut body = Vec::with_capacity(image.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", image.mime_type()).as_bytes());
    body.extend_from_slice(image.bytes());
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_predict_path() -> Result<()> {
        assert_eq!(
            predict_endpoint("http://127.0.0.1:8000")?,
            "http://127.0.0.1:8000/predict"
        );
        assert_eq!(
            predict_endpoint("https://api.example.com/v1/")?,
            "https://api.example.com/v1/predict"
        );
        Ok(())
    }

    #[test]
    fn source_posts_to_configured_endpoint() -> Result<()> {
        let source = PredictApiSource::new(PredictApiConfig {
            base_url: "http://10.0.0.7:9000/".to_string(),
            ..PredictApiConfig::default()
        })?;
        assert_eq!(source.endpoint(), "http://10.0.0.7:9000/predict");
        assert!(source.supports(SourceCapability::ImageAnalysis));
        assert!(!source.supports(SourceCapability::LiveFeed));
        Ok(())
    }

    #[test]
    fn endpoint_rejects_non_http_schemes() {
        assert!(predict_endpoint("ftp://example.com").is_err());
        assert!(predict_endpoint("not a url").is_err());
    }

    #[test]
    fn multipart_body_wraps_file_part() -> Result<()> {
        let image = UploadedImage::from_bytes("road.jpg", b"JPEGDATA".to_vec())?;
        let body = encode_multipart("XYZ", "file", &image);
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--XYZ\r\n"));
        assert!(text.contains("name=\"file\"; filename=\"road.jpg\""));
        assert!(text.contains("Content-Type: image/jpeg\r\n\r\nJPEGDATA\r\n"));
        assert!(text.ends_with("--XYZ--\r\n"));
        Ok(())
    }
}
