use reqwest::Client as ReqwestClient;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::env;

use crate::client::{bearer, build_http_client, error_from_response, normalize_base_url};
use crate::error::{Error, Result};
use crate::types::ImageResult;

/// The image model used when none is configured.
pub const DEFAULT_IMAGE_MODEL: &str = "@cf/bytedance/stable-diffusion-xl-lightning-1-0";

const DEFAULT_API_URL: &str = "https://api.cloudflare.com/client/v4/";
const ACCOUNT_ID_ENV: &str = "CLOUDFLARE_ACCOUNT_ID";
const API_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";

/// Client for Cloudflare Workers AI text-to-image models.
#[derive(Debug, Clone)]
pub struct ImageClient {
    account_id: String,
    api_token: String,
    client: ReqwestClient,
    base_url: String,
    model: String,
}

impl ImageClient {
    /// Create a new image client, falling back to CLOUDFLARE_ACCOUNT_ID and
    /// CLOUDFLARE_API_TOKEN for missing credentials.
    pub fn new(account_id: Option<String>, api_token: Option<String>) -> Result<Self> {
        Self::with_options(account_id, api_token, None, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(
        account_id: Option<String>,
        api_token: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Result<Self> {
        let account_id = account_id
            .or_else(|| env::var(ACCOUNT_ID_ENV).ok())
            .unwrap_or_default();
        let api_token = api_token
            .or_else(|| env::var(API_TOKEN_ENV).ok())
            .unwrap_or_default();
        Ok(Self {
            account_id,
            api_token,
            client: build_http_client()?,
            base_url: normalize_base_url(base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string())),
            model: model.unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
        })
    }

    /// The model requests are sent to.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}accounts/{}/ai/run/{}",
            self.base_url, self.account_id, self.model
        )
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::AUTHORIZATION, bearer(&self.api_token)?);
        Ok(headers)
    }

    /// Generate one image for `prompt`.
    ///
    /// One attempt, no timeout.  Binary responses are encoded as a PNG data
    /// URI; JSON responses carry the base64 payload in `result.image`.
    pub async fn generate(&self, prompt: &str) -> Result<ImageResult> {
        let response = self
            .client
            .post(self.endpoint())
            .headers(self.default_headers()?)
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| Error::from_send(e, None))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let is_json = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|val| val.to_str().ok())
            .is_some_and(|val| val.starts_with("application/json"));
        let body = response.bytes().await.map_err(|e| {
            Error::streaming(
                format!("Failed to read image response: {e}"),
                Some(Box::new(e)),
            )
        })?;
        decode_image(is_json, &body)
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct JsonEnvelope {
    result: Option<JsonResult>,
}

#[derive(Debug, Deserialize)]
struct JsonResult {
    image: Option<String>,
}

fn decode_image(is_json: bool, body: &[u8]) -> Result<ImageResult> {
    if is_json {
        let envelope: JsonEnvelope = serde_json::from_slice(body)?;
        return envelope
            .result
            .and_then(|result| result.image)
            .filter(|image| !image.is_empty())
            .map(ImageResult::from_base64)
            .ok_or_else(|| Error::serialization("image response carried no image", None));
    }
    if body.is_empty() {
        return Err(Error::serialization("image response was empty", None));
    }
    Ok(ImageResult::from_png_bytes(body))
}
