use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// Prefix of every data URI produced by the image proxy.
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// A generated image, encoded as a self-contained data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResult {
    data_uri: String,
}

impl ImageResult {
    /// Encode raw PNG bytes.
    pub fn from_png_bytes(bytes: &[u8]) -> Self {
        Self::from_base64(STANDARD.encode(bytes))
    }

    /// Wrap an already base64-encoded PNG payload.
    pub fn from_base64(base64: impl AsRef<str>) -> Self {
        Self {
            data_uri: format!("{PNG_DATA_URI_PREFIX}{}", base64.as_ref()),
        }
    }

    /// Accept a data URI produced elsewhere (for example by the proxy).
    pub fn from_data_uri(data_uri: impl Into<String>) -> Option<Self> {
        let data_uri = data_uri.into();
        if data_uri.starts_with("data:image/") && data_uri.contains(";base64,") {
            Some(Self { data_uri })
        } else {
            None
        }
    }

    /// The data URI.
    pub fn data_uri(&self) -> &str {
        &self.data_uri
    }

    /// Size of the decoded payload in bytes, estimated from the base64 length.
    pub fn approximate_size(&self) -> usize {
        let payload = self
            .data_uri
            .split_once(";base64,")
            .map(|(_, payload)| payload)
            .unwrap_or_default();
        let padding = payload.bytes().rev().take_while(|b| *b == b'=').count();
        (payload.len() / 4 * 3).saturating_sub(padding)
    }

    /// Consume the result, returning the data URI.
    pub fn into_data_uri(self) -> String {
        self.data_uri
    }
}

/// The JSON body answered by the image proxy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ImageResponse {
    /// A generated image.
    Image {
        /// The data URI.
        image: String,
    },

    /// A generation failure; the detail stays in the server log.
    Error {
        /// A fixed, caller-safe description.
        error: String,
    },
}

impl From<ImageResult> for ImageResponse {
    fn from(result: ImageResult) -> Self {
        ImageResponse::Image {
            image: result.into_data_uri(),
        }
    }
}
