//! Configuration types for the proxy server.
//!
//! Command-line arguments are parsed via `arrrg`; provider credentials come
//! from the environment.

use std::env;
use std::fmt;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::backend::Upstream;
use crate::client::{DEFAULT_CHAT_MODEL, TextClient};
use crate::error::Result;
use crate::image::{DEFAULT_IMAGE_MODEL, ImageClient};

/// Address the server listens on when none is given.
pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Default ceiling for one text reply, in seconds.
const DEFAULT_MAX_DURATION_SECS: u64 = 30;

const GROQ_API_KEY: &str = "GROQ_API_KEY";
const CLOUDFLARE_ACCOUNT_ID: &str = "CLOUDFLARE_ACCOUNT_ID";
const CLOUDFLARE_API_TOKEN: &str = "CLOUDFLARE_API_TOKEN";

/// Command-line arguments for the duochat-server tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ServerArgs {
    /// Address to listen on.
    #[arrrg(optional, "Address to listen on (default: 127.0.0.1:3000)", "ADDR")]
    pub bind: Option<String>,

    /// Text model to stream replies from.
    #[arrrg(optional, "Text model (default: llama-3.3-70b-versatile)", "MODEL")]
    pub chat_model: Option<String>,

    /// Image model to generate with.
    #[arrrg(
        optional,
        "Image model (default: @cf/bytedance/stable-diffusion-xl-lightning-1-0)",
        "MODEL"
    )]
    pub image_model: Option<String>,

    /// Ceiling for one text reply, in seconds.
    #[arrrg(optional, "Ceiling for one text reply in seconds (default: 30)", "SECONDS")]
    pub max_duration: Option<u64>,
}

/// Resolved server configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: String,

    /// Text model.
    pub chat_model: String,

    /// Image model.
    pub image_model: String,

    /// Wall-clock ceiling covering connection setup and streaming of one
    /// text reply.
    pub max_duration: Duration,

    /// Groq API key.
    pub groq_api_key: Option<String>,

    /// Cloudflare account id.
    pub cloudflare_account_id: Option<String>,

    /// Cloudflare API token.
    pub cloudflare_api_token: Option<String>,

    /// Override for the text provider's base URL.
    pub text_base_url: Option<String>,

    /// Override for the image provider's base URL.
    pub image_base_url: Option<String>,
}

impl ServerConfig {
    /// Creates a new ServerConfig with default values and no credentials.
    pub fn new() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            max_duration: Duration::from_secs(DEFAULT_MAX_DURATION_SECS),
            groq_api_key: None,
            cloudflare_account_id: None,
            cloudflare_api_token: None,
            text_base_url: None,
            image_base_url: None,
        }
    }

    /// Fill unset credentials from GROQ_API_KEY, CLOUDFLARE_ACCOUNT_ID and
    /// CLOUDFLARE_API_TOKEN.
    pub fn with_env_credentials(mut self) -> Self {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.is_empty());
        self.groq_api_key = self.groq_api_key.or_else(|| var(GROQ_API_KEY));
        self.cloudflare_account_id = self
            .cloudflare_account_id
            .or_else(|| var(CLOUDFLARE_ACCOUNT_ID));
        self.cloudflare_api_token = self
            .cloudflare_api_token
            .or_else(|| var(CLOUDFLARE_API_TOKEN));
        self
    }

    /// Sets the listen address.
    pub fn with_bind(mut self, bind: impl Into<String>) -> Self {
        self.bind = bind.into();
        self
    }

    /// Sets the text model.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Sets the image model.
    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    /// Sets the text reply ceiling.
    pub fn with_max_duration(mut self, max_duration: Duration) -> Self {
        self.max_duration = max_duration;
        self
    }

    /// Sets the Groq API key.
    pub fn with_groq_api_key(mut self, key: impl Into<String>) -> Self {
        self.groq_api_key = Some(key.into());
        self
    }

    /// Sets the Cloudflare account and token.
    pub fn with_cloudflare(mut self, account_id: impl Into<String>, token: impl Into<String>) -> Self {
        self.cloudflare_account_id = Some(account_id.into());
        self.cloudflare_api_token = Some(token.into());
        self
    }

    /// Points the text client somewhere other than Groq.
    pub fn with_text_base_url(mut self, url: impl Into<String>) -> Self {
        self.text_base_url = Some(url.into());
        self
    }

    /// Points the image client somewhere other than Cloudflare.
    pub fn with_image_base_url(mut self, url: impl Into<String>) -> Self {
        self.image_base_url = Some(url.into());
        self
    }

    /// Names of the credentials that are not set.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.groq_api_key.is_none() {
            missing.push(GROQ_API_KEY);
        }
        if self.cloudflare_account_id.is_none() {
            missing.push(CLOUDFLARE_ACCOUNT_ID);
        }
        if self.cloudflare_api_token.is_none() {
            missing.push(CLOUDFLARE_API_TOKEN);
        }
        missing
    }

    /// Build the provider clients.
    ///
    /// Missing credentials are only warned about; the providers reject the
    /// affected requests.
    pub fn upstream(&self) -> Result<Upstream> {
        for name in self.missing_credentials() {
            tracing::warn!(variable = name, "credential not set; requests needing it will fail");
        }
        let text = TextClient::with_options(
            Some(self.groq_api_key.clone().unwrap_or_default()),
            self.text_base_url.clone(),
            Some(self.chat_model.clone()),
        )?;
        let image = ImageClient::with_options(
            Some(self.cloudflare_account_id.clone().unwrap_or_default()),
            Some(self.cloudflare_api_token.clone().unwrap_or_default()),
            self.image_base_url.clone(),
            Some(self.image_model.clone()),
        )?;
        Ok(Upstream::new(text, image))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("chat_model", &self.chat_model)
            .field("image_model", &self.image_model)
            .field("max_duration", &self.max_duration)
            .field("groq_api_key", &redact(&self.groq_api_key))
            .field("cloudflare_account_id", &self.cloudflare_account_id)
            .field("cloudflare_api_token", &redact(&self.cloudflare_api_token))
            .field("text_base_url", &self.text_base_url)
            .field("image_base_url", &self.image_base_url)
            .finish()
    }
}

impl From<ServerArgs> for ServerConfig {
    fn from(args: ServerArgs) -> Self {
        let defaults = ServerConfig::new();
        ServerConfig {
            bind: args.bind.unwrap_or(defaults.bind),
            chat_model: args.chat_model.unwrap_or(defaults.chat_model),
            image_model: args.image_model.unwrap_or(defaults.image_model),
            max_duration: args
                .max_duration
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_duration),
            ..ServerConfig::new()
        }
        .with_env_credentials()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::new();
        assert_eq!(config.bind, "127.0.0.1:3000");
        assert_eq!(config.chat_model, "llama-3.3-70b-versatile");
        assert_eq!(
            config.image_model,
            "@cf/bytedance/stable-diffusion-xl-lightning-1-0"
        );
        assert_eq!(config.max_duration, Duration::from_secs(30));
        assert_eq!(
            config.missing_credentials(),
            vec![GROQ_API_KEY, CLOUDFLARE_ACCOUNT_ID, CLOUDFLARE_API_TOKEN]
        );
    }

    #[test]
    fn config_from_args_custom() {
        let args = ServerArgs {
            bind: Some("0.0.0.0:8080".to_string()),
            chat_model: Some("llama-3.1-8b-instant".to_string()),
            image_model: Some("@cf/black-forest-labs/flux-1-schnell".to_string()),
            max_duration: Some(5),
        };
        let config = ServerConfig::from(args);
        assert_eq!(config.bind, "0.0.0.0:8080");
        assert_eq!(config.chat_model, "llama-3.1-8b-instant");
        assert_eq!(config.image_model, "@cf/black-forest-labs/flux-1-schnell");
        assert_eq!(config.max_duration, Duration::from_secs(5));
    }

    #[test]
    fn config_builder_pattern() {
        let config = ServerConfig::new()
            .with_bind("127.0.0.1:0")
            .with_groq_api_key("gsk")
            .with_cloudflare("acct", "cf")
            .with_max_duration(Duration::from_millis(250))
            .with_text_base_url("http://127.0.0.1:1/v1/")
            .with_image_base_url("http://127.0.0.1:2/");
        assert!(config.missing_credentials().is_empty());
        assert_eq!(config.max_duration, Duration::from_millis(250));
        assert!(config.upstream().is_ok());
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = ServerConfig::new()
            .with_groq_api_key("gsk_secret")
            .with_cloudflare("acct", "cf_secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("gsk_secret"));
        assert!(!debug.contains("cf_secret"));
        assert!(debug.contains("acct"));
    }
}
