//! Client settings for the S3 transport.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Where and how the S3 client connects.
///
/// # Examples
///
/// ```
/// use ruststack_transfer_s3::config::S3TransportConfig;
///
/// let config = S3TransportConfig::builder()
///     .endpoint_url("http://localhost:4566")
///     .build();
/// assert!(config.force_path_style);
/// assert_eq!(config.region, "us-east-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct S3TransportConfig {
    /// Custom endpoint (for a local emulator); the SDK default when unset.
    #[builder(default, setter(strip_option, into))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,

    /// Signing region.
    #[builder(default = "us-east-1".to_owned(), setter(into))]
    pub region: String,

    /// Use `endpoint/bucket/key` addressing instead of virtual hosts.
    #[builder(default = true)]
    pub force_path_style: bool,
}

impl Default for S3TransportConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl S3TransportConfig {
    /// Load settings from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `S3_ENDPOINT_URL` | *(unset)* |
    /// | `AWS_REGION` | `us-east-1` |
    /// | `S3_FORCE_PATH_STYLE` | `true` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("S3_ENDPOINT_URL") {
            config.endpoint_url = Some(url);
        }
        if let Ok(region) = std::env::var("AWS_REGION") {
            config.region = region;
        }
        if let Ok(value) = std::env::var("S3_FORCE_PATH_STYLE") {
            config.force_path_style = !matches!(value.trim(), "false" | "0");
        }
        config
    }
}
