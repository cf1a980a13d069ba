//! Connection settings of the object store

use crate::error::ProbeError;

pub const DEFAULT_BUCKET: &str = "records";

/// Settings read from `MINIO_*`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub host: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub secure: bool,
}

impl ProbeConfig {
    /// Build the config, reporting every missing credential at once
    pub fn new(
        host: Option<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
        bucket: Option<String>,
        secure: bool,
    ) -> Result<Self, ProbeError> {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        match (host, access_key, secret_key) {
            (Some(host), Some(access_key), Some(secret_key))
                if !host.is_empty() && !access_key.is_empty() && !secret_key.is_empty() =>
            {
                Ok(Self {
                    host,
                    access_key,
                    secret_key,
                    bucket: bucket
                        .filter(|b| !b.is_empty())
                        .unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
                    secure,
                })
            }
            (host, access_key, secret_key) => Err(ProbeError::IncompleteConfig {
                host: present(&host),
                access_key: present(&access_key),
                secret_key: present(&secret_key),
            }),
        }
    }

    /// Endpoint URL; `host` may already carry a scheme
    pub fn endpoint_url(&self) -> String {
        if self.host.starts_with("http://") || self.host.starts_with("https://") {
            return self.host.clone();
        }
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.host)
    }
}

/// `MINIO_SECURE` is true only when it spells "true" in any case
pub fn parse_secure(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}
