//! Server-side upload authorization for the third-party media CDN.
//!
//! The signature is the hex HMAC-SHA256 of the signed parameters, sorted by
//! key and joined as `k1=v1&k2=v2`. Only `folder`, `allowed_formats` and
//! `timestamp` are signed; the API key and cloud name travel alongside.

use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;

use crate::{CoreError, CoreResult};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Deserialize)]
pub struct MediaSettings {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    #[serde(default = "default_formats")]
    pub allowed_formats: Vec<String>,
    #[serde(default = "default_ttl")]
    pub ttl_seconds: i64,
}

fn default_formats() -> Vec<String> {
    vec!["jpg".into(), "jpeg".into(), "png".into(), "webp".into()]
}

fn default_ttl() -> i64 {
    3600
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UploadSignature {
    pub signature: String,
    pub timestamp: i64,
    pub api_key: String,
    pub cloud_name: String,
    pub folder: String,
    pub allowed_formats: String,
    pub expires_at: DateTime<Utc>,
}

pub struct UploadSigner {
    settings: MediaSettings,
}

impl UploadSigner {
    pub fn new(settings: MediaSettings) -> CoreResult<Self> {
        if settings.api_secret.is_empty() {
            return Err(CoreError::ValidationError("media api secret is not configured".to_string()));
        }
        if settings.allowed_formats.is_empty() {
            return Err(CoreError::ValidationError("at least one upload format must be allowed".to_string()));
        }
        Ok(Self { settings })
    }

    /// Folder scoped to one provider
    pub fn provider_folder(provider_id: uuid::Uuid) -> String {
        format!("providers/{}", provider_id)
    }

    pub fn sign(&self, folder: &str) -> CoreResult<UploadSignature> {
        self.sign_at(folder, Utc::now())
    }

    pub fn sign_at(&self, folder: &str, now: DateTime<Utc>) -> CoreResult<UploadSignature> {
        let folder = folder.trim_matches('/');
        if folder.is_empty() || folder.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(CoreError::ValidationError(format!("invalid upload folder '{}'", folder)));
        }

        let timestamp = now.timestamp();
        let allowed_formats = self.settings.allowed_formats.join(",");
        let signature = self.digest(&signed_params(folder, &allowed_formats, timestamp))?;

        Ok(UploadSignature {
            signature,
            timestamp,
            api_key: self.settings.api_key.clone(),
            cloud_name: self.settings.cloud_name.clone(),
            folder: folder.to_string(),
            allowed_formats,
            expires_at: now + Duration::seconds(self.settings.ttl_seconds),
        })
    }

    /// Constant-time check of a signature produced by `sign`, rejecting expired ones
    pub fn verify(&self, folder: &str, allowed_formats: &str, timestamp: i64, signature: &str) -> bool {
        self.verify_at(folder, allowed_formats, timestamp, signature, Utc::now())
    }

    pub fn verify_at(
        &self,
        folder: &str,
        allowed_formats: &str,
        timestamp: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(issued) = Utc.timestamp_opt(timestamp, 0).single() else {
            return false;
        };
        if issued > now || now - issued > Duration::seconds(self.settings.ttl_seconds) {
            return false;
        }
        let Ok(expected) = self.digest(&signed_params(folder, allowed_formats, timestamp)) else {
            return false;
        };
        constant_time_eq(expected.as_bytes(), signature.as_bytes())
    }

    fn digest(&self, params: &BTreeMap<&str, String>) -> CoreResult<String> {
        let payload = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut mac = HmacSha256::new_from_slice(self.settings.api_secret.as_bytes())
            .map_err(|e| CoreError::InternalError(format!("hmac key: {}", e)))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

fn signed_params(folder: &str, allowed_formats: &str, timestamp: i64) -> BTreeMap<&'static str, String> {
    BTreeMap::from([
        ("allowed_formats", allowed_formats.to_string()),
        ("folder", folder.to_string()),
        ("timestamp", timestamp.to_string()),
    ])
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
