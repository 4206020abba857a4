use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use hex;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::ObjectStorageSettings;
use crate::models::DateKey;

type HmacSha256 = Hmac<Sha256>;

const AWS_URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Which side of a pair an uploaded image belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairImageKind {
    Human,
    Ai,
}

impl PairImageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairImageKind::Human => "human",
            PairImageKind::Ai => "ai",
        }
    }
}

/// Map an image content type to the object key extension.
/// Returns None for anything the gallery does not serve.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[derive(Clone, Debug)]
pub struct ObjectStorageClient {
    bucket: String,
    region: String,
    endpoint: Url,
    access_key: String,
    secret_key: String,
    public_base_url: String,
}

impl ObjectStorageClient {
    pub fn new(settings: ObjectStorageSettings) -> Result<Self> {
        let endpoint = Url::parse(&settings.endpoint).context("Invalid object storage endpoint URL")?;
        if endpoint.host_str().is_none() {
            bail!("Object storage endpoint must include a host");
        }

        // Enforce HTTPS in production mode (check APP_ENV at runtime)
        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "prod".to_string());
        if app_env == "prod" && endpoint.scheme() != "https" {
            bail!(
                "Object storage endpoint must use HTTPS in production mode. Got: {}",
                endpoint.scheme()
            );
        }

        // In development, allow both HTTP and HTTPS
        if endpoint.scheme() != "https" && endpoint.scheme() != "http" {
            bail!(
                "Invalid endpoint scheme: {}. Must be http or https.",
                endpoint.scheme()
            );
        }

        Ok(Self {
            bucket: settings.bucket,
            region: settings.region,
            access_key: settings.access_key,
            secret_key: settings.secret_key,
            endpoint,
            public_base_url: settings.public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Object key a pair image lives under. Deterministic so re-uploads for
    /// the same slot replace the previous object.
    pub fn build_pair_key(
        &self,
        date: DateKey,
        pair_index: usize,
        kind: PairImageKind,
        extension: &str,
    ) -> String {
        let ext = extension.trim_start_matches('.');
        format!(
            "puzzles/{date}/pair-{index}-{kind}.{ext}",
            date = date,
            index = pair_index,
            kind = kind.as_str(),
            ext = ext
        )
    }

    /// Stable URL the object is publicly served from once uploaded.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, Self::encoded_path(key))
    }

    fn encoded_path(key: &str) -> String {
        key.split('/')
            .map(|segment| utf8_percent_encode(segment, AWS_URI_ENCODE_SET).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn canonical_uri(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, Self::encoded_path(key))
    }

    fn canonical_query_string(params: &BTreeMap<String, String>) -> String {
        params
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(key, AWS_URI_ENCODE_SET),
                    utf8_percent_encode(value, AWS_URI_ENCODE_SET)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Presign a PUT so the admin frontend uploads directly to the bucket.
    /// The content type is part of the signature, so the uploader must send
    /// exactly the type it asked for.
    pub fn generate_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> Result<String> {
        let ttl_secs = ttl.as_secs().min(604800) as u32;
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();
        let scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let canonical_uri = self.canonical_uri(key);

        let mut params = BTreeMap::new();
        params.insert("X-Amz-Algorithm".into(), "AWS4-HMAC-SHA256".into());
        params.insert(
            "X-Amz-Credential".into(),
            format!("{}/{}", self.access_key, scope),
        );
        params.insert("X-Amz-Date".into(), amz_date.clone());
        params.insert("X-Amz-Expires".into(), ttl_secs.to_string());
        params.insert("X-Amz-SignedHeaders".into(), "content-type;host".into());

        let canonical_query = Self::canonical_query_string(&params);
        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| anyhow!("Object storage endpoint missing host"))?
            .to_lowercase();

        // Canonical headers are sorted; content-type precedes host
        let canonical_headers = format!("content-type:{}\nhost:{}\n", content_type, host);
        let signed_headers = "content-type;host";
        let payload_hash = "UNSIGNED-PAYLOAD";

        let canonical_request = format!(
            "PUT\n{}\n{}\n{}\n{}\n{}",
            canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
        );

        let hashed_canonical_request = Sha256::digest(canonical_request.as_bytes());
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            scope,
            hex::encode(hashed_canonical_request)
        );

        let signing_key = derive_signing_key(&self.secret_key, &date_stamp, &self.region, "s3");
        let signature = hex::encode(hmac_sign(&signing_key, string_to_sign.as_bytes()));

        let mut final_query = params;
        final_query.insert("X-Amz-Signature".into(), signature);
        let query_with_signature = Self::canonical_query_string(&final_query);

        let mut url = self.endpoint.clone();
        url.set_path(&format!("{}/{}", self.bucket, Self::encoded_path(key)));
        url.set_query(Some(&query_with_signature));

        Ok(url.to_string())
    }
}

fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let mut key = format!("AWS4{}", secret).into_bytes();
    key = hmac_sign(&key, date);
    key = hmac_sign(&key, region);
    key = hmac_sign(&key, service);
    hmac_sign(&key, b"aws4_request")
}

fn hmac_sign(key: &[u8], message: impl AsRef<[u8]>) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message.as_ref());
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(endpoint: &str) -> ObjectStorageSettings {
        ObjectStorageSettings {
            bucket: "artalyze-images".into(),
            region: "us-east-1".into(),
            endpoint: endpoint.into(),
            access_key: "key".into(),
            secret_key: "secret".into(),
            public_base_url: "https://images.artalyze.app".into(),
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_https_required_in_prod() {
        // Set APP_ENV=prod to enforce HTTPS requirement
        std::env::set_var("APP_ENV", "prod");

        let result = ObjectStorageClient::new(settings("http://insecure.com"));
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("HTTPS"));
        assert!(err_msg.contains("production"));

        // Clean up
        std::env::remove_var("APP_ENV");
    }

    #[test]
    #[serial_test::serial]
    fn test_http_allowed_in_dev() {
        // Set APP_ENV=dev to allow HTTP endpoints
        std::env::set_var("APP_ENV", "dev");

        let result = ObjectStorageClient::new(settings("http://localhost:9000"));
        assert!(result.is_ok());

        // Clean up
        std::env::remove_var("APP_ENV");
    }

    #[test]
    #[serial_test::serial]
    fn test_invalid_scheme_rejected() {
        std::env::set_var("APP_ENV", "dev");
        let result = ObjectStorageClient::new(settings("ftp://example.com"));
        assert!(result.is_err());
        std::env::remove_var("APP_ENV");
    }

    #[test]
    #[serial_test::serial]
    fn test_pair_key_and_public_url() {
        std::env::set_var("APP_ENV", "dev");
        let client = ObjectStorageClient::new(settings("https://s3.us-east-1.amazonaws.com"))
            .expect("valid settings");

        let date: DateKey = "2025-03-01".parse().unwrap();
        let key = client.build_pair_key(date, 2, PairImageKind::Ai, "png");
        assert_eq!(key, "puzzles/2025-03-01/pair-2-ai.png");
        assert_eq!(
            client.public_url(&key),
            "https://images.artalyze.app/puzzles/2025-03-01/pair-2-ai.png"
        );
        std::env::remove_var("APP_ENV");
    }

    #[test]
    #[serial_test::serial]
    fn test_presigned_upload_url_shape() {
        std::env::set_var("APP_ENV", "dev");
        let client = ObjectStorageClient::new(settings("https://s3.us-east-1.amazonaws.com"))
            .expect("valid settings");

        let url = client
            .generate_presigned_upload_url(
                "puzzles/2025-03-01/pair-0-human.jpg",
                "image/jpeg",
                Duration::from_secs(900),
            )
            .expect("presign");

        assert!(url.starts_with(
            "https://s3.us-east-1.amazonaws.com/artalyze-images/puzzles/2025-03-01/pair-0-human.jpg?"
        ));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Expires=900"));
        assert!(url.contains("X-Amz-SignedHeaders=content-type%3Bhost"));
        assert!(url.contains("X-Amz-Signature="));
        std::env::remove_var("APP_ENV");
    }

    #[test]
    fn test_extension_for_content_types() {
        assert_eq!(extension_for("image/jpeg"), Some("jpg"));
        assert_eq!(extension_for("image/png"), Some("png"));
        assert_eq!(extension_for("image/webp"), Some("webp"));
        assert_eq!(extension_for("text/html"), None);
    }
}
