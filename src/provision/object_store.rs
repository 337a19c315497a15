//! Object storage access for artifact downloads
//!
//! Talks to any S3-compatible service (DigitalOcean Spaces, MinIO, AWS) with
//! path-style URLs and AWS Signature V4 computed over `hmac` + `sha2`.

use crate::config::{Secret, StorageConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

/// Read-only object storage operations used by provisioning
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a small object into memory
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Stream an object to `dest`, returning the number of bytes written
    async fn download_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64>;
}

/// S3-compatible client
pub struct S3Client {
    client: reqwest::Client,
    endpoint: Url,
    region: String,
    access_key: String,
    secret_key: Secret,
}

impl S3Client {
    /// Build a client from storage configuration; both credentials are required
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        if config.access_key.trim().is_empty() || config.secret_key.is_empty() {
            return Err(Error::Config(
                "DO_SPACES_ACCESS_KEY and DO_SPACES_SECRET_KEY are required for artifact download"
                    .to_string(),
            ));
        }

        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| Error::Config(format!("Invalid object storage endpoint: {}", e)))?;

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            region: config.region.clone(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
        })
    }

    fn host(&self) -> Result<String> {
        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| Error::Config("Object storage endpoint has no host".to_string()))?;
        Ok(match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    async fn signed_get(&self, bucket: &str, key: &str) -> Result<reqwest::Response> {
        let host = self.host()?;
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}/{}", uri_encode(bucket), encoded_key);
        let url = format!("{}://{}{}", self.endpoint.scheme(), host, canonical_uri);

        let signed = sign_get(
            &host,
            &canonical_uri,
            &self.region,
            &self.access_key,
            self.secret_key.expose(),
            Utc::now(),
        );

        let resp = self
            .client
            .get(&url)
            .header("Authorization", &signed.authorization)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header("x-amz-date", &signed.amz_date)
            .send()
            .await
            .map_err(|e| Error::ObjectStore(format!("Failed to get s3://{}/{}: {}", bucket, key, e)))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::ObjectStore(format!(
                "Object not found: s3://{}/{}",
                bucket, key
            )));
        }
        if !status.is_success() {
            return Err(Error::ObjectStore(format!(
                "GetObject failed (HTTP {}) for s3://{}/{}",
                status, bucket, key
            )));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let resp = self.signed_get(bucket, key).await?;
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::ObjectStore(format!("Failed to read s3://{}/{}: {}", bucket, key, e)))?;
        Ok(bytes.to_vec())
    }

    async fn download_file(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64> {
        let mut resp = self.signed_get(bucket, key).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;

        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(|e| Error::ObjectStore(format!("Download of s3://{}/{} interrupted: {}", bucket, key, e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        debug!("Downloaded {} bytes to {:?}", written, dest);
        Ok(written)
    }
}

struct SignedHeaders {
    authorization: String,
    amz_date: String,
    payload_hash: String,
}

/// SigV4 headers for an unsigned-body GET
fn sign_get(
    host: &str,
    canonical_uri: &str,
    region: &str,
    access_key: &str,
    secret_key: &str,
    now: DateTime<Utc>,
) -> SignedHeaders {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(b"");

    let signed_headers = "host;x-amz-content-sha256;x-amz-date";
    let canonical_headers = format!(
        "host:{}\nx-amz-content-sha256:{}\nx-amz-date:{}\n",
        host, payload_hash, amz_date
    );
    let canonical_request = format!(
        "GET\n{}\n\n{}\n{}\n{}",
        canonical_uri, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(secret_key, &date_stamp, region, "s3");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    SignedHeaders {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            access_key, credential_scope, signed_headers, signature
        ),
        amz_date,
        payload_hash,
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding of everything outside `A-Z a-z 0-9 - _ . ~`
fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn storage_for(endpoint: &str) -> StorageConfig {
        StorageConfig {
            endpoint: endpoint.to_string(),
            bucket: "artifacts".to_string(),
            region: "tor1".to_string(),
            access_key: "AKIDEXAMPLE".to_string(),
            secret_key: Secret::new("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
        }
    }

    #[test]
    fn test_signing_key_matches_published_vector() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_sign_get_scope_and_headers() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap();
        let signed = sign_get(
            "tor1.digitaloceanspaces.com",
            "/artifacts/latest-manifest.json",
            "tor1",
            "AKIDEXAMPLE",
            "secret",
            now,
        );

        assert_eq!(signed.amz_date, "20240601T123000Z");
        assert_eq!(
            signed.payload_hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert!(signed.authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20240601/tor1/s3/aws4_request, \
             SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature="
        ));
    }

    #[test]
    fn test_uri_encode_reserved_characters() {
        assert_eq!(uri_encode("rag-index v1+2.json"), "rag-index%20v1%2B2.json");
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let mut config = storage_for("https://tor1.digitaloceanspaces.com");
        config.secret_key = Secret::new("");
        assert!(matches!(S3Client::from_config(&config), Err(Error::Config(_))));

        let mut config = storage_for("https://tor1.digitaloceanspaces.com");
        config.access_key = String::new();
        assert!(matches!(S3Client::from_config(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_get_object_is_signed_and_path_style() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifacts/latest-manifest.json"))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .and(header(
                "x-amz-content-sha256",
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"latest_version":"7"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = S3Client::from_config(&storage_for(&server.uri())).unwrap();
        let body = client
            .get_object("artifacts", "latest-manifest.json")
            .await
            .unwrap();
        assert_eq!(body, br#"{"latest_version":"7"}"#);
    }

    #[tokio::test]
    async fn test_download_file_streams_to_disk() {
        let server = MockServer::start().await;
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 256) as u8).collect();
        Mock::given(method("GET"))
            .and(path("/artifacts/rag-index-v7.tar.gz.enc"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.clone()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("artifact.enc");
        let client = S3Client::from_config(&storage_for(&server.uri())).unwrap();
        let written = client
            .download_file("artifacts", "rag-index-v7.tar.gz.enc", &dest)
            .await
            .unwrap();

        assert_eq!(written, payload.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_missing_object_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = S3Client::from_config(&storage_for(&server.uri())).unwrap();
        let err = client
            .get_object("artifacts", "rag-index-v9-manifest.json")
            .await
            .expect_err("404");
        assert!(matches!(err, Error::ObjectStore(msg) if msg.contains("not found")));
    }
}
