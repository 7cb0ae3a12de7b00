use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// File accepted from a client, prior to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub locator: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Result of a successful storage write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub locator: String,
    pub size_bytes: u64,
}

/// Time-limited retrieval URL minted by the storage provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Storage provider boundary (object store, local disk, in-memory).
pub trait FileStorage: Send + Sync {
    fn put(&self, upload: FileUpload) -> Result<StoredObject, StorageError>;
    fn signed_url(&self, locator: &str, ttl: Duration) -> Result<SignedUrl, StorageError>;
    fn fetch_signed(&self, url: &str) -> Result<Vec<u8>, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object {0} not found")]
    NotFound(String),
    #[error("signed url expired")]
    Expired,
    #[error("signed url rejected")]
    InvalidSignature,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

const URL_SCHEME: &str = "memory://";

/// Signs retrieval URLs with HMAC-SHA256 over `locator \n expiry`.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into().into_bytes(),
        }
    }

    fn mac(&self, locator: &str, expires: i64) -> Result<HmacSha256, StorageError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| StorageError::Unavailable(err.to_string()))?;
        mac.update(locator.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, locator: &str, expires_at: DateTime<Utc>) -> Result<SignedUrl, StorageError> {
        let expires = expires_at.timestamp();
        let signature = hex::encode(self.mac(locator, expires)?.finalize().into_bytes());
        Ok(SignedUrl {
            url: format!("{URL_SCHEME}{locator}?expires={expires}&signature={signature}"),
            expires_at,
        })
    }

    /// Validate a URL produced by [`UrlSigner::sign`] and return its locator.
    pub fn verify(&self, url: &str, now: DateTime<Utc>) -> Result<String, StorageError> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or(StorageError::InvalidSignature)?;
        let (locator, query) = rest.split_once('?').ok_or(StorageError::InvalidSignature)?;

        let mut expires = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", value)) => expires = value.parse::<i64>().ok(),
                Some(("signature", value)) => signature = Some(value),
                _ => {}
            }
        }
        let (expires, signature) = expires
            .zip(signature)
            .ok_or(StorageError::InvalidSignature)?;

        let signature = hex::decode(signature).map_err(|_| StorageError::InvalidSignature)?;
        self.mac(locator, expires)?
            .verify_slice(&signature)
            .map_err(|_| StorageError::InvalidSignature)?;
        let expires_at = Utc
            .timestamp_opt(expires, 0)
            .single()
            .ok_or(StorageError::InvalidSignature)?;
        if expires_at <= now {
            return Err(StorageError::Expired);
        }

        Ok(locator.to_string())
    }
}

/// Restrict client-supplied file names to characters safe inside a locator.
pub fn sanitize_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim_matches(['.', '_']).is_empty() {
        "upload.bin".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_urls_round_trip_until_expiry() {
        let signer = UrlSigner::new("secret");
        let now = Utc::now();
        let signed = signer
            .sign("applications/a/b-tax.pdf", now + Duration::seconds(60))
            .expect("signed");

        assert_eq!(
            signer.verify(&signed.url, now).expect("valid"),
            "applications/a/b-tax.pdf"
        );
        assert!(matches!(
            signer.verify(&signed.url, now + Duration::seconds(61)),
            Err(StorageError::Expired)
        ));
    }

    #[test]
    fn tampered_urls_are_rejected() {
        let signer = UrlSigner::new("secret");
        let now = Utc::now();
        let signed = signer
            .sign("applications/a/b.pdf", now + Duration::seconds(60))
            .expect("signed");
        let tampered = signed.url.replace("b.pdf", "c.pdf");

        assert!(matches!(
            signer.verify(&tampered, now),
            Err(StorageError::InvalidSignature)
        ));
        assert!(matches!(
            UrlSigner::new("other").verify(&signed.url, now),
            Err(StorageError::InvalidSignature)
        ));
    }

    #[test]
    fn signatures_are_keyed_hmac_sha256() {
        let signer = UrlSigner::new("secret");
        let expires_at = Utc.timestamp_opt(1_900_000_000, 0).single().expect("timestamp");
        let signed = signer.sign("a/b.pdf", expires_at).expect("signed");

        let mut mac = HmacSha256::new_from_slice(b"secret").expect("key");
        mac.update(b"a/b.pdf\n1900000000");
        let expected = hex::encode(mac.finalize().into_bytes());
        assert!(signed.url.ends_with(&format!("&signature={expected}")));

        let truncated = &signed.url[..signed.url.len() - 2];
        assert!(matches!(
            signer.verify(truncated, expires_at - Duration::seconds(1)),
            Err(StorageError::InvalidSignature)
        ));
        let garbled = signed.url.replace("signature=", "signature=zz");
        assert!(matches!(
            signer.verify(&garbled, expires_at - Duration::seconds(1)),
            Err(StorageError::InvalidSignature)
        ));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("tax return 2023.pdf"), "tax_return_2023.pdf");
        assert_eq!(sanitize_file_name("C:\\docs\\bill.PDF"), "bill.PDF");
        assert_eq!(sanitize_file_name(".."), "upload.bin");
    }
}
