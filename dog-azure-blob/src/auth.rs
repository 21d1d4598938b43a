//! Shared Key request signing for the Blob service.
//!
//! `Authorization: SharedKey {account}:{signature}` where the signature is
//! base64(HMAC-SHA256(key, string-to-sign)) and the string-to-sign is:
//!
//! ```text
//! VERB\n
//! Content-Encoding\n
//! Content-Language\n
//! Content-Length\n
//! Content-MD5\n
//! Content-Type\n
//! Date\n
//! If-Modified-Since\n
//! If-Match\n
//! If-None-Match\n
//! If-Unmodified-Since\n
//! Range\n
//! CanonicalizedHeaders
//! CanonicalizedResource
//! ```

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{BlobError, BlobResult, StorageCredentials};

type HmacSha256 = Hmac<Sha256>;

/// The parts of a request that take part in the signature
#[derive(Debug, Default)]
pub(crate) struct SignableRequest<'a> {
    pub method: &'a str,
    pub content_length: Option<usize>,
    pub content_md5: Option<&'a str>,
    pub content_type: Option<&'a str>,
    /// `x-ms-*` headers sent with the request, `x-ms-date` included
    pub ms_headers: &'a [(&'a str, String)],
    /// Encoded path after the host, starting with `/`
    pub path: &'a str,
    pub query: &'a [(&'a str, String)],
}

/// Decoded account key
#[derive(Clone)]
pub(crate) struct SharedKey {
    account: String,
    key: Vec<u8>,
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKey")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl SharedKey {
    pub fn from_credentials(credentials: &StorageCredentials) -> BlobResult<Self> {
        if credentials.account_name.is_empty() {
            return Err(BlobError::config("storage account name must not be empty"));
        }
        let key = BASE64_STANDARD
            .decode(credentials.access_key.trim())
            .map_err(|e| BlobError::config(format!("storage access key is not valid base64: {}", e)))?;

        Ok(Self {
            account: credentials.account_name.clone(),
            key,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    /// Value for the `Authorization` header
    pub fn authorization(&self, request: &SignableRequest<'_>) -> BlobResult<String> {
        let string_to_sign = self.string_to_sign(request);

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| BlobError::config(format!("invalid signing key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    pub fn string_to_sign(&self, request: &SignableRequest<'_>) -> String {
        // Zero length is signed as empty.
        let content_length = match request.content_length {
            Some(0) | None => String::new(),
            Some(len) => len.to_string(),
        };

        let mut headers: Vec<(String, &str)> = request
            .ms_headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
            .filter(|(k, _)| k.starts_with("x-ms-"))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonicalized_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let mut canonicalized_resource = format!("/{}{}", self.account, request.path);
        let mut query: Vec<(String, &str)> = request
            .query
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
            .collect();
        query.sort_by(|a, b| a.0.cmp(&b.0));
        for (k, v) in query {
            canonicalized_resource.push_str(&format!("\n{}:{}", k, v));
        }

        format!(
            "{}\n\n\n{}\n{}\n{}\n\n\n\n\n\n\n{}{}",
            request.method,
            content_length,
            request.content_md5.unwrap_or_default(),
            request.content_type.unwrap_or_default(),
            canonicalized_headers,
            canonicalized_resource
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SharedKey {
        SharedKey::from_credentials(&StorageCredentials::new("myaccount", "c2VjcmV0LWtleQ==")).unwrap()
    }

    #[test]
    fn test_string_to_sign_for_append_block() {
        let headers = [
            ("x-ms-version", "2023-11-03".to_string()),
            ("x-ms-date", "Sun, 18 Oct 2026 10:00:00 GMT".to_string()),
        ];
        let query = [("timeout", "300".to_string()), ("comp", "appendblock".to_string())];
        let request = SignableRequest {
            method: "PUT",
            content_length: Some(1024),
            content_md5: Some("XrY7u+Ae7tCTyyK7j1rNww=="),
            content_type: None,
            ms_headers: &headers,
            path: "/media/uploads/a%20b.txt",
            query: &query,
        };

        assert_eq!(
            key().string_to_sign(&request),
            "PUT\n\n\n1024\nXrY7u+Ae7tCTyyK7j1rNww==\n\n\n\n\n\n\n\n\
             x-ms-date:Sun, 18 Oct 2026 10:00:00 GMT\nx-ms-version:2023-11-03\n\
             /myaccount/media/uploads/a%20b.txt\ncomp:appendblock\ntimeout:300"
        );
    }

    #[test]
    fn test_zero_length_is_signed_empty() {
        let headers = [("x-ms-blob-type", "AppendBlob".to_string())];
        let request = SignableRequest {
            method: "PUT",
            content_length: Some(0),
            ms_headers: &headers,
            path: "/c/p",
            ..Default::default()
        };

        assert_eq!(
            key().string_to_sign(&request),
            "PUT\n\n\n\n\n\n\n\n\n\n\n\nx-ms-blob-type:AppendBlob\n/myaccount/c/p"
        );
    }

    #[test]
    fn test_authorization_is_deterministic() {
        let request = SignableRequest {
            method: "GET",
            path: "/c/p",
            ..Default::default()
        };
        let first = key().authorization(&request).unwrap();
        let second = key().authorization(&request).unwrap();

        assert_eq!(first, second);
        assert!(first.starts_with("SharedKey myaccount:"));
    }

    #[test]
    fn test_rejects_non_base64_key() {
        let err = SharedKey::from_credentials(&StorageCredentials::new("acct", "not base64!")).unwrap_err();
        assert!(matches!(err, BlobError::Config { .. }));
    }
}
