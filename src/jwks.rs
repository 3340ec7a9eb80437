use jsonwebtoken::jwk::JwkSet;
use url::Url;

use crate::error::VerificationError;

/// Fetches the provider's published signing keys.
///
/// The body is read chunk by chunk so an oversized document is rejected
/// before it is buffered in full.
#[derive(Clone)]
pub(crate) struct JwksClient {
    http: reqwest::Client,
    url: Url,
    size_limit: usize,
}

impl JwksClient {
    pub(crate) fn new(http: reqwest::Client, url: Url, size_limit: usize) -> Self {
        Self {
            http,
            url,
            size_limit,
        }
    }

    pub(crate) fn url(&self) -> &Url {
        &self.url
    }

    pub(crate) async fn fetch(&self) -> Result<JwkSet, VerificationError> {
        let mut response = self
            .http
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| VerificationError::KeyFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerificationError::KeyFetch(format!(
                "JWKS endpoint returned {}",
                status.as_u16()
            )));
        }

        if let Some(len) = response.content_length() {
            if len > self.size_limit as u64 {
                return Err(self.too_large());
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| VerificationError::KeyFetch(e.to_string()))?
        {
            if body.len() + chunk.len() > self.size_limit {
                return Err(self.too_large());
            }
            body.extend_from_slice(&chunk);
        }

        let keys: JwkSet = serde_json::from_slice(&body)
            .map_err(|e| VerificationError::KeyFetch(format!("invalid key set: {e}")))?;
        tracing::debug!(url = %self.url, keys = keys.keys.len(), "Fetched signing keys");
        Ok(keys)
    }

    fn too_large(&self) -> VerificationError {
        VerificationError::KeyFetch(format!(
            "key set exceeds {} bytes",
            self.size_limit
        ))
    }
}
