//! Copy verification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object_store::{hash_hex, ObjectStore, Result};

/// How an archived copy is compared with its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verification {
    /// Byte length only.
    #[default]
    Size,
    /// Byte length plus the store's integrity token.
    ETag,
    /// SHA-256 of both bodies. Reads every object twice.
    Sha256,
}

/// What `Verification` knows about one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub size: u64,
    pub etag: Option<String>,
    pub sha256: Option<String>,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "size={}", self.size)?;
        if let Some(etag) = &self.etag {
            write!(f, " etag={}", etag)?;
        }
        if let Some(sha) = &self.sha256 {
            write!(f, " sha256={}", sha)?;
        }
        Ok(())
    }
}

impl Verification {
    /// Gather the fields this method compares.
    pub async fn fingerprint(
        &self,
        store: &dyn ObjectStore,
        bucket: &str,
        key: &str,
    ) -> Result<Fingerprint> {
        match self {
            Verification::Size | Verification::ETag => {
                let meta = store.head(bucket, key).await?;
                Ok(Fingerprint {
                    size: meta.size,
                    etag: meta.etag,
                    sha256: None,
                })
            }
            Verification::Sha256 => {
                let body = store.get(bucket, key).await?;
                Ok(Fingerprint {
                    size: body.len() as u64,
                    etag: None,
                    sha256: Some(hash_hex(&body)),
                })
            }
        }
    }

    /// Whether `copy` is an identical copy of `source`.
    pub fn matches(&self, source: &Fingerprint, copy: &Fingerprint) -> bool {
        if source.size != copy.size {
            return false;
        }
        match self {
            Verification::Size => true,
            Verification::ETag => source.etag.is_some() && source.etag == copy.etag,
            Verification::Sha256 => source.sha256.is_some() && source.sha256 == copy.sha256,
        }
    }
}

/// Whether `key` holds the same bytes in both buckets.
///
/// Equal integrity tokens settle it; otherwise both bodies are hashed.
/// A missing object on either side is never identical.
pub async fn same_content(
    store: &dyn ObjectStore,
    src_bucket: &str,
    dst_bucket: &str,
    key: &str,
) -> Result<bool> {
    let (src, dst) = match (store.head(src_bucket, key).await, store.head(dst_bucket, key).await) {
        (Ok(src), Ok(dst)) => (src, dst),
        (Err(e), _) | (_, Err(e)) if e.is_not_found() => return Ok(false),
        (Err(e), _) | (_, Err(e)) => return Err(e),
    };
    if src.size != dst.size {
        return Ok(false);
    }
    if let (Some(a), Some(b)) = (&src.etag, &dst.etag) {
        if a == b {
            return Ok(true);
        }
    }

    // Tokens absent or computed differently (e.g. multipart uploads)
    let src_body = match store.get(src_bucket, key).await {
        Ok(body) => body,
        Err(e) if e.is_not_found() => return Ok(false),
        Err(e) => return Err(e),
    };
    let dst_body = match store.get(dst_bucket, key).await {
        Ok(body) => body,
        Err(e) if e.is_not_found() => return Ok(false),
        Err(e) => return Err(e),
    };
    Ok(hash_hex(&src_body) == hash_hex(&dst_body))
}
