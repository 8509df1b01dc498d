use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;

pub const MAX_PROOF_BYTES: usize = 3 * 1024 * 1024;
/// Lifetime of a proof download link.
pub const PROOF_URL_TTL: Duration = Duration::from_secs(600);

/// Raw bucket operations. `ProofStore` layers the proof rules on top.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    async fn signed_url(&self, key: &str, ttl: Duration) -> anyhow::Result<String>;
}

/// MinIO (or any S3-compatible) bucket.
#[derive(Clone)]
pub struct S3Bucket {
    client: Client,
    bucket: String,
}

impl S3Bucket {
    pub async fn connect(config: &AppConfig) -> Self {
        let endpoint = config.minio_endpoint.as_str();
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new(
                config.minio_access_key.as_str(),
                config.minio_secret_key.as_str(),
                None,
                None,
                "classos-env",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        // MinIO needs path-style addressing
        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(conf),
            bucket: config.minio_bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Bucket {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("upload {} to bucket {}", key, self.bucket))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("remove {} from bucket {}", key, self.bucket))?;
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> anyhow::Result<String> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(ttl)?)
            .await
            .with_context(|| format!("sign download link for {}", key))?;
        Ok(presigned.uri().to_string())
    }
}

/// Document types accepted as salary proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProofKind {
    Jpeg,
    Png,
    Pdf,
}

impl ProofKind {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "application/pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Pdf => "pdf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
        }
    }
}

/// `proofs/<teacher>/<upload id>.<ext>`. The key is fixed before the
/// application row exists, so it cannot carry the application number.
pub fn proof_key(teacher_id: Uuid, upload_id: Uuid, kind: ProofKind) -> String {
    format!("proofs/{}/{}.{}", teacher_id, upload_id, kind.extension())
}

/// Salary-proof documents kept in the object store.
#[derive(Clone)]
pub struct ProofStore {
    objects: Arc<dyn ObjectStore>,
}

impl ProofStore {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    /// Stores one proof for `teacher_id` and returns its key.
    pub async fn upload(&self, teacher_id: Uuid, kind: ProofKind, body: Bytes) -> anyhow::Result<String> {
        let key = proof_key(teacher_id, Uuid::new_v4(), kind);
        let size = body.len();
        self.objects.put(&key, body, kind.content_type()).await?;
        debug!(key = %key, size, "proof stored");
        Ok(key)
    }

    /// Drops a proof whose application never committed. Failures only leave
    /// an orphaned object behind.
    pub async fn discard(&self, key: &str) {
        if let Err(e) = self.objects.delete(key).await {
            warn!(error = ?e, key = %key, "orphaned proof object");
        }
    }

    pub async fn download_url(&self, key: &str) -> anyhow::Result<String> {
        self.objects.signed_url(key, PROOF_URL_TTL).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorded {
        puts: Mutex<Vec<(String, String)>>,
        deletes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for Recorded {
        async fn put(&self, key: &str, _body: Bytes, content_type: &str) -> anyhow::Result<()> {
            self.puts.lock().unwrap().push((key.into(), content_type.into()));
            Ok(())
        }
        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.deletes.lock().unwrap().push(key.into());
            anyhow::bail!("bucket offline")
        }
        async fn signed_url(&self, key: &str, ttl: Duration) -> anyhow::Result<String> {
            Ok(format!("https://bucket.local/{}?ttl={}", key, ttl.as_secs()))
        }
    }

    #[test]
    fn accepted_proof_types() {
        assert_eq!(ProofKind::from_content_type("image/jpeg"), Some(ProofKind::Jpeg));
        assert_eq!(ProofKind::from_content_type("image/png"), Some(ProofKind::Png));
        assert_eq!(ProofKind::from_content_type("application/pdf"), Some(ProofKind::Pdf));
        assert_eq!(ProofKind::from_content_type("image/gif"), None);
        assert_eq!(ProofKind::from_content_type("application/octet-stream"), None);
    }

    #[test]
    fn key_layout() {
        let key = proof_key(Uuid::nil(), Uuid::nil(), ProofKind::Pdf);
        assert_eq!(
            key,
            "proofs/00000000-0000-0000-0000-000000000000/00000000-0000-0000-0000-000000000000.pdf"
        );
    }

    #[tokio::test]
    async fn uploads_get_distinct_keys_under_the_teacher() {
        let bucket = Arc::new(Recorded::default());
        let store = ProofStore::new(bucket.clone());
        let teacher = Uuid::new_v4();

        let a = store.upload(teacher, ProofKind::Png, Bytes::from_static(b"x")).await.unwrap();
        let b = store.upload(teacher, ProofKind::Png, Bytes::from_static(b"x")).await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with(&format!("proofs/{}/", teacher)));
        assert!(a.ends_with(".png"));

        let puts = bucket.puts.lock().unwrap();
        assert_eq!(puts[0].1, "image/png");
    }

    #[tokio::test]
    async fn discard_swallows_bucket_errors() {
        let bucket = Arc::new(Recorded::default());
        let store = ProofStore::new(bucket.clone());
        store.discard("proofs/x/y.pdf").await;
        assert_eq!(bucket.deletes.lock().unwrap().as_slice(), ["proofs/x/y.pdf"]);
    }

    #[tokio::test]
    async fn download_links_last_ten_minutes() {
        let store = ProofStore::new(Arc::new(Recorded::default()));
        let url = store.download_url("proofs/a/b.jpg").await.unwrap();
        assert!(url.ends_with("?ttl=600"));
    }
}
