use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Datelike, Utc};
use s3::{presigning::PresigningConfig, primitives::ByteStream};
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use thiserror::Error;
use uuid::Uuid;

use crate::config::StorageConfig;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("{0}")]
    Unsupported(&'static str),

    #[error("{0}")]
    InvalidKey(String),
}

/// Where an object landed and how the public site reaches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// StorageService
///
/// The storage driver contract. Handlers only see this trait, so the local
/// filesystem driver, the Supabase bucket driver and the in-memory test double
/// are interchangeable.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// `local`, `supabase` or `mock`.
    fn driver_name(&self) -> &'static str;

    /// Bucket name or filesystem root, for the admin storage panel.
    fn location(&self) -> String;

    /// Provisions the bucket or directory if it does not exist yet.
    async fn ensure_bucket_exists(&self);

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Deleting an object that is already gone is not an error.
    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;

    fn public_url(&self, key: &str) -> String;

    /// A short-lived URL letting the client PUT the object directly.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`) and empty segments from a key.
pub fn sanitize_key(key: &str) -> String {
    key.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn checked_key(key: &str) -> Result<String, StorageError> {
    let clean = sanitize_key(key);
    if clean.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(clean)
}

/// Extension for an accepted image MIME type. The client filename is never
/// consulted, so the served type always matches the checked one.
pub fn image_extension(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/svg+xml" => "svg",
        _ => "bin",
    }
}

/// Object key for a new upload: `images/<yyyy>/<mm>/<uuid>.<ext>`.
pub fn image_key(content_type: &str, now: DateTime<Utc>) -> String {
    format!(
        "images/{:04}/{:02}/{}.{}",
        now.year(),
        now.month(),
        Uuid::new_v4(),
        image_extension(content_type)
    )
}

// --- Local filesystem driver ---

/// LocalStorage
///
/// Writes objects below `root`; the router serves that directory under `/uploads`.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base: &str) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for LocalStorage {
    fn driver_name(&self) -> &'static str {
        "local"
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }

    async fn ensure_bucket_exists(&self) {
        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            tracing::error!(root = %self.root.display(), "failed to create upload dir: {e}");
        }
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let key = checked_key(key)?;
        let path = self.root.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(key = %key, "stored object on local disk");

        Ok(StoredObject {
            url: self.public_url(&key),
            key,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let key = checked_key(key)?;
        match tokio::fs::remove_file(self.root.join(&key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/uploads/{}", self.public_base, sanitize_key(key))
    }

    async fn get_presigned_upload_url(
        &self,
        _key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        Err(StorageError::Unsupported("presigned uploads"))
    }
}

// --- Supabase Storage driver (S3 gateway) ---

/// S3StorageClient
///
/// Talks to Supabase Storage through its S3-compatible gateway. Path-style
/// addressing is required by that gateway.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_base: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_base: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    fn driver_name(&self) -> &'static str {
        "supabase"
    }

    fn location(&self) -> String {
        self.bucket_name.clone()
    }

    /// CreateBucket is idempotent on the gateway; an "already exists" answer is ignored.
    async fn ensure_bucket_exists(&self) {
        let _ = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await;
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let key = checked_key(key)?;
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(StoredObject {
            url: self.public_url(&key),
            key,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        let key = checked_key(key)?;
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base, self.bucket_name, sanitize_key(key))
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = checked_key(key)?;
        // Ten minutes is enough for a single image PUT.
        let presigning = PresigningConfig::expires_in(Duration::from_secs(600))
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(presigned_req.uri().to_string())
    }
}

// --- In-memory driver (tests) ---

/// MockStorageService
///
/// Keeps objects in memory so handler tests never touch disk or network.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, every write returns a simulated failure.
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    fn driver_name(&self) -> &'static str {
        "mock"
    }

    fn location(&self) -> String {
        "mock-bucket".to_string()
    }

    async fn ensure_bucket_exists(&self) {}

    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend("mock storage failure".to_string()));
        }
        let key = checked_key(key)?;
        self.objects
            .lock()
            .map_err(|_| StorageError::Backend("mock storage poisoned".to_string()))?
            .insert(key.clone(), (bytes, content_type.to_string()));
        Ok(StoredObject {
            url: self.public_url(&key),
            key,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend("mock storage failure".to_string()));
        }
        self.objects
            .lock()
            .map_err(|_| StorageError::Backend("mock storage poisoned".to_string()))?
            .remove(&sanitize_key(key));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("http://localhost:9000/mock-bucket/{}", sanitize_key(key))
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError::Backend("mock storage failure".to_string()));
        }
        Ok(format!("{}?signature=fake", self.public_url(key)))
    }
}

/// StorageState
///
/// The concrete type used to share the storage driver across the application state.
pub type StorageState = Arc<dyn StorageService>;

/// Builds the driver selected by the configuration.
pub async fn from_config(config: &StorageConfig) -> StorageState {
    match config {
        StorageConfig::Local { root, public_base } => {
            Arc::new(LocalStorage::new(root.clone(), public_base))
        }
        StorageConfig::Supabase {
            endpoint,
            region,
            access_key,
            secret_key,
            bucket,
            public_base,
        } => Arc::new(
            S3StorageClient::new(endpoint, region, access_key, secret_key, bucket, public_base)
                .await,
        ),
    }
}
