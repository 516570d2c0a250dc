//! src/services/resource_service.rs
//!
//! ResourceService: the ingestion pipeline. Uploads are streamed to a
//! scratch file while their SHA-256 is computed, deduplicated against the
//! `(bucket, hash)` unique key, promoted into the content store and recorded
//! in SQLite. Successful creates and deletes hand an event to the notifier
//! without waiting on delivery.

use crate::{
    errors::{ServiceError, ServiceResult},
    models::{
        bucket::Bucket,
        resource::{Resource, ResourceResponse, blob_filename},
        webhook::{ExtraHeaders, NotificationEvent, WebhookEventKind},
    },
    services::{
        bucket_repository::BucketRepository,
        content_store::ContentStore,
        dispatcher::Notifier,
        media_types,
        resource_repository::{NewResource, ResourceRepository},
    },
};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use sha2::{Digest, Sha256};
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    io::{self, ErrorKind},
    path::Path,
    sync::Arc,
};
use tokio::{
    fs::File,
    io::AsyncWriteExt,
    sync::{Mutex, MutexGuard},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const MAX_EXTENSION_LEN: usize = 32;
/// Number of striped locks serializing placement and removal per digest.
const DIGEST_LOCK_SLOTS: usize = 64;

/// Result of an upload: the resource plus whether this call created it.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub bucket: Bucket,
    pub resource: Resource,
    /// False when identical content already existed in the bucket.
    pub created: bool,
}

#[derive(Clone)]
pub struct ResourceService {
    buckets: BucketRepository,
    resources: ResourceRepository,
    store: ContentStore,
    notifier: Arc<dyn Notifier>,
    /// Base URL for emitted links, without trailing slash; may be empty.
    public_url: String,
    /// Held while a `(bucket, digest)` blob and its row change together.
    digest_locks: Arc<Vec<Mutex<()>>>,
}

impl ResourceService {
    pub fn new(
        buckets: BucketRepository,
        resources: ResourceRepository,
        store: ContentStore,
        notifier: Arc<dyn Notifier>,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            buckets,
            resources,
            store,
            notifier,
            public_url: public_url.into(),
            digest_locks: Arc::new((0..DIGEST_LOCK_SLOTS).map(|_| Mutex::new(())).collect()),
        }
    }

    /// Upload a raw body.
    ///
    /// The extension comes from `extension` when given, otherwise from the
    /// media type; an upload whose extension cannot be determined fails with
    /// `Validation` before any bytes are read.
    pub async fn upload_stream<S>(
        &self,
        caller: &str,
        bucket_id: Uuid,
        content_type: &str,
        extension: Option<&str>,
        stream: S,
        webhook_headers: ExtraHeaders,
    ) -> ServiceResult<UploadOutcome>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let bucket = self.buckets.get_owned(caller, bucket_id).await?;

        let extension = match explicit_extension(extension)? {
            Some(ext) => ext,
            None => media_types::extension_for(content_type)
                .map(str::to_string)
                .ok_or_else(|| {
                    ServiceError::validation(format!(
                        "cannot determine a file extension for content type `{}`; \
                         supply one explicitly",
                        content_type
                    ))
                })?,
        };

        self.ingest(bucket, content_type, extension, stream, webhook_headers)
            .await
    }

    /// Upload a multipart file part.
    ///
    /// An explicit `extension` wins; otherwise it is taken from `file_name`.
    /// A file name without an extension stores the blob without one.
    pub async fn upload_file<S>(
        &self,
        caller: &str,
        bucket_id: Uuid,
        file_name: Option<&str>,
        content_type: Option<&str>,
        extension: Option<&str>,
        stream: S,
        webhook_headers: ExtraHeaders,
    ) -> ServiceResult<UploadOutcome>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let bucket = self.buckets.get_owned(caller, bucket_id).await?;

        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        let extension = match explicit_extension(extension)? {
            Some(ext) => ext,
            None => file_name.map(extension_from_file_name).unwrap_or_default(),
        };

        self.ingest(bucket, content_type, extension, stream, webhook_headers)
            .await
    }

    async fn ingest<S>(
        &self,
        bucket: Bucket,
        content_type: &str,
        extension: String,
        stream: S,
        webhook_headers: ExtraHeaders,
    ) -> ServiceResult<UploadOutcome>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let (scratch, file) = self.store.scratch().await?;
        let (hash, size_bytes) = hash_into(file, stream).await?;

        // A delete of the same digest must not unlink the blob between our
        // placement and our insert.
        let _guard = self.lock_digest(bucket.id, &hash).await;

        if let Some(existing) = self.resources.get_by_bucket_and_hash(bucket.id, &hash).await? {
            debug!(bucket_id = %bucket.id, hash = %hash, "upload deduplicated");
            return Ok(UploadOutcome {
                bucket,
                resource: existing,
                created: false,
            });
        }

        let filename = blob_filename(&hash, &extension);
        self.store.write(bucket.id, &filename, scratch.path()).await?;
        drop(scratch);

        let created = self
            .resources
            .create(NewResource {
                bucket_id: bucket.id,
                hash: hash.clone(),
                size_bytes,
                content_type: content_type.to_string(),
                extension,
            })
            .await;

        match created {
            Ok(resource) => {
                info!(
                    bucket_id = %bucket.id,
                    hash = %resource.hash,
                    size = resource.size_bytes,
                    "stored new resource"
                );
                self.notify(
                    WebhookEventKind::ResourceNew,
                    &bucket,
                    &resource,
                    webhook_headers,
                );
                Ok(UploadOutcome {
                    bucket,
                    resource,
                    created: true,
                })
            }
            Err(ServiceError::Conflict(_)) => {
                // A concurrent upload of the same bytes inserted first.
                let existing = self
                    .resources
                    .get_by_bucket_and_hash(bucket.id, &hash)
                    .await?
                    .ok_or_else(|| ServiceError::Conflict(format!("resource `{}`", hash)))?;
                if existing.filename() != filename {
                    self.discard_blob(bucket.id, &filename).await;
                }
                debug!(bucket_id = %bucket.id, hash = %hash, "lost insert race, deduplicated");
                Ok(UploadOutcome {
                    bucket,
                    resource: existing,
                    created: false,
                })
            }
            Err(err) => {
                // Keep the blob if some row still references it.
                if !matches!(
                    self.resources.get_by_bucket_and_hash(bucket.id, &hash).await,
                    Ok(Some(_))
                ) {
                    self.discard_blob(bucket.id, &filename).await;
                }
                Err(err)
            }
        }
    }

    /// Metadata and an open handle on the blob.
    pub async fn download(
        &self,
        caller: &str,
        bucket_id: Uuid,
        hash: &str,
    ) -> ServiceResult<(Bucket, Resource, File)> {
        let (bucket, resource) = self.get(caller, bucket_id, hash).await?;
        let file = self.open_blob(&bucket, &resource).await?;
        Ok((bucket, resource, file))
    }

    /// Anonymous download. Private buckets answer NotFound.
    pub async fn download_public(
        &self,
        bucket_id: Uuid,
        hash: &str,
    ) -> ServiceResult<(Bucket, Resource, File)> {
        let bucket = self.buckets.get_by_id(bucket_id).await?;
        if !bucket.is_public {
            return Err(ServiceError::not_found("bucket"));
        }
        let resource = self.find_resource(bucket.id, hash).await?;
        let file = self.open_blob(&bucket, &resource).await?;
        Ok((bucket, resource, file))
    }

    /// A row without its blob is an internal inconsistency, not a 404.
    async fn open_blob(&self, bucket: &Bucket, resource: &Resource) -> ServiceResult<File> {
        match self.store.open(bucket.id, &resource.filename()).await {
            Ok(file) => Ok(file),
            Err(ServiceError::NotFound(_)) => {
                error!(
                    bucket_id = %bucket.id,
                    hash = %resource.hash,
                    "resource row has no backing blob"
                );
                Err(ServiceError::Storage(io::Error::new(
                    ErrorKind::NotFound,
                    "resource content is missing",
                )))
            }
            Err(err) => Err(err),
        }
    }

    /// Metadata only. `hash` may carry the stored extension as a suffix.
    pub async fn get(
        &self,
        caller: &str,
        bucket_id: Uuid,
        hash: &str,
    ) -> ServiceResult<(Bucket, Resource)> {
        let bucket = self.buckets.get_owned(caller, bucket_id).await?;
        let resource = self.find_resource(bucket.id, hash).await?;
        Ok((bucket, resource))
    }

    /// Look up `{digest}` or `{digest}{extension}`; a suffix must match the
    /// stored extension exactly.
    async fn find_resource(&self, bucket_id: Uuid, segment: &str) -> ServiceResult<Resource> {
        let (digest, extension) = split_digest(segment);
        self.resources
            .get_by_bucket_and_hash(bucket_id, digest)
            .await?
            .filter(|resource| extension.is_none_or(|ext| ext == resource.extension))
            .ok_or_else(|| ServiceError::not_found("resource"))
    }

    pub async fn list(&self, caller: &str, bucket_id: Uuid) -> ServiceResult<(Bucket, Vec<Resource>)> {
        let bucket = self.buckets.get_owned(caller, bucket_id).await?;
        let resources = self.resources.list_by_bucket(bucket.id).await?;
        Ok((bucket, resources))
    }

    /// Delete the metadata row, announce the deletion, then remove the blob.
    ///
    /// The event is built from the row fetched before deletion and is only
    /// handed off once the row is gone. The blob stays when a row written in
    /// the meantime (by another instance sharing the store) references it.
    pub async fn delete(&self, caller: &str, bucket_id: Uuid, hash: &str) -> ServiceResult<Resource> {
        let (bucket, resource) = self.get(caller, bucket_id, hash).await?;
        let event = NotificationEvent::new(
            WebhookEventKind::ResourceDeleted,
            &bucket,
            &resource,
            self.resource_url(&bucket, &resource),
        );
        let filename = resource.filename();

        let _guard = self.lock_digest(bucket.id, &resource.hash).await;
        self.resources
            .delete_by_bucket_and_hash(bucket.id, &resource.hash)
            .await?;
        self.notifier.dispatch(event, ExtraHeaders::new());

        match self
            .resources
            .get_by_bucket_and_hash(bucket.id, &resource.hash)
            .await
        {
            Ok(Some(current)) if current.filename() == filename => {
                debug!(
                    bucket_id = %bucket.id,
                    hash = %resource.hash,
                    "blob re-referenced after delete, keeping it"
                );
            }
            Ok(_) => self.discard_blob(bucket.id, &filename).await,
            Err(err) => warn!(
                bucket_id = %bucket.id,
                hash = %resource.hash,
                error = %err,
                "could not confirm blob is unreferenced, keeping it"
            ),
        }

        info!(bucket_id = %bucket.id, hash = %resource.hash, "deleted resource");
        Ok(resource)
    }

    /// Authenticated download URL; valid for both public and private buckets.
    pub fn resource_url(&self, bucket: &Bucket, resource: &Resource) -> String {
        format!(
            "{}/buckets/{}/resources/{}",
            self.public_url,
            bucket.id,
            resource.filename()
        )
    }

    /// Anonymous URL, only meaningful for public buckets.
    pub fn public_resource_url(&self, bucket: &Bucket, resource: &Resource) -> Option<String> {
        bucket.is_public.then(|| {
            format!(
                "{}/public/{}/{}",
                self.public_url,
                bucket.id,
                resource.filename()
            )
        })
    }

    pub fn to_response(&self, bucket: &Bucket, resource: &Resource) -> ResourceResponse {
        ResourceResponse {
            id: resource.id,
            hash: resource.hash.clone(),
            size: resource.size_bytes,
            content_type: resource.content_type.clone(),
            extension: resource.extension.clone(),
            created_at: resource.created_at,
            public_url: self.public_resource_url(bucket, resource),
        }
    }

    fn notify(
        &self,
        kind: WebhookEventKind,
        bucket: &Bucket,
        resource: &Resource,
        webhook_headers: ExtraHeaders,
    ) {
        let event = NotificationEvent::new(kind, bucket, resource, self.resource_url(bucket, resource));
        self.notifier.dispatch(event, webhook_headers);
    }

    async fn lock_digest(&self, bucket_id: Uuid, hash: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        bucket_id.hash(&mut hasher);
        hash.hash(&mut hasher);
        let slot = (hasher.finish() % self.digest_locks.len() as u64) as usize;
        self.digest_locks[slot].lock().await
    }

    /// Best-effort blob removal; failures are logged, never returned.
    async fn discard_blob(&self, bucket_id: Uuid, filename: &str) {
        if let Err(err) = self.store.remove(bucket_id, filename).await {
            warn!(
                bucket_id = %bucket_id,
                filename,
                error = %err,
                "failed to remove blob"
            );
        }
    }
}

/// Copy `stream` into `file`, returning the hex SHA-256 and byte count.
async fn hash_into<S>(mut file: File, stream: S) -> ServiceResult<(String, i64)>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let mut size_bytes: i64 = 0;
    let mut digest = Sha256::new();
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    Ok((hex::encode(digest.finalize()), size_bytes))
}

/// Normalize a caller-supplied extension; `None` or blank means "not given".
fn explicit_extension(extension: Option<&str>) -> ServiceResult<Option<String>> {
    match extension.map(str::trim).filter(|e| !e.is_empty()) {
        Some(ext) => normalize_extension(ext).map(Some),
        None => Ok(None),
    }
}

fn normalize_extension(ext: &str) -> ServiceResult<String> {
    let bare = ext.strip_prefix('.').unwrap_or(ext);
    let valid = !bare.is_empty()
        && bare.len() < MAX_EXTENSION_LEN
        && !bare.starts_with('.')
        && !bare.ends_with('.')
        && !bare.contains("..")
        && bare
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+'));
    if !valid {
        return Err(ServiceError::validation(format!("invalid file extension `{}`", ext)));
    }
    Ok(format!(".{}", bare))
}

fn extension_from_file_name(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| normalize_extension(ext).ok())
        .unwrap_or_default()
}

/// Split a `{digest}{extension}` path segment at its first dot.
fn split_digest(segment: &str) -> (&str, Option<&str>) {
    match segment.find('.') {
        Some(dot) => (&segment[..dot], Some(&segment[dot..])),
        None => (segment, None),
    }
}
