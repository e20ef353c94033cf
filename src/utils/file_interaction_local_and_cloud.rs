use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use object_store::memory::InMemory;
use object_store::{aws::AmazonS3Builder, local::LocalFileSystem, path::Path as ObjectPath, ObjectStore, PutPayload};
use once_cell::sync::Lazy;
use url::Url;

use crate::errors::{ChunkpackError, Result};

/// Prefix of paths served by the process-wide in-memory store.
pub const MEMORY_SCHEME: &str = "memory://";

/// Cache key for S3 stores that distinguishes between authenticated and anonymous access
#[derive(Hash, Eq, PartialEq, Clone, Debug)]
struct S3CacheKey {
    bucket: String,
    anonymous: bool,
}

/// Global cache for S3 stores, keyed by (bucket, anonymous).
///
/// Creating an S3 store may fetch credentials, so each bucket's store is built once and shared.
/// Credentials come from `AmazonS3Builder::from_env()`, which refreshes role-based credentials
/// on its own; static keys are read once.
static S3_STORE_CACHE: Lazy<DashMap<S3CacheKey, Arc<dyn ObjectStore>>> = Lazy::new(DashMap::new);

/// Process-wide in-memory store behind `memory://` paths.
static MEMORY_STORE: Lazy<Arc<InMemory>> = Lazy::new(|| Arc::new(InMemory::new()));

/// Gets or creates a cached S3 store for the given bucket.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// # use chunkpack::utils::file_interaction_local_and_cloud::get_cached_s3_store;
///
/// let store1 = get_cached_s3_store("my-bucket", true).unwrap();
/// let store2 = get_cached_s3_store("my-bucket", true).unwrap();
/// assert!(Arc::ptr_eq(&store1, &store2));
/// ```
pub fn get_cached_s3_store(bucket: &str, anonymous: bool) -> Result<Arc<dyn ObjectStore>> {
    let cache_key = S3CacheKey {
        bucket: bucket.to_string(),
        anonymous,
    };
    let entry = S3_STORE_CACHE.entry(cache_key);
    let store = entry.or_try_insert_with(|| create_s3_store(bucket, anonymous))?;
    Ok(Arc::clone(store.value()))
}

/// Resolves a path string to an `ObjectStore` and the location inside it.
///
/// # Supported Path Formats
///
/// * **S3**: `"s3://bucket/key"` or `"s3://bucket/key?anon=true"` (stores cached per bucket)
/// * **Memory**: `"memory://key"`, a single store shared by the whole process
/// * **Local**: absolute or relative filesystem paths
///
/// Directories resolve the same way; files inside them are addressed with
/// [`ObjectPath::child`].
///
/// # Errors
///
/// Returns an error if an S3 URL is malformed or has no bucket, if the S3 store cannot be
/// built, or if the current directory cannot be determined for a relative path.
///
/// # Examples
///
/// ```
/// # use chunkpack::utils::file_interaction_local_and_cloud::get_object_store;
/// # tokio_test::block_on(async {
/// let (store, dir) = get_object_store("memory://docs/out").await.unwrap();
/// let metadata = dir.child("metadata");
/// store.put(&metadata, vec![1u8, 2, 3].into()).await.unwrap();
/// assert_eq!(store.get(&metadata).await.unwrap().bytes().await.unwrap().len(), 3);
/// # });
/// ```
pub async fn get_object_store(file_path: &str) -> Result<(Arc<dyn ObjectStore>, ObjectPath)> {
    if file_path.starts_with("s3://") {
        let url = Url::parse(file_path)?;
        let bucket = url
            .host_str()
            .ok_or_else(|| ChunkpackError::InvalidPath(format!("no bucket in S3 URL '{}'", file_path)))?;
        let key = url.path().trim_start_matches('/');

        let anonymous = url
            .query_pairs()
            .any(|(k, v)| k == "anon" && (v == "true" || v == "1"));

        let store = get_cached_s3_store(bucket, anonymous)?;
        Ok((store, ObjectPath::from(key)))
    } else if let Some(key) = file_path.strip_prefix(MEMORY_SCHEME) {
        let store: Arc<dyn ObjectStore> = MEMORY_STORE.clone();
        Ok((store, ObjectPath::from(key.trim_matches('/'))))
    } else {
        use std::path::Path as StdPath;

        let std_path = StdPath::new(file_path);
        let absolute_path = if std_path.is_absolute() {
            std_path.to_path_buf()
        } else {
            std::env::current_dir()?.join(std_path)
        };

        #[cfg(windows)]
        let (root, relative) = {
            let path_str = absolute_path.to_string_lossy();
            if let Some(pos) = path_str.find(":\\") {
                let root = format!("{}:\\", &path_str[..pos]);
                let relative = path_str[pos + 2..].trim_start_matches('\\').replace('\\', "/");
                (root, relative)
            } else {
                return Err(ChunkpackError::InvalidPath(format!("invalid Windows path '{}'", file_path)));
            }
        };

        #[cfg(not(windows))]
        let (root, relative) = {
            let path_str = absolute_path.to_string_lossy();
            ("/".to_string(), path_str.trim_start_matches('/').to_string())
        };

        let local_store = LocalFileSystem::new_with_prefix(root)?;
        let store: Arc<dyn ObjectStore> = Arc::new(local_store);
        Ok((store, ObjectPath::from(relative)))
    }
}

/// Creates an S3 `ObjectStore` for `bucket`; `anonymous` skips request signing.
pub fn create_s3_store(bucket: &str, anonymous: bool) -> Result<Arc<dyn ObjectStore>> {
    let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

    if anonymous {
        builder = builder.with_skip_signature(true);
    }

    let s3_store = builder.build()?;
    Ok(Arc::new(s3_store))
}

/// Places `contents` at a `memory://` path so it can be fed to the path-based entry points.
///
/// # Examples
///
/// ```
/// # use chunkpack::utils::file_interaction_local_and_cloud::{register_memory_file, read_path};
/// # tokio_test::block_on(async {
/// let path = register_memory_file("inputs/small.csv", b"1,2.5\n".to_vec()).await.unwrap();
/// assert_eq!(path, "memory://inputs/small.csv");
/// assert_eq!(&read_path(&path).await.unwrap()[..], b"1,2.5\n");
/// # });
/// ```
pub async fn register_memory_file(key: &str, contents: Vec<u8>) -> Result<String> {
    let path = format!("{}{}", MEMORY_SCHEME, key.trim_start_matches('/'));
    write_path(&path, contents).await?;
    Ok(path)
}

pub async fn read_object(store: &dyn ObjectStore, location: &ObjectPath) -> Result<Bytes> {
    Ok(store.get(location).await?.bytes().await?)
}

/// Writes `contents` to `location`, returning the number of bytes written.
pub async fn write_object(store: &dyn ObjectStore, location: &ObjectPath, contents: impl Into<PutPayload>) -> Result<u64> {
    let payload: PutPayload = contents.into();
    let written = payload.content_length() as u64;
    store.put(location, payload).await?;
    Ok(written)
}

pub async fn read_path(file_path: &str) -> Result<Bytes> {
    let (store, location) = get_object_store(file_path).await?;
    read_object(store.as_ref(), &location).await
}

pub async fn write_path(file_path: &str, contents: impl Into<PutPayload>) -> Result<u64> {
    let (store, location) = get_object_store(file_path).await?;
    write_object(store.as_ref(), &location, contents).await
}
