//! Object storage interface for rasters and boundary files.

use bytes::Bytes;
use object_store::{
    aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory, path::Path, ObjectStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use exposure_common::{ExposureError, ExposureResult, Iso3};

/// Backend selection for an object storage container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3/MinIO compatible endpoint
    S3,
    /// Directory on the local filesystem
    Local,
    /// Process-local store, contents are lost on exit
    Memory,
}

/// Configuration for one object storage container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageConfig {
    pub backend: StorageBackend,
    /// S3/MinIO endpoint URL
    pub endpoint: String,
    /// Bucket (container) name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// AWS region (use "us-east-1" for MinIO)
    pub region: String,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
    /// Root directory for the local backend
    pub local_root: String,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            endpoint: "http://minio:9000".to_string(),
            bucket: "projects".to_string(),
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            allow_http: true,
            local_root: "./data".to_string(),
        }
    }
}

/// Object storage client for one container.
#[derive(Clone)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ObjectStorage {
    /// Create a new object storage client from config.
    pub fn new(config: &ObjectStorageConfig) -> ExposureResult<Self> {
        let store: Arc<dyn ObjectStore> = match config.backend {
            StorageBackend::S3 => {
                let mut builder = AmazonS3Builder::new()
                    .with_endpoint(&config.endpoint)
                    .with_bucket_name(&config.bucket)
                    .with_access_key_id(&config.access_key_id)
                    .with_secret_access_key(&config.secret_access_key)
                    .with_region(&config.region);

                if config.allow_http {
                    builder = builder.with_allow_http(true);
                }

                Arc::new(builder.build().map_err(|e| {
                    ExposureError::StorageError(format!("Failed to create S3 client: {}", e))
                })?)
            }
            StorageBackend::Local => {
                let root = std::path::Path::new(&config.local_root).join(&config.bucket);
                std::fs::create_dir_all(&root)?;
                Arc::new(LocalFileSystem::new_with_prefix(&root).map_err(|e| {
                    ExposureError::StorageError(format!(
                        "Failed to open {}: {}",
                        root.display(),
                        e
                    ))
                })?)
            }
            StorageBackend::Memory => Arc::new(InMemory::new()),
        };

        Ok(Self {
            store,
            bucket: config.bucket.clone(),
        })
    }

    /// Empty in-memory container, used for dry runs and tests.
    pub fn in_memory(bucket: &str) -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            bucket: bucket.to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Write bytes to a path in the bucket, replacing any existing object.
    #[instrument(skip(self, data), fields(bucket = %self.bucket, path = %path))]
    pub async fn put(&self, path: &str, data: Bytes) -> ExposureResult<()> {
        let location = Path::from(path);
        debug!(size = data.len(), "Writing object");

        self.store
            .put(&location, data.into())
            .await
            .map_err(|e| ExposureError::StorageError(format!("Failed to write {}: {}", path, e)))?;

        Ok(())
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(bucket = %self.bucket, path = %path))]
    pub async fn get(&self, path: &str) -> ExposureResult<Bytes> {
        let location = Path::from(path);

        let result = self.store.get(&location).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => ExposureError::NotFound(path.to_string()),
            e => ExposureError::StorageError(format!("Failed to read {}: {}", path, e)),
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| ExposureError::StorageError(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }

    /// Check if an object exists.
    pub async fn exists(&self, path: &str) -> ExposureResult<bool> {
        let location = Path::from(path);

        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(ExposureError::StorageError(format!(
                "Failed to check {}: {}",
                path, e
            ))),
        }
    }

    /// List object keys under a prefix, sorted.
    pub async fn list(&self, prefix: &str) -> ExposureResult<Vec<String>> {
        use futures::TryStreamExt;

        let prefix_path = Path::from(prefix);
        let mut paths = Vec::new();

        let mut stream = self.store.list(Some(&prefix_path));
        while let Some(meta) = stream
            .try_next()
            .await
            .map_err(|e| ExposureError::StorageError(format!("List failed: {}", e)))?
        {
            paths.push(meta.location.to_string());
        }

        paths.sort();
        Ok(paths)
    }
}

/// Path builder for the project container layout.
#[derive(Debug, Clone)]
pub struct StoragePath {
    prefix: String,
}

impl StoragePath {
    pub fn new(project_prefix: &str) -> Self {
        Self {
            prefix: project_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Format: {prefix}/raw/worldpop/{iso3}_ppp_2020_1km_Aggregated_UNadj.tif
    pub fn population(&self, iso3: &Iso3) -> String {
        format!(
            "{}/raw/worldpop/{}_ppp_2020_1km_Aggregated_UNadj.tif",
            self.prefix, iso3
        )
    }

    /// Format: {prefix}/raw/codab/{iso3}_adm{level}.geojson
    pub fn boundaries(&self, iso3: &Iso3, level: u8) -> String {
        format!("{}/raw/codab/{}_adm{}.geojson", self.prefix, iso3, level)
    }

    /// Directory holding one country's exposure rasters.
    /// Format: {prefix}/processed/flood_exposure/{iso3}/
    pub fn exposure_dir(&self, iso3: &Iso3) -> String {
        format!("{}/processed/flood_exposure/{}/", self.prefix, iso3)
    }

    /// Format: {prefix}/processed/flood_exposure/{iso3}/{iso3}_exposure_{date}.tif
    pub fn exposure_raster(&self, iso3: &Iso3, date: chrono::NaiveDate) -> String {
        format!(
            "{}{}_exposure_{}.tif",
            self.exposure_dir(iso3),
            iso3,
            date.format("%Y-%m-%d")
        )
    }

    /// Format: {prefix}/processed/geojson/adm{level}.json
    pub fn geojson_export(&self, level: u8) -> String {
        format!("{}/processed/geojson/adm{}.json", self.prefix, level)
    }

    /// Format: {prefix}/processed/geojson/adm0_outline.json
    pub fn geojson_outline(&self) -> String {
        format!("{}/processed/geojson/adm0_outline.json", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_storage_paths() {
        let paths = StoragePath::new("ds-floodexposure-monitoring/");
        let iso3 = Iso3::new("NGA").unwrap();

        assert_eq!(
            paths.population(&iso3),
            "ds-floodexposure-monitoring/raw/worldpop/nga_ppp_2020_1km_Aggregated_UNadj.tif"
        );
        assert_eq!(
            paths.exposure_raster(&iso3, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
            "ds-floodexposure-monitoring/processed/flood_exposure/nga/nga_exposure_2024-01-03.tif"
        );
        assert_eq!(
            paths.boundaries(&iso3, 2),
            "ds-floodexposure-monitoring/raw/codab/nga_adm2.geojson"
        );
        assert_eq!(
            paths.geojson_outline(),
            "ds-floodexposure-monitoring/processed/geojson/adm0_outline.json"
        );
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let storage = ObjectStorage::in_memory("projects");
        storage.put("a/b/one.tif", Bytes::from_static(b"1")).await.unwrap();
        storage.put("a/b/two.tif", Bytes::from_static(b"2")).await.unwrap();
        storage.put("a/c/three.tif", Bytes::from_static(b"3")).await.unwrap();

        assert!(storage.exists("a/b/one.tif").await.unwrap());
        assert!(!storage.exists("a/b/zero.tif").await.unwrap());
        assert_eq!(storage.get("a/b/two.tif").await.unwrap(), Bytes::from_static(b"2"));
        assert_eq!(
            storage.list("a/b/").await.unwrap(),
            vec!["a/b/one.tif".to_string(), "a/b/two.tif".to_string()]
        );
        assert!(matches!(
            storage.get("a/b/zero.tif").await,
            Err(ExposureError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = ObjectStorageConfig {
            backend: StorageBackend::Local,
            bucket: "raster".to_string(),
            local_root: dir.path().display().to_string(),
            ..Default::default()
        };
        let storage = ObjectStorage::new(&config).unwrap();
        storage.put("x/y.tif", Bytes::from_static(b"xy")).await.unwrap();
        assert!(dir.path().join("raster/x/y.tif").exists());
        assert_eq!(storage.list("x").await.unwrap(), vec!["x/y.tif".to_string()]);
    }
}
