use std::path::PathBuf;

use crate::error::StoreError;
use crate::retry;

/// Object storage half of the port. Buckets: `workflows`, `videos`,
/// `summary-media`. Paths follow `{bucket}/{owner}/{scope}/{filename}`.
pub enum ObjectStore {
    Rest(RestObjects),
    Local(LocalObjects),
}

impl ObjectStore {
    pub fn rest(base_url: String, service_key: String) -> Result<Self, StoreError> {
        Ok(ObjectStore::Rest(RestObjects::new(base_url, service_key)?))
    }

    pub fn local(media_dir: &str) -> Self {
        ObjectStore::Local(LocalObjects {
            root: PathBuf::from(media_dir),
        })
    }

    pub fn bucket(&self, name: &str) -> Bucket<'_> {
        Bucket {
            store: self,
            name: name.to_string(),
        }
    }
}

pub struct Bucket<'a> {
    store: &'a ObjectStore,
    name: String,
}

impl Bucket<'_> {
    /// Upload bytes and return the public URL.
    pub async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        match self.store {
            ObjectStore::Rest(r) => r.upload(&self.name, path, bytes, content_type).await,
            ObjectStore::Local(l) => l.upload(&self.name, path, bytes).await,
        }
    }

    pub fn public_url(&self, path: &str) -> String {
        match self.store {
            ObjectStore::Rest(r) => r.public_url(&self.name, path),
            ObjectStore::Local(l) => l.public_url(&self.name, path),
        }
    }
}

pub struct RestObjects {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl RestObjects {
    fn new(base_url: String, service_key: String) -> Result<Self, StoreError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        })
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StoreError> {
        let url = format!("{}/storage/v1/object/{bucket}/{path}", self.base_url);
        retry::with_backoff("object.upload", || {
            let bytes = bytes.clone();
            let url = url.clone();
            async move {
                let resp = self
                    .client
                    .post(&url)
                    .bearer_auth(&self.service_key)
                    .header("Content-Type", content_type)
                    // Re-uploads of the same path overwrite rather than 409.
                    .header("x-upsert", "true")
                    .body(bytes)
                    .send()
                    .await?;
                let status = resp.status();
                if status.as_u16() == 429 || status.is_server_error() {
                    return Err(StoreError::Transient(format!("upload {status}")));
                }
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    return Err(StoreError::Object(format!("upload {status}: {text}")));
                }
                Ok(())
            }
        })
        .await?;
        Ok(self.public_url(bucket, path))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{path}", self.base_url)
    }
}

pub struct LocalObjects {
    root: PathBuf,
}

impl LocalObjects {
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>) -> Result<String, StoreError> {
        let full = self.root.join(bucket).join(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Object(e.to_string()))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| StoreError::Object(e.to_string()))?;
        Ok(self.public_url(bucket, path))
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("file://{}", self.root.join(bucket).join(path).display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_upload_roundtrip() {
        let dir = std::env::temp_dir().join(format!("gm-objects-{}", uuid::Uuid::new_v4()));
        let store = ObjectStore::local(dir.to_str().unwrap());
        let url = store
            .bucket("videos")
            .upload("owner/scope/a.mp4", b"abc".to_vec(), "video/mp4")
            .await
            .unwrap();
        assert!(url.contains("videos"));
        let on_disk = dir.join("videos/owner/scope/a.mp4");
        assert_eq!(tokio::fs::read(on_disk).await.unwrap(), b"abc");
        let _ = tokio::fs::remove_dir_all(dir).await;
    }
}
