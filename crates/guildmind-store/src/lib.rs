//! Storage port: a PostgREST-style row store plus an object store, behind
//! one fluent API. Either a remote REST backend or a local SQLite file can
//! be plugged in; callers never see the dialect.

pub mod error;
pub mod object;
pub mod query;
pub mod records;
pub mod rest;
pub mod retry;
pub mod schema;
pub mod sqlite;
pub mod syslog;

use std::sync::Arc;

use guildmind_core::config::StoreSettings;

use crate::error::StoreError;
use crate::object::ObjectStore;
use crate::query::{Query, TableQuery};
use crate::rest::RestBackend;
use crate::sqlite::SqliteBackend;

/// Page size for transparent select pagination.
pub const PAGE_SIZE: usize = 1000;

#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    async fn select(&self, q: &Query) -> Result<Vec<serde_json::Value>, StoreError>;
    async fn write(&self, q: &Query) -> Result<u64, StoreError>;
}

/// The single shared-state authority of the system.
pub struct Store {
    backend: Arc<dyn StoreBackend>,
    objects: ObjectStore,
}

impl Store {
    /// Open the store named by config: remote when Supabase credentials are
    /// present, the local SQLite file otherwise.
    pub async fn open(settings: &StoreSettings) -> Result<Self, StoreError> {
        if settings.use_remote() {
            let url = settings.supabase_url.clone().unwrap_or_default();
            let key = settings.supabase_service_key.clone().unwrap_or_default();
            let backend = RestBackend::new(url.clone(), key.clone())?;
            let objects = ObjectStore::rest(url, key)?;
            Ok(Self {
                backend: Arc::new(backend),
                objects,
            })
        } else {
            let backend = SqliteBackend::open(&settings.sqlite_path).await?;
            let objects = ObjectStore::local(&settings.media_dir);
            Ok(Self {
                backend: Arc::new(backend),
                objects,
            })
        }
    }

    /// In-memory store for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let backend = SqliteBackend::open(":memory:").await?;
        Ok(Self {
            backend: Arc::new(backend),
            objects: ObjectStore::local("target/test-media"),
        })
    }

    pub fn table(&self, name: &str) -> TableQuery<'_> {
        TableQuery::new(self.backend.as_ref(), name)
    }

    pub fn bucket(&self, name: &str) -> object::Bucket<'_> {
        self.objects.bucket(name)
    }
}
