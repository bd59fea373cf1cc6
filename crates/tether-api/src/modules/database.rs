use crate::types::DbType;
use async_trait::async_trait;
use std::sync::Arc;
use tether_core::{Error, Result};

/// Persistent key-value databases.
#[async_trait]
pub trait DatabaseModule: Send + Sync {
    fn name(&self) -> &str;

    /// Open, or create, the database with the given logical name.
    async fn key_value_db(&self, name: &str, db_type: DbType) -> Result<Arc<dyn KeyValueDb>>;
}

/// String key-value store.
#[async_trait]
pub trait KeyValueDb: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;

    /// Visit every pair until `visitor` returns `false`.
    async fn iterate(&self, visitor: &mut (dyn for<'k, 'v> FnMut(&'k str, &'v str) -> bool + Send)) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Copy every pair of `src` into `dst`, stopping at the first failed `set`.
pub async fn migrate_key_value_db(src: &dyn KeyValueDb, dst: &dyn KeyValueDb) -> Result<usize> {
    let mut pairs = Vec::new();
    src.iterate(&mut |key, value| {
        pairs.push((key.to_string(), value.to_string()));
        true
    })
    .await?;

    let mut copied = 0;
    for (key, value) in pairs {
        dst.set(&key, &value)
            .await
            .map_err(|e| Error::module(format!("migrate {key}: {e}")))?;
        copied += 1;
    }
    Ok(copied)
}
