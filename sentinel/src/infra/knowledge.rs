//! Infrastructure implementation of the `KnowledgeStore` port.
//!
//! Each knowledge item is tracked as `knowledge/<sha256(source, filename)>.json`
//! holding its latest add/delete event. The agent runtime picks these up and
//! does the actual ingestion.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sentinel_common::{KnowledgeAction, KnowledgeRecord};
use sha2::{Digest, Sha256};

use crate::application::ports::KnowledgeStore;
use crate::infra::state::write_atomic;

pub struct KnowledgeDir {
    root: PathBuf,
}

impl KnowledgeDir {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn record_path(&self, source: &str, filename: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update([0]);
        hasher.update(filename.as_bytes());
        self.root
            .join(format!("{}.json", hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl KnowledgeStore for KnowledgeDir {
    async fn record(&self, source: &str, filename: &str, action: KnowledgeAction) -> Result<()> {
        let record = KnowledgeRecord {
            source: source.to_string(),
            filename: filename.to_string(),
            action,
            updated_at: chrono::Utc::now(),
        };
        let content = serde_json::to_vec_pretty(&record).context("serializing knowledge record")?;
        let path = self.record_path(source, filename);
        tokio::task::spawn_blocking(move || write_atomic(&path, &content))
            .await
            .context("knowledge write task panicked")??;
        tracing::info!(%source, %filename, ?action, "knowledge recorded");
        Ok(())
    }
}
