//! Audit ledgers
//!
//! Runs are appended, never rewritten. A failed write is reported by the
//! caller but does not undo transfers that already executed.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::Ledger;
use crate::distribution::DistributionRun;
use crate::error::{Error, Result};
use crate::withdrawal::WithdrawalRecord;

/// One audited outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEntry {
    Distribution(DistributionRun),
    Withdrawal(WithdrawalRecord),
}

impl LedgerEntry {
    pub fn id(&self) -> Uuid {
        match self {
            LedgerEntry::Distribution(run) => run.id,
            LedgerEntry::Withdrawal(record) => record.id,
        }
    }
}

/// Append-only JSON-lines file
pub struct JsonlLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlLedger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every entry in file order
    pub async fn load(&self) -> Result<Vec<LedgerEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let data = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::Ledger(e.to_string()))?;

        data.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| Error::Ledger(e.to_string())))
            .collect()
    }
}

#[async_trait]
impl Ledger for JsonlLedger {
    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| Error::Ledger(e.to_string()))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Ledger(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| Error::Ledger(e.to_string()))?;

        debug!("Recorded ledger entry {} to {}", entry.id(), self.path.display());
        Ok(())
    }
}

/// In-process ledger
#[derive(Default)]
pub struct MemoryLedger {
    entries: RwLock<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn record(&self, entry: &LedgerEntry) -> Result<()> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}
