//! Local pledge fallback
//!
//! A durable key-value file holding one key, a list of pledge records. Every
//! save reads the whole file, appends and writes the whole file back.
//! Records saved here are never reconciled with the remote store.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::db::schemas::PledgeDoc;
use crate::types::{PledgeError, Result};

/// Key under which pledges are stored
pub const FALLBACK_KEY: &str = "pledgewall_pledges";

pub struct LocalPledgeLog {
    path: PathBuf,
    /// Serialises read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl LocalPledgeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Returns the number of records now stored.
    pub async fn append(&self, pledge: &PledgeDoc) -> Result<usize> {
        let _guard = self.lock.lock().await;

        let mut entries = self.read_entries().await?;
        let mut list = match entries.remove(FALLBACK_KEY) {
            Some(Value::Array(list)) => list,
            _ => Vec::new(),
        };
        list.push(serde_json::to_value(pledge).map_err(local_err)?);
        let len = list.len();
        entries.insert(FALLBACK_KEY.to_string(), Value::Array(list));

        self.write_entries(&entries).await?;
        debug!("Pledge appended to local fallback ({} stored)", len);
        Ok(len)
    }

    /// All stored records, oldest first. Unreadable records are skipped.
    pub async fn records(&self) -> Result<Vec<PledgeDoc>> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;

        Ok(match entries.get(FALLBACK_KEY) {
            Some(Value::Array(list)) => list
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    pub async fn count(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;

        Ok(match entries.get(FALLBACK_KEY) {
            Some(Value::Array(list)) => list.len(),
            _ => 0,
        })
    }

    async fn read_entries(&self) -> Result<Map<String, Value>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes).map_err(local_err)? {
                Value::Object(map) => Ok(map),
                _ => Err(PledgeError::LocalStorage(format!(
                    "{} is not a JSON object",
                    self.path.display()
                ))),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(local_err(e)),
        }
    }

    async fn write_entries(&self, entries: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(local_err)?;
            }
        }

        let bytes = serde_json::to_vec_pretty(entries).map_err(local_err)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(local_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(local_err)?;
        Ok(())
    }
}

fn local_err(e: impl std::fmt::Display) -> PledgeError {
    PledgeError::LocalStorage(e.to_string())
}

/// Log where the fallback lives and how much it holds
pub async fn report(log: &LocalPledgeLog) {
    match log.count().await {
        Ok(n) => info!("Local fallback at {} holds {} pledge(s)", log.path().display(), n),
        Err(e) => info!("Local fallback at {} unreadable: {}", log.path().display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pledge(name: &str) -> PledgeDoc {
        PledgeDoc {
            parent_name: name.to_string(),
            display_name: name.to_string(),
            is_public: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_append_accumulates_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = LocalPledgeLog::new(dir.path().join("nested").join("pledges.json"));

        assert_eq!(log.count().await.unwrap(), 0);
        assert_eq!(log.append(&pledge("a")).await.unwrap(), 1);
        assert_eq!(log.append(&pledge("b")).await.unwrap(), 2);

        let records = log.records().await.unwrap();
        let names: Vec<&str> = records.iter().map(|p| p.parent_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_other_keys_survive_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, r#"{"theme":"dark"}"#).await.unwrap();

        let log = LocalPledgeLog::new(&path);
        log.append(&pledge("a")).await.unwrap();

        let raw: Value = serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw[FALLBACK_KEY].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, "[1, 2").await.unwrap();

        let log = LocalPledgeLog::new(&path);
        let err = log.append(&pledge("a")).await.unwrap_err();
        assert!(matches!(err, PledgeError::LocalStorage(_)));
    }
}
