//! JSON-file broadcast store.
//!
//! Layout under the root directory:
//!
//! ```text
//! broadcasts/<broadcast_id>.json   BroadcastRecord
//! templates/<template_id>.json     TemplateDefinition
//! accounts/<user_id>.json          AccountInfo
//! ```
//!
//! Status writes go to a temporary file that is renamed over the record.

use crate::{due_window, BroadcastStore, ReplaySource, StoreError, StoreResult};
use async_trait::async_trait;
use campaign_types::{AccountInfo, BroadcastStatus, ScheduledBroadcastHandle, TemplateDefinition};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// A persisted scheduled broadcast and its lifecycle status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastRecord {
    #[serde(flatten)]
    pub handle: ScheduledBroadcastHandle,
    pub status: BroadcastStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl BroadcastRecord {
    pub fn pending(handle: ScheduledBroadcastHandle) -> Self {
        Self {
            handle,
            status: BroadcastStatus::Pending,
            annotation: None,
            updated_at: None,
        }
    }
}

/// Broadcast store backed by a directory of JSON files.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn broadcasts_dir(&self) -> PathBuf {
        self.root.join("broadcasts")
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.root.join("templates")
    }

    pub fn accounts_dir(&self) -> PathBuf {
        self.root.join("accounts")
    }

    /// Create the directory layout.
    pub async fn ensure_dirs(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(self.broadcasts_dir()).await?;
        tokio::fs::create_dir_all(self.templates_dir()).await?;
        tokio::fs::create_dir_all(self.accounts_dir()).await?;
        Ok(())
    }

    /// Write (or overwrite) a broadcast record.
    pub async fn put(&self, record: &BroadcastRecord) -> StoreResult<()> {
        let path = record_path(&self.broadcasts_dir(), &record.handle.broadcast_id)?;
        write_json(&path, record).await
    }

    pub async fn get(&self, broadcast_id: &str) -> StoreResult<BroadcastRecord> {
        read_json(&record_path(&self.broadcasts_dir(), broadcast_id)?).await
    }

    async fn records(&self) -> StoreResult<Vec<BroadcastRecord>> {
        let mut records = Vec::new();
        let mut entries = match tokio::fs::read_dir(self.broadcasts_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_json::<BroadcastRecord>(&path).await {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable broadcast record"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl BroadcastStore for DirectoryStore {
    async fn find_due(
        &self,
        lookback: Duration,
        lookahead: Duration,
        status: BroadcastStatus,
    ) -> StoreResult<Vec<ScheduledBroadcastHandle>> {
        let (from, to) = due_window(Utc::now(), lookback, lookahead);
        let due: Vec<ScheduledBroadcastHandle> = self
            .records()
            .await?
            .into_iter()
            .filter(|record| record.status == status)
            .filter(|record| record.handle.schedule_at >= from && record.handle.schedule_at <= to)
            .map(|record| record.handle)
            .collect();

        debug!(count = due.len(), from = %from, to = %to, "Found due broadcasts");
        Ok(due)
    }

    async fn save_status(
        &self,
        broadcast_id: &str,
        status: BroadcastStatus,
        annotation: Option<&str>,
    ) -> StoreResult<()> {
        let mut record = self.get(broadcast_id).await?;
        record.status = status;
        record.annotation = annotation.map(str::to_string);
        record.updated_at = Some(Utc::now());
        self.put(&record).await
    }
}

#[async_trait]
impl ReplaySource for DirectoryStore {
    async fn load_template(&self, template_id: &str) -> StoreResult<TemplateDefinition> {
        read_json(&record_path(&self.templates_dir(), template_id)?).await
    }

    async fn account_for(&self, user_id: &str) -> StoreResult<AccountInfo> {
        read_json(&record_path(&self.accounts_dir(), user_id)?).await
    }
}

/// `<dir>/<id>.json`, refusing ids that would escape `dir`.
fn record_path(dir: &Path, id: &str) -> StoreResult<PathBuf> {
    if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
        return Err(StoreError::Backend(format!("invalid record id: {id:?}")));
    }
    Ok(dir.join(format!("{id}.json")))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&content)?)
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use campaign_types::FlowKind;
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    fn handle(id: &str, schedule_at: DateTime<Utc>) -> ScheduledBroadcastHandle {
        ScheduledBroadcastHandle {
            broadcast_id: id.into(),
            user_id: "u-1".into(),
            template_id: "t-1".into(),
            schedule_at,
            flow: FlowKind::Normal,
            request_json: None,
            mobiles: vec!["911".into()],
        }
    }

    const TEN_MIN: Duration = Duration::from_secs(600);
    const TWO_MIN: Duration = Duration::from_secs(120);

    #[tokio::test]
    async fn test_find_due_filters_window_and_status() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        store.ensure_dirs().await.unwrap();

        let now = Utc::now();
        store.put(&BroadcastRecord::pending(handle("in-window", now - ChronoDuration::minutes(5)))).await.unwrap();
        store.put(&BroadcastRecord::pending(handle("soon", now + ChronoDuration::minutes(1)))).await.unwrap();
        store.put(&BroadcastRecord::pending(handle("stale", now - ChronoDuration::hours(2)))).await.unwrap();
        store.put(&BroadcastRecord::pending(handle("far", now + ChronoDuration::hours(1)))).await.unwrap();
        let mut done = BroadcastRecord::pending(handle("done", now));
        done.status = BroadcastStatus::Succeeded;
        store.put(&done).await.unwrap();

        let mut ids: Vec<String> = store
            .find_due(TEN_MIN, TWO_MIN, BroadcastStatus::Pending)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.broadcast_id)
            .collect();
        ids.sort();

        assert_eq!(ids, vec!["in-window", "soon"]);
    }

    #[tokio::test]
    async fn test_save_status_updates_record() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        store.ensure_dirs().await.unwrap();
        store.put(&BroadcastRecord::pending(handle("b-1", Utc::now()))).await.unwrap();

        store
            .save_status("b-1", BroadcastStatus::Failed, Some("template missing"))
            .await
            .unwrap();

        let record = store.get("b-1").await.unwrap();
        assert_eq!(record.status, BroadcastStatus::Failed);
        assert_eq!(record.annotation.as_deref(), Some("template missing"));
        assert!(record.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_missing_records() {
        let dir = tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());

        assert!(store
            .find_due(TEN_MIN, TWO_MIN, BroadcastStatus::Pending)
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(store.load_template("t-404").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.save_status("nope", BroadcastStatus::Executing, None).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_record_path_rejects_traversal() {
        let dir = Path::new("/tmp/store");
        assert!(record_path(dir, "../etc/passwd").is_err());
        assert!(record_path(dir, "").is_err());
        assert_eq!(record_path(dir, "b-1").unwrap(), PathBuf::from("/tmp/store/b-1.json"));
    }

    #[test]
    fn test_record_json_is_flat() {
        let record = BroadcastRecord::pending(handle("b-1", Utc::now()));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["broadcast_id"], "b-1");
        assert_eq!(value["status"], "PENDING");
        assert_eq!(value["flow"], "NORMAL");
    }
}
