use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::migrate::{MigrationReport, migrate_with_report};
use crate::reminder::{Reminder, StoredReminder};

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub reminders_path: PathBuf,
    pub undo_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UndoEntry {
    reminders: Vec<StoredReminder>,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let reminders_path = data_dir.join("reminders.data");
        let undo_path = data_dir.join("undo.data");

        for path in [&reminders_path, &undo_path] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            reminders = %reminders_path.display(),
            undo = %undo_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            reminders_path,
            undo_path,
        })
    }

    /// Records exactly as stored, legacy shapes included.
    #[tracing::instrument(skip(self))]
    pub fn load_raw(&self) -> anyhow::Result<Vec<StoredReminder>> {
        load_jsonl(&self.reminders_path).context("failed to load reminders.data")
    }

    /// Loads and migrates in memory. Nothing is written back.
    #[tracing::instrument(skip(self))]
    pub fn load_reminders(&self) -> anyhow::Result<(Vec<Reminder>, MigrationReport)> {
        let raw = self.load_raw()?;
        Ok(migrate_with_report(raw))
    }

    #[tracing::instrument(skip(self, reminders))]
    pub fn save_reminders(&self, reminders: &[Reminder]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.reminders_path, reminders)
            .context("failed to save reminders.data")
    }

    #[tracing::instrument(skip(self, records))]
    pub fn save_raw(&self, records: &[StoredReminder]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.reminders_path, records).context("failed to save reminders.data")
    }

    /// Rewrites the store in the current shape. The prior raw state is kept
    /// on the undo stack when anything changed.
    #[tracing::instrument(skip(self))]
    pub fn migrate_in_place(&self) -> anyhow::Result<(Vec<Reminder>, MigrationReport)> {
        let raw = self.load_raw()?;
        let before = raw.clone();
        let (migrated, report) = migrate_with_report(raw);

        if !report.changed() {
            debug!("store already in current shape; nothing to write");
            return Ok((migrated, report));
        }

        self.push_undo_snapshot(&before)?;
        self.save_reminders(&migrated)?;
        info!(migrated = report.migrated, "persisted migrated reminders");
        Ok((migrated, report))
    }

    #[tracing::instrument(skip(self, records))]
    pub fn push_undo_snapshot(&self, records: &[StoredReminder]) -> anyhow::Result<()> {
        let mut entries: Vec<UndoEntry> =
            load_jsonl(&self.undo_path).context("failed to load undo.data")?;
        entries.push(UndoEntry {
            reminders: records.to_vec(),
        });
        save_jsonl_atomic(&self.undo_path, &entries).context("failed to save undo.data")
    }

    #[tracing::instrument(skip(self))]
    pub fn pop_undo_snapshot(&self) -> anyhow::Result<Option<Vec<StoredReminder>>> {
        let mut entries: Vec<UndoEntry> =
            load_jsonl(&self.undo_path).context("failed to load undo.data")?;
        let Some(entry) = entries.pop() else {
            return Ok(None);
        };
        save_jsonl_atomic(&self.undo_path, &entries).context("failed to save undo.data")?;
        Ok(Some(entry.reminders))
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let row: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(row);
    }

    debug!(count = out.len(), "loaded rows from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, rows))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = rows.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for row in rows {
        let serialized = serde_json::to_string(row)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
