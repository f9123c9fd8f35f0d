use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::reminder::{Reminder, StoredReminder};

/// Counts from a single migration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub total: usize,
    pub migrated: usize,
    pub unchanged: usize,
    /// Legacy records that also carried a work context; `projectId` won.
    pub overridden_work_context: usize,
    /// Records left without a work context after the pass.
    pub missing_work_context: usize,
}

impl MigrationReport {
    pub fn changed(&self) -> bool {
        self.migrated > 0
    }

    fn record(&mut self, stored: &StoredReminder) {
        self.total += 1;
        match stored {
            StoredReminder::Legacy(legacy) => {
                self.migrated += 1;
                if legacy.has_stale_work_context() {
                    self.overridden_work_context += 1;
                }
            }
            StoredReminder::Current(current) => {
                self.unchanged += 1;
                if !current.has_work_context() {
                    self.missing_work_context += 1;
                }
            }
        }
    }
}

/// Upgrades every legacy record to the current shape.
///
/// Output keeps the input's length and order. Current records are moved
/// through untouched.
pub fn migrate_reminders(records: Vec<StoredReminder>) -> Vec<Reminder> {
    records.into_iter().map(StoredReminder::into_current).collect()
}

/// Same rule over an id-keyed collection.
pub fn migrate_keyed(records: BTreeMap<String, StoredReminder>) -> BTreeMap<String, Reminder> {
    records
        .into_iter()
        .map(|(key, stored)| (key, stored.into_current()))
        .collect()
}

#[tracing::instrument(skip_all, fields(count = records.len()))]
pub fn migrate_with_report(records: Vec<StoredReminder>) -> (Vec<Reminder>, MigrationReport) {
    let mut report = MigrationReport::default();
    let mut out = Vec::with_capacity(records.len());

    for stored in records {
        report.record(&stored);
        if let StoredReminder::Legacy(legacy) = &stored {
            debug!(id = %legacy.id, project = %legacy.project_id, "migrating legacy reminder");
            if legacy.has_stale_work_context() {
                warn!(
                    id = %legacy.id,
                    "legacy reminder also had a work context; projectId takes precedence"
                );
            }
        }
        out.push(stored.into_current());
    }

    if report.missing_work_context > 0 {
        warn!(
            count = report.missing_work_context,
            "reminders without a work context passed through unchanged"
        );
    }
    info!(
        total = report.total,
        migrated = report.migrated,
        unchanged = report.unchanged,
        "reminder migration pass finished"
    );

    (out, report)
}
