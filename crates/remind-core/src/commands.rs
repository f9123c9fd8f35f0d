use std::collections::HashMap;
use std::io::{self, Read};

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument};

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::migrate::{MigrationReport, migrate_with_report};
use crate::reminder::{Reminder, StoredReminder};
use crate::render::Renderer;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "list",
        "migrate",
        "export",
        "import",
        "undo",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &str, known: &[&'a str]) -> Option<&'a str> {
    if let Some(exact) = known.iter().copied().find(|name| *name == token) {
        return Some(exact);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    debug!(command, args = ?inv.command_args, "dispatching command");

    match command {
        "list" => cmd_list(store, cfg, renderer),
        "migrate" => cmd_migrate(store, renderer, &inv.command_args),
        "export" => cmd_export(store, cfg),
        "import" => cmd_import(store),
        "undo" => cmd_undo(store),
        "_commands" => cmd_commands(),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// Loads the store in the current shape. With `migrate.on_load` set the
/// migrated form is written back; otherwise it only lives in memory.
#[instrument(skip(store, cfg))]
pub fn load_current(store: &DataStore, cfg: &Config) -> anyhow::Result<Vec<Reminder>> {
    if cfg.persist_on_load()? {
        let (reminders, _) = store.migrate_in_place()?;
        return Ok(reminders);
    }

    let (reminders, report) = store.load_reminders()?;
    if report.changed() {
        debug!(
            migrated = report.migrated,
            "legacy reminders migrated in memory only"
        );
    }
    Ok(reminders)
}

#[instrument(skip(store, cfg, renderer))]
fn cmd_list(store: &DataStore, cfg: &Config, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command list");
    let reminders = load_current(store, cfg)?;
    if reminders.is_empty() {
        println!("No reminders.");
        return Ok(());
    }
    renderer.print_reminder_table(&reminders)
}

#[instrument(skip(store, renderer, args))]
fn cmd_migrate(store: &DataStore, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command migrate");

    let dry_run = parse_migrate_args(args)?;
    let report = run_migrate(store, dry_run)?;
    renderer.print_report(&report, dry_run)
}

/// Migrates the store in place. A dry run only reports what would change
/// and leaves both data files alone.
#[instrument(skip(store))]
pub fn run_migrate(store: &DataStore, dry_run: bool) -> anyhow::Result<MigrationReport> {
    if dry_run {
        let (_, report) = store.load_reminders()?;
        return Ok(report);
    }
    let (_, report) = store.migrate_in_place()?;
    Ok(report)
}

fn parse_migrate_args(args: &[String]) -> anyhow::Result<bool> {
    let mut dry_run = false;
    for arg in args {
        match arg.as_str() {
            "dry-run" | "--dry-run" | "-n" => dry_run = true,
            other => return Err(anyhow!("migrate: unexpected argument: {other}")),
        }
    }
    Ok(dry_run)
}

#[instrument(skip(store, cfg))]
fn cmd_export(store: &DataStore, cfg: &Config) -> anyhow::Result<()> {
    info!("command export");
    let reminders = load_current(store, cfg)?;
    let out = serde_json::to_string(&reminders)?;
    println!("{out}");
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub modified: usize,
    pub migrated: usize,
    /// Incoming rows dropped because a later row had the same id.
    pub duplicates: usize,
}

#[instrument(skip(store))]
fn cmd_import(store: &DataStore) -> anyhow::Result<()> {
    info!("command import");

    let mut stdin = String::new();
    io::stdin()
        .read_to_string(&mut stdin)
        .context("failed reading stdin")?;

    let summary = import_reminders(store, &stdin)?;
    println!(
        "Imported {} reminder(s): {} added, {} modified, {} migrated from legacy shape.",
        summary.added + summary.modified,
        summary.added,
        summary.modified,
        summary.migrated
    );
    if summary.duplicates > 0 {
        println!(
            "Skipped {} duplicate row(s); the last row for each id was kept.",
            summary.duplicates
        );
    }
    Ok(())
}

/// Merges `input` (a JSON array or JSONL) into the store, upserting by id.
/// Incoming legacy records are migrated before they land. When the input
/// repeats an id, the last row wins.
#[instrument(skip(store, input))]
pub fn import_reminders(store: &DataStore, input: &str) -> anyhow::Result<ImportSummary> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("import: empty input"));
    }

    let before = store.load_raw()?;
    let (mut current, _) = migrate_with_report(before.clone());

    let (incoming, duplicates) = dedupe_by_id(parse_import_items(trimmed)?);
    let (incoming, report) = migrate_with_report(incoming);

    let mut summary = ImportSummary {
        migrated: report.migrated,
        duplicates,
        ..ImportSummary::default()
    };

    for reminder in incoming {
        if let Some(slot) = current.iter_mut().find(|r| r.id == reminder.id) {
            debug!(id = %reminder.id, "replacing existing reminder");
            *slot = reminder;
            summary.modified += 1;
        } else {
            debug!(id = %reminder.id, "adding reminder");
            current.push(reminder);
            summary.added += 1;
        }
    }

    store.push_undo_snapshot(&before)?;
    store.save_reminders(&current)?;
    info!(
        added = summary.added,
        modified = summary.modified,
        migrated = summary.migrated,
        duplicates = summary.duplicates,
        "import finished"
    );
    Ok(summary)
}

/// Keeps the last row for each id, at the position of its first occurrence.
fn dedupe_by_id(items: Vec<StoredReminder>) -> (Vec<StoredReminder>, usize) {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<StoredReminder> = Vec::with_capacity(items.len());
    let mut duplicates = 0;

    for item in items {
        if let Some(&idx) = positions.get(item.id()) {
            debug!(id = %item.id(), "duplicate id in import, keeping the later row");
            kept[idx] = item;
            duplicates += 1;
        } else {
            positions.insert(item.id().to_string(), kept.len());
            kept.push(item);
        }
    }

    (kept, duplicates)
}

fn parse_import_items(input: &str) -> anyhow::Result<Vec<StoredReminder>> {
    if input.starts_with('[') {
        return serde_json::from_str(input).context("import: invalid JSON array");
    }

    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line.trim())
                .with_context(|| format!("import: invalid JSON on line {}", idx + 1))
        })
        .collect()
}

#[instrument(skip(store))]
fn cmd_undo(store: &DataStore) -> anyhow::Result<()> {
    info!("command undo");

    if undo(store)? {
        println!("Undo completed.");
    } else {
        println!("No undo transactions available.");
    }
    Ok(())
}

/// Restores the most recent raw snapshot. Returns false when the undo
/// stack is empty.
pub fn undo(store: &DataStore) -> anyhow::Result<bool> {
    let Some(records) = store.pop_undo_snapshot()? else {
        return Ok(false);
    };
    debug!(count = records.len(), "restoring undo snapshot");
    store.save_raw(&records)?;
    Ok(true)
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for (k, v) in cfg.iter() {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!("Commands: list, migrate [dry-run], export, import, undo, _commands, _show, version");
    Ok(())
}
