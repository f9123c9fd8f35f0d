use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_remind_at;
use crate::migrate::MigrationReport;
use crate::reminder::Reminder;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.bool_or("color", true)?;
        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, reminders))]
    pub fn print_reminder_table(&mut self, reminders: &[Reminder]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let (headers, rows) = self.reminder_rows(reminders);
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_report(&mut self, report: &MigrationReport, dry_run: bool) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        write_report(&mut out, report, dry_run)
    }

    fn reminder_rows(&self, reminders: &[Reminder]) -> (Vec<String>, Vec<Vec<String>>) {
        let headers = vec![
            "ID".to_string(),
            "When".to_string(),
            "Context".to_string(),
            "Type".to_string(),
            "Title".to_string(),
        ];

        let rows = reminders
            .iter()
            .map(|reminder| {
                let when = reminder.remind_at().map(format_remind_at).unwrap_or_default();
                let context = match (&reminder.work_context_type, &reminder.work_context_id) {
                    (Some(kind), Some(id)) => format!("{}:{id}", kind.as_str().to_ascii_lowercase()),
                    _ => self.paint("-", "31"),
                };
                let kind = reminder
                    .kind()
                    .map(|kind| format!("{kind:?}").to_ascii_lowercase())
                    .unwrap_or_default();

                vec![
                    self.paint(&reminder.id, "33"),
                    when,
                    context,
                    kind,
                    reminder.title().unwrap_or_default().to_string(),
                ]
            })
            .collect();

        (headers, rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_report<W: Write>(
    mut writer: W,
    report: &MigrationReport,
    dry_run: bool,
) -> anyhow::Result<()> {
    let verb = if dry_run { "Would migrate" } else { "Migrated" };
    writeln!(
        writer,
        "{verb} {} of {} reminder(s); {} already current.",
        report.migrated, report.total, report.unchanged
    )?;
    if report.overridden_work_context > 0 {
        writeln!(
            writer,
            "{} legacy reminder(s) also carried a work context; projectId was used.",
            report.overridden_work_context
        )?;
    }
    if report.missing_work_context > 0 {
        writeln!(
            writer,
            "{} reminder(s) have no work context.",
            report.missing_work_context
        )?;
    }
    Ok(())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ", width = *width)?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_to_widest_cell() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".to_string(), "Title".to_string()],
            vec![vec!["reminder-1".to_string(), "x".to_string()]],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID         Title ");
        assert_eq!(lines[1], "---------- ----- ");
        assert_eq!(lines[2], "reminder-1 x     ");
    }

    #[test]
    fn ansi_codes_do_not_count_toward_width() {
        assert_eq!(strip_ansi("\x1b[33mabc\x1b[0m"), "abc");
    }

    #[test]
    fn report_mentions_overrides() {
        let mut buf = Vec::new();
        let report = MigrationReport {
            total: 3,
            migrated: 2,
            unchanged: 1,
            overridden_work_context: 1,
            missing_work_context: 0,
        };
        write_report(&mut buf, &report, true).expect("write report");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("Would migrate 2 of 3 reminder(s); 1 already current."));
        assert!(text.contains("projectId was used"));
        assert!(!text.contains("no work context"));
    }

    #[test]
    fn color_setting_must_be_boolean() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("color".to_string(), "off".to_string())]);
        assert!(!Renderer::new(&cfg).expect("color off").color);

        cfg.apply_overrides(vec![("color".to_string(), "purple".to_string())]);
        let err = Renderer::new(&cfg).err().expect("invalid color");
        assert!(err.to_string().contains("invalid color setting: purple"));
    }
}
