use cirun_core::{BatchReport, EntryReport, Outcome, PlannedEntry, SkipReason, Summary};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_report(report: &BatchReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    let rows = report.entries.iter().map(report_row).collect();
    print!(
        "{}",
        render_table(&["#", "ENTRY", "BACKEND", "RUN", "OUTCOME", "DETAIL"], rows)
    );
    println!();
    println!("{}", summary_line(&report.summary));
    if report.halted {
        println!("batch halted; use --continue-on-error to run the remaining entries");
    }
    Ok(())
}

pub fn print_plan(planned: &[PlannedEntry], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&planned);
    }
    let rows = planned
        .iter()
        .map(|p| {
            vec![
                p.index.to_string(),
                p.label.clone(),
                p.backend.as_str().to_string(),
                match p.skip {
                    Some(reason) => format!("skip ({})", skip_text(reason)),
                    None => "trigger".to_string(),
                },
            ]
        })
        .collect();
    print!(
        "{}",
        render_table(&["#", "ENTRY", "BACKEND", "ACTION"], rows)
    );
    Ok(())
}

fn report_row(entry: &EntryReport) -> Vec<String> {
    let run = entry
        .run_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let detail = match &entry.outcome {
        Outcome::Failed { message, .. } => message.clone(),
        Outcome::TimedOut { waited_secs } => format!("gave up after {waited_secs}s"),
        Outcome::Skipped { reason } => skip_text(*reason).to_string(),
        _ => String::new(),
    };
    vec![
        entry.index.to_string(),
        entry.label.clone(),
        entry.backend.as_str().to_string(),
        run,
        entry.outcome.as_str().to_string(),
        detail,
    ]
}

fn skip_text(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Disabled => "disabled",
        SkipReason::MissingCredential => "no token",
    }
}

fn summary_line(s: &Summary) -> String {
    format!(
        "{} entries: {} succeeded, {} dispatched, {} failed, {} timed out, {} skipped, {} not attempted",
        s.total, s.succeeded, s.dispatched, s.failed, s.timed_out, s.skipped, s.not_attempted
    )
}

/// Left-aligned columns separated by two spaces, with a dashed rule under the header.
/// Trailing padding is trimmed from each line.
pub fn render_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let mut out = String::new();
    out.push_str(&format_line(&widths, headers.iter().copied()));
    out.push('\n');
    let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    out.push_str(&rule.join("  "));
    out.push('\n');
    for row in &rows {
        out.push_str(&format_line(&widths, row.iter().map(String::as_str)));
        out.push('\n');
    }
    out
}

fn format_line<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    let padded: Vec<String> = cells
        .enumerate()
        .map(|(i, cell)| {
            let w = widths.get(i).copied().unwrap_or(0);
            format!("{cell:w$}")
        })
        .collect();
    padded.join("  ").trim_end().to_string()
}
