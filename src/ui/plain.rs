use unicode_width::UnicodeWidthStr;

use crate::results::{RankedRacer, SortSpec};
use crate::ui::results_table::{header_labels, ResultRowData};

/// Fixed-width text rendering of the results table for non-TTY output.
pub fn render_plain(rows: &[RankedRacer<'_>], sort: &SortSpec) -> String {
    if rows.is_empty() {
        return "No results.\n".to_string();
    }

    let header = header_labels(sort.key, sort.ascending);
    let lines: Vec<Vec<String>> = rows
        .iter()
        .map(|row| ResultRowData::from_ranked(row).cells().to_vec())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.width()).collect();
    for line in &lines {
        for (w, cell) in widths.iter_mut().zip(line) {
            *w = (*w).max(cell.width());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &header, &widths);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_line(&mut out, &rule, &widths);
    for line in &lines {
        push_line(&mut out, line, &widths);
    }
    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| {
            // pad by display width so umlauts and dashes line up
            let fill = w.saturating_sub(cell.width());
            format!("{cell}{}", " ".repeat(fill))
        })
        .collect();
    out.push_str(padded.join("  ").trim_end());
    out.push('\n');
}
