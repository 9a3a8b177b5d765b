//! Run merging: raw change markers → redlines.
//!
//! Word splits a single edit into several runs (spell-check boundaries,
//! formatting seams), so one author action often arrives as a chain of
//! abutting `w:ins` or `w:del` markers. Merging reconstructs the edit:
//! abutting same-author same-kind markers collapse into one redline, and a
//! deletion chain directly abutting an insertion chain becomes a
//! replacement.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::models::{Anchor, Redline, RedlineKind};

use super::docx::{ChangeUnit, DocumentScan, UnitKind};

/// Bound on context captured either side of a change.
const CONTEXT_CHARS: usize = 240;

/// Collapse whitespace runs to single spaces, trimmed. Mirrors how the
/// host editor's run splitting scatters spacing across markers.
pub(crate) fn normalize_ws(text: &str) -> String {
    static WS_RE: OnceLock<Regex> = OnceLock::new();
    let re = WS_RE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    re.replace_all(text.trim(), " ").into_owned()
}

fn parse_date(date: Option<&str>) -> Option<DateTime<Utc>> {
    date.and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn abuts(prev: &ChangeUnit, next: &ChangeUnit) -> bool {
    prev.paragraph == next.paragraph && prev.visible_end == next.visible_start
}

fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}

fn head_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Merge scan markers into ordered redlines with dense ids.
pub(crate) fn merge_units(scan: &DocumentScan) -> Vec<Redline> {
    let units = &scan.units;
    let mut redlines = Vec::new();
    let mut i = 0;

    while i < units.len() {
        let first = &units[i];

        if first.kind == UnitKind::Formatting {
            redlines.push(build_redline(
                scan,
                RedlineKind::Formatting,
                first.author.clone(),
                first.date.as_deref(),
                String::new(),
                String::new(),
                i,
                i + 1,
                first.visible_start,
                first.visible_start,
            ));
            i += 1;
            continue;
        }

        // Absorb the chain of abutting same-kind, same-author markers.
        let mut j = i + 1;
        let mut text = first.text.clone();
        while j < units.len()
            && units[j].kind == first.kind
            && units[j].author == first.author
            && abuts(&units[j - 1], &units[j])
        {
            text.push_str(&units[j].text);
            j += 1;
        }

        // A deletion chain directly abutting an insertion chain is one
        // replacement. Author comes from the deletion unless it is absent.
        if first.kind == UnitKind::Del
            && j < units.len()
            && units[j].kind == UnitKind::Ins
            && abuts(&units[j - 1], &units[j])
        {
            let ins_author = units[j].author.clone();
            let mut ins_text = units[j].text.clone();
            let mut k = j + 1;
            while k < units.len()
                && units[k].kind == UnitKind::Ins
                && units[k].author == ins_author
                && abuts(&units[k - 1], &units[k])
            {
                ins_text.push_str(&units[k].text);
                k += 1;
            }

            let removed = normalize_ws(&text);
            let added = normalize_ws(&ins_text);
            if !removed.is_empty() || !added.is_empty() {
                let author = first.author.clone().or(ins_author);
                let date = first.date.as_deref().or(units[j].date.as_deref());
                redlines.push(build_redline(
                    scan,
                    RedlineKind::Replacement,
                    author,
                    date,
                    removed,
                    added,
                    i,
                    k,
                    first.visible_start,
                    units[k - 1].visible_end,
                ));
            }
            i = k;
            continue;
        }

        let normalized = normalize_ws(&text);
        if !normalized.is_empty() {
            let (kind, removed, added) = match first.kind {
                UnitKind::Ins => (RedlineKind::Insertion, String::new(), normalized),
                UnitKind::Del => (RedlineKind::Deletion, normalized, String::new()),
                UnitKind::Formatting => unreachable!("handled above"),
            };
            redlines.push(build_redline(
                scan,
                kind,
                first.author.clone(),
                first.date.as_deref(),
                removed,
                added,
                i,
                j,
                first.visible_start,
                units[j - 1].visible_end,
            ));
        }
        i = j;
    }

    for (id, redline) in redlines.iter_mut().enumerate() {
        redline.id = id as u32;
    }
    redlines
}

#[allow(clippy::too_many_arguments)]
fn build_redline(
    scan: &DocumentScan,
    kind: RedlineKind,
    author: Option<String>,
    date: Option<&str>,
    removed_text: String,
    added_text: String,
    unit_from: usize,
    unit_to: usize,
    visible_start: usize,
    visible_end: usize,
) -> Redline {
    let first = &scan.units[unit_from];
    let paragraph_text = scan
        .paragraphs
        .get(first.paragraph)
        .map(String::as_str)
        .unwrap_or("");

    Redline {
        id: 0, // densely reassigned by the caller
        kind,
        author: author.filter(|a| !a.is_empty()),
        timestamp: parse_date(date),
        context_before: tail_chars(
            paragraph_text.get(..visible_start).unwrap_or(""),
            CONTEXT_CHARS,
        ),
        context_after: head_chars(
            paragraph_text.get(visible_end..).unwrap_or(""),
            CONTEXT_CHARS,
        ),
        anchor: Anchor::Packaged {
            paragraph: first.paragraph,
            change: first.seq,
            span: unit_to - unit_from,
        },
        removed_text,
        added_text,
    }
}
