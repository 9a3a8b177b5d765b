//! Write-back for the packaged document format.
//!
//! The document part is never re-serialized: annotations are spliced into
//! the original `word/document.xml` bytes at offsets recorded by the same
//! scan the extractor runs, so every pre-existing byte of markup (revision
//! ids, comments, formatting) survives untouched. The new container is
//! assembled in a temp file and only persisted on full success.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;

use quick_xml::escape::escape;
use regex::Regex;
use std::sync::OnceLock;
use zip::write::FileOptions;

use crate::models::{Anchor, Redline};
use crate::pipeline::extraction::docx::{scan_document, DocumentScan, DocxBackend, DOCUMENT_PART};
use crate::pipeline::extraction::{AnnotationMode, AnnotationOutcome, AnnotationPlan, ExtractionError};

use super::{AnnotationError, AnnotationSkip};

const COMMENTS_PART: &str = "word/comments.xml";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const DOCUMENT_RELS_PART: &str = "word/_rels/document.xml.rels";

const COMMENTS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.comments+xml";
const COMMENTS_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

fn part_error(e: ExtractionError) -> AnnotationError {
    match e {
        ExtractionError::Container(m) => AnnotationError::Container(m),
        ExtractionError::MissingPart(m) => AnnotationError::MissingPart(m),
        ExtractionError::Xml(m) => AnnotationError::Xml(m),
        ExtractionError::Io(e) => AnnotationError::Io(e),
        ExtractionError::Api(e) => AnnotationError::Api(e),
    }
}

/// Apply a verdict batch to a packaged document.
///
/// Atomic from the caller's perspective: the output file appears only once
/// every annotation is in place; on any error the original input and the
/// output path are untouched.
pub(crate) fn annotate_docx(
    input: &Path,
    output: &Path,
    plan: &AnnotationPlan<'_>,
) -> Result<AnnotationOutcome, AnnotationError> {
    let document_xml =
        DocxBackend::read_part(input, DOCUMENT_PART).map_err(part_error)?;
    let scan = scan_document(&document_xml).map_err(part_error)?;

    // (paragraph, seq) -> unit index, for anchor resolution.
    let unit_index: HashMap<(usize, usize), usize> = scan
        .units
        .iter()
        .enumerate()
        .map(|(i, u)| ((u.paragraph, u.seq), i))
        .collect();

    let existing_comments = DocxBackend::read_part(input, COMMENTS_PART).ok();
    let mut next_comment_id = existing_comments
        .as_deref()
        .map(max_numeric_attr(r#"w:id="(\d+)""#))
        .unwrap_or(0);
    let mut next_revision_id = scan.max_revision_id + 1;

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let author = escape(&plan.config.reviewer_author).into_owned();

    let mut splices: Vec<(usize, String)> = Vec::new();
    let mut new_comments = String::new();
    let mut skipped = Vec::new();
    let mut applied = 0usize;

    let redline_by_id: HashMap<u32, &Redline> =
        plan.redlines.iter().map(|r| (r.id, r)).collect();

    for verdict in plan.verdicts {
        let span = match resolve_span(verdict.redline_id, &redline_by_id, &scan, &unit_index) {
            Ok(span) => span,
            Err(detail) => {
                if plan.config.strict {
                    return Err(AnnotationError::InvalidAnchor {
                        redline_id: verdict.redline_id,
                        detail,
                    });
                }
                tracing::warn!(
                    redline_id = verdict.redline_id,
                    reason = %detail,
                    "Skipping annotation with invalid anchor"
                );
                skipped.push(AnnotationSkip {
                    redline_id: verdict.redline_id,
                    reason: detail,
                });
                continue;
            }
        };

        let as_counter =
            plan.mode == AnnotationMode::CounterRedline && verdict.counter_text.is_some();
        if as_counter {
            let counter = verdict.counter_text.as_deref().expect("checked above");
            splices.push((
                span.1,
                format!(
                    r#"<w:ins w:id="{id}" w:author="{author}" w:date="{timestamp}"><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:ins>"#,
                    id = next_revision_id,
                    text = escape(counter),
                ),
            ));
            next_revision_id += 1;
        } else {
            let id = next_comment_id;
            next_comment_id += 1;
            splices.push((span.0, format!(r#"<w:commentRangeStart w:id="{id}"/>"#)));
            splices.push((
                span.1,
                format!(
                    r#"<w:commentRangeEnd w:id="{id}"/><w:r><w:rPr><w:rStyle w:val="CommentReference"/></w:rPr><w:commentReference w:id="{id}"/></w:r>"#
                ),
            ));
            new_comments.push_str(&comment_xml(id, &author, &timestamp, &verdict.comment_body()));
        }
        applied += 1;
    }

    let new_document = splice(&document_xml, splices);

    // Assemble the remaining parts.
    let mut replaced: HashMap<String, Vec<u8>> = HashMap::new();
    replaced.insert(DOCUMENT_PART.to_string(), new_document);

    if !new_comments.is_empty() {
        match &existing_comments {
            Some(existing) => {
                let merged = insert_before_close(existing, "</w:comments>", &new_comments)
                    .ok_or_else(|| {
                        AnnotationError::Xml("comments part has no closing element".into())
                    })?;
                replaced.insert(COMMENTS_PART.to_string(), merged);
            }
            None => {
                let fresh = format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:comments xmlns:w="{W_NS}">{new_comments}</w:comments>"#
                );
                replaced.insert(COMMENTS_PART.to_string(), fresh.into_bytes());
                register_comments_part(input, &mut replaced)?;
            }
        }
    }

    write_container(input, output, replaced)?;

    tracing::info!(
        output = %output.display(),
        applied,
        skipped = skipped.len(),
        "Annotated packaged document written"
    );
    Ok(AnnotationOutcome { applied, skipped })
}

/// Resolve a verdict's anchor to the byte span of its change markers.
fn resolve_span(
    redline_id: u32,
    redline_by_id: &HashMap<u32, &Redline>,
    scan: &DocumentScan,
    unit_index: &HashMap<(usize, usize), usize>,
) -> Result<(usize, usize), String> {
    let redline = redline_by_id
        .get(&redline_id)
        .ok_or_else(|| format!("no extracted redline with id {redline_id}"))?;
    let (paragraph, change, span) = match &redline.anchor {
        Anchor::Packaged {
            paragraph,
            change,
            span,
        } => (*paragraph, *change, *span),
        Anchor::Hosted { .. } => {
            return Err("anchor does not belong to this document format".into())
        }
    };
    if span == 0 {
        return Err("anchor covers no change markers".into());
    }
    let first = *unit_index
        .get(&(paragraph, change))
        .ok_or_else(|| format!("no change marker at paragraph {paragraph}, index {change}"))?;
    let last = *unit_index
        .get(&(paragraph, change + span - 1))
        .ok_or_else(|| format!("change span truncated at paragraph {paragraph}"))?;
    Ok((scan.units[first].start, scan.units[last].end))
}

/// One comment entry, one paragraph per body line.
fn comment_xml(id: u32, author: &str, timestamp: &str, body: &str) -> String {
    let mut paragraphs = String::new();
    for line in body.lines() {
        paragraphs.push_str(&format!(
            r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
            escape(line)
        ));
    }
    if paragraphs.is_empty() {
        paragraphs.push_str("<w:p/>");
    }
    format!(
        r#"<w:comment w:id="{id}" w:author="{author}" w:date="{timestamp}" w:initials="RL">{paragraphs}</w:comment>"#
    )
}

/// Apply insertions to the original bytes, lowest offset first. Insertions
/// at equal offsets keep plan order.
fn splice(original: &[u8], mut insertions: Vec<(usize, String)>) -> Vec<u8> {
    insertions.sort_by_key(|(offset, _)| *offset);
    let mut out = Vec::with_capacity(original.len() + insertions.len() * 64);
    let mut cursor = 0usize;
    for (offset, text) in insertions {
        out.extend_from_slice(&original[cursor..offset]);
        out.extend_from_slice(text.as_bytes());
        cursor = offset;
    }
    out.extend_from_slice(&original[cursor..]);
    out
}

fn max_numeric_attr(pattern: &str) -> impl Fn(&[u8]) -> u32 + '_ {
    move |bytes: &[u8]| {
        let re = Regex::new(pattern).expect("valid regex");
        let text = String::from_utf8_lossy(bytes);
        re.captures_iter(&text)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .map(|id| id + 1)
            .max()
            .unwrap_or(0)
    }
}

fn insert_before_close(original: &[u8], close_tag: &str, addition: &str) -> Option<Vec<u8>> {
    let text = String::from_utf8_lossy(original);
    let at = text.rfind(close_tag)?;
    let mut out = Vec::with_capacity(original.len() + addition.len());
    out.extend_from_slice(text[..at].as_bytes());
    out.extend_from_slice(addition.as_bytes());
    out.extend_from_slice(text[at..].as_bytes());
    Some(out)
}

/// First-time comments part: register its content type and relationship.
fn register_comments_part(
    input: &Path,
    replaced: &mut HashMap<String, Vec<u8>>,
) -> Result<(), AnnotationError> {
    let content_types =
        DocxBackend::read_part(input, CONTENT_TYPES_PART).map_err(part_error)?;
    let ct_text = String::from_utf8_lossy(&content_types);
    if !ct_text.contains(COMMENTS_CONTENT_TYPE) {
        let override_entry = format!(
            r#"<Override PartName="/word/comments.xml" ContentType="{COMMENTS_CONTENT_TYPE}"/>"#
        );
        let updated = insert_before_close(&content_types, "</Types>", &override_entry)
            .ok_or_else(|| AnnotationError::Xml("content types part has no closing element".into()))?;
        replaced.insert(CONTENT_TYPES_PART.to_string(), updated);
    }

    let rels = DocxBackend::read_part(input, DOCUMENT_RELS_PART).map_err(part_error)?;
    let rels_text = String::from_utf8_lossy(&rels);
    if !rels_text.contains(COMMENTS_REL_TYPE) {
        static REL_ID_RE: OnceLock<Regex> = OnceLock::new();
        let re = REL_ID_RE.get_or_init(|| Regex::new(r#"Id="rId(\d+)""#).expect("valid regex"));
        let next_rel = re
            .captures_iter(&rels_text)
            .filter_map(|c| c[1].parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let rel_entry = format!(
            r#"<Relationship Id="rId{next_rel}" Type="{COMMENTS_REL_TYPE}" Target="comments.xml"/>"#
        );
        let updated = insert_before_close(&rels, "</Relationships>", &rel_entry)
            .ok_or_else(|| AnnotationError::Xml("relationships part has no closing element".into()))?;
        replaced.insert(DOCUMENT_RELS_PART.to_string(), updated);
    }
    Ok(())
}

/// Rebuild the container: untouched entries copied raw, replaced and new
/// parts written fresh. The result lands at `output` only on full success.
fn write_container(
    input: &Path,
    output: &Path,
    mut replaced: HashMap<String, Vec<u8>>,
) -> Result<(), AnnotationError> {
    let file = std::fs::File::open(input)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| AnnotationError::Container(e.to_string()))?;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options: FileOptions =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for i in 0..archive.len() {
            let name = archive
                .by_index_raw(i)
                .map_err(|e| AnnotationError::Container(e.to_string()))?
                .name()
                .to_string();
            if let Some(content) = replaced.remove(&name) {
                writer
                    .start_file(&name, options)
                    .map_err(|e| AnnotationError::Container(e.to_string()))?;
                writer.write_all(&content)?;
            } else {
                let entry = archive
                    .by_index_raw(i)
                    .map_err(|e| AnnotationError::Container(e.to_string()))?;
                writer
                    .raw_copy_file(entry)
                    .map_err(|e| AnnotationError::Container(e.to_string()))?;
            }
        }

        // Parts that did not exist in the input (first comments.xml).
        let mut fresh: Vec<_> = replaced.into_iter().collect();
        fresh.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, content) in fresh {
            writer
                .start_file(&name, options)
                .map_err(|e| AnnotationError::Container(e.to_string()))?;
            writer.write_all(&content)?;
        }
        writer
            .finish()
            .map_err(|e| AnnotationError::Container(e.to_string()))?;
    }

    let parent = output.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(cursor.get_ref())?;
    tmp.persist(output).map_err(|e| AnnotationError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnnotationConfig;
    use crate::models::{RiskLevel, Verdict};
    use crate::pipeline::extraction::docx::fixtures::{
        document_xml, replacement_paragraph, write_docx,
    };
    use crate::pipeline::extraction::DocumentBackend;

    fn verdict(redline_id: u32, counter: Option<&str>) -> Verdict {
        Verdict {
            redline_id,
            risk: RiskLevel::High,
            matched_rule: Some(0),
            assessment: "Softens a mandatory obligation.".into(),
            recommended_action: "Reject & restore \"shall\".".into(),
            counter_text: counter.map(String::from),
        }
    }

    fn setup(body: &str) -> (tempfile::TempDir, DocxBackend) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        let output = dir.path().join("out.docx");
        write_docx(&input, &document_xml(body));
        (dir, DocxBackend::new(input, output))
    }

    fn plan<'a>(
        redlines: &'a [Redline],
        verdicts: &'a [Verdict],
        mode: AnnotationMode,
        config: &'a AnnotationConfig,
    ) -> AnnotationPlan<'a> {
        AnnotationPlan {
            redlines,
            verdicts,
            mode,
            config,
        }
    }

    #[test]
    fn comment_mode_adds_comment_around_anchor() {
        let (_dir, backend) = setup(replacement_paragraph());
        let redlines = backend.extract().unwrap();
        let verdicts = vec![verdict(0, None)];
        let config = AnnotationConfig::default();

        let outcome = backend
            .annotate(&plan(&redlines, &verdicts, AnnotationMode::Comment, &config))
            .unwrap();
        assert_eq!(outcome.applied, 1);
        assert!(outcome.skipped.is_empty());

        let doc = DocxBackend::read_part(backend.output(), DOCUMENT_PART).unwrap();
        let doc = String::from_utf8(doc).unwrap();
        assert!(doc.contains(r#"<w:commentRangeStart w:id="0"/>"#));
        assert!(doc.contains(r#"<w:commentRangeEnd w:id="0"/>"#));
        assert!(doc.contains(r#"<w:commentReference w:id="0"/>"#));
        // The range wraps the original markers without touching them.
        assert!(doc.contains(r#"<w:del w:id="11""#));
        assert!(doc.contains(r#"<w:ins w:id="12""#));

        let comments = DocxBackend::read_part(backend.output(), COMMENTS_PART).unwrap();
        let comments = String::from_utf8(comments).unwrap();
        assert!(comments.contains("[high risk] Softens a mandatory obligation."));
        assert!(comments.contains("Reject &amp; restore"));
    }

    #[test]
    fn new_comments_part_is_registered() {
        let (_dir, backend) = setup(replacement_paragraph());
        let redlines = backend.extract().unwrap();
        let verdicts = vec![verdict(0, None)];
        let config = AnnotationConfig::default();
        backend
            .annotate(&plan(&redlines, &verdicts, AnnotationMode::Comment, &config))
            .unwrap();

        let ct = DocxBackend::read_part(backend.output(), CONTENT_TYPES_PART).unwrap();
        assert!(String::from_utf8_lossy(&ct).contains(COMMENTS_CONTENT_TYPE));
        let rels = DocxBackend::read_part(backend.output(), DOCUMENT_RELS_PART).unwrap();
        let rels = String::from_utf8_lossy(&rels);
        assert!(rels.contains(COMMENTS_REL_TYPE));
        assert!(rels.contains(r#"Id="rId2""#));
    }

    #[test]
    fn counter_mode_inserts_tracked_change_after_anchor() {
        let (_dir, backend) = setup(replacement_paragraph());
        let redlines = backend.extract().unwrap();
        let verdicts = vec![verdict(0, Some("shall use reasonable efforts to"))];
        let config = AnnotationConfig {
            reviewer_author: "Reviewer".into(),
            strict: false,
        };
        let outcome = backend
            .annotate(&plan(
                &redlines,
                &verdicts,
                AnnotationMode::CounterRedline,
                &config,
            ))
            .unwrap();
        assert_eq!(outcome.applied, 1);

        let doc = DocxBackend::read_part(backend.output(), DOCUMENT_PART).unwrap();
        let doc = String::from_utf8(doc).unwrap();
        // Counter-redline allocated above the document's max revision id
        // (12 in the fixture), attributed to the reviewing author.
        assert!(doc.contains(r#"<w:ins w:id="13" w:author="Reviewer""#));
        assert!(doc.contains("shall use reasonable efforts to"));
        // Original change untouched: same ids, same author, no accept/reject.
        assert!(doc.contains(r#"<w:del w:id="11" w:author="Counterparty""#));
        assert!(doc.contains(r#"<w:ins w:id="12" w:author="Counterparty""#));
    }

    #[test]
    fn counter_mode_without_counter_text_falls_back_to_comment() {
        let (_dir, backend) = setup(replacement_paragraph());
        let redlines = backend.extract().unwrap();
        let verdicts = vec![verdict(0, None)];
        let config = AnnotationConfig::default();
        let outcome = backend
            .annotate(&plan(
                &redlines,
                &verdicts,
                AnnotationMode::CounterRedline,
                &config,
            ))
            .unwrap();
        assert_eq!(outcome.applied, 1);

        let doc = DocxBackend::read_part(backend.output(), DOCUMENT_PART).unwrap();
        let doc = String::from_utf8(doc).unwrap();
        assert!(doc.contains("commentReference"));
    }

    #[test]
    fn invalid_anchor_is_recorded_skip_not_abort() {
        let (_dir, backend) = setup(replacement_paragraph());
        let mut redlines = backend.extract().unwrap();
        // A second redline whose anchor went stale (document mutated by
        // another actor between extraction and annotation).
        let mut stale = redlines[0].clone();
        stale.id = 1;
        stale.anchor = Anchor::Packaged {
            paragraph: 99,
            change: 0,
            span: 1,
        };
        redlines.push(stale);

        let verdicts = vec![verdict(0, None), verdict(1, None)];
        let config = AnnotationConfig::default();
        let outcome = backend
            .annotate(&plan(&redlines, &verdicts, AnnotationMode::Comment, &config))
            .unwrap();
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].redline_id, 1);
    }

    #[test]
    fn strict_mode_aborts_on_invalid_anchor_leaving_no_output() {
        let (_dir, backend) = setup(replacement_paragraph());
        let mut redlines = backend.extract().unwrap();
        redlines[0].anchor = Anchor::Packaged {
            paragraph: 99,
            change: 0,
            span: 1,
        };
        let verdicts = vec![verdict(0, None)];
        let config = AnnotationConfig {
            strict: true,
            ..AnnotationConfig::default()
        };
        let err = backend
            .annotate(&plan(&redlines, &verdicts, AnnotationMode::Comment, &config))
            .unwrap_err();
        assert!(matches!(
            err,
            AnnotationError::InvalidAnchor { redline_id: 0, .. }
        ));
        assert!(!backend.output().exists());
    }

    #[test]
    fn annotation_does_not_change_extracted_redlines() {
        let (_dir, backend) = setup(replacement_paragraph());
        let before = backend.extract().unwrap();
        let verdicts = vec![verdict(0, None)];
        let config = AnnotationConfig::default();
        backend
            .annotate(&plan(&before, &verdicts, AnnotationMode::Comment, &config))
            .unwrap();

        let reread = DocxBackend::new(backend.output(), backend.output().with_extension("x"));
        let after = reread.extract().unwrap();
        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].removed_text, after[0].removed_text);
        assert_eq!(before[0].added_text, after[0].added_text);
        assert_eq!(before[0].kind, after[0].kind);
    }

    #[test]
    fn existing_comments_are_preserved_and_ids_continue() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.docx");
        let output = dir.path().join("out.docx");

        // Container that already carries a comment part with id 4.
        let file = std::fs::File::create(&input).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options: FileOptions = Default::default();
        let existing_comments = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:comments xmlns:w="{W_NS}"><w:comment w:id="4" w:author="Earlier Reviewer" w:initials="ER"><w:p><w:r><w:t>Keep this.</w:t></w:r></w:p></w:comment></w:comments>"#
        );
        for (name, content) in [
            (
                CONTENT_TYPES_PART,
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/comments.xml" ContentType="{COMMENTS_CONTENT_TYPE}"/></Types>"#
                ),
            ),
            (
                DOCUMENT_RELS_PART,
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{COMMENTS_REL_TYPE}" Target="comments.xml"/></Relationships>"#
                ),
            ),
            (COMMENTS_PART, existing_comments),
            (DOCUMENT_PART, document_xml(replacement_paragraph())),
        ] {
            writer.start_file(name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();

        let backend = DocxBackend::new(&input, &output);
        let redlines = backend.extract().unwrap();
        let verdicts = vec![verdict(0, None)];
        let config = AnnotationConfig::default();
        backend
            .annotate(&plan(&redlines, &verdicts, AnnotationMode::Comment, &config))
            .unwrap();

        let comments = DocxBackend::read_part(&output, COMMENTS_PART).unwrap();
        let comments = String::from_utf8(comments).unwrap();
        assert!(comments.contains("Keep this."));
        assert!(comments.contains(r#"<w:comment w:id="5""#));
    }

    #[test]
    fn splice_preserves_surrounding_bytes() {
        let original = b"<a><b/><c/></a>";
        let out = splice(
            original,
            vec![(3, "<x/>".to_string()), (11, "<y/>".to_string())],
        );
        assert_eq!(out, b"<a><x/><b/><c/><y/></a>");
    }

    #[test]
    fn empty_verdicts_still_produce_output_copy() {
        let (_dir, backend) = setup(replacement_paragraph());
        let config = AnnotationConfig::default();
        let outcome = backend
            .annotate(&plan(&[], &[], AnnotationMode::Comment, &config))
            .unwrap();
        assert_eq!(outcome.applied, 0);
        assert!(backend.output().exists());
    }
}
