//! Packaged-document back-end (OOXML container).
//!
//! Tracked changes live in `word/document.xml`: `<w:ins>` wraps inserted
//! runs, `<w:del>` wraps deleted runs (`<w:delText>`), and `<w:rPrChange>`
//! inside a run records a formatting-only revision. One streaming scan
//! produces both the redlines and the byte offsets the annotator later
//! splices at, so anchors stay consistent between the two passes.

use std::io::Read;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::models::Redline;
use crate::pipeline::annotate::{self, AnnotationError};

use super::merge::merge_units;
use super::types::{AnnotationOutcome, AnnotationPlan, DocumentBackend};
use super::ExtractionError;

pub(crate) const DOCUMENT_PART: &str = "word/document.xml";

/// Raw tracked-change marker found by the scan, before run merging.
#[derive(Debug, Clone)]
pub(crate) struct ChangeUnit {
    pub kind: UnitKind,
    pub author: Option<String>,
    pub date: Option<String>,
    /// Concatenated `w:t`/`w:delText` content inside the marker.
    pub text: String,
    pub paragraph: usize,
    /// Marker index within its paragraph, in document order.
    pub seq: usize,
    /// Byte range of the marker in `word/document.xml`.
    pub start: usize,
    pub end: usize,
    /// Visible-text offsets within the paragraph at the marker's
    /// boundaries. Two markers abut when one's end equals the next's start.
    pub visible_start: usize,
    pub visible_end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnitKind {
    Ins,
    Del,
    Formatting,
}

/// Everything one pass over `word/document.xml` yields.
#[derive(Debug, Default)]
pub(crate) struct DocumentScan {
    pub units: Vec<ChangeUnit>,
    /// Visible text per paragraph (insertions included, deletions not).
    pub paragraphs: Vec<String>,
    /// Highest `w:id` seen on any revision marker. Counter-redlines
    /// allocate above this.
    pub max_revision_id: u32,
}

struct OpenChange {
    kind: UnitKind,
    author: Option<String>,
    date: Option<String>,
    text: String,
    start: usize,
    visible_start: usize,
    nesting: u32,
}

#[derive(Clone, Copy, PartialEq)]
enum TextElem {
    Visible,
    Deleted,
}

fn attr_local(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == name {
            if let Ok(value) = attr.unescape_value() {
                return Some(value.into_owned());
            }
        }
    }
    None
}

fn revision_id(e: &BytesStart<'_>) -> Option<u32> {
    attr_local(e, b"id").and_then(|v| v.parse::<u32>().ok())
}

/// Streaming scan of `word/document.xml`.
///
/// Depth-first event order is document order, which makes `seq` reproducible
/// across extraction and annotation runs over the same bytes.
pub(crate) fn scan_document(xml: &[u8]) -> Result<DocumentScan, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut scan = DocumentScan::default();
    let mut seq_in_para = 0usize;
    let mut open_change: Option<OpenChange> = None;
    let mut in_text: Option<TextElem> = None;
    let mut run_start: Option<usize> = None;
    let mut run_visible_start = 0usize;
    let mut run_format: Option<(Option<String>, Option<String>)> = None;

    loop {
        let pos_before = reader.buffer_position();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ExtractionError::Xml(e.to_string()))?;
        let pos_after = reader.buffer_position();

        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => {
                    scan.paragraphs.push(String::new());
                    seq_in_para = 0;
                }
                b"ins" | b"del" => {
                    if let Some(id) = revision_id(&e) {
                        scan.max_revision_id = scan.max_revision_id.max(id);
                    }
                    match open_change.as_mut() {
                        Some(open) => open.nesting += 1,
                        None => {
                            if let Some(para) = scan.paragraphs.last() {
                                open_change = Some(OpenChange {
                                    kind: if e.local_name().as_ref() == b"ins" {
                                        UnitKind::Ins
                                    } else {
                                        UnitKind::Del
                                    },
                                    author: attr_local(&e, b"author"),
                                    date: attr_local(&e, b"date"),
                                    text: String::new(),
                                    start: pos_before,
                                    visible_start: para.len(),
                                    nesting: 0,
                                });
                            }
                        }
                    }
                }
                b"r" => {
                    if open_change.is_none() {
                        run_start = Some(pos_before);
                        run_format = None;
                        run_visible_start =
                            scan.paragraphs.last().map(String::len).unwrap_or(0);
                    }
                }
                b"rPrChange" => {
                    if let Some(id) = revision_id(&e) {
                        scan.max_revision_id = scan.max_revision_id.max(id);
                    }
                    if open_change.is_none() && run_start.is_some() {
                        run_format =
                            Some((attr_local(&e, b"author"), attr_local(&e, b"date")));
                    }
                }
                b"t" => in_text = Some(TextElem::Visible),
                b"delText" => in_text = Some(TextElem::Deleted),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"ins" | b"del" => {
                    if let Some(id) = revision_id(&e) {
                        scan.max_revision_id = scan.max_revision_id.max(id);
                    }
                    // Self-closing marker: an empty change, recorded so the
                    // annotator's seq numbering still lines up.
                    if open_change.is_none() {
                        if let Some(para) = scan.paragraphs.last() {
                            let visible = para.len();
                            scan.units.push(ChangeUnit {
                                kind: if e.local_name().as_ref() == b"ins" {
                                    UnitKind::Ins
                                } else {
                                    UnitKind::Del
                                },
                                author: attr_local(&e, b"author"),
                                date: attr_local(&e, b"date"),
                                text: String::new(),
                                paragraph: scan.paragraphs.len() - 1,
                                seq: seq_in_para,
                                start: pos_before,
                                end: pos_after,
                                visible_start: visible,
                                visible_end: visible,
                            });
                            seq_in_para += 1;
                        }
                    }
                }
                b"rPrChange" => {
                    if let Some(id) = revision_id(&e) {
                        scan.max_revision_id = scan.max_revision_id.max(id);
                    }
                    if open_change.is_none() && run_start.is_some() {
                        run_format =
                            Some((attr_local(&e, b"author"), attr_local(&e, b"date")));
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"p" => {
                    run_start = None;
                    run_format = None;
                }
                b"ins" | b"del" => {
                    let close = match open_change.as_mut() {
                        Some(open) if open.nesting > 0 => {
                            open.nesting -= 1;
                            false
                        }
                        Some(_) => true,
                        None => false,
                    };
                    if close {
                        let open = open_change.take().expect("change marker open");
                        let paragraph = scan.paragraphs.len() - 1;
                        let visible_end = {
                            let para = scan
                                .paragraphs
                                .last_mut()
                                .expect("change marker inside paragraph");
                            if open.kind == UnitKind::Ins {
                                para.push_str(&open.text);
                            }
                            para.len()
                        };
                        scan.units.push(ChangeUnit {
                            kind: open.kind,
                            author: open.author,
                            date: open.date,
                            text: open.text,
                            paragraph,
                            seq: seq_in_para,
                            start: open.start,
                            end: pos_after,
                            visible_start: open.visible_start,
                            visible_end,
                        });
                        seq_in_para += 1;
                    }
                }
                b"r" => {
                    if open_change.is_none() {
                        if let (Some(start), Some((author, date))) =
                            (run_start.take(), run_format.take())
                        {
                            let paragraph = scan.paragraphs.len().saturating_sub(1);
                            let visible_end =
                                scan.paragraphs.last().map(String::len).unwrap_or(0);
                            scan.units.push(ChangeUnit {
                                kind: UnitKind::Formatting,
                                author,
                                date,
                                text: String::new(),
                                paragraph,
                                seq: seq_in_para,
                                start,
                                end: pos_after,
                                visible_start: run_visible_start,
                                visible_end,
                            });
                            seq_in_para += 1;
                        } else {
                            run_start = None;
                        }
                    }
                }
                b"t" | b"delText" => in_text = None,
                _ => {}
            },
            Event::Text(t) => {
                if let Some(elem) = in_text {
                    let text = t
                        .unescape()
                        .map_err(|e| ExtractionError::Xml(e.to_string()))?;
                    match open_change.as_mut() {
                        Some(open) => open.text.push_str(&text),
                        None => {
                            if elem == TextElem::Visible {
                                if let Some(para) = scan.paragraphs.last_mut() {
                                    para.push_str(&text);
                                }
                            }
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(scan)
}

/// Local packaged-document back-end. `input` is read, the annotated copy
/// lands at `output`; the input file is never modified.
pub struct DocxBackend {
    input: PathBuf,
    output: PathBuf,
}

impl DocxBackend {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub(crate) fn read_part(path: &Path, name: &str) -> Result<Vec<u8>, ExtractionError> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| ExtractionError::Container(e.to_string()))?;
        let mut entry = archive
            .by_name(name)
            .map_err(|_| ExtractionError::MissingPart(name.to_string()))?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    pub(crate) fn scan(&self) -> Result<DocumentScan, ExtractionError> {
        let xml = Self::read_part(&self.input, DOCUMENT_PART)?;
        scan_document(&xml)
    }
}

impl DocumentBackend for DocxBackend {
    fn extract(&self) -> Result<Vec<Redline>, ExtractionError> {
        let scan = self.scan()?;
        let redlines = merge_units(&scan);
        tracing::debug!(
            path = %self.input.display(),
            markers = scan.units.len(),
            redlines = redlines.len(),
            "Extracted redlines from packaged document"
        );
        Ok(redlines)
    }

    fn document_text(&self) -> Result<String, ExtractionError> {
        Ok(self.scan()?.paragraphs.join("\n"))
    }

    fn annotate(&self, plan: &AnnotationPlan<'_>) -> Result<AnnotationOutcome, AnnotationError> {
        annotate::docx::annotate_docx(&self.input, &self.output, plan)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Write;
    use std::path::Path;

    use zip::write::FileOptions;

    pub(crate) const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

    pub(crate) const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

    pub(crate) const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

    /// Wrap body XML in a minimal document part.
    pub(crate) fn document_xml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        )
    }

    /// Write a minimal packaged document at `path`.
    pub(crate) fn write_docx(path: &Path, document_xml: &str) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options: FileOptions =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        for (name, content) in [
            ("[Content_Types].xml", CONTENT_TYPES),
            ("_rels/.rels", ROOT_RELS),
            ("word/document.xml", document_xml),
            ("word/_rels/document.xml.rels", DOCUMENT_RELS),
        ] {
            writer.start_file(name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    /// A paragraph where "shall" is replaced by "may" (deletion directly
    /// followed by insertion, same author).
    pub(crate) fn replacement_paragraph() -> &'static str {
        r#"<w:p><w:r><w:t xml:space="preserve">The Supplier </w:t></w:r><w:del w:id="11" w:author="Counterparty" w:date="2026-03-01T10:00:00Z"><w:r><w:delText>shall</w:delText></w:r></w:del><w:ins w:id="12" w:author="Counterparty" w:date="2026-03-01T10:00:00Z"><w:r><w:t>may</w:t></w:r></w:ins><w:r><w:t xml:space="preserve"> deliver the goods.</w:t></w:r></w:p>"#
    }
}
