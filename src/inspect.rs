//! Page structure overview and quick selector probing.

use std::collections::BTreeSet;
use std::fmt;

use scraper::Selector;

use crate::constants::INSPECT_PREVIEW_CHARS;
use crate::document::Document;
use crate::resolve::resolve_field;
use crate::sanitize::truncate_chars;
use crate::selector::{ExtractionIntent, FieldDescriptor, SelectorKind};

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Counts and names found in a page, to help pick selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
    pub total_elements: usize,
    pub tags: Vec<String>,
    pub links: usize,
    pub images: usize,
    pub divs: usize,
    pub paragraphs: usize,
    pub headings: usize,
    pub classes: Vec<String>,
    pub ids: Vec<String>,
    pub preview: String,
}

/// Walks every element of the document once.
pub fn inspect_page(document: &Document) -> PageReport {
    let mut tags = BTreeSet::new();
    let mut classes = BTreeSet::new();
    let mut ids = BTreeSet::new();
    let mut report = PageReport {
        total_elements: 0,
        tags: Vec::new(),
        links: 0,
        images: 0,
        divs: 0,
        paragraphs: 0,
        headings: 0,
        classes: Vec::new(),
        ids: Vec::new(),
        preview: truncate_chars(document.raw(), INSPECT_PREVIEW_CHARS).to_owned(),
    };

    let Ok(everything) = Selector::parse("*") else {
        return report;
    };

    for element in document.html().select(&everything) {
        let value = element.value();
        let name = value.name();
        report.total_elements += 1;
        match name {
            "a" => report.links += 1,
            "img" => report.images += 1,
            "div" => report.divs += 1,
            "p" => report.paragraphs += 1,
            _ if HEADING_TAGS.contains(&name) => report.headings += 1,
            _ => {}
        }
        tags.insert(name.to_owned());
        classes.extend(value.classes().map(str::to_owned));
        if let Some(id) = value.id() {
            ids.insert(id.to_owned());
        }
    }

    report.tags = tags.into_iter().collect();
    report.classes = classes.into_iter().collect();
    report.ids = ids.into_iter().collect();
    report
}

impl fmt::Display for PageReport {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(formatter, "Total elements: {}", self.total_elements)?;
        writeln!(formatter, "Tag types:      {}", self.tags.len())?;
        writeln!(formatter, "Links (a):      {}", self.links)?;
        writeln!(formatter, "Images (img):   {}", self.images)?;
        writeln!(formatter, "Divs:           {}", self.divs)?;
        writeln!(formatter, "Paragraphs (p): {}", self.paragraphs)?;
        writeln!(formatter, "Headings:       {}", self.headings)?;
        writeln!(formatter)?;
        writeln!(formatter, "Tags: {}", self.tags.join(", "))?;
        writeln!(formatter, "Classes: {}", self.classes.join(", "))?;
        writeln!(formatter, "Ids: {}", self.ids.join(", "))?;
        writeln!(formatter)?;
        write!(formatter, "{}", self.preview)
    }
}

/// How one selector fared against a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub selector: String,
    pub kind: SelectorKind,
    pub total: usize,
    /// First value, `No results`, or the error when the selector failed.
    pub first_value: String,
    pub failed: bool,
}

/// Runs each selector on its own and summarizes the matches.
pub fn probe_selectors(
    document: &Document,
    selectors: &[String],
    intent: &ExtractionIntent,
) -> Vec<ProbeResult> {
    selectors
        .iter()
        .map(|selector| selector.trim())
        .filter(|selector| !selector.is_empty())
        .map(|selector| {
            let field = FieldDescriptor::new(selector, selector).with_intent(intent.clone());
            let kind = field.query().kind;
            let outcome = resolve_field(document, &field);

            let (first_value, failed) = match outcome.error {
                Some(err) => (err.marker(), true),
                None => (
                    outcome
                        .values
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "No results".to_owned()),
                    false,
                ),
            };

            ProbeResult {
                selector: selector.to_owned(),
                kind,
                total: outcome.values.len(),
                first_value,
                failed,
            }
        })
        .collect()
}
