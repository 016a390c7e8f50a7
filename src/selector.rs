//! Selector classification and field descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_ATTRIBUTE;

const XPATH_PREFIXES: &[&str] = &["//", "/", "./", "(//", "(./"];

/// Query language of a selector.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Css,
    Xpath,
}

impl fmt::Display for SelectorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorKind::Css => write!(formatter, "CSS"),
            SelectorKind::Xpath => write!(formatter, "XPath"),
        }
    }
}

impl FromStr for SelectorKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "css" => Ok(SelectorKind::Css),
            "xpath" => Ok(SelectorKind::Xpath),
            _ => Err(format!("Invalid selector kind: {input}")),
        }
    }
}

/// Decides whether a selector is XPath or CSS.
///
/// A selector is XPath when it starts with `//`, `/`, `./`, `(//` or `(./`,
/// contains an axis separator `::`, or contains both `@` and `/`.
/// Anything else is CSS, valid or not.
pub fn classify(selector: &str) -> SelectorKind {
    let selector = selector.trim();
    let is_xpath = XPATH_PREFIXES
        .iter()
        .any(|prefix| selector.starts_with(prefix))
        || selector.contains("::")
        || (selector.contains('@') && selector.contains('/'));

    if is_xpath {
        SelectorKind::Xpath
    } else {
        SelectorKind::Css
    }
}

/// What a single match should turn into.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionIntent {
    /// Decided per node from the field label and selector text.
    #[default]
    Auto,
    /// Trimmed visible text.
    Text,
    /// Value of the named attribute, empty when absent.
    Attribute(String),
    /// The matched element serialized back to markup.
    #[serde(rename = "html")]
    RawHtml,
}

/// A field the caller wants extracted.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Semantic name, used as the column header.
    pub label: String,
    /// Pinned query language; classified from `selector` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SelectorKind>,
    pub selector: String,
    #[serde(default)]
    pub intent: ExtractionIntent,
}

/// A descriptor with its query language and intent settled.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Query<'a> {
    pub kind: SelectorKind,
    pub selector: &'a str,
    pub intent: ExtractionIntent,
}

impl FieldDescriptor {
    pub fn new(label: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: None,
            selector: selector.into(),
            intent: ExtractionIntent::Auto,
        }
    }

    pub fn with_kind(mut self, kind: SelectorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_intent(mut self, intent: ExtractionIntent) -> Self {
        self.intent = intent;
        self
    }

    /// Settles the query language and, for CSS selectors written as
    /// `selector@attribute`, splits off the attribute into the intent.
    pub fn query(&self) -> Query<'_> {
        let selector = self.selector.trim();
        let kind = self.kind.unwrap_or_else(|| classify(selector));

        if kind == SelectorKind::Css
            && let Some((css, attribute)) = split_attribute_suffix(selector)
        {
            let intent = match &self.intent {
                ExtractionIntent::Auto | ExtractionIntent::Attribute(_) => {
                    ExtractionIntent::Attribute(attribute.to_owned())
                }
                other => other.clone(),
            };
            return Query {
                kind,
                selector: css,
                intent,
            };
        }

        Query {
            kind,
            selector,
            intent: self.intent.clone(),
        }
    }
}

/// Parses `LABEL=SELECTOR`. A bare selector is labelled with itself.
impl FromStr for FieldDescriptor {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let input = input.trim();
        if input.is_empty() {
            return Err("Empty field definition".to_owned());
        }

        match input.split_once('=') {
            Some((label, selector))
                if !label.trim().is_empty() && !label.contains(['[', '(', '/', '@']) =>
            {
                Ok(FieldDescriptor::new(label.trim(), selector.trim()))
            }
            _ => Ok(FieldDescriptor::new(input, input)),
        }
    }
}

/// Builds the intent named by an LLM proposal (`text`, `attribute`, `html`).
///
/// `attribute` without an explicit name falls back to `href`.
pub fn intent_from_name(name: Option<&str>, selector: &str) -> ExtractionIntent {
    match name.map(|name| name.trim().to_lowercase()).as_deref() {
        Some("html") => ExtractionIntent::RawHtml,
        Some("attribute") => match split_attribute_suffix(selector) {
            Some((_, attribute)) => ExtractionIntent::Attribute(attribute.to_owned()),
            None => ExtractionIntent::Attribute(DEFAULT_ATTRIBUTE.to_owned()),
        },
        _ => ExtractionIntent::Auto,
    }
}

fn split_attribute_suffix(selector: &str) -> Option<(&str, &str)> {
    let (css, attribute) = selector.rsplit_once('@')?;
    let css = css.trim_end();
    let valid_name = attribute
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && attribute
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'));

    (valid_name && !css.is_empty()).then_some((css, attribute))
}
