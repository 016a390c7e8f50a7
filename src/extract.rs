//! Turning one matched node into one string value.

use scraper::ElementRef;

use crate::constants::{
    ATTRIBUTE_LABEL_KEYWORDS, ATTRIBUTE_SELECTOR_TOKENS, LINK_ATTRIBUTES, RAW_HTML_LABEL_KEYWORDS,
};
use crate::selector::ExtractionIntent;

/// A single match produced by a selector.
#[derive(Clone)]
pub enum MatchedNode<'a> {
    /// Element matched by a CSS selector or an XPath expression.
    Element(ElementRef<'a>),
    /// Attribute value, text node or scalar produced by an XPath expression.
    Value(String),
}

/// What the caller asked for, used to settle [`ExtractionIntent::Auto`].
#[derive(Debug, Clone, Copy)]
pub struct ExtractionContext<'a> {
    pub label: &'a str,
    pub selector: &'a str,
    pub intent: &'a ExtractionIntent,
}

/// Produces the value of one matched node.
///
/// Plain strings are returned verbatim. Otherwise the intent decides:
/// markup, a named attribute, or trimmed text. With automatic intent a
/// label mentioning images, GIFs, screenshots or "complete" content asks for
/// markup; a selector or label pointing at images and links asks for the
/// node's `src`/`href` when it has one; everything else yields text.
pub fn extract_value(node: &MatchedNode<'_>, context: &ExtractionContext<'_>) -> String {
    if let MatchedNode::Value(value) = node {
        return value.clone();
    }

    match context.intent {
        ExtractionIntent::RawHtml => outer_html(node),
        ExtractionIntent::Text => text_content(node),
        ExtractionIntent::Attribute(name) => attribute(node, name).unwrap_or_default(),
        ExtractionIntent::Auto => {
            if wants_raw_html(context.label) {
                return outer_html(node);
            }
            if wants_link(context.label, context.selector)
                && let Some(link) = LINK_ATTRIBUTES
                    .iter()
                    .find_map(|name| attribute(node, name).filter(|value| !value.is_empty()))
            {
                return link;
            }
            text_content(node)
        }
    }
}

/// Whether a field label asks for raw markup.
pub fn wants_raw_html(label: &str) -> bool {
    let label = label.to_lowercase();
    RAW_HTML_LABEL_KEYWORDS
        .iter()
        .any(|keyword| label.contains(keyword))
}

/// Whether a field label or selector points at an image or link target.
pub fn wants_link(label: &str, selector: &str) -> bool {
    let label = label.to_lowercase();
    let selector = selector.to_lowercase();
    ATTRIBUTE_SELECTOR_TOKENS
        .iter()
        .any(|token| selector.contains(token))
        || ATTRIBUTE_LABEL_KEYWORDS
            .iter()
            .any(|keyword| label.contains(keyword))
}

fn text_content(node: &MatchedNode<'_>) -> String {
    match node {
        MatchedNode::Element(element) => element.text().collect::<String>().trim().to_owned(),
        MatchedNode::Value(value) => value.clone(),
    }
}

fn attribute(node: &MatchedNode<'_>, name: &str) -> Option<String> {
    match node {
        MatchedNode::Element(element) => element.value().attr(name).map(str::to_owned),
        MatchedNode::Value(_) => None,
    }
}

fn outer_html(node: &MatchedNode<'_>) -> String {
    match node {
        MatchedNode::Element(element) => element.html(),
        MatchedNode::Value(value) => value.clone(),
    }
}
