//! Stripping scripts, styles and other noise from HTML before it is shown
//! to a model or a person.

use std::fmt::{self, Write};

use log::warn;
use ego_tree::iter::Edge;
use scraper::node::Element;
use scraper::{Html, Node};

use crate::constants::MAX_PROMPT_HTML_CHARS;

const REMOVED_ELEMENTS: &[&str] = &["script", "style", "noscript", "iframe", "svg"];

const TRACKING_ATTRIBUTES: &[&str] = &["ping", "jsaction", "jslog", "nonce"];

const TRACKING_ATTRIBUTE_PREFIXES: &[&str] = &[
    "data-ga",
    "data-gtm",
    "data-analytics",
    "data-track",
    "data-event",
    "data-ved",
];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Removes `script`, `style`, `noscript`, `iframe` and `svg` elements,
/// comments, `on*` handlers, inline `style` and tracking attributes.
///
/// Links, images and structural attributes (`class`, `id`, `data-*`,
/// `aria-*`) are kept. On any internal failure the input is returned as is.
pub fn sanitize(html: &str) -> String {
    match try_sanitize(html) {
        Ok(clean) => clean,
        Err(err) => {
            warn!("Unable to sanitize HTML ({err}), keeping original");
            html.to_owned()
        }
    }
}

/// Sanitizes and truncates a document to the size sent to the model.
pub fn prompt_html(html: &str) -> String {
    truncate_chars(&sanitize(html), MAX_PROMPT_HTML_CHARS).to_owned()
}

/// Cuts a string to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text.get(..end).unwrap_or(text),
        None => text,
    }
}

fn try_sanitize(html: &str) -> Result<String, fmt::Error> {
    let document = Html::parse_document(html);
    let mut clean = String::with_capacity(html.len());
    // Open elements of the subtree currently being dropped.
    let mut removed_depth = 0_usize;

    for edge in document.tree.root().traverse() {
        match edge {
            Edge::Open(node) => match node.value() {
                Node::Element(element) => {
                    if removed_depth > 0 || REMOVED_ELEMENTS.contains(&element.name()) {
                        removed_depth += 1;
                    } else {
                        write_open_tag(&mut clean, element)?;
                    }
                }
                leaf if removed_depth == 0 => write_leaf(&mut clean, leaf)?,
                _ => {}
            },
            Edge::Close(node) => {
                if let Node::Element(element) = node.value() {
                    if removed_depth > 0 {
                        removed_depth -= 1;
                    } else if !VOID_ELEMENTS.contains(&element.name()) {
                        write!(clean, "</{}>", element.name())?;
                    }
                }
            }
        }
    }

    Ok(clean)
}

fn write_open_tag(clean: &mut String, element: &Element) -> fmt::Result {
    write!(clean, "<{}", element.name())?;
    for (attribute, value) in element.attrs() {
        if keeps_attribute(attribute) {
            write!(clean, " {attribute}=\"{}\"", escape_attribute(value))?;
        }
    }
    clean.push('>');
    Ok(())
}

fn write_leaf(clean: &mut String, node: &Node) -> fmt::Result {
    match node {
        Node::Doctype(doctype) => write!(clean, "<!DOCTYPE {}>", doctype.name()),
        Node::Text(text) => {
            clean.push_str(&escape_text(text));
            Ok(())
        }
        _ => Ok(()),
    }
}

fn keeps_attribute(attribute: &str) -> bool {
    let attribute = attribute.to_ascii_lowercase();
    !(attribute.starts_with("on")
        || attribute == "style"
        || TRACKING_ATTRIBUTES.contains(&attribute.as_str())
        || TRACKING_ATTRIBUTE_PREFIXES
            .iter()
            .any(|prefix| attribute.starts_with(prefix)))
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
