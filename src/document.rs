//! Parsed, immutable HTML documents queryable by CSS and XPath.

use std::collections::HashMap;

use ego_tree::iter::Edge;
use once_cell::unsync::OnceCell;
use scraper::{ElementRef, Html, Node};
use sxd_document::Package;
use sxd_document::dom::{self, ChildOfElement, ChildOfRoot};

/// One parsed HTML page.
///
/// The CSS tree is built on parse. The XPath tree is a mirror of it built
/// the first time an XPath selector is evaluated, then reused.
pub struct Document {
    raw: String,
    html: Html,
    xpath_tree: OnceCell<Package>,
}

impl Document {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let html = Html::parse_document(&raw);
        Self {
            raw,
            html,
            xpath_tree: OnceCell::new(),
        }
    }

    /// Source text the document was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn xpath_tree(&self) -> &Package {
        self.xpath_tree
            .get_or_init(|| mirror_document(&self.html))
    }

    /// Pairs every element of the XPath tree with the HTML element it was
    /// copied from.
    ///
    /// Both trees hold the same elements in the same pre-order, so the pairs
    /// come from walking them side by side.
    pub fn source_elements<'d>(
        &'d self,
        xml: &dom::Document<'d>,
    ) -> HashMap<dom::Element<'d>, ElementRef<'d>> {
        let mut mirrored = Vec::new();
        let mut pending: Vec<dom::Element<'d>> = xml
            .root()
            .children()
            .into_iter()
            .rev()
            .filter_map(ChildOfRoot::element)
            .collect();

        while let Some(element) = pending.pop() {
            mirrored.push(element);
            pending.extend(
                element
                    .children()
                    .into_iter()
                    .rev()
                    .filter_map(ChildOfElement::element),
            );
        }

        mirrored
            .into_iter()
            .zip(
                self.html
                    .root_element()
                    .descendants()
                    .filter_map(ElementRef::wrap),
            )
            .collect()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Document")
            .field("raw_len", &self.raw.len())
            .finish_non_exhaustive()
    }
}

/// Copies elements, attributes, text and comments of the HTML tree into an
/// XML document, so that XPath can run over markup that is not well-formed XML.
fn mirror_document(html: &Html) -> Package {
    let package = Package::new();
    {
        let xml = package.as_document();
        let mut open: Vec<dom::Element<'_>> = Vec::new();

        for edge in html.root_element().traverse() {
            match edge {
                Edge::Open(node) => match node.value() {
                    Node::Element(source) => {
                        let element = xml.create_element(source.name());
                        for (name, value) in source.attrs() {
                            element.set_attribute_value(name, value);
                        }
                        match open.last() {
                            Some(parent) => parent.append_child(element),
                            None => xml.root().append_child(element),
                        }
                        open.push(element);
                    }
                    Node::Text(text) => {
                        if let Some(parent) = open.last() {
                            parent.append_child(xml.create_text(text));
                        }
                    }
                    Node::Comment(comment) => {
                        if let Some(parent) = open.last() {
                            parent.append_child(xml.create_comment(comment));
                        }
                    }
                    _ => {}
                },
                Edge::Close(node) => {
                    if node.value().is_element() {
                        open.pop();
                    }
                }
            }
        }
    }
    package
}
