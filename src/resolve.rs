//! Applying one field descriptor to one document.

use std::collections::HashMap;

use log::{debug, warn};
use scraper::Selector;
use sxd_xpath::Value;
use sxd_xpath::nodeset::Node;

use crate::document::Document;
use crate::error::ExtractError;
use crate::extract::{ExtractionContext, MatchedNode, extract_value};
use crate::selector::{FieldDescriptor, Query, SelectorKind};

/// Values produced by one field on one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOutcome {
    pub label: String,
    /// One value per match, in document order.
    pub values: Vec<String>,
    /// Set when the selector could not be evaluated; `values` is then empty.
    pub error: Option<ExtractError>,
}

/// Evaluates a field against a document.
///
/// An empty selector matches nothing. A selector that fails to parse or
/// evaluate yields no values and a recorded [`ExtractError::SelectorSyntax`].
/// A node whose value cannot be extracted contributes an empty string.
pub fn resolve_field(document: &Document, field: &FieldDescriptor) -> FieldOutcome {
    let query = field.query();
    let result = if query.selector.is_empty() {
        Ok(Vec::new())
    } else {
        match query.kind {
            SelectorKind::Css => css_values(document, &field.label, &query),
            SelectorKind::Xpath => xpath_values(document, &field.label, &query),
        }
    };

    match result {
        Ok(values) => {
            debug!(
                "Field {:?} ({} `{}`) matched {} values",
                field.label,
                query.kind,
                query.selector,
                values.len()
            );
            FieldOutcome {
                label: field.label.clone(),
                values,
                error: None,
            }
        }
        Err(err) => {
            warn!("Field {:?}: {err}", field.label);
            FieldOutcome {
                label: field.label.clone(),
                values: Vec::new(),
                error: Some(err),
            }
        }
    }
}

/// Evaluates every field against a document, in descriptor order.
pub fn resolve_fields(document: &Document, fields: &[FieldDescriptor]) -> Vec<FieldOutcome> {
    fields
        .iter()
        .map(|field| resolve_field(document, field))
        .collect()
}

fn css_values(
    document: &Document,
    label: &str,
    query: &Query<'_>,
) -> Result<Vec<String>, ExtractError> {
    let selector = Selector::parse(query.selector).map_err(|err| ExtractError::SelectorSyntax {
        selector: query.selector.to_owned(),
        message: err.to_string(),
    })?;

    let nodes = document.html().select(&selector).map(MatchedNode::Element).map(Ok);

    Ok(extract_all(nodes, label, query))
}

fn xpath_values(
    document: &Document,
    label: &str,
    query: &Query<'_>,
) -> Result<Vec<String>, ExtractError> {
    let package = document.xpath_tree();
    let xml = package.as_document();
    let value = sxd_xpath::evaluate_xpath(&xml, query.selector).map_err(|err| {
        ExtractError::SelectorSyntax {
            selector: query.selector.to_owned(),
            message: format!("{err:?}"),
        }
    })?;

    let nodes: Vec<Result<MatchedNode<'_>, ExtractError>> = match value {
        Value::Nodeset(nodeset) => {
            let ordered = nodeset.document_order();
            let sources = if ordered.iter().any(|node| matches!(node, Node::Element(_))) {
                document.source_elements(&xml)
            } else {
                HashMap::new()
            };
            ordered
                .into_iter()
                .map(|node| match node {
                    Node::Element(element) => sources
                        .get(&element)
                        .map(|source| MatchedNode::Element(*source))
                        .ok_or_else(|| {
                            ExtractError::ExtractionValue(format!(
                                "<{}> has no counterpart in the HTML tree",
                                element.name().local_part()
                            ))
                        }),
                    other => Ok(MatchedNode::Value(other.string_value())),
                })
                .collect()
        }
        Value::String(text) => vec![Ok(MatchedNode::Value(text))],
        Value::Number(number) => vec![Ok(MatchedNode::Value(format_number(number)))],
        Value::Boolean(flag) => vec![Ok(MatchedNode::Value(flag.to_string()))],
    };

    Ok(extract_all(nodes, label, query))
}

/// Extracts one value per node. A node that cannot be rendered yields `""`.
fn extract_all<'a>(
    nodes: impl IntoIterator<Item = Result<MatchedNode<'a>, ExtractError>>,
    label: &str,
    query: &Query<'_>,
) -> Vec<String> {
    let context = ExtractionContext {
        label,
        selector: query.selector,
        intent: &query.intent,
    };

    nodes
        .into_iter()
        .map(|node| match node {
            Ok(node) => extract_value(&node, &context),
            Err(err) => {
                debug!("Field {label:?}: {err}, using empty value");
                String::new()
            }
        })
        .collect()
}

fn format_number(number: f64) -> String {
    if number.is_finite() && number.fract() == 0.0 {
        format!("{number:.0}")
    } else {
        number.to_string()
    }
}
