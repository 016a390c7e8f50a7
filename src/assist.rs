//! The assist module asks an LLM either to propose selectors for a
//! natural-language request or to extract the requested values directly.
//!
//! Model output is never partially trusted: anything that does not parse
//! into the expected JSON shape fails the whole call.

use std::time::Duration;

use llm::chat::{ChatMessage, ChatProvider};
use log::{debug, info};
use once_cell::sync::Lazy;
use rate_guard::{RateLimit, StdTokenBucket, TokenBucketBuilder};
use regex::Regex;
use serde::Deserialize;

use crate::align::{RowRecord, column_labels};
use crate::constants::{
    CODE_FENCE_STRIPPER, EXTRACT_DIRECT_PROMPT, JSON_OBJECT_SPAN, PROPOSE_SELECTORS_PROMPT,
    THINK_STRIPPER,
};
use crate::error::CollaboratorError;
use crate::sanitize::prompt_html;
use crate::selector::{FieldDescriptor, SelectorKind, intent_from_name};

static THINK_STRIPPER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(THINK_STRIPPER).expect("Failed to compile THINK_STRIPPER regex"));

static CODE_FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(CODE_FENCE_STRIPPER).expect("Failed to compile CODE_FENCE_STRIPPER regex")
});

static JSON_OBJECT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(JSON_OBJECT_SPAN).expect("Failed to compile JSON_OBJECT_SPAN regex"));

/// Shared data for assisted calls.
pub struct AssistContext<'a> {
    /// LLM model to ask
    pub model: &'a dyn ChatProvider,
    /// Rate limiter for controlling request frequency
    pub rate_limiter: Option<&'a StdTokenBucket>,
}

/// Selectors proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorProposal {
    pub fields: Vec<FieldDescriptor>,
    /// Example value per field as quoted by the model, if any.
    pub examples: Vec<Option<String>>,
    pub explanation: String,
}

/// One value extracted by the model itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectField {
    pub label: String,
    pub value: String,
    pub found: bool,
}

/// Values extracted by the model itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectExtraction {
    pub fields: Vec<DirectField>,
    pub summary: String,
}

impl DirectExtraction {
    /// Column headers, with repeated labels kept apart as `Label (2)`.
    pub fn labels(&self) -> Vec<String> {
        column_labels(self.fields.iter().map(|field| field.label.as_str()))
    }

    /// The extracted values as a single row, in the order the model gave them.
    pub fn to_row(&self) -> RowRecord {
        RowRecord::new(
            self.labels()
                .into_iter()
                .zip(&self.fields)
                .map(|(label, field)| (label, field.value.clone()))
                .collect(),
        )
    }
}

#[derive(Deserialize)]
struct RawProposal {
    #[serde(default, alias = "seletores")]
    selectors: Vec<RawSelector>,
    #[serde(default, alias = "explicacao")]
    explanation: String,
}

#[derive(Deserialize)]
struct RawSelector {
    #[serde(default, alias = "tipo")]
    kind: Option<String>,
    #[serde(default, alias = "seletor")]
    selector: String,
    #[serde(default, alias = "descricao", alias = "field")]
    label: Option<String>,
    #[serde(default, alias = "type")]
    intent: Option<String>,
    #[serde(default, alias = "exemplo_resultado")]
    example: Option<String>,
}

#[derive(Deserialize)]
struct RawDirectExtraction {
    #[serde(default)]
    fields: Vec<RawDirectField>,
    #[serde(default)]
    summary: String,
}

#[derive(Deserialize)]
struct RawDirectField {
    label: String,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    found: Option<bool>,
}

/// Builds a rate limiter allowing `rpm` requests per minute.
pub fn rate_limiter(rpm: Option<u32>) -> Option<StdTokenBucket> {
    rpm.and_then(|rpm| {
        let capacity = u64::from(rpm.max(1));
        let refill_interval = Duration::from_secs_f64(60.0 / capacity as f64);

        TokenBucketBuilder::builder()
            .capacity(capacity)
            .refill_amount(1_u64)
            .refill_every(refill_interval)
            .with_time(rate_guard::StdTimeSource::new())
            .with_precision::<rate_guard::Nanos>()
            .build()
            .ok()
    })
}

/// Masks an API key for display: first and last four characters only.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "***".to_owned();
    }
    let head: String = chars.iter().take(4).collect();
    let tail: String = chars.iter().skip(chars.len() - 4).collect();
    format!("{head}...{tail}")
}

/// Asks the model for one selector per field named in `query`.
///
/// The HTML is sanitized and truncated before it is sent.
///
/// # Errors
///
/// Returns an error if the model call fails or its answer is not a selector
/// list in JSON form.
pub async fn propose_selectors(
    html: &str,
    query: &str,
    ctx: &AssistContext<'_>,
) -> Result<SelectorProposal, CollaboratorError> {
    let prompt = render_prompt(PROPOSE_SELECTORS_PROMPT, html, query);
    let response = ask(&prompt, ctx).await?;
    let proposal = parse_selector_proposal(&response)?;
    info!(
        "Model proposed {} selectors: {}",
        proposal.fields.len(),
        proposal.explanation
    );
    Ok(proposal)
}

/// Asks the model to extract the values named in `query` itself.
///
/// # Errors
///
/// Returns an error if the model call fails or its answer is not a field
/// list in JSON form.
pub async fn extract_direct(
    html: &str,
    query: &str,
    ctx: &AssistContext<'_>,
) -> Result<DirectExtraction, CollaboratorError> {
    let prompt = render_prompt(EXTRACT_DIRECT_PROMPT, html, query);
    let response = ask(&prompt, ctx).await?;
    let extraction = parse_direct_extraction(&response)?;
    info!(
        "Model extracted {} fields: {}",
        extraction.fields.len(),
        extraction.summary
    );
    Ok(extraction)
}

/// Parses a selector proposal out of raw model output.
///
/// Accepts English keys as well as the Portuguese ones used by older prompts
/// (`seletores`, `tipo`, `seletor`, `descricao`, `explicacao`).
///
/// # Errors
///
/// Returns [`CollaboratorError::MalformedResponse`] if no JSON object with
/// the expected shape can be found.
pub fn parse_selector_proposal(response: &str) -> Result<SelectorProposal, CollaboratorError> {
    let payload = json_payload(response)?;
    let raw: RawProposal = serde_json::from_str(&payload)
        .map_err(|err| CollaboratorError::MalformedResponse(err.to_string()))?;

    let (fields, examples): (Vec<_>, Vec<_>) = raw
        .selectors
        .into_iter()
        .enumerate()
        .map(|(index, selector)| {
            let label = selector
                .label
                .filter(|label| !label.trim().is_empty())
                .unwrap_or_else(|| format!("Field {}", index + 1));
            let kind = selector
                .kind
                .as_deref()
                .and_then(|kind| kind.parse::<SelectorKind>().ok());
            let intent = intent_from_name(selector.intent.as_deref(), &selector.selector);

            let mut field = FieldDescriptor::new(label, selector.selector).with_intent(intent);
            field.kind = kind;
            (field, selector.example)
        })
        .unzip();

    Ok(SelectorProposal {
        fields,
        examples,
        explanation: raw.explanation,
    })
}

/// Parses a direct extraction out of raw model output.
///
/// # Errors
///
/// Returns [`CollaboratorError::MalformedResponse`] if no JSON object with
/// the expected shape can be found.
pub fn parse_direct_extraction(response: &str) -> Result<DirectExtraction, CollaboratorError> {
    let payload = json_payload(response)?;
    let raw: RawDirectExtraction = serde_json::from_str(&payload)
        .map_err(|err| CollaboratorError::MalformedResponse(err.to_string()))?;

    let fields = raw
        .fields
        .into_iter()
        .map(|field| {
            let value = match field.value {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(value) => value,
                other => other.to_string(),
            };
            DirectField {
                found: field.found.unwrap_or(!value.is_empty()),
                label: field.label,
                value,
            }
        })
        .collect();

    Ok(DirectExtraction {
        fields,
        summary: raw.summary,
    })
}

fn render_prompt(template: &str, html: &str, query: &str) -> String {
    template
        .replace("{query}", query)
        .replace("{html}", &prompt_html(html))
}

async fn ask(prompt: &str, ctx: &AssistContext<'_>) -> Result<String, CollaboratorError> {
    let messages = vec![ChatMessage::user().content(prompt).build()];

    if let Some(limiter) = ctx.rate_limiter {
        while limiter.try_acquire(1).is_err() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    let response = ctx
        .model
        .chat(&messages)
        .await
        .map_err(|err| CollaboratorError::Request(err.to_string()))?
        .to_string();
    debug!("Model answered with {} characters", response.len());

    if response.trim().is_empty() {
        return Err(CollaboratorError::EmptyResponse);
    }
    Ok(response)
}

/// Recovers the JSON object from model output that may be wrapped in
/// `<think>` blocks, code fences or prose.
fn json_payload(response: &str) -> Result<String, CollaboratorError> {
    let without_thinking = THINK_STRIPPER_REGEX.replace_all(response, "");
    let without_fences = CODE_FENCE_REGEX.replace_all(&without_thinking, "");

    JSON_OBJECT_REGEX
        .find(&without_fences)
        .map(|span| span.as_str().to_owned())
        .ok_or_else(|| {
            CollaboratorError::MalformedResponse("no JSON object in response".to_owned())
        })
}
