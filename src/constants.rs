pub const MODEL_API_KEY_ENV_NAME: &str = "HTMLSIFT_MODEL_API_KEY";

/// Provider specific key variables tried after [`MODEL_API_KEY_ENV_NAME`], keyed by backend scheme.
pub const PROVIDER_API_KEY_ENV_NAMES: &[(&str, &str)] = &[
    ("openai", "OPENAI_API_KEY"),
    ("anthropic", "ANTHROPIC_API_KEY"),
    ("google", "GEMINI_API_KEY"),
];

pub const ERROR_MARKER: &str = "ERROR: ";

pub const SOURCE_COLUMN: &str = "source";
pub const ERROR_COLUMN: &str = "error";
pub const RESERVED_COLUMNS: &[&str] = &[SOURCE_COLUMN, ERROR_COLUMN];

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";
pub const ACCEPT_LANGUAGE: &str = "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7";
pub const CORS_PROXY_PREFIX: &str = "https://corsproxy.io/?";
pub const STEAM_HOST: &str = "steampowered.com";
pub const STEAM_AGE_COOKIES: &str = "wants_mature_content=1; birthtime=631152000; lastagecheckage=1-0-1990";
pub const MIN_DOCUMENT_LENGTH: usize = 100;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 20;

pub const MAX_PROMPT_HTML_CHARS: usize = 200_000;
pub const INSPECT_PREVIEW_CHARS: usize = 5_000;

/// Label words that switch automatic extraction to raw HTML.
pub const RAW_HTML_LABEL_KEYWORDS: &[&str] = &[
    "image",
    "imagem",
    "gif",
    "complete",
    "completa",
    "completo",
    "html",
    "screenshot",
    "media",
];

/// Selector tokens hinting that an element's `src`/`href` is wanted rather than its text.
pub const ATTRIBUTE_SELECTOR_TOKENS: &[&str] = &["img", "src", "href"];

/// Label words hinting that an element's `src`/`href` is wanted rather than its text.
pub const ATTRIBUTE_LABEL_KEYWORDS: &[&str] = &["link", "url", "photo", "picture", "thumbnail", "logo", "icon"];

/// Attributes tried, in order, when an element's link-like value is wanted.
pub const LINK_ATTRIBUTES: &[&str] = &["src", "data-src", "href"];

pub const DEFAULT_ATTRIBUTE: &str = "href";

pub(crate) const THINK_STRIPPER: &str = r"<think>[\s\S]*</think>\s*";
pub(crate) const CODE_FENCE_STRIPPER: &str = r"```[a-zA-Z]*";
pub(crate) const JSON_OBJECT_SPAN: &str = r"(?s)\{.*\}";

pub(crate) const PROPOSE_SELECTORS_PROMPT: &str = r#"You are a web scraping expert. Analyse the CLEAN HTML below (scripts and CSS removed) and identify a CSS or XPath selector for EACH field requested by the user.

HTML of the page:
{html}

User request:
{query}

RULES:
1. Return one selector for EVERY field the user mentions.
2. If a field cannot be found, include it anyway with an empty selector and say so.
3. For IMAGES return selectors matching <img> tags (e.g. "img.screenshot" or "//img[@class='screenshot']/@src").
4. For descriptions with images or GIFs return the CONTAINER element, not only its text.
5. Use "intent": "attribute" with a trailing "@name" on CSS selectors when an attribute is wanted (e.g. "a.product@href").

Respond with JSON only, no markdown:
{
    "selectors": [
        {
            "kind": "css" or "xpath",
            "selector": "the full selector, or empty when not found",
            "label": "exact field name",
            "intent": "text", "attribute" or "html",
            "example": "a real value from the HTML or 'not found'"
        }
    ],
    "explanation": "how many requested fields were found"
}"#;

pub(crate) const EXTRACT_DIRECT_PROMPT: &str = r#"You are a data extraction assistant. Read the CLEAN HTML below and extract the values requested by the user.

HTML of the page:
{html}

User request:
{query}

Respond with JSON only, no markdown:
{
    "fields": [
        { "label": "field name", "value": "extracted value or empty", "found": true or false }
    ],
    "summary": "one sentence about what was found"
}"#;
