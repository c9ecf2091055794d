//! Recovers one JSON object from free-form model output.
//!
//! Models asked for "JSON only" still wrap it in fences, prepend prose, or answer in markdown
//! sections. The chain below tries progressively looser readings and the first that yields an
//! object wins.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

static FLAT_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r#"(?s)\{[^{}]*(?:"[^"]*"[^{}]*)*\}"#) {
        Ok(regex) => regex,
        Err(err) => panic!("flat object regex is invalid: {err}"),
    });

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"(?s)```json\s*(\{.*?\})\s*```") {
        Ok(regex) => regex,
        Err(err) => panic!("json fence regex is invalid: {err}"),
    });

static PLAIN_FENCE: LazyLock<Regex> =
    LazyLock::new(|| match Regex::new(r"(?s)```\s*(\{.*?\})\s*```") {
        Ok(regex) => regex,
        Err(err) => panic!("plain fence regex is invalid: {err}"),
    });

/// Which step of the chain produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    FlatObject,
    JsonFence,
    PlainFence,
    OuterBraces,
    Sections,
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParseStrategy::FlatObject => "flat_object",
            ParseStrategy::JsonFence => "json_fence",
            ParseStrategy::PlainFence => "plain_fence",
            ParseStrategy::OuterBraces => "outer_braces",
            ParseStrategy::Sections => "sections",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no JSON object or recognizable sections found in model output")]
pub struct ParseError;

/// A field the section heuristic looks for when no JSON can be recovered.
#[derive(Debug, Clone, Copy)]
pub struct SectionField {
    pub key: &'static str,
    /// Heading text as a model tends to write it, matched case-insensitively.
    pub label: &'static str,
    /// Filler used when the heuristic succeeds overall but misses this field.
    pub placeholder: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedObject {
    pub fields: Map<String, Value>,
    pub strategy: ParseStrategy,
}

/// Full chain: the four JSON readings, then section extraction over `sections`.
pub fn parse_response(text: &str, sections: &[SectionField]) -> Result<ParsedObject, ParseError> {
    if let Some(parsed) = parse_json_object(text) {
        return Ok(parsed);
    }

    extract_sections(text, sections)
        .map(|fields| ParsedObject {
            fields,
            strategy: ParseStrategy::Sections,
        })
        .ok_or(ParseError)
}

/// The JSON-only part of the chain.
pub fn parse_json_object(text: &str) -> Option<ParsedObject> {
    let attempts: [(ParseStrategy, fn(&str) -> Option<&str>); 4] = [
        (ParseStrategy::FlatObject, flat_object),
        (ParseStrategy::JsonFence, json_fence),
        (ParseStrategy::PlainFence, plain_fence),
        (ParseStrategy::OuterBraces, outer_braces),
    ];

    attempts.into_iter().find_map(|(strategy, candidate)| {
        let fields = decode_object(candidate(text)?)?;
        debug!(%strategy, "Recovered JSON object from model output");
        Some(ParsedObject { fields, strategy })
    })
}

fn decode_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// First brace-free object that is not itself nested inside another object. Without the
/// nesting check a nested document would yield its innermost member.
fn flat_object(text: &str) -> Option<&str> {
    let found = FLAT_OBJECT.find(text)?;
    let prefix = &text[..found.start()];
    let open = prefix.matches('{').count();
    let close = prefix.matches('}').count();
    (open <= close).then(|| found.as_str())
}

fn json_fence(text: &str) -> Option<&str> {
    fenced(&JSON_FENCE, text)
}

fn plain_fence(text: &str) -> Option<&str> {
    fenced(&PLAIN_FENCE, text)
}

fn fenced<'t>(regex: &Regex, text: &'t str) -> Option<&'t str> {
    regex
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn outer_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Markdown-ish section recovery. Needs at least two of `sections` to be found; the rest are
/// filled from their placeholders.
pub fn extract_sections(text: &str, sections: &[SectionField]) -> Option<Map<String, Value>> {
    let mut found = Map::new();
    for section in sections {
        if let Some(content) = find_section(text, section.label) {
            found.insert(section.key.to_string(), Value::String(content));
        }
    }

    if found.len() < 2 {
        return None;
    }

    for section in sections {
        found
            .entry(section.key)
            .or_insert_with(|| Value::String(section.placeholder.to_string()));
    }
    Some(found)
}

fn find_section(text: &str, label: &str) -> Option<String> {
    let label = regex::escape(label);
    let patterns = [
        format!(r"(?is)\*\*{label}\*\*:?\s*([^*]+?)(?:\*\*|\z)"),
        format!(r"(?i){label}:?\s*([^\n]+)"),
        format!(r"(?im)^{label}:?\s*(.+?)$"),
    ];

    patterns.iter().find_map(|pattern| {
        let regex = Regex::new(pattern).ok()?;
        let content = regex.captures(text)?.get(1)?.as_str().trim();
        (!content.is_empty()).then(|| content.to_string())
    })
}
