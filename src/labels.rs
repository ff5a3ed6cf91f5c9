//! Labeled-field parsing for model replies
//!
//! Prompts ask the model for a delimited `KEY: value` block. Parsing first
//! honours that contract (label at the start of a line), then falls back to a
//! loose search anywhere in the text. Every field is looked up on its own, so
//! one malformed field never sinks the others.

use once_cell::sync::Lazy;
use regex::Regex;

/// A line that opens another labeled section
static LABEL_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[*_]*[A-Z][A-Z0-9_ ]*[*_]*\s*:").expect("static regex"));

/// Leading bullet or enumeration marker
static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]+|\d+[.)])\s*").expect("static regex"));

fn strict_pattern(label: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"(?im)^[\s>*_-]*{}[*_]*\s*:[*_]*[ \t]*(\S[^\n]*?)[ \t]*$",
        regex::escape(label)
    ))
    .ok()
}

fn loose_pattern(label: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?i){}\s*:\s*([^\n]+)", regex::escape(label))).ok()
}

/// Single-line value of `label`, or `None` if the label is absent or empty
pub fn field(text: &str, label: &str) -> Option<String> {
    let strict = strict_pattern(label)
        .and_then(|re| re.captures(text).map(|c| c[1].trim().to_string()));

    strict
        .or_else(|| {
            loose_pattern(label)
                .and_then(|re| re.captures(text).map(|c| c[1].trim().to_string()))
        })
        .map(|v| v.trim_matches(|c| c == '*' || c == '[' || c == ']').trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First word of a field's value, lowercased (`COMPLEXITY: High - because` → `high`)
pub fn word(text: &str, label: &str) -> Option<String> {
    field(text, label).and_then(|v| {
        v.split(|c: char| !c.is_alphanumeric())
            .find(|w| !w.is_empty())
            .map(str::to_lowercase)
    })
}

/// Multi-line section opened by `label`
///
/// Collects the label's own line plus continuation lines, stopping at a blank
/// line or the next labeled line.
pub fn section(text: &str, label: &str) -> Option<String> {
    let header = strict_pattern_allow_empty(label)?;
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.iter().position(|l| header.is_match(l))?;

    let first = header
        .captures(lines[start])
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or("");

    let mut collected = Vec::new();
    if !first.is_empty() {
        collected.push(first.to_string());
    }

    let mut rest = lines[start + 1..].iter().peekable();
    if collected.is_empty() {
        while rest.peek().is_some_and(|l| l.trim().is_empty()) {
            rest.next();
        }
    }

    for line in rest {
        if line.trim().is_empty() || LABEL_LINE.is_match(line) {
            break;
        }
        collected.push(line.trim().to_string());
    }

    let joined = collected.join("\n");
    if joined.trim().is_empty() {
        field(text, label)
    } else {
        Some(joined)
    }
}

fn strict_pattern_allow_empty(label: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"(?i)^[\s>*_-]*{}[*_]*\s*:[*_]*[ \t]*(.*)$",
        regex::escape(label)
    ))
    .ok()
}

/// Split a section into items on newlines and `•`, dropping bullet markers
/// and fragments of five characters or fewer
pub fn items(value: &str) -> Vec<String> {
    value
        .split(|c| c == '\n' || c == '•')
        .map(|s| BULLET.replace(s, "").trim().to_string())
        .filter(|s| s.chars().count() > 5)
        .collect()
}

/// Split a single-line value on commas
pub fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
