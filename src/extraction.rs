//! Worker-id extraction from free-text planning replies
//!
//! A layered parser: strategies run in priority order and each reports
//! either the tokens it found or [`Extraction::NoMatch`]. Tokens are
//! normalized and resolved through an [`AliasMap`]; the first strategy that
//! resolves at least one valid worker (other than the orchestrator) wins.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::PlanGenerationError;
use crate::worker::WorkerDescriptor;

/// `**SELECTED AGENTS:**` followed by bullet lines
static SELECTED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\**[ \t]*SELECTED[ \t]+AGENTS[ \t]*\**[ \t]*:[ \t]*\**[ \t]*\r?\n(?:[ \t]*\r?\n)*((?:[ \t]*(?:[-•]|\*[ \t])[^\n]*(?:\n|$))+)",
    )
    .expect("static regex")
});

static BULLET_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-•]|\*\s)\s*").expect("static regex"));

/// Labeled one-line lists, most specific first
static LABELED_LISTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\brequired\s+agents?\s*:\s*([^\n]+)",
        r"(?i)\bagents?\s+needed\s*:\s*([^\n]+)",
        r"(?i)\bteam\s*:\s*([^\n]+)",
        r"(?i)\bagents?\s*:\s*([^\n]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

static LIST_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[,;\n]+|\s+and\s+|\s*&\s*").expect("static regex"));

static LEADING_THE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^the\s+").expect("static regex"));
static TRAILING_AGENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*agent$").expect("static regex"));
static SEPARATOR_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s_-]+").expect("static regex"));
static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9-]").expect("static regex"));

/// Result of a single extraction strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Worker ids the strategy resolved, deduplicated in first-seen order
    Found(Vec<String>),
    /// The strategy did not apply or resolved nothing
    NoMatch,
}

impl Extraction {
    pub fn is_match(&self) -> bool {
        matches!(self, Extraction::Found(_))
    }
}

/// Normalize an extracted token into id shape
///
/// `"The Data Scientist Agent"` becomes `"data-scientist"`.
pub fn normalize(token: &str) -> String {
    let lowered = token.trim().to_lowercase();
    let lowered = LEADING_THE.replace(&lowered, "");
    let lowered = TRAILING_AGENT.replace(&lowered, "");
    let hyphenated = SEPARATOR_RUN.replace_all(lowered.trim(), "-");
    DISALLOWED
        .replace_all(&hyphenated, "")
        .trim_matches('-')
        .to_string()
}

/// Lookup from every accepted spelling of a worker to its id
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    aliases: HashMap<String, String>,
    /// Spellings precise enough to scan free prose for
    names: Vec<String>,
}

impl AliasMap {
    /// Build aliases for the given descriptors
    ///
    /// Aliases are filled tier by tier across the whole team: exact ids,
    /// then ids without `-agent` and hyphen-joined display names, then the
    /// first word of a display name, then synonyms. A spelling claimed by a
    /// more precise tier is never taken by a looser one; within a tier the
    /// first registered worker keeps it.
    pub fn build<'a>(descriptors: impl IntoIterator<Item = &'a WorkerDescriptor>) -> Self {
        let descriptors: Vec<&WorkerDescriptor> = descriptors.into_iter().collect();
        let mut aliases: HashMap<String, String> = descriptors
            .iter()
            .map(|d| (d.id.clone(), d.id.clone()))
            .collect();
        let mut names: Vec<String> = descriptors.iter().map(|d| d.id.clone()).collect();

        let name_words: Vec<Vec<String>> = descriptors
            .iter()
            .map(|d| {
                d.display_name
                    .to_lowercase()
                    .split_whitespace()
                    .filter(|w| *w != "agent")
                    .map(normalize)
                    .filter(|w| !w.is_empty())
                    .collect()
            })
            .collect();

        for (d, words) in descriptors.iter().zip(&name_words) {
            let base = d.id.strip_suffix("-agent").unwrap_or(&d.id).to_string();
            for precise in [base, words.join("-")] {
                if !precise.is_empty() {
                    aliases.entry(precise.clone()).or_insert_with(|| d.id.clone());
                    names.push(precise);
                }
            }
        }

        for (d, words) in descriptors.iter().zip(&name_words) {
            if let Some(first) = words.first() {
                aliases.entry(first.clone()).or_insert_with(|| d.id.clone());
            }
        }

        for d in &descriptors {
            for synonym in synonyms(&d.id) {
                aliases
                    .entry(synonym.to_string())
                    .or_insert_with(|| d.id.clone());
            }
        }

        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        names.dedup();

        Self { aliases, names }
    }

    /// Resolve a normalized token
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.aliases.get(token).map(String::as_str)
    }

    fn name_pattern(&self) -> Option<Regex> {
        if self.names.is_empty() {
            return None;
        }
        let alternatives: Vec<String> = self
            .names
            .iter()
            .map(|n| {
                n.split('-')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"[-\s]+")
            })
            .collect();
        Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()
    }
}

/// Hand-curated domain synonyms keyed on id fragments
fn synonyms(id: &str) -> &'static [&'static str] {
    if id.contains("researcher") {
        &["research", "personal-researcher"]
    } else if id.contains("communications") {
        &["communication", "communications"]
    } else if id.contains("project-coordinator") {
        &["project", "coordinator"]
    } else {
        &[]
    }
}

/// Named heuristics, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    SelectedBlock,
    LabeledList,
    KnownNames,
}

impl Strategy {
    pub const ORDER: [Strategy; 3] = [
        Strategy::SelectedBlock,
        Strategy::LabeledList,
        Strategy::KnownNames,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::SelectedBlock => "selected-agents-block",
            Strategy::LabeledList => "labeled-list",
            Strategy::KnownNames => "known-names",
        }
    }

    /// Raw, already-normalized tokens this strategy finds in `text`
    fn tokens(&self, text: &str, aliases: &AliasMap) -> Vec<String> {
        match self {
            Strategy::SelectedBlock => SELECTED_BLOCK
                .captures_iter(text)
                .flat_map(|caps| {
                    caps[1]
                        .lines()
                        .filter(|l| BULLET_PREFIX.is_match(l))
                        .map(|l| bullet_token(l))
                        .collect::<Vec<_>>()
                })
                .collect(),
            Strategy::LabeledList => LABELED_LISTS
                .iter()
                .flat_map(|re| re.captures_iter(text))
                .flat_map(|caps| {
                    LIST_SEPARATOR
                        .split(&caps[1])
                        .map(normalize)
                        .filter(|t| t.len() > 2)
                        .collect::<Vec<_>>()
                })
                .collect(),
            Strategy::KnownNames => aliases
                .name_pattern()
                .map(|re| re.find_iter(text).map(|m| normalize(m.as_str())).collect())
                .unwrap_or_default(),
        }
    }
}

/// Bullet line to token: drop the marker, any parenthetical and any trailing
/// description after ` - ` or `:`
fn bullet_token(line: &str) -> String {
    let item = BULLET_PREFIX.replace(line, "");
    let item = item.split('(').next().unwrap_or("");
    let item = item.split(" - ").next().unwrap_or("");
    let item = item.split(':').next().unwrap_or("");
    normalize(item.trim_matches(|c: char| c == '*' || c == '`' || c.is_whitespace()))
}

/// Resolves worker ids out of planning replies
#[derive(Debug, Clone)]
pub struct WorkerIdExtractor {
    aliases: AliasMap,
    orchestrator_id: String,
    available: Vec<String>,
}

impl WorkerIdExtractor {
    pub fn new<'a>(
        descriptors: impl IntoIterator<Item = &'a WorkerDescriptor>,
        orchestrator_id: impl Into<String>,
    ) -> Self {
        let descriptors: Vec<&WorkerDescriptor> = descriptors.into_iter().collect();
        Self {
            aliases: AliasMap::build(descriptors.iter().copied()),
            orchestrator_id: orchestrator_id.into(),
            available: descriptors.iter().map(|d| d.id.clone()).collect(),
        }
    }

    /// Run one strategy, resolving and filtering its tokens
    pub fn apply(&self, strategy: Strategy, text: &str) -> Extraction {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();

        for token in strategy.tokens(text, &self.aliases) {
            if token.is_empty() {
                continue;
            }
            let Some(id) = self.aliases.resolve(&token) else {
                debug!(strategy = strategy.name(), token = %token, "Ignoring unknown worker");
                continue;
            };
            if id == self.orchestrator_id {
                warn!(
                    worker_id = %id,
                    "Orchestrator cannot coordinate with itself, dropping from plan"
                );
                continue;
            }
            if seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        }

        if ids.is_empty() {
            Extraction::NoMatch
        } else {
            Extraction::Found(ids)
        }
    }

    /// Worker ids for a planning reply, never empty on success
    pub fn extract(&self, text: &str) -> Result<Vec<String>, PlanGenerationError> {
        for strategy in Strategy::ORDER {
            if let Extraction::Found(ids) = self.apply(strategy, text) {
                debug!(strategy = strategy.name(), workers = ?ids, "Extracted workers");
                return Ok(ids);
            }
        }

        warn!(
            response_len = text.len(),
            available = %self.available.join(", "),
            "No valid workers found in planning response"
        );
        Err(PlanGenerationError::ExtractionFailure {
            response_len: text.len(),
            available: self.available.join(", "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> Vec<WorkerDescriptor> {
        vec![
            WorkerDescriptor::new("master-orchestrator", "Master Orchestrator", "Coordinates"),
            WorkerDescriptor::new("researcher", "Research Agent", "Information gathering"),
            WorkerDescriptor::new("communications", "Communications Agent", "Messaging"),
            WorkerDescriptor::new("project-coordinator", "Project Coordinator", "Timelines"),
            WorkerDescriptor::new("data-scientist", "Data Scientist", "Statistics"),
            WorkerDescriptor::new("music-coach-agent", "Music Coach Agent", "Music"),
        ]
    }

    fn extractor() -> WorkerIdExtractor {
        let team = team();
        WorkerIdExtractor::new(team.iter(), "master-orchestrator")
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("The Data Scientist Agent"), "data-scientist");
        assert_eq!(normalize("  Project   Coordinator!"), "project-coordinator");
        assert_eq!(normalize("front_end -- developer"), "front-end-developer");
        assert_eq!(normalize("`researcher`"), "researcher");
    }

    #[test]
    fn test_alias_resolution() {
        let team = team();
        let aliases = AliasMap::build(team.iter());
        assert_eq!(aliases.resolve("researcher"), Some("researcher"));
        assert_eq!(aliases.resolve("research"), Some("researcher"));
        assert_eq!(aliases.resolve("communication"), Some("communications"));
        assert_eq!(aliases.resolve("coordinator"), Some("project-coordinator"));
        assert_eq!(aliases.resolve("music-coach"), Some("music-coach-agent"));
        assert_eq!(aliases.resolve("data"), Some("data-scientist"));
        assert_eq!(aliases.resolve("astrologer"), None);
    }

    #[test]
    fn test_precise_alias_beats_first_word() {
        let team = vec![
            WorkerDescriptor::new("music-coach", "Music Coach", "Lessons"),
            WorkerDescriptor::new("music-agent", "Music Agent", "Playlists"),
        ];
        let aliases = AliasMap::build(team.iter());
        assert_eq!(aliases.resolve("music"), Some("music-agent"));
        assert_eq!(aliases.resolve("music-coach"), Some("music-coach"));

        let extractor = WorkerIdExtractor::new(team.iter(), "master-orchestrator");
        assert_eq!(
            extractor.extract("Required agents: the Music Agent").unwrap(),
            vec!["music-agent"]
        );
    }

    #[test]
    fn test_selected_block_is_authoritative() {
        let text = "Let me think about this. The researcher and data scientist could help.\n\n\
                    **SELECTED AGENTS:**\n\
                    - researcher (gathers sources)\n\
                    - communications\n\
                    \n\
                    Timeline: 2 days, though project coordination may be useful.";

        let ids = extractor().extract(text).unwrap();
        assert_eq!(ids, vec!["researcher", "communications"]);
    }

    #[test]
    fn test_selected_block_without_bold() {
        let text = "SELECTED AGENTS:\n* data-scientist - crunches numbers\n- researcher\n";
        let ids = extractor().extract(text).unwrap();
        assert_eq!(ids, vec!["data-scientist", "researcher"]);
    }

    #[test]
    fn test_orchestrator_never_selected() {
        let text = "**SELECTED AGENTS:**\n- master-orchestrator\n- researcher\n- master-orchestrator\n";
        let ids = extractor().extract(text).unwrap();
        assert_eq!(ids, vec!["researcher"]);

        let text = "Agents: master orchestrator, the Research agent";
        let ids = extractor().extract(text).unwrap();
        assert!(!ids.contains(&"master-orchestrator".to_string()));
        assert_eq!(ids, vec!["researcher"]);
    }

    #[test]
    fn test_block_naming_only_the_orchestrator_falls_through() {
        let text = "**SELECTED AGENTS:**\n- master-orchestrator\n\nteam: Communications, Project";
        let ex = extractor();
        assert_eq!(ex.apply(Strategy::SelectedBlock, text), Extraction::NoMatch);
        assert_eq!(
            ex.extract(text).unwrap(),
            vec!["communications", "project-coordinator"]
        );
    }

    #[test]
    fn test_labeled_list_fallback() {
        let text = "Required agents: The Data Scientist Agent, researcher and communications";
        let ids = extractor().extract(text).unwrap();
        assert_eq!(ids, vec!["data-scientist", "researcher", "communications"]);
    }

    #[test]
    fn test_known_names_fallback() {
        let text = "I would bring in the project coordinator first, then the music coach.";
        let ex = extractor();
        assert_eq!(ex.apply(Strategy::LabeledList, text), Extraction::NoMatch);
        assert_eq!(
            ex.extract(text).unwrap(),
            vec!["project-coordinator", "music-coach-agent"]
        );
    }

    #[test]
    fn test_unknown_tokens_never_enter_the_plan() {
        let text = "**SELECTED AGENTS:**\n- astrologer\n- researcher\n- tarot-reader\n";
        assert_eq!(extractor().extract(text).unwrap(), vec!["researcher"]);
    }

    #[test]
    fn test_empty_extraction_fails() {
        let err = extractor()
            .extract("Happy to help with that! Let me know more.")
            .unwrap_err();
        assert!(matches!(
            err,
            PlanGenerationError::ExtractionFailure { response_len: 42, .. }
        ));
    }
}
