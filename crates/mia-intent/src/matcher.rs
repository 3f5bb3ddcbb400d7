//! Fast-tier intent matching.
//!
//! Resolves an utterance to an intent name without calling a model:
//!
//! | Step | Technique | Parameters |
//! |------|-----------|------------|
//! | 1 | Exact phrase via [`aho_corasick`], longest match wins | none |
//! | 2 | Regex patterns in registration order | named captures |
//!
//! Phrases match the lowercased utterance and must start and end on word
//! boundaries.  Patterns are compiled case-insensitively and run against
//! the original text so captured values keep their case.

use std::collections::BTreeMap;

use aho_corasick::AhoCorasick;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Which step produced a fast match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Phrase,
    Pattern,
}

/// A fast-tier hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastMatch {
    pub intent: String,
    pub kind: MatchKind,
    /// Named captures of the matching pattern; empty for phrases.
    pub captures: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct PatternRoute {
    intent: String,
    compiled: Regex,
}

// ---------------------------------------------------------------------------
// IntentMatcher
// ---------------------------------------------------------------------------

/// Phrase and pattern table built once per catalog snapshot.
#[derive(Debug, Clone, Default)]
pub struct IntentMatcher {
    /// Lowercased phrases and the intent each one selects.
    phrases: Vec<(String, String)>,
    automaton: Option<AhoCorasick>,
    patterns: Vec<PatternRoute>,
}

impl IntentMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exact phrase.  Call [`IntentMatcher::build`] once all
    /// phrases are in.
    pub fn add_phrase(&mut self, phrase: &str, intent: impl Into<String>) {
        let phrase = phrase.trim().to_lowercase();
        if phrase.is_empty() {
            return;
        }
        let intent = intent.into();
        tracing::trace!(phrase = %phrase, intent = %intent, "phrase added");
        self.phrases.push((phrase, intent));
        self.automaton = None;
    }

    /// Compile and register a regex pattern.
    pub fn add_pattern(
        &mut self,
        pattern: &str,
        intent: impl Into<String>,
    ) -> Result<(), regex::Error> {
        let compiled = compile_pattern(pattern)?;
        let intent = intent.into();
        tracing::trace!(pattern = %pattern, intent = %intent, "pattern added");
        self.patterns.push(PatternRoute { intent, compiled });
        Ok(())
    }

    /// Build the phrase automaton.
    pub fn build(&mut self) -> Result<(), aho_corasick::BuildError> {
        self.automaton = if self.phrases.is_empty() {
            None
        } else {
            let phrases: Vec<&str> = self.phrases.iter().map(|(p, _)| p.as_str()).collect();
            Some(AhoCorasick::new(&phrases)?)
        };
        Ok(())
    }

    pub fn phrase_count(&self) -> usize {
        self.phrases.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Try phrases, then patterns.  `None` means the model tier is needed.
    pub fn find(&self, utterance: &str) -> Option<FastMatch> {
        let text = utterance.trim();
        if let Some(hit) = self.find_phrase(&text.to_lowercase()) {
            tracing::debug!(utterance = %text, intent = %hit.intent, "phrase match");
            return Some(hit);
        }
        if let Some(hit) = self.find_pattern(text) {
            tracing::debug!(utterance = %text, intent = %hit.intent, "pattern match");
            return Some(hit);
        }
        None
    }

    // -- Private helpers ----------------------------------------------------

    fn find_phrase(&self, lowered: &str) -> Option<FastMatch> {
        let ac = self.automaton.as_ref()?;

        // Overlapping search so the longest phrase wins even when a shorter
        // one starts earlier.
        let mut best: Option<(usize, usize)> = None;
        for mat in ac.find_overlapping_iter(lowered) {
            if !on_word_boundaries(lowered, mat.start(), mat.end()) {
                continue;
            }
            let len = mat.end() - mat.start();
            if best.is_none_or(|(_, best_len)| len > best_len) {
                best = Some((mat.pattern().as_usize(), len));
            }
        }

        let (idx, _) = best?;
        let (_, intent) = &self.phrases[idx];
        Some(FastMatch {
            intent: intent.clone(),
            kind: MatchKind::Phrase,
            captures: BTreeMap::new(),
        })
    }

    fn find_pattern(&self, text: &str) -> Option<FastMatch> {
        for route in &self.patterns {
            if let Some(caps) = route.compiled.captures(text) {
                let captures = route
                    .compiled
                    .capture_names()
                    .flatten()
                    .filter_map(|name| {
                        caps.name(name)
                            .map(|m| (name.to_owned(), m.as_str().trim().to_owned()))
                    })
                    .collect();
                return Some(FastMatch {
                    intent: route.intent.clone(),
                    kind: MatchKind::Pattern,
                    captures,
                });
            }
        }
        None
    }
}

/// Compile a catalog pattern the way the matcher runs it.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

fn on_word_boundaries(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
