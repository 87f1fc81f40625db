//! Professional term correction for accepted transcript text.
//!
//! Two passes: regex rewrite rules first, then fuzzy matching of each word
//! against a list of known terms.

use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use strsim::normalized_levenshtein;
use tracing::debug;
use vbatch_models::TranscriptSegment;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Words shorter than this are never fuzzy-corrected.
const MIN_WORD_CHARS: usize = 3;

/// One entry of a rules file.
#[derive(Debug, Clone, Deserialize)]
pub struct TermRuleEntry {
    pub pattern: String,
    pub replacement: String,
}

#[derive(Debug, Clone)]
struct TermRule {
    pattern: Regex,
    replacement: String,
}

/// Rewrites commonly misrecognised terms in transcript text.
#[derive(Debug, Clone)]
pub struct TermCorrector {
    rules: Vec<TermRule>,
    terms: Vec<String>,
    threshold: f64,
}

impl TermCorrector {
    pub fn new(terms: Vec<String>, threshold: f64) -> Self {
        Self {
            rules: Vec::new(),
            terms,
            threshold,
        }
    }

    /// Add a rewrite rule. `replacement` may use `$1`-style group references.
    pub fn with_rule(mut self, pattern: &str, replacement: impl Into<String>) -> WorkerResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| WorkerError::config_error(format!("invalid term rule '{}': {}", pattern, e)))?;
        self.rules.push(TermRule {
            pattern,
            replacement: replacement.into(),
        });
        Ok(self)
    }

    /// Load rules from a JSON array of `{"pattern", "replacement"}` objects.
    pub fn with_rules_file(self, path: &Path) -> WorkerResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WorkerError::config_error(format!("cannot read {}: {}", path.display(), e)))?;
        let rules: Vec<TermRuleEntry> = serde_json::from_str(&raw)
            .map_err(|e| WorkerError::config_error(format!("invalid rules file {}: {}", path.display(), e)))?;

        rules
            .into_iter()
            .try_fold(self, |corrector, rule| corrector.with_rule(&rule.pattern, rule.replacement))
    }

    /// Build from config; `None` when no terms or rules are configured.
    pub fn from_config(config: &WorkerConfig) -> WorkerResult<Option<Self>> {
        if config.professional_terms.is_empty() && config.term_rules_file.is_none() {
            return Ok(None);
        }

        let corrector = Self::new(config.professional_terms.clone(), config.term_similarity);
        let corrector = match &config.term_rules_file {
            Some(path) => corrector.with_rules_file(path)?,
            None => corrector,
        };
        Ok(Some(corrector))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.terms.is_empty()
    }

    /// Apply rules, then fuzzy term matching.
    pub fn correct(&self, text: &str) -> String {
        let mut corrected = text.to_string();
        for rule in &self.rules {
            if rule.pattern.is_match(&corrected) {
                debug!(pattern = %rule.pattern, "Applying term rule");
                corrected = rule.pattern.replace_all(&corrected, rule.replacement.as_str()).into_owned();
            }
        }

        if self.terms.is_empty() {
            return corrected;
        }
        self.correct_words(&corrected)
    }

    /// Correct each segment in place; returns how many changed.
    pub fn correct_segments(&self, segments: &mut [TranscriptSegment]) -> usize {
        let mut changed = 0;
        for segment in segments.iter_mut() {
            let corrected = self.correct(&segment.text);
            if corrected != segment.text && !corrected.trim().is_empty() {
                segment.text = corrected;
                changed += 1;
            }
        }
        changed
    }

    fn correct_words(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut word = String::new();

        for ch in text.chars() {
            if ch.is_alphanumeric() {
                word.push(ch);
                continue;
            }
            self.push_word(&mut result, &word);
            word.clear();
            result.push(ch);
        }
        self.push_word(&mut result, &word);

        result
    }

    fn push_word(&self, out: &mut String, word: &str) {
        match self.closest_term(word) {
            Some(term) => out.push_str(term),
            None => out.push_str(word),
        }
    }

    /// Best term at or above the threshold, unless the word already is one.
    fn closest_term(&self, word: &str) -> Option<&str> {
        if word.chars().count() < MIN_WORD_CHARS {
            return None;
        }

        let lower = word.to_lowercase();
        let mut best: Option<(&str, f64)> = None;
        for term in &self.terms {
            let candidate = term.to_lowercase();
            if candidate == lower {
                return None;
            }
            let score = normalized_levenshtein(&lower, &candidate);
            if score >= self.threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((term.as_str(), score));
            }
        }

        if let Some((term, score)) = best {
            debug!(word, term, score, "Term correction");
        }
        best.map(|(term, _)| term)
    }
}
