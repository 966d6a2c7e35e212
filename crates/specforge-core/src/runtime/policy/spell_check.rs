//! Spell-check enrichment.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value as Json};
use tracing::debug;

use super::{PolicyStep, StepScope};
use crate::runtime::config::SpellCheckConfig;
use crate::runtime::error::ProcessError;
use crate::runtime::model::Model;

/// Meta key under which suggestions are reported.
pub const META_KEY: &str = "spell_check";

/// Largest edit distance at which a dictionary word is suggested.
pub const MAX_EDIT_DISTANCE: usize = 2;

/// Finds unknown words in text.
pub trait SpellChecker: Send + Sync {
    /// Map each unknown word to its suggested replacements.
    fn check(&self, text: &str) -> BTreeMap<String, Vec<String>>;
}

/// Spell checker backed by a fixed word list.
#[derive(Debug, Clone)]
pub struct DictionarySpellChecker {
    words: BTreeSet<String>,
    max_suggestions: usize,
}

impl DictionarySpellChecker {
    /// Create a checker over `words`, compared case-insensitively.
    pub fn new<I, S>(words: I, max_suggestions: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .collect(),
            max_suggestions,
        }
    }

    fn suggestions(&self, word: &str) -> Vec<String> {
        let mut ranked: Vec<(usize, &String)> = self
            .words
            .iter()
            .filter_map(|candidate| {
                let distance = edit_distance(word, candidate);
                (distance <= MAX_EDIT_DISTANCE).then_some((distance, candidate))
            })
            .collect();
        ranked.sort();
        ranked
            .into_iter()
            .take(self.max_suggestions)
            .map(|(_, candidate)| candidate.clone())
            .collect()
    }
}

impl SpellChecker for DictionarySpellChecker {
    fn check(&self, text: &str) -> BTreeMap<String, Vec<String>> {
        text.split(|c: char| !c.is_alphabetic() && c != '\'')
            .map(|w| w.trim_matches('\''))
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .filter(|w| !self.words.contains(w))
            .map(|w| {
                let suggestions = self.suggestions(&w);
                (w, suggestions)
            })
            .collect()
    }
}

/// Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != *cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Reports unknown words of configured attributes in the item's meta slot.
///
/// The model is never modified.
pub struct SpellCheckPolicy {
    fields: Vec<String>,
    checker: Box<dyn SpellChecker>,
}

impl SpellCheckPolicy {
    /// Build a dictionary-backed policy from configuration.
    pub fn new(config: &SpellCheckConfig) -> Self {
        Self::with_checker(
            config.fields.clone(),
            DictionarySpellChecker::new(&config.dictionary, config.max_suggestions),
        )
    }

    /// Build a policy around any checker.
    pub fn with_checker(fields: Vec<String>, checker: impl SpellChecker + 'static) -> Self {
        Self {
            fields,
            checker: Box::new(checker),
        }
    }
}

impl PolicyStep for SpellCheckPolicy {
    fn name(&self) -> &'static str {
        "spell_check"
    }

    fn admit(&self, scope: &mut StepScope<'_, '_>, model: Model) -> Result<Model, ProcessError> {
        let mut report = Map::new();

        for field in &self.fields {
            let Some(text) = scope.mutation.str_attribute(field) else {
                continue;
            };
            let unknown = self.checker.check(text);
            if unknown.is_empty() {
                continue;
            }
            let words: Map<String, Json> = unknown
                .into_iter()
                .map(|(word, suggestions)| (word, Json::from(suggestions)))
                .collect();
            report.insert(field.clone(), Json::Object(words));
        }

        if !report.is_empty() {
            debug!(
                entity = scope.entity,
                index = scope.index,
                fields = report.len(),
                "spelling suggestions collected"
            );
            scope.meta.insert(META_KEY.to_string(), Json::Object(report));
        }

        Ok(model)
    }
}
