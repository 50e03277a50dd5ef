use std::collections::BTreeMap;
use std::fs;

use serde::{Deserialize, Serialize};

use pairpad_core::error::{PairpadError, Result};
use pairpad_core::model::{Language, RoomSettings};

const EMBEDDED: &str = include_str!("../../assets/problems.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub input: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub title: String,
    pub difficulty: String,
    pub description: String,
    #[serde(default)]
    pub examples: Vec<Example>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub given_python: Option<String>,
    #[serde(default)]
    pub given_javascript: Option<String>,
    #[serde(default)]
    pub given_java: Option<String>,
}

impl Problem {
    pub fn starter_code(&self, language: Language) -> Option<&str> {
        match language {
            Language::Python => self.given_python.as_deref(),
            Language::Javascript => self.given_javascript.as_deref(),
            Language::Java => self.given_java.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ProblemSet {
    problems: Vec<Problem>,
}

type Sets = BTreeMap<String, ProblemSet>;

/// `subject -> difficulty -> set number -> problems`.
///
/// Absent keys resolve to `None`/empty rather than errors; callers show a
/// "no content available" state instead.
#[derive(Debug, Clone)]
pub struct ProblemCatalog {
    subjects: BTreeMap<String, BTreeMap<String, Sets>>,
}

impl ProblemCatalog {
    pub fn from_json(s: &str) -> Result<Self> {
        let subjects = serde_json::from_str(s)
            .map_err(|e| PairpadError::BadRequest(format!("invalid problem catalog: {e}")))?;
        Ok(Self { subjects })
    }

    /// Catalog bundled with the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_json(EMBEDDED)
    }

    /// Load `path`, or the embedded catalog when none is configured.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => {
                let s = fs::read_to_string(p)
                    .map_err(|e| PairpadError::Internal(format!("read problem catalog {p} failed: {e}")))?;
                Self::from_json(&s)
            }
            None => Self::embedded(),
        }
    }

    pub fn problems(&self, settings: &RoomSettings) -> Option<&[Problem]> {
        self.subjects
            .get(&settings.subject_name)?
            .get(&settings.difficulty)?
            .get(&settings.set_number.to_string())
            .map(|set| set.problems.as_slice())
    }

    pub fn problem(&self, settings: &RoomSettings, index: u32) -> Option<&Problem> {
        self.problems(settings)?.get(index as usize)
    }

    pub fn set_len(&self, settings: &RoomSettings) -> usize {
        self.problems(settings).map(|p| p.len()).unwrap_or(0)
    }

    pub fn subjects(&self) -> Vec<&str> {
        self.subjects.keys().map(String::as_str).collect()
    }

    pub fn difficulties(&self, subject: &str) -> Vec<&str> {
        self.subjects
            .get(subject)
            .map(|d| d.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Numeric set keys, ascending. Non-numeric keys are skipped.
    pub fn set_numbers(&self, subject: &str, difficulty: &str) -> Vec<u32> {
        let mut nums: Vec<u32> = self
            .subjects
            .get(subject)
            .and_then(|d| d.get(difficulty))
            .map(|sets| sets.keys().filter_map(|k| k.parse().ok()).collect())
            .unwrap_or_default();
        nums.sort_unstable();
        nums
    }

    /// First subject/difficulty/set in catalog order.
    pub fn first_settings(&self) -> Option<RoomSettings> {
        let (subject, diffs) = self.subjects.iter().next()?;
        let (difficulty, _) = diffs.iter().next()?;
        let set_number = *self.set_numbers(subject, difficulty).first()?;
        Some(RoomSettings {
            subject_name: subject.clone(),
            difficulty: difficulty.clone(),
            set_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings() -> RoomSettings {
        RoomSettings {
            subject_name: "Strings & Arrays".into(),
            difficulty: "Foundational".into(),
            set_number: 1,
        }
    }

    #[test]
    fn embedded_catalog_resolves_sets() {
        let cat = ProblemCatalog::embedded().unwrap();
        assert_eq!(cat.set_len(&strings()), 3);
        assert_eq!(cat.problem(&strings(), 0).unwrap().title, "Two Sum");
        assert_eq!(cat.subjects(), vec!["Stacks", "Strings & Arrays"]);
        assert_eq!(cat.set_numbers("Stacks", "Foundational"), vec![1]);
    }

    #[test]
    fn absent_lookups_degrade_to_none() {
        let cat = ProblemCatalog::embedded().unwrap();
        let mut missing = strings();
        missing.set_number = 42;
        assert!(cat.problems(&missing).is_none());
        assert_eq!(cat.set_len(&missing), 0);
        assert!(cat.problem(&strings(), 99).is_none());
        assert!(cat.difficulties("Graphs").is_empty());
    }

    #[test]
    fn starter_code_is_per_language() {
        let cat = ProblemCatalog::embedded().unwrap();
        let p = cat.problem(&strings(), 2).unwrap();
        assert!(p.starter_code(Language::Python).unwrap().contains("is_palindrome"));
        assert!(p.starter_code(Language::Java).is_none());
    }

    #[test]
    fn malformed_catalog_is_rejected() {
        assert!(ProblemCatalog::from_json(r#"{"S":{"D":{"1":{}}}}"#).is_err());
    }
}
