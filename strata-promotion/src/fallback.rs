//! Rule-based fact extraction used while generation is degraded.
//!
//! Each user turn is checked against lexical cues in priority order; the first
//! matching cue yields one fact at the configured fallback certainty.

use regex::Regex;

use strata_core::models::{FactType, TurnRecord, TurnRole};

/// A candidate produced by a lexical cue, before scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct CueMatch {
    pub fact_type: FactType,
    pub impact: f64,
    pub content: String,
    pub entities: Vec<String>,
    pub sequence: u64,
}

struct Cue {
    fact_type: FactType,
    impact: f64,
    pattern: Regex,
}

pub struct FallbackExtractor {
    cues: Vec<Cue>,
    entity: Option<Regex>,
}

impl std::fmt::Debug for FallbackExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackExtractor")
            .field("cues", &self.cues.len())
            .finish()
    }
}

const CUE_PATTERNS: &[(FactType, f64, &str)] = &[
    (
        FactType::Constraint,
        0.9,
        r"(?i)\b(i can(?:no|')?t|i cannot|i(?:'m| am) allergic|i must not|i never|i don't eat|i do not eat)\b",
    ),
    (
        FactType::Preference,
        0.85,
        r"(?i)\b(i (?:really |do |much )?(?:like|love|prefer|enjoy|hate|dislike|adore)|my fav(?:ou)?rite)\b",
    ),
    (
        FactType::Instruction,
        0.8,
        r"(?i)\b(please (?:always|never|remember|make sure|use|don't)|always use|remember (?:to|that)|don't forget)\b",
    ),
    (
        FactType::Personal,
        0.8,
        r"(?i)\b(my name is|i live in|i work (?:at|as|for)|i(?:'m| am) (?:a|an) [a-z]+|my (?:wife|husband|partner|son|daughter|birthday))\b",
    ),
    (
        FactType::Decision,
        0.75,
        r"(?i)\b(i(?:'ve| have)? decided|i(?:'ll| will) go with|let's go with|we (?:chose|picked|decided))\b",
    ),
];

impl FallbackExtractor {
    pub fn new() -> Self {
        let cues = CUE_PATTERNS
            .iter()
            .filter_map(|(fact_type, impact, pattern)| {
                Regex::new(pattern).ok().map(|pattern| Cue {
                    fact_type: *fact_type,
                    impact: *impact,
                    pattern,
                })
            })
            .collect();
        let entity = Regex::new(r"\b[A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)*\b").ok();
        Self { cues, entity }
    }

    /// Extract candidates from the user turns of a batch.
    pub fn extract(&self, turns: &[TurnRecord]) -> Vec<CueMatch> {
        turns
            .iter()
            .filter(|t| t.role == TurnRole::User)
            .filter_map(|t| {
                let cue = self.cues.iter().find(|c| c.pattern.is_match(&t.text))?;
                Some(CueMatch {
                    fact_type: cue.fact_type,
                    impact: cue.impact,
                    content: t.text.trim().to_string(),
                    entities: self.entities(&t.text),
                    sequence: t.sequence,
                })
            })
            .collect()
    }

    /// Capitalized phrases other than the pronoun "I" and sentence openers.
    fn entities(&self, text: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let Some(entity) = &self.entity else {
            return out;
        };
        for m in entity.find_iter(text) {
            let starts_sentence = text[..m.start()]
                .trim_end()
                .chars()
                .last()
                .map_or(true, |c| matches!(c, '.' | '!' | '?'));
            let phrase = m.as_str();
            if phrase == "I" || starts_sentence {
                continue;
            }
            if !out.iter().any(|e| e == phrase) {
                out.push(phrase.to_string());
            }
        }
        out
    }
}

impl Default for FallbackExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_fixtures::builders::{turn, turn_at};

    #[test]
    fn detects_preference_cue() {
        let ex = FallbackExtractor::new();
        let found = ex.extract(&[turn("s", 1, "I really prefer Earl Grey over coffee")]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].fact_type, FactType::Preference);
        assert_eq!(found[0].entities, vec!["Earl Grey".to_string()]);
    }

    #[test]
    fn constraint_outranks_preference() {
        let ex = FallbackExtractor::new();
        let found = ex.extract(&[turn("s", 1, "I love sushi but I'm allergic to shellfish")]);
        assert_eq!(found[0].fact_type, FactType::Constraint);
    }

    #[test]
    fn ignores_small_talk_and_assistant_turns() {
        let ex = FallbackExtractor::new();
        let turns = vec![
            turn("s", 1, "what's the weather like today?"),
            turn_at(
                "s",
                2,
                TurnRole::Assistant,
                "I love helping with that",
                test_fixtures::builders::base_time(),
            ),
        ];
        assert!(ex.extract(&turns).is_empty());
    }

    #[test]
    fn recognises_each_cue_family() {
        let ex = FallbackExtractor::new();
        let cases = [
            ("Please always answer in French", FactType::Instruction),
            ("My name is Ada", FactType::Personal),
            ("I've decided to take the train", FactType::Decision),
            ("I can't eat gluten", FactType::Constraint),
        ];
        for (text, expected) in cases {
            let found = ex.extract(&[turn("s", 1, text)]);
            assert_eq!(found.first().map(|c| c.fact_type), Some(expected), "{text}");
        }
    }
}
