mod episode;
mod fact;
mod generation;
mod knowledge_document;
mod lifecycle_event;
mod synthesis;
mod tier;
mod turn_record;

pub use episode::{Episode, WriteStatus};
pub use fact::{Fact, FactType, TurnRange};
pub use generation::{GenerationRequest, GenerationResponse, TaskType};
pub use knowledge_document::{DocumentType, KnowledgeDocument};
pub use lifecycle_event::LifecycleEvent;
pub use synthesis::{
    ConflictingValue, DocumentGroup, KnowledgeConflict, SynthesisQuery, SynthesisResult,
};
pub use tier::{IndexSide, ProcessingPath, Tier};
pub use turn_record::{TurnRecord, TurnRole};

/// Deterministic id from ordered parts: `{prefix}-{first 16 bytes of blake3, hex}`.
///
/// Used wherever a retry must land on the same record instead of a new one.
pub fn stable_id(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0x1f]);
    }
    let hex = hasher.finalize().to_hex();
    format!("{prefix}-{}", &hex.as_str()[..32])
}

/// Lower-cased, trimmed key used to group episodes by entity or topic.
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_is_deterministic_and_order_sensitive() {
        let a = stable_id("fact", &["s1", "t1", "likes tea"]);
        let b = stable_id("fact", &["s1", "t1", "likes tea"]);
        let c = stable_id("fact", &["t1", "s1", "likes tea"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("fact-"));
    }

    #[test]
    fn stable_id_separates_parts() {
        assert_ne!(stable_id("x", &["ab", "c"]), stable_id("x", &["a", "bc"]));
    }

    #[test]
    fn normalize_key_collapses_case_and_space() {
        assert_eq!(normalize_key("  Green   Tea "), "green tea");
    }
}
