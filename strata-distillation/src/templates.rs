//! Deterministic document text used when generation is degraded.

use strata_core::models::{DocumentType, Episode};

/// Render one document of `document_type` for `topic_key` from its episodes.
/// `episodes` must be non-empty and ordered oldest first.
pub fn render(document_type: DocumentType, topic_key: &str, episodes: &[Episode]) -> String {
    let count = episodes.len();
    let first = episodes.first().map(|e| e.window_start.format("%Y-%m-%d").to_string());
    let last = episodes.last().map(|e| e.window_end.format("%Y-%m-%d").to_string());
    let span = match (first, last) {
        (Some(a), Some(b)) if a == b => format!("on {a}"),
        (Some(a), Some(b)) => format!("between {a} and {b}"),
        _ => String::new(),
    };

    match document_type {
        DocumentType::Summary => {
            let mut text = format!("{topic_key}: {count} episodes {span}.");
            for episode in episodes {
                text.push_str("\n- ");
                text.push_str(first_line(&episode.narrative));
            }
            text
        }
        DocumentType::Insight => format!(
            "{topic_key} is a recurring subject, raised in {count} separate episodes {span}."
        ),
        DocumentType::Pattern => {
            let sessions = distinct_sessions(episodes);
            format!("{topic_key} comes up repeatedly: {count} episodes across {sessions} session(s).")
        }
        DocumentType::Recommendation => {
            format!("Account for {topic_key} in future interactions; it has been discussed {count} times.")
        }
        DocumentType::Rule => format!(
            "When {topic_key} comes up, apply what was established in the {count} prior episodes."
        ),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}

fn distinct_sessions(episodes: &[Episode]) -> usize {
    let mut sessions: Vec<&str> = episodes.iter().map(|e| e.session_id.as_str()).collect();
    sessions.sort_unstable();
    sessions.dedup();
    sessions.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_fixtures::builders::EpisodeBuilder;

    #[test]
    fn summary_lists_each_episode() {
        let eps = vec![
            EpisodeBuilder::new("s1", &["f1"]).narrative("Chose green tea\nthen left").build(),
            EpisodeBuilder::new("s2", &["f2"]).narrative("Asked for green tea again").build(),
        ];
        let text = render(DocumentType::Summary, "green tea", &eps);
        assert!(text.starts_with("green tea: 2 episodes"));
        assert!(text.contains("- Chose green tea\n"));
        assert!(text.contains("- Asked for green tea again"));
    }

    #[test]
    fn pattern_counts_sessions() {
        let eps = vec![
            EpisodeBuilder::new("s1", &["f1"]).build(),
            EpisodeBuilder::new("s1", &["f2"]).build(),
            EpisodeBuilder::new("s2", &["f3"]).build(),
        ];
        assert!(render(DocumentType::Pattern, "tea", &eps).contains("3 episodes across 2 session(s)"));
    }
}
