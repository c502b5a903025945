//! Resumable paging over a timestamp field.
//!
//! Stores only offer `field >= value` filters, so records that share the
//! cursor's timestamp come back on the next page too. The cursor remembers
//! their ids and skips them; everything strictly later resets that set.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use strata_core::{RecordFilter, SortOrder};

#[derive(Debug, Clone)]
pub struct ScanCursor {
    field: &'static str,
    at: Option<DateTime<Utc>>,
    seen_at: HashSet<String>,
}

impl ScanCursor {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            at: None,
            seen_at: HashSet::new(),
        }
    }

    /// `base` narrowed to records at or after the cursor.
    pub fn filter(&self, base: RecordFilter) -> RecordFilter {
        let base = base.not_null(self.field);
        match self.at {
            Some(at) => base.gte(self.field, at.to_rfc3339()),
            None => base,
        }
    }

    pub fn order(&self) -> SortOrder {
        SortOrder::asc(self.field)
    }

    /// Query limit that still yields `page` unseen records when every record
    /// already seen at the cursor comes back again.
    pub fn limit(&self, page: usize) -> usize {
        page + self.seen_at.len()
    }

    /// Move past one record. False when the record was already returned.
    pub fn advance(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        match self.at {
            Some(current) if at < current => false,
            Some(current) if at == current => self.seen_at.insert(id.to_string()),
            _ => {
                self.at = Some(at);
                self.seen_at.clear();
                self.seen_at.insert(id.to_string());
                true
            }
        }
    }

    pub fn position(&self) -> Option<DateTime<Utc>> {
        self.at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn fresh_cursor_only_requires_the_field() {
        let cursor = ScanCursor::new("committed_at");
        let filter = cursor.filter(RecordFilter::all());
        assert!(filter.matches(&json!({ "committed_at": "2026-03-01T09:00:00Z" })));
        assert!(!filter.matches(&json!({ "committed_at": null })));
        assert_eq!(cursor.limit(5), 5);
    }

    #[test]
    fn ties_at_the_cursor_are_skipped_once_seen() {
        let mut cursor = ScanCursor::new("committed_at");
        assert!(cursor.advance("a", t(0)));
        assert!(cursor.advance("b", t(1)));
        assert!(cursor.advance("c", t(1)));
        assert_eq!(cursor.limit(5), 7);

        // The next page repeats b and c.
        assert!(!cursor.advance("b", t(1)));
        assert!(!cursor.advance("c", t(1)));
        assert!(cursor.advance("d", t(1)));
        assert!(cursor.advance("e", t(2)));
        assert_eq!(cursor.limit(5), 6);
        assert_eq!(cursor.position(), Some(t(2)));
    }

    #[test]
    fn records_behind_the_cursor_are_rejected() {
        let mut cursor = ScanCursor::new("committed_at");
        cursor.advance("a", t(3));
        assert!(!cursor.advance("z", t(1)));

        let filter = cursor.filter(RecordFilter::all());
        assert!(filter.matches(&json!({ "committed_at": t(3).to_rfc3339() })));
        assert!(filter.matches(&json!({ "committed_at": t(4).to_rfc3339() })));
        assert!(!filter.matches(&json!({ "committed_at": t(2).to_rfc3339() })));
    }
}
