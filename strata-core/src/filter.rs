//! Backend-neutral record filters.
//!
//! The lifecycle never emits backend query syntax. Adapters translate a
//! [`RecordFilter`] into their own language; in-process adapters can use
//! [`RecordFilter::matches`] over the record's JSON form directly.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A comparison applied to one field. Fields are dotted paths into the
/// record's serialized form, e.g. `metadata.carrier`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FilterOp {
    Eq(Value),
    In(Vec<Value>),
    /// Array field contains the value, or string field contains the substring.
    Contains(Value),
    Gte(Value),
    Lte(Value),
    IsNull,
    NotNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCondition {
    pub field: String,
    pub op: FilterOp,
}

/// Conjunction of field conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub conditions: Vec<FieldCondition>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    fn with(mut self, field: impl Into<String>, op: FilterOp) -> Self {
        self.conditions.push(FieldCondition {
            field: field.into(),
            op,
        });
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, FilterOp::Eq(value.into()))
    }

    pub fn in_values(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, FilterOp::In(values))
    }

    pub fn contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, FilterOp::Contains(value.into()))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, FilterOp::Gte(value.into()))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(field, FilterOp::Lte(value.into()))
    }

    pub fn is_null(self, field: impl Into<String>) -> Self {
        self.with(field, FilterOp::IsNull)
    }

    pub fn not_null(self, field: impl Into<String>) -> Self {
        self.with(field, FilterOp::NotNull)
    }

    /// Evaluate against a record's JSON form.
    pub fn matches(&self, record: &Value) -> bool {
        self.conditions.iter().all(|c| {
            let field = lookup(record, &c.field);
            match &c.op {
                FilterOp::Eq(v) => field.is_some_and(|f| values_equal(f, v)),
                FilterOp::In(vs) => field.is_some_and(|f| vs.iter().any(|v| values_equal(f, v))),
                FilterOp::Contains(v) => match field {
                    Some(Value::Array(items)) => items.iter().any(|i| values_equal(i, v)),
                    Some(Value::String(s)) => v.as_str().is_some_and(|needle| s.contains(needle)),
                    _ => false,
                },
                FilterOp::Gte(v) => field
                    .and_then(|f| compare_values(f, v))
                    .is_some_and(|o| o != Ordering::Less),
                FilterOp::Lte(v) => field
                    .and_then(|f| compare_values(f, v))
                    .is_some_and(|o| o != Ordering::Greater),
                FilterOp::IsNull => field.map_or(true, Value::is_null),
                FilterOp::NotNull => field.is_some_and(|f| !f.is_null()),
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Result ordering for a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Order two serialized records. Missing fields sort first ascending.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        let ord = match (lookup(a, &self.field), lookup(b, &self.field)) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        match self.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    }
}

/// Resolve a dotted path.
fn lookup<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(record, |node, key| node.get(key))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Numbers compare numerically, RFC 3339 timestamps chronologically, other
/// strings lexically. Mixed kinds are incomparable.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            match (parse_timestamp(x), parse_timestamp(y)) {
                (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "session_id": "s1",
            "processed": false,
            "sequence": 7,
            "entities": ["tea", "kyoto"],
            "timestamp": "2026-03-01T10:00:00Z",
            "metadata": { "carrier": "DHL", "lane": "EU" },
            "consolidated_episode_id": null
        })
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(RecordFilter::all().matches(&record()));
    }

    #[test]
    fn conjunction_of_conditions() {
        let f = RecordFilter::all()
            .eq("session_id", "s1")
            .eq("processed", false)
            .gte("sequence", 5);
        assert!(f.matches(&record()));
        assert!(!f.clone().eq("session_id", "s2").matches(&record()));
    }

    #[test]
    fn dotted_paths_reach_nested_metadata() {
        assert!(RecordFilter::all()
            .eq("metadata.carrier", "DHL")
            .matches(&record()));
        assert!(!RecordFilter::all()
            .eq("metadata.carrier", "FedEx")
            .matches(&record()));
    }

    #[test]
    fn contains_and_in() {
        assert!(RecordFilter::all()
            .contains("entities", "kyoto")
            .matches(&record()));
        assert!(RecordFilter::all()
            .in_values("session_id", vec![json!("s0"), json!("s1")])
            .matches(&record()));
    }

    #[test]
    fn null_checks_treat_missing_as_null() {
        assert!(RecordFilter::all()
            .is_null("consolidated_episode_id")
            .matches(&record()));
        assert!(RecordFilter::all().is_null("absent").matches(&record()));
        assert!(!RecordFilter::all().not_null("absent").matches(&record()));
    }

    #[test]
    fn timestamps_compare_chronologically_despite_fraction_width() {
        let earlier = json!({ "t": "2026-03-01T10:00:00Z" });
        let later = json!({ "t": "2026-03-01T10:00:00.500Z" });
        let order = SortOrder::asc("t");
        assert_eq!(order.compare(&earlier, &later), Ordering::Less);
        assert_eq!(SortOrder::desc("t").compare(&earlier, &later), Ordering::Greater);
    }
}
