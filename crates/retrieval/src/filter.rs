//! Filter composition for the vector index
//!
//! Builds the metadata predicate sent alongside each similarity search.
//! The grammar is the index's: numeric ranges (`$gte`/`$lte`), set
//! membership (`$in`), and conjunction (`$and`). An absent constraint is
//! expressed by omitting the clause, never by a predicate that matches
//! nothing.

use crate::expand::Discipline;
use serde_json::{json, Value};

/// Closed epoch-second range over the indexed occurrence date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateFilter {
    pub start_epoch: i64,
    pub end_epoch: i64,
}

impl DateFilter {
    pub fn to_value(&self) -> Value {
        json!({
            "date_unix": {
                "$gte": self.start_epoch,
                "$lte": self.end_epoch,
            }
        })
    }
}

/// Set-membership predicate over discipline labels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisciplineFilter {
    disciplines: Vec<Discipline>,
}

impl DisciplineFilter {
    /// Build a filter from classified disciplines; an empty set means no
    /// restriction and yields no filter at all
    pub fn new(disciplines: Vec<Discipline>) -> Option<Self> {
        if disciplines.is_empty() {
            None
        } else {
            Some(Self { disciplines })
        }
    }

    pub fn to_value(&self) -> Value {
        let labels: Vec<&str> = self.disciplines.iter().map(Discipline::label).collect();
        json!({
            "discipline": {
                "$in": labels,
            }
        })
    }
}

/// Conjunction of the temporal and discipline constraints
#[derive(Debug, Clone, Default)]
pub struct CompositeFilter {
    date: Option<DateFilter>,
    disciplines: Option<DisciplineFilter>,
}

impl CompositeFilter {
    pub fn new(date: Option<DateFilter>, disciplines: Option<DisciplineFilter>) -> Self {
        Self { date, disciplines }
    }

    /// True when no constraint is present
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.disciplines.is_none()
    }

    /// Render the filter expression, or `None` when unconstrained
    pub fn to_value(&self) -> Option<Value> {
        match (&self.date, &self.disciplines) {
            (None, None) => None,
            (Some(date), None) => Some(date.to_value()),
            (None, Some(disciplines)) => Some(disciplines.to_value()),
            (Some(date), Some(disciplines)) => Some(json!({
                "$and": [date.to_value(), disciplines.to_value()],
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_constraints_renders_nothing() {
        let filter = CompositeFilter::new(None, None);
        assert!(filter.is_empty());
        assert_eq!(filter.to_value(), None);
    }

    #[test]
    fn test_empty_discipline_set_builds_no_filter() {
        assert_eq!(DisciplineFilter::new(Vec::new()), None);
    }

    #[test]
    fn test_date_only() {
        let filter = CompositeFilter::new(
            Some(DateFilter { start_epoch: 100, end_epoch: 200 }),
            None,
        );
        assert_eq!(
            filter.to_value(),
            Some(json!({"date_unix": {"$gte": 100, "$lte": 200}}))
        );
    }

    #[test]
    fn test_discipline_only() {
        let disciplines =
            DisciplineFilter::new(vec![Discipline::Dance, Discipline::Music]).unwrap();
        let filter = CompositeFilter::new(None, Some(disciplines));
        assert_eq!(
            filter.to_value(),
            Some(json!({"discipline": {"$in": ["Danse", "Musique"]}}))
        );
    }

    #[test]
    fn test_both_constraints_are_conjoined() {
        let filter = CompositeFilter::new(
            Some(DateFilter { start_epoch: 100, end_epoch: 200 }),
            DisciplineFilter::new(vec![Discipline::Circus]),
        );
        assert_eq!(
            filter.to_value(),
            Some(json!({
                "$and": [
                    {"date_unix": {"$gte": 100, "$lte": 200}},
                    {"discipline": {"$in": ["Cirque"]}},
                ]
            }))
        );
    }
}
