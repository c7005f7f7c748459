//! Temporal constraint resolution
//!
//! Extracts date constraints from the query text via the text-generation
//! provider, anchored to a civil-calendar context, and normalizes them into
//! an epoch-second range filter. Extraction output is treated as untrusted
//! free text: anything malformed degrades to "no date found" rather than an
//! error.

use crate::calendar::CivilCalendar;
use crate::filter::DateFilter;
use chrono::{LocalResult, NaiveDate, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;
use std::sync::Arc;
use vitrine_common::generation::{ChatMessage, TextGenerator};
use vitrine_common::metrics;

/// Shape of the extracted constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    /// A date written out in the query ("March 15th")
    Explicit,
    /// Resolved from a relative phrase ("tomorrow", "this weekend")
    Relative,
    /// A continuous span ("next week", "from the 15th to the 20th")
    Interval,
    /// Several disjoint days ("Tuesday or Thursday")
    Multiple,
}

/// Inclusive bounds of a continuous date span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalBounds {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Result of temporal extraction
///
/// When `is_interval` is set, `interval_bounds` is present with
/// `start <= end`; otherwise `dates` holds the discrete days, ascending.
/// `kind` is meaningful only when `found` is set.
#[derive(Debug, Clone)]
pub struct TemporalExtraction {
    pub found: bool,
    pub dates: Vec<NaiveDate>,
    pub kind: TemporalKind,
    pub is_interval: bool,
    pub interval_bounds: Option<IntervalBounds>,
}

impl TemporalExtraction {
    /// The degraded result: no temporal restriction
    pub fn not_found() -> Self {
        Self {
            found: false,
            dates: Vec::new(),
            kind: TemporalKind::Relative,
            is_interval: false,
            interval_bounds: None,
        }
    }
}

/// Wire format of the extraction response; every field is optional so a
/// partially valid payload still deserializes
#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    date_found: bool,
    #[serde(default)]
    dates: Vec<String>,
    #[serde(default)]
    date_type: Option<String>,
    #[serde(default)]
    is_interval: bool,
    #[serde(default)]
    interval_bounds: Option<RawBounds>,
}

#[derive(Debug, Deserialize)]
struct RawBounds {
    start: String,
    end: String,
}

/// Resolves date constraints from query text
pub struct TemporalResolver {
    generator: Arc<dyn TextGenerator>,
    temperature: f32,
    tz: Tz,
}

impl TemporalResolver {
    pub fn new(generator: Arc<dyn TextGenerator>, temperature: f32, tz: Tz) -> Self {
        Self { generator, temperature, tz }
    }

    /// Extract the temporal constraint from `query`. Provider faults and
    /// malformed output both come back as `found = false`.
    pub async fn resolve(&self, query: &str, calendar: &CivilCalendar) -> TemporalExtraction {
        match self.try_resolve(query, calendar).await {
            Ok(extraction) => {
                tracing::debug!(
                    found = extraction.found,
                    is_interval = extraction.is_interval,
                    dates = extraction.dates.len(),
                    "Temporal extraction completed"
                );
                extraction
            }
            Err(e) => {
                tracing::warn!(error = %e, "Temporal extraction failed, dropping date restriction");
                metrics::record_extraction_fallback("temporal");
                TemporalExtraction::not_found()
            }
        }
    }

    async fn try_resolve(
        &self,
        query: &str,
        calendar: &CivilCalendar,
    ) -> vitrine_common::Result<TemporalExtraction> {
        let messages = self.build_messages(query, calendar);
        let response = self.generator.generate(&messages, self.temperature).await?;
        let raw: RawExtraction = serde_json::from_str(extract_json(&response))?;
        Ok(validate(raw))
    }

    fn build_messages(&self, query: &str, calendar: &CivilCalendar) -> Vec<ChatMessage> {
        let weekend = calendar
            .weekend_dates()
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let next_week = calendar
            .next_week_dates()
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let system = format!(
            r#"Analyze the text and extract any date constraint using this context:
Date: {today}
Weekday: {weekday}
Month: {month}
Tomorrow: {tomorrow}
Weekend: {weekend}
Next week: {next_week}

For a continuous span ("next week", "from the 15th to the 20th"):
- is_interval: true
- interval_bounds: {{"start": first_date, "end": last_date}}

For distinct specific days ("Tuesday or Thursday"):
- is_interval: false

Respond with JSON only:
{{
    "date_found": bool,
    "dates": ["YYYY-MM-DD"],
    "date_type": "explicit|relative|interval|multiple",
    "is_interval": bool,
    "interval_bounds": {{"start": "YYYY-MM-DD", "end": "YYYY-MM-DD"}} or null
}}"#,
            today = calendar.today(),
            weekday = calendar.weekday_name(),
            month = calendar.month_name(),
            tomorrow = calendar.tomorrow(),
            weekend = weekend,
            next_week = next_week,
        );

        vec![ChatMessage::system(system), ChatMessage::user(query)]
    }

    /// Normalize an extraction into the index filter range plus the primary
    /// resolved date (the interval start, or the first discrete date).
    /// Bounds are localized to 00:00:00 / 23:59:59 in the configured
    /// timezone before conversion to epoch seconds.
    pub fn date_filter(&self, extraction: &TemporalExtraction) -> Option<(DateFilter, String)> {
        if !extraction.found {
            return None;
        }

        let (start, end, target) = if extraction.is_interval {
            let bounds = extraction.interval_bounds.as_ref()?;
            (bounds.start, bounds.end, bounds.start)
        } else {
            let first = *extraction.dates.first()?;
            let last = *extraction.dates.last()?;
            (first, last, first)
        };

        let start_epoch = local_epoch(start, (0, 0, 0), self.tz)?;
        let end_epoch = local_epoch(end, (23, 59, 59), self.tz)?;

        tracing::debug!(
            start_epoch,
            end_epoch,
            target = %target,
            "Date filter constructed"
        );

        Some((DateFilter { start_epoch, end_epoch }, target.to_string()))
    }
}

/// Validate the wire payload into a well-formed extraction; any invariant
/// violation degrades to not-found
fn validate(raw: RawExtraction) -> TemporalExtraction {
    if !raw.date_found {
        return TemporalExtraction::not_found();
    }

    let kind = match raw.date_type.as_deref() {
        Some("explicit") => TemporalKind::Explicit,
        Some("interval") => TemporalKind::Interval,
        Some("multiple") => TemporalKind::Multiple,
        _ => TemporalKind::Relative,
    };

    let mut dates: Vec<NaiveDate> = raw
        .dates
        .iter()
        .filter_map(|s| parse_date(s))
        .collect();
    dates.sort();
    dates.dedup();

    if raw.is_interval {
        let bounds = raw.interval_bounds.as_ref().and_then(|b| {
            let start = parse_date(&b.start)?;
            let end = parse_date(&b.end)?;
            (start <= end).then_some(IntervalBounds { start, end })
        });

        let Some(bounds) = bounds else {
            tracing::warn!("Interval extraction without usable bounds, dropping");
            return TemporalExtraction::not_found();
        };

        return TemporalExtraction {
            found: true,
            dates,
            kind,
            is_interval: true,
            interval_bounds: Some(bounds),
        };
    }

    if dates.is_empty() {
        return TemporalExtraction::not_found();
    }

    TemporalExtraction {
        found: true,
        dates,
        kind,
        is_interval: false,
        interval_bounds: None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Trim the response to its outermost JSON object; models occasionally wrap
/// payloads in code fences or prose
fn extract_json(response: &str) -> &str {
    let start = response.find('{');
    let end = response.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => &response[start..=end],
        _ => response,
    }
}

fn local_epoch(date: NaiveDate, (h, m, s): (u32, u32, u32), tz: Tz) -> Option<i64> {
    let naive = date.and_hms_opt(h, m, s)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.timestamp()),
        // DST fold: take the earlier instant
        LocalResult::Ambiguous(dt, _) => Some(dt.timestamp()),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vitrine_common::errors::AppError;

    struct CannedGenerator(String);

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, _: &[ChatMessage], _: f32) -> vitrine_common::Result<String> {
            Ok(self.0.clone())
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(&self, _: &[ChatMessage], _: f32) -> vitrine_common::Result<String> {
            Err(AppError::GenerationError { message: "boom".into() })
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    fn montreal() -> Tz {
        "America/Montreal".parse().unwrap()
    }

    fn resolver(response: &str) -> TemporalResolver {
        TemporalResolver::new(Arc::new(CannedGenerator(response.to_string())), 0.0, montreal())
    }

    fn calendar_on(y: i32, m: u32, d: u32) -> CivilCalendar {
        CivilCalendar::for_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[tokio::test]
    async fn test_interval_extraction() {
        let r = resolver(
            r#"{"date_found": true, "dates": ["2024-03-11"], "date_type": "interval",
               "is_interval": true,
               "interval_bounds": {"start": "2024-03-11", "end": "2024-03-17"}}"#,
        );
        let extraction = r.resolve("next week", &calendar_on(2024, 3, 4)).await;
        assert!(extraction.found);
        assert!(extraction.is_interval);
        let bounds = extraction.interval_bounds.unwrap();
        assert_eq!(bounds.start, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(bounds.end, NaiveDate::from_ymd_opt(2024, 3, 17).unwrap());
    }

    #[tokio::test]
    async fn test_discrete_dates_sorted() {
        let r = resolver(
            r#"{"date_found": true, "dates": ["2024-03-14", "2024-03-12"],
               "date_type": "multiple", "is_interval": false}"#,
        );
        let extraction = r.resolve("tuesday or thursday", &calendar_on(2024, 3, 11)).await;
        assert!(extraction.found);
        assert!(!extraction.is_interval);
        assert_eq!(
            extraction.dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn test_provider_failure_degrades() {
        let r = TemporalResolver::new(Arc::new(FailingGenerator), 0.0, montreal());
        let extraction = r.resolve("tomorrow", &calendar_on(2024, 3, 4)).await;
        assert!(!extraction.found);
    }

    #[tokio::test]
    async fn test_malformed_json_degrades() {
        let r = resolver("sorry, I can't help with that");
        let extraction = r.resolve("tomorrow", &calendar_on(2024, 3, 4)).await;
        assert!(!extraction.found);
    }

    #[tokio::test]
    async fn test_fenced_json_is_accepted() {
        let r = resolver(
            "```json\n{\"date_found\": true, \"dates\": [\"2024-03-05\"], \"date_type\": \"relative\", \"is_interval\": false}\n```",
        );
        let extraction = r.resolve("tomorrow", &calendar_on(2024, 3, 4)).await;
        assert!(extraction.found);
        assert_eq!(extraction.dates.len(), 1);
    }

    #[tokio::test]
    async fn test_interval_with_inverted_bounds_degrades() {
        let r = resolver(
            r#"{"date_found": true, "dates": [], "date_type": "interval",
               "is_interval": true,
               "interval_bounds": {"start": "2024-03-20", "end": "2024-03-10"}}"#,
        );
        let extraction = r.resolve("whenever", &calendar_on(2024, 3, 4)).await;
        assert!(!extraction.found);
    }

    #[test]
    fn test_no_date_means_no_filter() {
        let r = resolver("{}");
        assert!(r.date_filter(&TemporalExtraction::not_found()).is_none());
    }

    #[test]
    fn test_weekend_interval_filter_bounds() {
        // Scenario: "this weekend" anchored on Monday 2024-03-04 spans
        // Saturday 00:00:00 through Sunday 23:59:59, America/Montreal
        // (EST, UTC-5 on those dates).
        let r = resolver("{}");
        let extraction = TemporalExtraction {
            found: true,
            dates: Vec::new(),
            kind: TemporalKind::Interval,
            is_interval: true,
            interval_bounds: Some(IntervalBounds {
                start: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
                end: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
            }),
        };

        let (filter, target) = r.date_filter(&extraction).unwrap();
        // 2024-03-09T00:00:00-05:00
        assert_eq!(filter.start_epoch, 1709960400);
        // 2024-03-10T23:59:59-04:00 (DST begins that Sunday morning)
        assert_eq!(filter.end_epoch, 1710129599);
        assert!(filter.start_epoch <= filter.end_epoch);
        assert_eq!(target, "2024-03-09");
    }

    #[test]
    fn test_single_date_spans_one_day() {
        let r = resolver("{}");
        let extraction = TemporalExtraction {
            found: true,
            dates: vec![NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()],
            kind: TemporalKind::Explicit,
            is_interval: false,
            interval_bounds: None,
        };

        let (filter, target) = r.date_filter(&extraction).unwrap();
        assert_eq!(filter.end_epoch - filter.start_epoch, 86_399);
        assert_eq!(target, "2024-01-15");
    }

    #[test]
    fn test_discrete_dates_span_first_to_last() {
        let r = resolver("{}");
        let extraction = TemporalExtraction {
            found: true,
            dates: vec![
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 18).unwrap(),
            ],
            kind: TemporalKind::Multiple,
            is_interval: false,
            interval_bounds: None,
        };

        let (filter, target) = r.date_filter(&extraction).unwrap();
        // Four calendar days inclusive
        assert_eq!(filter.end_epoch - filter.start_epoch, 4 * 86_400 - 1);
        assert_eq!(target, "2024-01-15");
    }

    #[test]
    fn test_unparseable_dates_are_skipped() {
        let raw = RawExtraction {
            date_found: true,
            dates: vec!["2024-03-12".into(), "soon".into(), "03/15/2024".into()],
            date_type: Some("multiple".into()),
            is_interval: false,
            interval_bounds: None,
        };
        let extraction = validate(raw);
        assert!(extraction.found);
        assert_eq!(extraction.dates.len(), 1);
    }
}
