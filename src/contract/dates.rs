//! Date bounds and ranges used by date-typed filters and mutations
//!
//! Absolute dates are validated and normalized here; relative bounds stay
//! symbolic and are resolved by the generated script at run time, so a
//! compiled query never depends on the wall clock.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ContractError;

const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One end of a date range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DateBound {
    /// Normalized ISO-8601 text; zone-less values are local time
    Absolute { at: String },
    Now,
    StartOfToday,
    EndOfToday,
    DaysFromNow { days: i64 },
}

impl DateBound {
    pub fn absolute(field: &str, raw: &str) -> Result<Self, ContractError> {
        Ok(DateBound::Absolute {
            at: normalize_date(field, raw)?,
        })
    }

    /// Accepts an ISO date/date-time or one of the keywords `now`, `today`,
    /// `startOfToday`, `endOfToday`
    pub fn from_external(field: &str, raw: &Value) -> Result<Self, ContractError> {
        let text = raw
            .as_str()
            .ok_or_else(|| ContractError::invalid_value(field, "date string", raw))?;
        match text.trim() {
            "now" => Ok(DateBound::Now),
            "today" | "startOfToday" => Ok(DateBound::StartOfToday),
            "endOfToday" => Ok(DateBound::EndOfToday),
            other => DateBound::absolute(field, other),
        }
    }

    fn naive(&self) -> Option<Comparable> {
        match self {
            DateBound::Absolute { at } => Comparable::parse(at),
            _ => None,
        }
    }
}

/// Normalize an external date string.
///
/// - RFC 3339 keeps its offset (`2026-03-01T09:00:00+01:00`)
/// - `YYYY-MM-DD` becomes local midnight (`2026-03-01T00:00:00`)
/// - `YYYY-MM-DD HH:MM[:SS]` / `YYYY-MM-DDTHH:MM[:SS]` becomes local time
pub fn normalize_date(field: &str, raw: &str) -> Result<String, ContractError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.format(LOCAL_FORMAT).to_string());
        }
    }
    for pattern in [
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        LOCAL_FORMAT,
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Ok(dt.format(LOCAL_FORMAT).to_string());
        }
    }
    Err(ContractError::InvalidDate {
        field: field.to_string(),
        value: raw.to_string(),
        reason: "expected YYYY-MM-DD, YYYY-MM-DD HH:MM or RFC 3339".to_string(),
    })
}

enum Comparable {
    Local(NaiveDateTime),
    Zoned(DateTime<chrono::FixedOffset>),
}

impl Comparable {
    fn parse(normalized: &str) -> Option<Self> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(normalized) {
            return Some(Comparable::Zoned(dt));
        }
        NaiveDateTime::parse_from_str(normalized, LOCAL_FORMAT)
            .ok()
            .map(Comparable::Local)
    }

    fn is_after(&self, other: &Comparable) -> bool {
        match (self, other) {
            (Comparable::Local(a), Comparable::Local(b)) => a > b,
            (Comparable::Zoned(a), Comparable::Zoned(b)) => a > b,
            // Mixed local/zoned cannot be ordered without the host's zone
            _ => false,
        }
    }
}

/// A date window; `inclusive` is set for `between`, cleared for
/// `before`/`after`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<DateBound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<DateBound>,
    pub inclusive: bool,
}

impl DateRange {
    pub fn before(bound: DateBound) -> Self {
        Self {
            after: None,
            before: Some(bound),
            inclusive: false,
        }
    }

    pub fn after(bound: DateBound) -> Self {
        Self {
            after: Some(bound),
            before: None,
            inclusive: false,
        }
    }

    pub fn between(start: DateBound, end: DateBound) -> Self {
        Self {
            after: Some(start),
            before: Some(end),
            inclusive: true,
        }
    }

    /// Inclusive window over two absolute dates, rejected when reversed
    pub fn absolute_between(field: &str, start: &str, end: &str) -> Result<Self, ContractError> {
        let range = DateRange::between(
            DateBound::absolute(field, start)?,
            DateBound::absolute(field, end)?,
        );
        range.check_order(field)?;
        Ok(range)
    }

    /// Parse the external `{before?, after?, between?: [start, end]}` shape
    pub fn from_external(field: &str, raw: &Value) -> Result<Self, ContractError> {
        let obj = raw.as_object().ok_or_else(|| {
            ContractError::invalid_value(field, "object with before/after/between", raw)
        })?;

        if let Some(key) = obj
            .keys()
            .find(|k| !matches!(k.as_str(), "before" | "after" | "between"))
        {
            return Err(ContractError::UnknownField {
                field: key.clone(),
                context: format!("'{}' date range", field),
            });
        }

        let range = match obj.get("between") {
            Some(between) => {
                if obj.contains_key("before") || obj.contains_key("after") {
                    return Err(ContractError::invalid_value(
                        field,
                        "either between or before/after",
                        raw,
                    ));
                }
                let pair = between
                    .as_array()
                    .filter(|a| a.len() == 2)
                    .ok_or_else(|| {
                        ContractError::invalid_value(field, "[start, end] pair", between)
                    })?;
                DateRange::between(
                    DateBound::from_external(field, &pair[0])?,
                    DateBound::from_external(field, &pair[1])?,
                )
            }
            None => {
                let after = obj
                    .get("after")
                    .map(|v| DateBound::from_external(field, v))
                    .transpose()?;
                let before = obj
                    .get("before")
                    .map(|v| DateBound::from_external(field, v))
                    .transpose()?;
                if after.is_none() && before.is_none() {
                    return Err(ContractError::invalid_value(
                        field,
                        "at least one of before/after/between",
                        raw,
                    ));
                }
                DateRange {
                    after,
                    before,
                    inclusive: false,
                }
            }
        };

        range.check_order(field)?;
        Ok(range)
    }

    fn check_order(&self, field: &str) -> Result<(), ContractError> {
        let (Some(start), Some(end)) = (&self.after, &self.before) else {
            return Ok(());
        };
        if let (Some(a), Some(b)) = (start.naive(), end.naive()) {
            if a.is_after(&b) {
                return Err(ContractError::InvalidDate {
                    field: field.to_string(),
                    value: format!("{:?}..{:?}", start, end),
                    reason: "range start is after range end".to_string(),
                });
            }
        }
        Ok(())
    }
}
