//! JSON field mapping for configurable endpoints.
//!
//! The guest-search adapter and the generic ATS vendor read arbitrary JSON
//! shapes; the mapping from item fields to candidate fields comes from the
//! source config instead of per-site code.

use chrono::{DateTime, Utc};

use super::RawCandidate;

/// Where candidate fields live inside a response item.
#[derive(Debug, Clone)]
pub struct FieldMap {
    /// Dot path to the item array, empty for a top-level array.
    pub items_path: String,
    pub title_field: String,
    pub url_field: String,
    pub location_field: String,
    pub description_field: String,
    pub date_field: String,
}

impl FieldMap {
    /// Build a mapping from an adapter config, with conventional defaults.
    pub fn from_config(config: &serde_json::Value) -> Self {
        let key = |name: &str, default: &str| {
            config
                .get(name)
                .and_then(|v| v.as_str())
                .unwrap_or(default)
                .to_string()
        };
        Self {
            items_path: key("jobs_path", "jobs"),
            title_field: key("title_field", "title"),
            url_field: key("url_field", "url"),
            location_field: key("location_field", "location"),
            description_field: key("description_field", "description"),
            date_field: key("date_field", "posted_at"),
        }
    }

    /// Locate the item array in a response, honoring the dot path.
    ///
    /// A top-level array always matches; otherwise each path segment must be
    /// an object key.
    pub fn items<'a>(&self, body: &'a serde_json::Value) -> Option<&'a Vec<serde_json::Value>> {
        if let Some(items) = body.as_array() {
            return Some(items);
        }
        let mut cursor = body;
        for segment in self.items_path.split('.').filter(|s| !s.is_empty()) {
            cursor = cursor.get(segment)?;
        }
        cursor.as_array()
    }

    /// Map one response item to a candidate. Missing required fields yield
    /// `None`; the caller counts on `drop_malformed` either way.
    pub fn candidate(&self, item: &serde_json::Value) -> Option<RawCandidate> {
        let title = item.get(&self.title_field)?.as_str()?.to_string();
        let url = item.get(&self.url_field)?.as_str()?.to_string();
        Some(RawCandidate {
            title,
            url,
            location: string_at(item, &self.location_field),
            description: string_at(item, &self.description_field),
            posted_at: item
                .get(&self.date_field)
                .and_then(parse_flexible_datetime),
        })
    }
}

fn string_at(item: &serde_json::Value, field: &str) -> Option<String> {
    item.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}

/// Parse the date formats job boards actually emit: RFC 3339 strings,
/// bare dates, or millisecond epoch numbers.
pub fn parse_flexible_datetime(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    if let Some(ms) = value.as_i64() {
        return DateTime::from_timestamp_millis(ms);
    }
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
