use scraper::{Html, Selector};
use serde_json::Value;

use super::JobFields;
use super::text::{clean_inline, flatten_html};
use crate::normalize::LocationRaw;

const JOB_POSTING: &str = "JobPosting";

/// Read a schema.org `JobPosting` from the page's JSON-LD blocks.
pub fn extract(document: &Html) -> Option<JobFields> {
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    document
        .select(&selector)
        .filter_map(|script| {
            let body = script.text().collect::<String>();
            match serde_json::from_str::<Value>(body.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::debug!("Skipping unparseable JSON-LD block: {e}");
                    None
                }
            }
        })
        .find_map(|block| select_posting(&block).and_then(fields_from_posting))
}

/// Lists yield their first JobPosting-typed element, else their first
/// element; single objects must be typed JobPosting themselves.
fn select_posting(block: &Value) -> Option<&Value> {
    match block {
        Value::Array(items) => items
            .iter()
            .find(|item| is_job_posting(item))
            .or_else(|| items.first()),
        Value::Object(map) => {
            if is_job_posting(block) {
                Some(block)
            } else {
                map.get("@graph").and_then(select_posting)
            }
        }
        _ => None,
    }
}

fn is_job_posting(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == JOB_POSTING,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(JOB_POSTING)),
        _ => false,
    }
}

fn fields_from_posting(posting: &Value) -> Option<JobFields> {
    let title = posting.get("title").and_then(Value::as_str).and_then(clean_inline)?;

    let company = match posting.get("hiringOrganization") {
        Some(Value::String(name)) => clean_inline(name),
        Some(org) => org.get("name").and_then(Value::as_str).and_then(clean_inline),
        None => None,
    };

    let mut location = posting
        .get("jobLocation")
        .map(LocationRaw::from_json)
        .unwrap_or_default();
    if location == LocationRaw::Absent && is_telecommute(posting) {
        location = LocationRaw::text("Remote");
    }

    let employment_type = match posting.get("employmentType") {
        Some(Value::String(s)) => clean_inline(s),
        Some(Value::Array(kinds)) => {
            let kinds: Vec<&str> = kinds.iter().filter_map(Value::as_str).collect();
            clean_inline(&kinds.join(", "))
        }
        _ => None,
    };

    Some(JobFields {
        title: Some(title),
        company,
        description: posting
            .get("description")
            .and_then(Value::as_str)
            .map(flatten_html),
        location,
        employment_type,
        date_posted: posting
            .get("datePosted")
            .and_then(Value::as_str)
            .map(String::from),
    })
}

fn is_telecommute(posting: &Value) -> bool {
    match posting.get("jobLocationType") {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("TELECOMMUTE"),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .any(|s| s.eq_ignore_ascii_case("TELECOMMUTE")),
        _ => false,
    }
}
