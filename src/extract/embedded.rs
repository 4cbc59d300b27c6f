use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::JobFields;
use super::text::{clean_inline, flatten_html};
use crate::normalize::LocationRaw;

static REMIX_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"window\.__remixContext\s*=\s*").expect("static regex")
});

/// Read the job post out of a server-rendered application state blob.
pub fn extract(html: &str) -> Option<JobFields> {
    let assignment = REMIX_CONTEXT.find(html)?;
    // Only the first JSON value counts; the script may keep going after it.
    let rest = &html[assignment.end()..];
    let state = match serde_json::Deserializer::from_str(rest)
        .into_iter::<Value>()
        .next()?
    {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("Embedded state is not valid JSON: {e}");
            return None;
        }
    };

    let loader_data = state.pointer("/state/loaderData")?;
    let post = find_job_post(loader_data)?;
    fields_from_post(post)
}

/// Depth-first search for the first object carrying a `jobPost` field.
fn find_job_post(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            if let Some(post) = map.get("jobPost").filter(|p| p.is_object()) {
                return Some(post);
            }
            map.values().find_map(find_job_post)
        }
        Value::Array(items) => items.iter().find_map(find_job_post),
        _ => None,
    }
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(Value::as_str)
}

fn fields_from_post(post: &Value) -> Option<JobFields> {
    let title = first_str(post, &["title"]).and_then(clean_inline)?;

    let location = ["job_post_location", "location"]
        .iter()
        .filter_map(|k| post.get(*k))
        .map(LocationRaw::from_json)
        .find(|l| *l != LocationRaw::Absent)
        .unwrap_or_default();

    Some(JobFields {
        title: Some(title),
        company: first_str(post, &["company_name", "companyName"]).and_then(clean_inline),
        description: first_str(post, &["content", "description"]).map(flatten_html),
        location,
        employment_type: first_str(post, &["employment_type", "employmentType"])
            .and_then(clean_inline),
        date_posted: first_str(post, &["published_at", "first_published", "updated_at"])
            .map(String::from),
    })
}
