use serde_json::Value;

/// Location as found on a page, before it is reduced to a display string.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LocationRaw {
    #[default]
    Absent,
    Text(String),
    Structured(Address),
    List(Vec<LocationRaw>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Address {
    pub locality: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

impl LocationRaw {
    /// Classify a JSON value from structured metadata or embedded state.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::text(s),
            Value::Array(items) => {
                let items: Vec<LocationRaw> = items
                    .iter()
                    .map(Self::from_json)
                    .filter(|l| *l != LocationRaw::Absent)
                    .collect();
                if items.is_empty() {
                    LocationRaw::Absent
                } else {
                    LocationRaw::List(items)
                }
            }
            Value::Object(map) => {
                // schema.org Place wraps a PostalAddress (or plain text).
                if let Some(inner) = map.get("address") {
                    let resolved = Self::from_json(inner);
                    if resolved != LocationRaw::Absent {
                        return resolved;
                    }
                }
                let address = Address {
                    locality: string_field(value, &["addressLocality", "city"]),
                    region: string_field(value, &["addressRegion", "region", "state"]),
                    country: country_field(value),
                };
                if address != Address::default() {
                    return LocationRaw::Structured(address);
                }
                map.get("name")
                    .and_then(Value::as_str)
                    .map(Self::text)
                    .unwrap_or_default()
            }
            _ => LocationRaw::Absent,
        }
    }

    pub fn text(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            LocationRaw::Absent
        } else {
            LocationRaw::Text(s.to_string())
        }
    }

    /// Reduce to a single display string.
    pub fn display(&self) -> Option<String> {
        match self {
            LocationRaw::Absent => None,
            LocationRaw::Text(s) => Some(s.clone()),
            LocationRaw::Structured(address) => {
                let parts: Vec<&str> = [&address.locality, &address.region, &address.country]
                    .into_iter()
                    .flatten()
                    .map(String::as_str)
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(", "))
                }
            }
            LocationRaw::List(items) => {
                let mut seen: Vec<String> = Vec::new();
                for item in items {
                    if let Some(s) = item.display()
                        && !seen.contains(&s)
                    {
                        seen.push(s);
                    }
                }
                if seen.is_empty() {
                    None
                } else {
                    Some(seen.join("; "))
                }
            }
        }
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

fn country_field(value: &Value) -> Option<String> {
    match value.get("addressCountry") {
        Some(Value::Object(_)) => value
            .get("addressCountry")
            .and_then(|c| string_field(c, &["name"])),
        _ => string_field(value, &["addressCountry", "country"]),
    }
}
