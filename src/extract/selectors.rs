use scraper::{ElementRef, Html, Selector};

use super::JobFields;
use super::text::{clean_inline, element_text};
use crate::ats::FieldSelectors;
use crate::normalize::LocationRaw;

/// Apply the platform's configured CSS selectors. Title and description
/// must both resolve to non-empty text; the rest are optional.
pub fn extract(document: &Html, selectors: &FieldSelectors) -> Option<JobFields> {
    let title = select_first(document, selectors.title.as_deref()?)
        .and_then(|el| clean_inline(&el.text().collect::<String>()))?;

    let description = select_first(document, selectors.description.as_deref()?)
        .map(|el| element_text(&el))
        .filter(|text| !text.is_empty())?;

    let optional_text = |selector: Option<&str>| {
        selector
            .and_then(|s| select_first(document, s))
            .and_then(|el| clean_inline(&el.text().collect::<String>()))
    };

    let date_posted = selectors
        .date
        .as_deref()
        .and_then(|s| select_first(document, s))
        .and_then(|el| {
            el.value()
                .attr("datetime")
                .and_then(clean_inline)
                .or_else(|| clean_inline(&el.text().collect::<String>()))
        });

    Some(JobFields {
        title: Some(title),
        company: optional_text(selectors.company.as_deref()),
        description: Some(description),
        location: optional_text(selectors.location.as_deref())
            .map(LocationRaw::Text)
            .unwrap_or_default(),
        employment_type: None,
        date_posted,
    })
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(parsed) => document.select(&parsed).next(),
        Err(e) => {
            tracing::debug!("Invalid selector '{selector}': {e}");
            None
        }
    }
}
