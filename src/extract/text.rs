use scraper::{ElementRef, Html};

/// Flatten markup into plain text, one trimmed line per text run.
///
/// Entity-escaped markup (`&lt;p&gt;...`, common inside embedded JSON) is
/// decoded before parsing so it flattens the same way as real tags.
pub fn flatten_html(raw: &str) -> String {
    let decoded;
    let source = if raw.contains("&lt;") && !raw.contains('<') {
        decoded = html_escape::decode_html_entities(raw).into_owned();
        decoded.as_str()
    } else {
        raw
    };

    let fragment = Html::parse_fragment(source);
    join_lines(fragment.root_element().text())
}

/// Plain text of an element, flattened the same way as `flatten_html`.
pub fn element_text(element: &ElementRef<'_>) -> String {
    join_lines(element.text())
}

/// Single-line text for short fields such as titles and company names.
pub fn clean_inline(raw: &str) -> Option<String> {
    let decoded = html_escape::decode_html_entities(raw);
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn join_lines<'a>(runs: impl Iterator<Item = &'a str>) -> String {
    runs.flat_map(str::lines)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
