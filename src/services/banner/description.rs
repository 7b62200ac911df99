//! `getCourseDescription` HTML parsing.

use crate::http::UpstreamError;
use scraper::{Html, Selector};

const DESCRIPTION_SELECTOR: &str = r#"[aria-labelledby="courseDescription"]"#;

/// Concatenated, trimmed text of the course description element. `Ok(None)`
/// when the element is present but empty.
pub fn parse_description(html: &str) -> Result<Option<String>, UpstreamError> {
    let selector = Selector::parse(DESCRIPTION_SELECTOR).map_err(|e| {
        UpstreamError::assumption_violation("getCourseDescription", format!("{e:?}"))
    })?;
    let document = Html::parse_fragment(html);

    let element = document.select(&selector).next().ok_or_else(|| {
        UpstreamError::assumption_violation(
            "getCourseDescription",
            "response has no courseDescription element",
        )
    })?;

    let text: String = element.text().collect();
    let text = text.trim();
    Ok((!text.is_empty()).then(|| text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fixture() {
        let html = include_str!("../../../tests/fixtures/banner/course_description.html");
        let description = parse_description(html).unwrap().unwrap();
        assert!(description.starts_with("An introduction to programming"));
        assert!(description.ends_with("No prior experience required."));
    }

    #[test]
    fn test_nested_text_is_concatenated() {
        let html = r#"<section aria-labelledby="courseDescription">
            Intro <b>to</b> systems.
        </section>"#;
        assert_eq!(
            parse_description(html).unwrap().as_deref(),
            Some("Intro to systems.")
        );
    }

    #[test]
    fn test_empty_element() {
        let html = r#"<section aria-labelledby="courseDescription">   </section>"#;
        assert_eq!(parse_description(html).unwrap(), None);
    }

    #[test]
    fn test_missing_element_is_violation() {
        let err = parse_description("<div>nothing here</div>").unwrap_err();
        assert!(err.is_assumption_violation());
    }
}
