//! Askama filters used by the storefront templates.

use std::fmt::Display;

use chrono::Datelike;

/// Year for the footer copyright line.
///
/// Usage in templates: `{{ ""|current_year }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    Ok(chrono::Utc::now().year())
}

/// "1 item", "3 items".
///
/// Usage in templates: `{{ cart.count|items_label }}`
#[allow(clippy::unnecessary_wraps)]
#[askama::filter_fn]
pub fn items_label(count: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(pluralize_items(&count.to_string()))
}

fn pluralize_items(count: &str) -> String {
    if count == "1" {
        "1 item".to_owned()
    } else {
        format!("{count} items")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pluralize_items() {
        assert_eq!(pluralize_items("0"), "0 items");
        assert_eq!(pluralize_items("1"), "1 item");
        assert_eq!(pluralize_items("12"), "12 items");
    }
}
