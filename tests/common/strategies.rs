//! Proptest strategies for alert payloads

use proptest::prelude::*;

/// Identifiers the default service pattern accepts
pub fn service_name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9][A-Za-z0-9._-]{0,63}"
}

/// Names with at least one character outside the safe set
pub fn unsafe_service_name_strategy() -> impl Strategy<Value = String> {
    (
        "[a-z0-9-]{0,16}",
        prop::sample::select(vec![";", "&", "|", "$(", "`", " ", "\n", ">", "'", "\""]),
        "[a-z0-9-]{0,16}",
    )
        .prop_map(|(head, meta, tail)| format!("{head}{meta}{tail}"))
}

/// Arbitrary non-empty text, including whitespace and control characters
pub fn non_empty_text_strategy() -> impl Strategy<Value = String> {
    any::<String>().prop_filter("payload must be non-empty", |text| !text.is_empty())
}
