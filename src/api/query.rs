//! Query-string helpers
//!
//! `serde_urlencoded` hands every value over as a string, and `#[serde(flatten)]`
//! loses the type hints that would otherwise parse numbers. Fields that are
//! flattened into a filter struct go through [`opt_from_str`] instead.

use serde::{Deserialize, Deserializer};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw<T> {
    Typed(T),
    Text(String),
}

/// Deserialize an optional value from either its native form or a string.
/// An empty string is treated as absent.
pub fn opt_from_str<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: Display,
{
    match Option::<Raw<T>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Typed(value)) => Ok(Some(value)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// `ILIKE` pattern matching `q` anywhere, with `%`, `_` and `\` escaped.
/// Blank searches yield `None` so the filter is skipped.
pub fn like_pattern(q: Option<&str>) -> Option<String> {
    let q = q.map(str::trim).filter(|s| !s.is_empty())?;
    let mut pattern = String::with_capacity(q.len() + 2);
    pattern.push('%');
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_escape_wildcards() {
        assert_eq!(like_pattern(Some(" mug ")).as_deref(), Some("%mug%"));
        assert_eq!(like_pattern(Some("50%_off")).as_deref(), Some("%50\\%\\_off%"));
        assert_eq!(like_pattern(Some("  ")), None);
        assert_eq!(like_pattern(None), None);
    }

    #[derive(Debug, Deserialize, Default)]
    struct Inner {
        #[serde(default, deserialize_with = "opt_from_str")]
        page: Option<u32>,
        #[serde(default, deserialize_with = "opt_from_str")]
        active: Option<bool>,
    }

    #[derive(Debug, Deserialize)]
    struct Outer {
        #[serde(flatten)]
        inner: Inner,
        q: Option<String>,
    }

    #[test]
    fn parses_flattened_strings() {
        let parsed: Outer = serde_json::from_value(serde_json::json!({
            "page": "3",
            "active": "true",
            "q": "mug"
        }))
        .unwrap();
        assert_eq!(parsed.inner.page, Some(3));
        assert_eq!(parsed.inner.active, Some(true));
        assert_eq!(parsed.q.as_deref(), Some("mug"));
    }

    #[test]
    fn empty_string_is_none() {
        let parsed: Outer = serde_json::from_value(serde_json::json!({ "page": "" })).unwrap();
        assert_eq!(parsed.inner.page, None);
    }

    #[test]
    fn rejects_garbage() {
        let parsed: Result<Outer, _> =
            serde_json::from_value(serde_json::json!({ "page": "three" }));
        assert!(parsed.is_err());
    }
}
