use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer};

const MAX_PAGE: i64 = 100;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn first(limit: i64) -> Self {
        Self { limit, offset: 0 }
    }

    /// Limit clamped to `1..=100`, offset floored at zero.
    pub fn clamped(self) -> (i64, i64) {
        (self.limit.clamp(1, MAX_PAGE), self.offset.max(0))
    }
}

/// `%term%` for ILIKE, with LIKE wildcards in the term escaped. `None` for blank input.
pub fn like_pattern(search: Option<&str>) -> Option<String> {
    let term = search.map(str::trim).filter(|s| !s.is_empty())?;
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    Some(escaped)
}

/// Query-string helper: `?status=` (empty) means "no filter" instead of a parse error.
pub fn empty_string_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let opt = Option::<String>::deserialize(de)?;
    match opt.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<T>().map(Some).map_err(serde::de::Error::custom),
    }
}
