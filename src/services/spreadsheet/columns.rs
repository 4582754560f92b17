//! Fuzzy header matching
//!
//! Each importable field lists the header texts it is known by. A header
//! that equals an alias after normalization scores 1.0; otherwise it scores
//! its best Jaro-Winkler similarity against the aliases. Candidates below
//! [`MIN_SIMILARITY`] are dropped and the rest are assigned greedily by
//! score, so each header and each field is used at most once.

use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;

use super::ImportError;

pub const MIN_SIMILARITY: f64 = 0.85;

/// A target column of an import
pub trait ImportField: Copy + Eq + Hash + 'static {
    /// Every field in declaration order; earlier fields win score ties
    fn all() -> &'static [Self];
    fn name(&self) -> &'static str;
    fn aliases(&self) -> &'static [&'static str];
    fn required(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatchedColumn {
    pub header: String,
    pub field: &'static str,
    pub column: usize,
    pub score: f64,
}

/// Result of matching a header row against a field set
#[derive(Debug, Clone)]
pub struct ColumnMapping<F> {
    columns: HashMap<F, usize>,
    pub matched: Vec<MatchedColumn>,
    pub unmatched_headers: Vec<String>,
}

impl<F: ImportField> ColumnMapping<F> {
    pub fn column(&self, field: F) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn has(&self, field: F) -> bool {
        self.columns.contains_key(&field)
    }
}

/// Lowercase, turn every non-alphanumeric run into one space, trim.
pub fn normalize(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut pending_space = false;

    for ch in header.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

fn similarity(header: &str, alias: &str) -> f64 {
    if header == alias {
        return 1.0;
    }
    let compact_header: String = header.split(' ').collect();
    let compact_alias: String = alias.split(' ').collect();
    if compact_header == compact_alias {
        return 1.0;
    }

    strsim::jaro_winkler(header, alias).max(strsim::jaro_winkler(&compact_header, &compact_alias))
}

fn best_score<F: ImportField>(field: F, header: &str) -> f64 {
    let by_name = similarity(header, &normalize(field.name()));
    field
        .aliases()
        .iter()
        .map(|alias| similarity(header, &normalize(alias)))
        .fold(by_name, f64::max)
}

pub fn match_columns<F: ImportField>(headers: &[String]) -> Result<ColumnMapping<F>, ImportError> {
    let normalized: Vec<String> = headers.iter().map(|h| normalize(h)).collect();

    // (score, header index, field order)
    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for (col, header) in normalized.iter().enumerate() {
        if header.is_empty() {
            continue;
        }
        for (order, field) in F::all().iter().enumerate() {
            let score = best_score(*field, header);
            if score >= MIN_SIMILARITY {
                candidates.push((score, col, order));
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });

    let mut columns = HashMap::new();
    let mut used_headers = vec![false; headers.len()];
    let mut matched = Vec::new();

    for (score, col, order) in candidates {
        let field = F::all()[order];
        if used_headers[col] || columns.contains_key(&field) {
            continue;
        }
        used_headers[col] = true;
        columns.insert(field, col);
        matched.push(MatchedColumn {
            header: headers[col].clone(),
            field: field.name(),
            column: col,
            score: (score * 1000.0).round() / 1000.0,
        });
    }
    matched.sort_by_key(|m| m.column);

    let missing: Vec<&'static str> = F::all()
        .iter()
        .filter(|f| f.required() && !columns.contains_key(*f))
        .map(|f| f.name())
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing));
    }

    let unmatched_headers = headers
        .iter()
        .enumerate()
        .filter(|(col, h)| !used_headers[*col] && !h.trim().is_empty())
        .map(|(_, h)| h.clone())
        .collect();

    Ok(ColumnMapping {
        columns,
        matched,
        unmatched_headers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Field {
        Sku,
        Name,
        Price,
        Notes,
    }

    impl ImportField for Field {
        fn all() -> &'static [Self] {
            &[Field::Sku, Field::Name, Field::Price, Field::Notes]
        }

        fn name(&self) -> &'static str {
            match self {
                Field::Sku => "sku",
                Field::Name => "name",
                Field::Price => "price",
                Field::Notes => "notes",
            }
        }

        fn aliases(&self) -> &'static [&'static str] {
            match self {
                Field::Sku => &["product code", "item code"],
                Field::Name => &["product name", "title"],
                Field::Price => &["unit price", "base price"],
                Field::Notes => &["comments"],
            }
        }

        fn required(&self) -> bool {
            matches!(self, Field::Sku | Field::Name)
        }
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case("  Product_Name ", "product name")]
    #[case("Base-Price (USD)", "base price usd")]
    #[case("SKU#", "sku")]
    #[case("", "")]
    fn normalizes_headers(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize(raw), expected);
    }

    #[test]
    fn exact_aliases_and_camel_case() {
        let mapping = match_columns::<Field>(&headers(&["Item Code", "Title", "basePrice"])).unwrap();
        assert_eq!(mapping.column(Field::Sku), Some(0));
        assert_eq!(mapping.column(Field::Name), Some(1));
        assert_eq!(mapping.column(Field::Price), Some(2));
        assert!(mapping.matched.iter().all(|m| m.score == 1.0));
    }

    #[test]
    fn fuzzy_match_tolerates_typos() {
        let mapping = match_columns::<Field>(&headers(&["sku", "Prodcut Name", "Comment"])).unwrap();
        assert_eq!(mapping.column(Field::Name), Some(1));
        assert_eq!(mapping.column(Field::Notes), Some(2));
        let name = mapping.matched.iter().find(|m| m.field == "name").unwrap();
        assert!(name.score >= MIN_SIMILARITY && name.score < 1.0);
    }

    #[test]
    fn each_field_is_used_once() {
        let mapping = match_columns::<Field>(&headers(&["sku", "name", "Product Name"])).unwrap();
        assert_eq!(mapping.column(Field::Name), Some(1));
        assert_eq!(mapping.unmatched_headers, ["Product Name"]);
    }

    #[test]
    fn unrelated_headers_stay_unmatched() {
        let mapping = match_columns::<Field>(&headers(&["sku", "name", "Warehouse"])).unwrap();
        assert!(!mapping.has(Field::Price));
        assert_eq!(mapping.unmatched_headers, ["Warehouse"]);
    }

    #[test]
    fn missing_required_columns_are_listed() {
        let err = match_columns::<Field>(&headers(&["price", "comments"])).unwrap_err();
        assert_eq!(err, ImportError::MissingColumns(vec!["sku", "name"]));
    }
}
