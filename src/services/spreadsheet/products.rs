//! Product workbook parsing
//!
//! Rows sharing a sku describe one product; each row may also carry one
//! variant. Product columns are read from the first row of a sku and later
//! rows only contribute variants.

use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

use super::columns::{match_columns, ColumnMapping, ImportField};
use super::{split_header, Cell, ImportError, RowError};
use crate::domain::products::{check_compare_at, ProductStatus};
use crate::domain::MAX_MONEY;
use crate::services::pricing::round_money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductField {
    Sku,
    Name,
    Description,
    Brand,
    Categories,
    BasePrice,
    CompareAtPrice,
    Status,
    VariantSku,
    VariantName,
    VariantPrice,
}

impl ImportField for ProductField {
    fn all() -> &'static [Self] {
        use ProductField::*;
        &[
            Sku,
            Name,
            Description,
            Brand,
            Categories,
            BasePrice,
            CompareAtPrice,
            Status,
            VariantSku,
            VariantName,
            VariantPrice,
        ]
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Sku => "sku",
            Self::Name => "name",
            Self::Description => "description",
            Self::Brand => "brand",
            Self::Categories => "categories",
            Self::BasePrice => "base_price",
            Self::CompareAtPrice => "compare_at_price",
            Self::Status => "status",
            Self::VariantSku => "variant_sku",
            Self::VariantName => "variant_name",
            Self::VariantPrice => "variant_price",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Sku => &["sku", "product sku", "product code", "item code", "code"],
            Self::Name => &["name", "product name", "title", "product title"],
            Self::Description => &["description", "product description", "details", "body"],
            Self::Brand => &["brand", "brand name", "manufacturer", "vendor"],
            Self::Categories => &["categories", "category", "collections"],
            Self::BasePrice => &["price", "base price", "unit price", "retail price"],
            Self::CompareAtPrice => &["compare at", "compare at price", "msrp", "original price"],
            Self::Status => &["status", "state"],
            Self::VariantSku => &["variant sku", "option sku"],
            Self::VariantName => &["variant name", "variant", "option name"],
            Self::VariantPrice => &["variant price", "option price"],
        }
    }

    fn required(&self) -> bool {
        matches!(self, Self::Sku | Self::Name | Self::BasePrice)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantImport {
    pub row: usize,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductImport {
    /// Spreadsheet row the product columns came from
    pub row: usize,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub brand: Option<String>,
    pub categories: Vec<String>,
    pub base_price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub status: Option<ProductStatus>,
    pub variants: Vec<VariantImport>,
}

#[derive(Debug)]
pub struct ParsedProducts {
    pub products: Vec<ProductImport>,
    pub errors: Vec<RowError>,
    /// Non-blank data rows
    pub total_rows: usize,
    /// Rows rejected with at least one error
    pub skipped: usize,
    pub mapping: ColumnMapping<ProductField>,
}

const MAX_SKU_LEN: usize = 64;
const MAX_NAME_LEN: usize = 200;

static EMPTY: Cell = Cell::Empty;

/// Parse a money cell. Currency symbols, thousands separators and spaces are
/// ignored in text cells; the result is rounded to cents.
pub fn parse_money(cell: &Cell) -> Result<Option<Decimal>, String> {
    let value = match cell {
        Cell::Empty => return Ok(None),
        Cell::Number(n) => Decimal::try_from(*n).map_err(|_| format!("'{n}' is not a valid amount"))?,
        Cell::Bool(_) => return Err("expected an amount".to_string()),
        Cell::Text(raw) => {
            let cleaned: String = raw
                .chars()
                .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' ' | '\u{a0}'))
                .collect();
            if cleaned.is_empty() {
                return Ok(None);
            }
            cleaned
                .parse::<Decimal>()
                .map_err(|_| format!("'{}' is not a valid amount", raw.trim()))?
        }
    };

    if value.is_sign_negative() && !value.is_zero() {
        return Err("must not be negative".to_string());
    }
    let value = round_money(value);
    if value > MAX_MONEY {
        return Err(format!("must not exceed {MAX_MONEY}"));
    }
    Ok(Some(value))
}

/// Accepts the stored names plus a few storefront synonyms.
pub fn parse_status(text: &str) -> Result<ProductStatus, String> {
    match text.trim().to_ascii_lowercase().as_str() {
        "published" | "live" | "enabled" => Ok(ProductStatus::Active),
        "hidden" | "unpublished" => Ok(ProductStatus::Draft),
        "discontinued" | "retired" => Ok(ProductStatus::Archived),
        other => other
            .parse()
            .map_err(|_| format!("unknown status '{}'", text.trim())),
    }
}

/// Split `"Mugs, Kitchen; Gifts"` into distinct names, keeping first spelling.
pub fn parse_categories(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .map(str::to_string)
        .collect()
}

struct RowReader<'a> {
    row: usize,
    cells: &'a [Cell],
    mapping: &'a ColumnMapping<ProductField>,
    errors: Vec<RowError>,
}

impl<'a> RowReader<'a> {
    fn cell(&self, field: ProductField) -> &'a Cell {
        self.mapping
            .column(field)
            .and_then(|col| self.cells.get(col))
            .unwrap_or(&EMPTY)
    }

    fn text(&self, field: ProductField) -> Option<String> {
        self.cell(field).as_text()
    }

    fn error(&mut self, field: ProductField, message: impl Into<String>) {
        self.errors
            .push(RowError::new(self.row, Some(field.name()), message));
    }

    fn bounded_text(&mut self, field: ProductField, max: usize) -> Option<String> {
        let value = self.text(field)?;
        if value.chars().count() > max {
            self.error(field, format!("must be at most {max} characters"));
            return None;
        }
        Some(value)
    }

    fn money(&mut self, field: ProductField) -> Option<Decimal> {
        match parse_money(self.cell(field)) {
            Ok(value) => value,
            Err(message) => {
                self.error(field, message);
                None
            }
        }
    }
}

/// Values read from one row, before grouping by sku
struct RowValues {
    row: usize,
    sku: String,
    name: Option<String>,
    description: Option<String>,
    brand: Option<String>,
    categories: Vec<String>,
    base_price: Option<Decimal>,
    compare_at_price: Option<Decimal>,
    status: Option<ProductStatus>,
    variant_sku: Option<String>,
    variant_name: Option<String>,
    variant_price: Option<Decimal>,
}

fn read_row(
    row: usize,
    cells: &[Cell],
    mapping: &ColumnMapping<ProductField>,
) -> Result<RowValues, Vec<RowError>> {
    use ProductField::*;
    let mut reader = RowReader {
        row,
        cells,
        mapping,
        errors: Vec::new(),
    };

    let sku = reader.bounded_text(Sku, MAX_SKU_LEN);
    if sku.is_none() && reader.errors.is_empty() {
        reader.error(Sku, "sku is required");
    }
    let name = reader.bounded_text(Name, MAX_NAME_LEN);
    let description = reader.text(Description);
    let brand = reader.bounded_text(Brand, MAX_NAME_LEN);
    let categories = reader
        .text(Categories)
        .map(|s| parse_categories(&s))
        .unwrap_or_default();
    let base_price = reader.money(BasePrice);
    let compare_at_price = reader.money(CompareAtPrice);
    let status = match reader.text(Status) {
        Some(text) => match parse_status(&text) {
            Ok(status) => Some(status),
            Err(message) => {
                reader.error(Status, message);
                None
            }
        },
        None => None,
    };
    let variant_sku = reader.bounded_text(VariantSku, MAX_SKU_LEN);
    let variant_name = reader.bounded_text(VariantName, MAX_NAME_LEN);
    let variant_price = reader.money(VariantPrice);

    if variant_sku.is_none() && (variant_name.is_some() || variant_price.is_some()) {
        reader.error(VariantSku, "variant_sku is required when variant columns are set");
    }
    if check_compare_at(base_price, compare_at_price).is_err() {
        reader.error(CompareAtPrice, "compare_at_price must not be below base_price");
    }

    match sku {
        Some(sku) if reader.errors.is_empty() => Ok(RowValues {
            row,
            sku,
            name,
            description,
            brand,
            categories,
            base_price,
            compare_at_price,
            status,
            variant_sku,
            variant_name,
            variant_price,
        }),
        _ => Err(reader.errors),
    }
}

/// Parse a product sheet grid. Fails only when the header cannot be used;
/// row problems are collected in [`ParsedProducts::errors`].
pub fn parse_products(grid: &[Vec<Cell>]) -> Result<ParsedProducts, ImportError> {
    let (headers, rows) = split_header(grid)?;
    let mapping = match_columns::<ProductField>(&headers)?;

    let mut products: Vec<ProductImport> = Vec::new();
    let mut by_sku: HashMap<String, usize> = HashMap::new();
    let mut variant_skus: HashSet<String> = HashSet::new();
    let mut errors = Vec::new();
    let mut total_rows = 0;
    let mut skipped = 0;

    for (row, cells) in rows {
        if cells.iter().all(Cell::is_blank) {
            continue;
        }
        total_rows += 1;

        let values = match read_row(row, cells, &mapping) {
            Ok(values) => values,
            Err(row_errors) => {
                errors.extend(row_errors);
                skipped += 1;
                continue;
            }
        };

        if let Some(variant_sku) = &values.variant_sku {
            if !variant_skus.insert(variant_sku.to_lowercase()) {
                errors.push(RowError::new(
                    row,
                    Some(ProductField::VariantSku.name()),
                    format!("variant sku '{variant_sku}' appears more than once"),
                ));
                skipped += 1;
                continue;
            }
        }

        let key = values.sku.to_lowercase();
        let index = match by_sku.get(&key) {
            Some(index) => *index,
            None => match start_product(&values) {
                Ok(product) => {
                    products.push(product);
                    by_sku.insert(key, products.len() - 1);
                    products.len() - 1
                }
                Err(row_errors) => {
                    if let Some(variant_sku) = &values.variant_sku {
                        variant_skus.remove(&variant_sku.to_lowercase());
                    }
                    errors.extend(row_errors);
                    skipped += 1;
                    continue;
                }
            },
        };

        if let Some(variant_sku) = values.variant_sku {
            let product = &mut products[index];
            product.variants.push(VariantImport {
                row,
                name: values.variant_name.unwrap_or_else(|| variant_sku.clone()),
                price: values.variant_price.unwrap_or(product.base_price),
                sku: variant_sku,
            });
        }
    }

    Ok(ParsedProducts {
        products,
        errors,
        total_rows,
        skipped,
        mapping,
    })
}

fn start_product(values: &RowValues) -> Result<ProductImport, Vec<RowError>> {
    let mut errors = Vec::new();
    if values.name.is_none() {
        errors.push(RowError::new(
            values.row,
            Some(ProductField::Name.name()),
            "name is required",
        ));
    }
    if values.base_price.is_none() {
        errors.push(RowError::new(
            values.row,
            Some(ProductField::BasePrice.name()),
            "base_price is required",
        ));
    }

    match (&values.name, values.base_price) {
        (Some(name), Some(base_price)) if errors.is_empty() => Ok(ProductImport {
            row: values.row,
            sku: values.sku.clone(),
            name: name.clone(),
            description: values.description.clone(),
            brand: values.brand.clone(),
            categories: values.categories.clone(),
            base_price,
            compare_at_price: values.compare_at_price,
            status: values.status,
            variants: Vec::new(),
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn t(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn header() -> Vec<Cell> {
        ["SKU", "Product Name", "Price", "MSRP", "Status", "Category", "Variant SKU", "Variant Price"]
            .iter()
            .map(|s| t(s))
            .collect()
    }

    #[rstest]
    #[case(t("$1,299.50"), Some(dec!(1299.50)))]
    #[case(Cell::Number(19.99), Some(dec!(19.99)))]
    #[case(t("  "), None)]
    #[case(Cell::Empty, None)]
    fn money_cells(#[case] cell: Cell, #[case] expected: Option<Decimal>) {
        assert_eq!(parse_money(&cell).unwrap(), expected);
    }

    #[test]
    fn bad_money_cells() {
        assert!(parse_money(&t("twelve")).is_err());
        assert!(parse_money(&Cell::Number(-4.0)).is_err());
        assert!(parse_money(&Cell::Bool(true)).is_err());
        assert!(parse_money(&t("10000000000")).is_err());
    }

    #[test]
    fn status_synonyms() {
        assert_eq!(parse_status("Published").unwrap(), ProductStatus::Active);
        assert_eq!(parse_status("archived").unwrap(), ProductStatus::Archived);
        assert!(parse_status("sold out").is_err());
    }

    #[test]
    fn category_lists() {
        assert_eq!(parse_categories("Mugs, Kitchen; mugs ;;"), ["Mugs", "Kitchen"]);
    }

    #[test]
    fn groups_variant_rows_by_sku() {
        let grid = vec![
            header(),
            vec![t("MUG-1"), t("Mug"), t("12.00"), t("15"), t("active"), t("Kitchen"), t("MUG-1-RED"), Cell::Empty],
            vec![t("MUG-1"), Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty, Cell::Empty, t("MUG-1-BLU"), t("13.5")],
            vec![Cell::Empty; 8],
            vec![t("CUP-2"), t("Cup"), Cell::Number(4.0)],
        ];

        let parsed = parse_products(&grid).unwrap();
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.total_rows, 3);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.products.len(), 2);

        let mug = &parsed.products[0];
        assert_eq!(mug.row, 2);
        assert_eq!(mug.status, Some(ProductStatus::Active));
        assert_eq!(mug.compare_at_price, Some(dec!(15)));
        assert_eq!(mug.categories, ["Kitchen"]);
        assert_eq!(mug.variants.len(), 2);
        assert_eq!(mug.variants[0].price, dec!(12.00));
        assert_eq!(mug.variants[0].name, "MUG-1-RED");
        assert_eq!(mug.variants[1].price, dec!(13.50));

        let cup = &parsed.products[1];
        assert_eq!(cup.row, 5);
        assert!(cup.variants.is_empty());
    }

    #[test]
    fn row_errors_carry_row_numbers_and_do_not_abort() {
        let grid = vec![
            header(),
            vec![t("A-1"), t("Alpha"), t("abc")],
            vec![Cell::Empty, t("No Sku"), t("5")],
            vec![t("B-2"), t("Beta"), t("10"), t("8")],
            vec![t("C-3"), t("Gamma"), t("3"), Cell::Empty, t("sold out")],
            vec![t("D-4"), Cell::Empty, t("3")],
            vec![t("E-5"), t("Epsilon"), t("7")],
        ];

        let parsed = parse_products(&grid).unwrap();
        assert_eq!(parsed.total_rows, 6);
        assert_eq!(parsed.skipped, 5);
        assert_eq!(parsed.products.len(), 1);
        assert_eq!(parsed.products[0].sku, "E-5");

        let rows: Vec<(usize, Option<&str>)> = parsed
            .errors
            .iter()
            .map(|e| (e.row, e.column.as_deref()))
            .collect();
        assert_eq!(
            rows,
            [
                (2, Some("base_price")),
                (3, Some("sku")),
                (4, Some("compare_at_price")),
                (5, Some("status")),
                (6, Some("name")),
            ]
        );
    }

    #[test]
    fn duplicate_variant_skus_are_rejected() {
        let grid = vec![
            header(),
            vec![t("MUG-1"), t("Mug"), t("12"), Cell::Empty, Cell::Empty, Cell::Empty, t("V-1")],
            vec![t("MUG-2"), t("Mug 2"), t("12"), Cell::Empty, Cell::Empty, Cell::Empty, t("v-1")],
        ];
        let parsed = parse_products(&grid).unwrap();
        assert_eq!(parsed.products.len(), 1);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].row, 3);
    }

    #[test]
    fn missing_required_header() {
        let grid = vec![vec![t("Name"), t("Price")], vec![t("Mug"), t("3")]];
        assert_eq!(
            parse_products(&grid).unwrap_err(),
            ImportError::MissingColumns(vec!["sku"])
        );
    }
}
