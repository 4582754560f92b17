//! Domain types and DTOs
//!
//! Status-like enums are stored as text columns; [`text_enum!`] generates
//! the mapping both ways so rows can decode them with `#[sqlx(try_from = "String")]`.

use rust_decimal::Decimal;
use validator::ValidationError;

/// Define a text-backed enum with `as_str`, `FromStr`, `TryFrom<String>` and `Display`.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $( $variant:ident => $text:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $text ),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $( $text => Ok(Self::$variant), )+
                    other => Err(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    )),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod admin_users;
pub mod audit;
pub mod brands;
pub mod bundles;
pub mod categories;
pub mod customers;
pub mod dashboard;
pub mod inventory;
pub mod orders;
pub mod products;
pub mod purchase_orders;

/// Money fields must not be negative.
pub fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    Ok(())
}

/// Largest amount a `NUMERIC(12, 2)` column holds.
pub const MAX_MONEY: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, 2);

/// Money fields are non-negative and fit the stored precision.
pub fn money_amount(value: &Decimal) -> Result<(), ValidationError> {
    non_negative(value)?;
    if *value > MAX_MONEY {
        let mut err = ValidationError::new("money_amount");
        err.message = Some(format!("must not exceed {MAX_MONEY}").into());
        return Err(err);
    }
    Ok(())
}

/// Lowercase ASCII letters, digits and single dashes.
pub fn valid_slug(value: &str) -> Result<(), ValidationError> {
    let ok = !value.is_empty()
        && value.len() <= 120
        && !value.starts_with('-')
        && !value.ends_with('-')
        && !value.contains("--")
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if ok {
        Ok(())
    } else {
        let mut err = ValidationError::new("slug");
        err.message = Some("must be lowercase letters, digits and dashes".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    text_enum! {
        pub enum Colour { Red => "red", DeepBlue => "deep_blue" }
    }

    #[test]
    fn text_enum_round_trips() {
        for colour in Colour::ALL {
            assert_eq!(colour.as_str().parse::<Colour>().unwrap(), *colour);
        }
        assert_eq!(" DEEP_BLUE ".parse::<Colour>().unwrap(), Colour::DeepBlue);
        assert!("green".parse::<Colour>().is_err());
        assert_eq!(Colour::try_from("red".to_string()).unwrap(), Colour::Red);
        assert_eq!(serde_json::to_string(&Colour::DeepBlue).unwrap(), "\"deep_blue\"");
    }

    #[test]
    fn money_must_not_be_negative() {
        assert!(non_negative(&dec!(0)).is_ok());
        assert!(non_negative(&dec!(19.99)).is_ok());
        assert!(non_negative(&dec!(-0.01)).is_err());
    }

    #[test]
    fn money_fits_stored_precision() {
        assert_eq!(MAX_MONEY, dec!(9999999999.99));
        assert!(money_amount(&dec!(9999999999.99)).is_ok());
        assert!(money_amount(&dec!(10000000000)).is_err());
        assert!(money_amount(&Decimal::MAX).is_err());
        assert!(money_amount(&dec!(-1)).is_err());
    }

    #[test]
    fn slug_rules() {
        assert!(valid_slug("summer-sale-2024").is_ok());
        assert!(valid_slug("Summer").is_err());
        assert!(valid_slug("-lead").is_err());
        assert!(valid_slug("double--dash").is_err());
        assert!(valid_slug("").is_err());
    }
}
