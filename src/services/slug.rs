//! URL slugs for brands, categories, products and bundles

/// Lowercase, ASCII-only, dash-separated slug. Returns `"item"` when nothing
/// usable remains so the column never receives an empty string.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        let mapped = match c {
            'a'..='z' | '0'..='9' => Some(c),
            'A'..='Z' => Some(c.to_ascii_lowercase()),
            'à' | 'á' | 'â' | 'ä' | 'ã' | 'å' | 'À' | 'Á' | 'Â' | 'Ä' | 'Ã' | 'Å' => Some('a'),
            'è' | 'é' | 'ê' | 'ë' | 'È' | 'É' | 'Ê' | 'Ë' => Some('e'),
            'ì' | 'í' | 'î' | 'ï' | 'Ì' | 'Í' | 'Î' | 'Ï' => Some('i'),
            'ò' | 'ó' | 'ô' | 'ö' | 'õ' | 'ø' | 'Ò' | 'Ó' | 'Ô' | 'Ö' | 'Õ' | 'Ø' => Some('o'),
            'ù' | 'ú' | 'û' | 'ü' | 'Ù' | 'Ú' | 'Û' | 'Ü' => Some('u'),
            'ñ' | 'Ñ' => Some('n'),
            'ç' | 'Ç' => Some('c'),
            'ß' => {
                push_segment(&mut slug, &mut pending_dash, "ss");
                continue;
            }
            '&' => {
                pending_dash = true;
                push_segment(&mut slug, &mut pending_dash, "and");
                pending_dash = true;
                continue;
            }
            _ => None,
        };

        match mapped {
            Some(ch) => {
                let mut buf = [0u8; 4];
                push_segment(&mut slug, &mut pending_dash, ch.encode_utf8(&mut buf));
            }
            None => pending_dash = true,
        }
    }

    if slug.len() > 120 {
        slug.truncate(120);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        "item".to_string()
    } else {
        slug
    }
}

fn push_segment(slug: &mut String, pending_dash: &mut bool, segment: &str) {
    if *pending_dash && !slug.is_empty() {
        slug.push('-');
    }
    *pending_dash = false;
    slug.push_str(segment);
}

/// Use the caller's slug when given, otherwise derive one from `name`.
pub fn resolve(explicit: Option<&str>, name: &str) -> String {
    match explicit.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => slug.to_string(),
        None => slugify(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::valid_slug;
    use rstest::rstest;

    #[rstest]
    #[case("Summer Sale 2024", "summer-sale-2024")]
    #[case("  Café & Crème  ", "cafe-and-creme")]
    #[case("Straße", "strasse")]
    #[case("--Hello---World--", "hello-world")]
    #[case("Tea/Coffee > Mugs", "tea-coffee-mugs")]
    #[case("!!!", "item")]
    fn slugifies(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(slugify(input), expected);
    }

    #[test]
    fn output_passes_slug_validation() {
        let long = "x".repeat(300);
        for input in ["Vintage Ceramics™", "A & B", "100% Cotton", long.as_str()] {
            let slug = slugify(input);
            assert!(valid_slug(&slug).is_ok(), "{slug}");
        }
    }

    #[test]
    fn explicit_slug_wins() {
        assert_eq!(resolve(Some("custom"), "Ignored Name"), "custom");
        assert_eq!(resolve(Some("  "), "Fallback Name"), "fallback-name");
        assert_eq!(resolve(None, "Fallback Name"), "fallback-name");
    }
}
