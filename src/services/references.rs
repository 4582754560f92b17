//! Human-readable document numbers such as `ORD-20240131-7KQ2ZD`

use chrono::{DateTime, Utc};
use rand::Rng;

/// Alphabet without easily confused characters (0/O, 1/I)
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 6;

pub fn generate(prefix: &str, at: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, at.format("%Y%m%d"), suffix)
}

pub fn order_number(at: DateTime<Utc>) -> String {
    generate("ORD", at)
}

pub fn purchase_order_reference(at: DateTime<Utc>) -> String {
    generate("PO", at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_is_prefix_date_suffix() {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        let number = order_number(at);
        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "ORD");
        assert_eq!(parts[1], "20240131");
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2].bytes().all(|b| ALPHABET.contains(&b)));

        assert!(purchase_order_reference(at).starts_with("PO-20240131-"));
    }
}
