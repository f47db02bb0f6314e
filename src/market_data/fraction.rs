//! Minor-unit digits per currency or crypto asset.
//!
//! Balances are stored as integers in minor units, so a currency's fraction
//! count is the power of ten between its display value and its stored value.

/// Digits used for any code not listed below.
pub const DEFAULT_FRACTION: u32 = 2;

/// Upper bound so that crypto balances still fit an `i64`.
pub const MAX_FRACTION: u32 = 8;

const ZERO_DIGIT: [&str; 16] = [
    "BIF", "CLP", "DJF", "GNF", "ISK", "JPY", "KMF", "KRW", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

const THREE_DIGIT: [&str; 7] = ["BHD", "IQD", "JOD", "KWD", "LYD", "OMR", "TND"];

const CRYPTO: [(&str, u32); 20] = [
    ("BTC", 8),
    ("ETH", 5),
    ("BNB", 5),
    ("SOL", 5),
    ("ADA", 4),
    ("XRP", 4),
    ("DOT", 3),
    ("DOGE", 2),
    ("MATIC", 4),
    ("USDT", 2),
    ("USDC", 2),
    ("DAI", 2),
    ("LTC", 4),
    ("BCH", 4),
    ("LINK", 4),
    ("XLM", 4),
    ("UNI", 4),
    ("ATOM", 4),
    ("XMR", 4),
    ("ETC", 4),
];

/// Number of minor-unit digits for `code`, case-insensitive.
pub fn fraction_digits(code: &str) -> u32 {
    let code = code.trim().to_ascii_uppercase();
    let digits = if ZERO_DIGIT.contains(&code.as_str()) {
        0
    } else if THREE_DIGIT.contains(&code.as_str()) {
        3
    } else if let Some((_, digits)) = CRYPTO.iter().find(|(sym, _)| *sym == code) {
        *digits
    } else {
        DEFAULT_FRACTION
    };
    digits.min(MAX_FRACTION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_fiat_fractions() {
        assert_eq!(fraction_digits("USD"), 2);
        assert_eq!(fraction_digits("jpy"), 0);
        assert_eq!(fraction_digits("KWD"), 3);
    }

    #[test]
    fn crypto_fractions() {
        assert_eq!(fraction_digits("BTC"), 8);
        assert_eq!(fraction_digits("eth"), 5);
        assert_eq!(fraction_digits("DOT"), 3);
        assert_eq!(fraction_digits("DOGE"), 2);
    }

    #[test]
    fn unknown_codes_default_to_two() {
        assert_eq!(fraction_digits("ZZZ"), DEFAULT_FRACTION);
        assert_eq!(fraction_digits(""), DEFAULT_FRACTION);
    }

    #[test]
    fn nothing_exceeds_the_cap() {
        for (code, _) in CRYPTO {
            assert!(fraction_digits(code) <= MAX_FRACTION);
        }
    }
}
