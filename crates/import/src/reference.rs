use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Prefix every storefront order number carries.
pub const ORDER_PREFIX: &str = "ABI";

// The separated variants take exactly four digits while the plain variant
// accepts a fifth. Five-digit numbers written as "ABI 10001" therefore come
// out as "ABI1000". Kept as-is until the shop confirms which form customers use.
static PLAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ABI\d{4}\d?").expect("valid order pattern"));
static SPACED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ABI \d{4}").expect("valid order pattern"));
static SLASHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)AB/\d{4}").expect("valid order pattern"));

/// Extracts the order numbers mentioned in a payment reference.
///
/// Recognises `ABI1000`, `ABI 1000` and `AB/1000` in any case and returns
/// them as `ABI1000`. An empty set means the transaction needs manual
/// attention.
pub fn extract_order_ids(reference: &str) -> BTreeSet<String> {
    let plain = PLAIN.find_iter(reference).map(|m| m.as_str().to_string());
    let spaced = SPACED
        .find_iter(reference)
        .map(|m| m.as_str().replace(' ', ""));
    let slashed = SLASHED
        .find_iter(reference)
        .map(|m| m.as_str().replacen('/', "I", 1));

    plain
        .chain(spaced)
        .chain(slashed)
        .map(|nr| nr.to_uppercase())
        .collect()
}

/// Canonical order number for operator input: `1000`, `abi1000`,
/// `ABI 1000` and `AB/1000` all become `ABI1000`.
pub fn canonical_order_nr(input: &str) -> String {
    let upper = input.trim().to_uppercase();
    if let Some(rest) = upper.strip_prefix("AB/") {
        format!("{ORDER_PREFIX}{}", rest.trim())
    } else if let Some(rest) = upper.strip_prefix(ORDER_PREFIX) {
        format!("{ORDER_PREFIX}{}", rest.trim())
    } else {
        format!("{ORDER_PREFIX}{upper}")
    }
}

/// Splits an operator's line into canonical order numbers. A bare `ABI` or
/// `AB/` is joined with the number that follows it.
pub fn parse_order_nrs(line: &str) -> Vec<String> {
    let mut nrs = Vec::new();
    let mut tokens = line.split_whitespace();
    while let Some(token) = tokens.next() {
        let upper = token.to_uppercase();
        if upper == ORDER_PREFIX || upper == "AB/" {
            if let Some(number) = tokens.next() {
                nrs.push(canonical_order_nr(number));
                continue;
            }
        }
        nrs.push(canonical_order_nr(token));
    }
    nrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_several_plain_numbers() {
        assert_eq!(
            extract_order_ids("Payment for ABI1000 and ABI1001"),
            ids(&["ABI1000", "ABI1001"])
        );
    }

    #[test]
    fn slash_variant_becomes_abi() {
        assert_eq!(extract_order_ids("AB/1000"), ids(&["ABI1000"]));
    }

    #[test]
    fn no_reference_is_empty() {
        assert!(extract_order_ids("no ref").is_empty());
        assert!(extract_order_ids("").is_empty());
    }

    #[test]
    fn case_insensitive_and_uppercased() {
        assert_eq!(extract_order_ids("bestellung abi1234"), ids(&["ABI1234"]));
        assert_eq!(extract_order_ids("ab/2345"), ids(&["ABI2345"]));
    }

    #[test]
    fn space_variant_drops_space() {
        assert_eq!(extract_order_ids("Order ABI 1002"), ids(&["ABI1002"]));
    }

    #[test]
    fn plain_variant_takes_five_digits() {
        assert_eq!(extract_order_ids("ABI10001"), ids(&["ABI10001"]));
    }

    #[test]
    fn separated_variants_take_four_digits() {
        assert_eq!(extract_order_ids("ABI 10001"), ids(&["ABI1000"]));
        assert_eq!(extract_order_ids("AB/10001"), ids(&["ABI1000"]));
    }

    #[test]
    fn duplicates_collapse() {
        assert_eq!(
            extract_order_ids("ABI1000, abi1000, ABI 1000, AB/1000"),
            ids(&["ABI1000"])
        );
    }

    #[test]
    fn too_short_numbers_are_ignored() {
        assert!(extract_order_ids("ABI123 AB/12").is_empty());
    }

    #[test]
    fn canonical_operator_input() {
        assert_eq!(canonical_order_nr("1000"), "ABI1000");
        assert_eq!(canonical_order_nr(" abi1001 "), "ABI1001");
        assert_eq!(canonical_order_nr("AB/1002"), "ABI1002");
    }

    #[test]
    fn operator_line_with_separated_prefix() {
        assert_eq!(
            parse_order_nrs("ABI 1000 ab/ 1001 1002 abi1003"),
            ["ABI1000", "ABI1001", "ABI1002", "ABI1003"]
        );
        assert_eq!(parse_order_nrs("  "), Vec::<String>::new());
        // A dangling prefix is kept and later reported as unknown.
        assert_eq!(parse_order_nrs("1000 ABI"), ["ABI1000", "ABI"]);
    }
}
