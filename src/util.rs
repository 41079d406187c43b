// Value normalization, funder-name cleanup and number formatting.
//
// Everything here is a pure function over a single value so the
// aggregation code can assume bucketed amounts and canonical names.
use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use regex::Regex;

pub const UNKNOWN_FUNDER: &str = "Unknown Funder";

/// Round `value` to the nearest multiple of `width`, halves rounding up.
///
/// NaN and infinite inputs (and a non-positive width) come back unchanged;
/// disclosed values are already banded, so this only removes false precision.
pub fn round_to_bucket(value: f64, width: f64) -> f64 {
    if !value.is_finite() || !width.is_finite() || width <= 0.0 {
        return value;
    }
    (value / width + 0.5).floor() * width
}

static SECRETARIAT_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+Secretariat\s+.*$").expect("secretariat pattern"));
static JOINT_SECRETARIAT_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+Joint\s+Secretariat\s+.*$").expect("joint pattern"));
static AMOUNT_RANGE_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s+\d{1,3}(,\d{3})*-\d{1,3}(,\d{3})*\s+.*$").expect("amount range pattern")
});

/// Reduce a free-text benefit attribution to a canonical funder name.
///
/// Strips trailing "Secretariat ..." clauses, amount-range/date fragments
/// and a dangling "Joint". Anything that ends up empty is `Unknown Funder`.
pub fn extract_funder_name(source: Option<&str>) -> String {
    let Some(source) = source else {
        return UNKNOWN_FUNDER.to_string();
    };
    let name = SECRETARIAT_TAIL.replace(source, "");
    let name = JOINT_SECRETARIAT_TAIL.replace(&name, "");
    let name = AMOUNT_RANGE_TAIL.replace(&name, "");
    let mut name = name.trim();
    if let Some(stripped) = name.strip_suffix(" Joint") {
        name = stripped.trim_end();
    }
    if name.is_empty() {
        UNKNOWN_FUNDER.to_string()
    } else {
        name.to_string()
    }
}

/// `num / den`, or 0 when there is nothing to divide by.
pub fn ratio_or_zero(num: f64, den: usize) -> f64 {
    if den == 0 {
        return 0.0;
    }
    num / den as f64
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals with `1,234,567.89` style grouping on the integer part.
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// Whole pounds, e.g. `£12,000`.
pub fn format_currency(n: f64) -> String {
    let s = format_number(n, 0);
    match s.strip_prefix('-') {
        Some(abs) => format!("-£{}", abs),
        None => format!("£{}", s),
    }
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::en)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rounds_to_nearest_bucket() {
        assert_eq!(round_to_bucket(0.0, 1500.0), 0.0);
        assert_eq!(round_to_bucket(749.0, 1500.0), 0.0);
        assert_eq!(round_to_bucket(750.0, 1500.0), 1500.0);
        assert_eq!(round_to_bucket(2250.0, 1500.0), 3000.0);
        assert_eq!(round_to_bucket(10_001.0, 1500.0), 10_500.0);
    }

    #[test]
    fn nan_passes_through() {
        assert!(round_to_bucket(f64::NAN, 1500.0).is_nan());
        assert_eq!(round_to_bucket(f64::INFINITY, 1500.0), f64::INFINITY);
        assert_eq!(round_to_bucket(1234.0, 0.0), 1234.0);
    }

    #[test]
    fn strips_secretariat_clause() {
        assert_eq!(
            extract_funder_name(Some("Acme Corp Secretariat provided by XYZ")),
            "Acme Corp"
        );
        assert_eq!(
            extract_funder_name(Some("Policy Connect Joint Secretariat with Foo")),
            "Policy Connect"
        );
    }

    #[test]
    fn strips_amount_range_and_date() {
        assert_eq!(
            extract_funder_name(Some("Big Pharma Ltd 1,500-3,000 01/04/2022 to 31/03/2023")),
            "Big Pharma Ltd"
        );
    }

    #[test]
    fn strips_dangling_joint() {
        assert_eq!(extract_funder_name(Some("Charity Trust Joint")), "Charity Trust");
    }

    #[test]
    fn missing_or_blank_is_unknown() {
        assert_eq!(extract_funder_name(None), UNKNOWN_FUNDER);
        assert_eq!(extract_funder_name(Some("")), UNKNOWN_FUNDER);
        assert_eq!(extract_funder_name(Some("   ")), UNKNOWN_FUNDER);
    }

    #[test]
    fn untouched_names_are_trimmed() {
        assert_eq!(extract_funder_name(Some("  Acme  ")), "Acme");
        // No trailing clause after the keyword, so nothing is stripped.
        assert_eq!(extract_funder_name(Some("Acme Secretariat")), "Acme Secretariat");
    }

    #[test]
    fn ratio_guards_zero() {
        assert_eq!(ratio_or_zero(9000.0, 0), 0.0);
        assert_eq!(ratio_or_zero(9000.0, 3), 3000.0);
    }

    #[test]
    fn formats_money() {
        assert_eq!(format_number(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_currency(12000.0), "£12,000");
        assert_eq!(format_currency(-1500.0), "-£1,500");
        assert_eq!(format_int(9855u32), "9,855");
    }

    proptest! {
        #[test]
        fn bucketed_values_are_multiples_of_width(value in -1.0e9f64..1.0e9f64) {
            let rounded = round_to_bucket(value, 1500.0);
            prop_assert_eq!(rounded % 1500.0, 0.0);
            prop_assert!((rounded - value).abs() <= 750.0);
        }

        #[test]
        fn extraction_never_yields_empty(source in ".{0,64}") {
            let name = extract_funder_name(Some(&source));
            prop_assert!(!name.is_empty());
            prop_assert_eq!(name.trim(), name.as_str());
        }
    }
}
