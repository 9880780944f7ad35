use ledgerlink_types::{Balance, FixedPoint, Sign, FRACTION_SCALE};
use proptest::prelude::*;

// ── FixedPoint ───────────────────────────────────────────────────

#[test]
fn fixed_point_serializes_halves_as_strings() {
    let v = FixedPoint::new(500, 250_000_000_000_000_000).unwrap();
    let json = serde_json::to_value(v).unwrap();
    assert_eq!(json["integer"], "500");
    assert_eq!(json["fraction"], "250000000000000000");
}

#[test]
fn fixed_point_survives_values_beyond_f64_precision() {
    let v = FixedPoint::new(u64::MAX, FRACTION_SCALE - 1).unwrap();
    let json = serde_json::to_string(&v).unwrap();
    let back: FixedPoint = serde_json::from_str(&json).unwrap();
    assert_eq!(back, v);
}

#[test]
fn fixed_point_rejects_numeric_json() {
    let err = serde_json::from_str::<FixedPoint>(r#"{"integer":5,"fraction":0}"#);
    assert!(err.is_err());
}

#[test]
fn fixed_point_rejects_oversized_fraction_on_wire() {
    let json = format!(r#"{{"integer":"1","fraction":"{}"}}"#, FRACTION_SCALE);
    assert!(serde_json::from_str::<FixedPoint>(&json).is_err());
}

#[test]
fn fixed_point_parse_rejects_garbage() {
    assert!("".parse::<FixedPoint>().is_err());
    assert!("-1".parse::<FixedPoint>().is_err());
    assert!("1.2.3".parse::<FixedPoint>().is_err());
    assert!("0.1234567890123456789".parse::<FixedPoint>().is_err());
}

#[test]
fn units_roundtrip() {
    let v: FixedPoint = "3.000000000000000007".parse().unwrap();
    assert_eq!(FixedPoint::from_units(v.units()).unwrap(), v);
}

// ── Sign ─────────────────────────────────────────────────────────

#[test]
fn sign_wire_format_is_plus_minus_one() {
    assert_eq!(serde_json::to_string(&Sign::Negative).unwrap(), "-1");
    assert_eq!(serde_json::from_str::<Sign>("1").unwrap(), Sign::Positive);
    assert!(serde_json::from_str::<Sign>("0").is_err());
}

// ── Balance ──────────────────────────────────────────────────────

#[test]
fn balance_of_lines_sums_signed_magnitudes() {
    let total: Balance = [
        Balance::of_line(Sign::Negative, &FixedPoint::from_integer(500)),
        Balance::of_line(Sign::Positive, &"120.5".parse().unwrap()),
    ]
    .into_iter()
    .sum();
    assert_eq!(total.to_string(), "-379.5");
}

#[test]
fn balance_serializes_as_decimal_string() {
    let b = Balance::from_integer(-500);
    assert_eq!(serde_json::to_string(&b).unwrap(), r#""-500""#);
}

#[test]
fn balance_beyond_u64_whole_units_parses_back() {
    let line = Balance::of_line(Sign::Positive, &FixedPoint::new(u64::MAX, 5).unwrap());
    let total = line + line;
    assert_eq!(total.to_string(), "36893488147419103230.00000000000000001");
    assert_eq!(total.to_string().parse::<Balance>().unwrap(), total);
    assert_eq!((-total).to_string().parse::<Balance>().unwrap(), -total);
}

#[test]
fn balance_extremes_parse_back() {
    for b in [Balance::from_units(i128::MAX), Balance::from_units(i128::MIN)] {
        assert_eq!(b.to_string().parse::<Balance>().unwrap(), b);
    }
    let past_max = (i128::MAX as u128 / u128::from(FRACTION_SCALE) + 1).to_string();
    assert!(past_max.parse::<Balance>().is_err());
}

#[test]
fn fixed_point_still_rejects_integer_beyond_u64() {
    assert!("18446744073709551616".parse::<FixedPoint>().is_err());
}

proptest! {
    #[test]
    fn balance_display_parse_roundtrip(units in any::<i64>()) {
        let b = Balance::from_units(i128::from(units) * 1_000);
        let parsed: Balance = b.to_string().parse().unwrap();
        prop_assert_eq!(parsed, b);
    }

    #[test]
    fn fixed_point_display_parse_roundtrip(integer in any::<u64>(), fraction in 0..FRACTION_SCALE) {
        let v = FixedPoint::new(integer, fraction).unwrap();
        let parsed: FixedPoint = v.to_string().parse().unwrap();
        prop_assert_eq!(parsed, v);
    }
}
