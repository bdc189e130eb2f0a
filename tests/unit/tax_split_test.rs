// Property-based tests for GST splitting of tax-inclusive amounts
//
// For every amount the components must add up exactly:
// - cgst + sgst + igst == tax_amount
// - tax_amount + base_amount == amount (rounded to paise)
// - home state buyers pay CGST + SGST in equal halves, others pay IGST only

use emi_ledger::modules::taxes::{split_tax, HomeState, TaxCalculator};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn rupees(paise: i64) -> Decimal {
    Decimal::new(paise, 2)
}

proptest! {
    #[test]
    fn prop_components_sum_exactly(
        paise in 0i64..1_000_000_000,
        rate_bp in prop::sample::select(vec![0u32, 500, 1200, 1800, 2800]),
        home in any::<bool>(),
    ) {
        let amount = rupees(paise);
        let rate = Decimal::new(rate_bp as i64, 4);

        let split = split_tax(amount, rate, home).unwrap();

        prop_assert_eq!(split.cgst + split.sgst + split.igst, split.tax_amount);
        prop_assert_eq!(split.tax_amount + split.base_amount, amount);
        prop_assert!(split.base_amount >= Decimal::ZERO);
        prop_assert!(split.tax_amount >= Decimal::ZERO);

        if home {
            prop_assert_eq!(split.igst, Decimal::ZERO);
            prop_assert_eq!(split.cgst, split.sgst);
        } else {
            prop_assert_eq!(split.cgst, Decimal::ZERO);
            prop_assert_eq!(split.sgst, Decimal::ZERO);
        }
    }

    #[test]
    fn prop_components_have_paise_precision(paise in 0i64..100_000_000, home in any::<bool>()) {
        let split = split_tax(rupees(paise), dec!(0.18), home).unwrap();
        for component in [split.cgst, split.sgst, split.igst, split.tax_amount, split.base_amount] {
            prop_assert!(component.scale() <= 2 || component.round_dp(2) == component);
        }
    }
}

#[test]
fn test_home_state_purchase_of_11800() {
    let split = split_tax(dec!(11800), dec!(0.18), true).unwrap();
    assert_eq!(split.base_amount, dec!(10000));
    assert_eq!(split.cgst, dec!(900));
    assert_eq!(split.sgst, dec!(900));
    assert_eq!(split.igst, dec!(0));
    assert_eq!(split.tax_amount, dec!(1800));
}

#[test]
fn test_other_state_purchase_of_11800() {
    let split = split_tax(dec!(11800), dec!(0.18), false).unwrap();
    assert_eq!(split.base_amount, dec!(10000));
    assert_eq!(split.igst, dec!(1800));
    assert_eq!(split.cgst + split.sgst, dec!(0));
}

#[test]
fn test_zero_amount() {
    let split = split_tax(dec!(0), dec!(0.18), true).unwrap();
    assert_eq!(split.tax_amount, dec!(0));
    assert_eq!(split.base_amount, dec!(0));
}

#[test]
fn test_invalid_inputs_rejected() {
    assert!(split_tax(dec!(-1), dec!(0.18), true).is_err());
    assert!(split_tax(dec!(100), dec!(-0.18), true).is_err());
    assert!(split_tax(dec!(100), dec!(1.5), true).is_err());
}

#[test]
fn test_home_state_matching_ignores_case_and_aliases() {
    let calculator = TaxCalculator::new(dec!(0.18), HomeState::parse("UP, Uttar Pradesh")).unwrap();

    assert!(calculator.is_home_state("up"));
    assert!(calculator.is_home_state("  uttar pradesh "));
    assert!(!calculator.is_home_state("Maharashtra"));

    let split = calculator.split_for_state(dec!(11800), "Uttar Pradesh").unwrap();
    assert_eq!(split.cgst, dec!(900));
}
