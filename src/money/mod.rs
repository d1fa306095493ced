//! Line-item and totals arithmetic for VAT invoices.
//!
//! Every intermediate value (base amount, discounted net, VAT, each running
//! sum) is independently rounded to 2 digits with round-half-away-from-zero.
//! Summing pre-rounded per-line results then reproduces the same grand total
//! as a one-shot computation, and totals are stable under line reordering.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// VAT rate on a line. The two exemption codes (`zw` exempt-subject,
/// `np` exempt-other) always yield zero VAT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VatRate {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "23")]
    TwentyThree,
    #[serde(rename = "zw")]
    ExemptSubject,
    #[serde(rename = "np")]
    ExemptOther,
}

impl VatRate {
    /// Numeric percentage, or `None` for the exemption codes.
    pub fn percent(&self) -> Option<Decimal> {
        match self {
            VatRate::Zero => Some(Decimal::ZERO),
            VatRate::Five => Some(Decimal::from(5)),
            VatRate::Eight => Some(Decimal::from(8)),
            VatRate::TwentyThree => Some(Decimal::from(23)),
            VatRate::ExemptSubject | VatRate::ExemptOther => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            VatRate::Zero => "0",
            VatRate::Five => "5",
            VatRate::Eight => "8",
            VatRate::TwentyThree => "23",
            VatRate::ExemptSubject => "zw",
            VatRate::ExemptOther => "np",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub quantity: Decimal,
    pub unit_net_price: Decimal,
    pub discount_percent: Decimal,
    pub vat_rate: VatRate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineCalculation {
    pub net: Decimal,
    pub vat: Decimal,
    pub gross: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RateTotals {
    pub net: Decimal,
    pub vat: Decimal,
    pub gross: Decimal,
}

/// Grand totals plus per-rate breakdown, keyed by the rate's invoice code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub net: Decimal,
    pub vat: Decimal,
    pub gross: Decimal,
    pub by_rate: BTreeMap<VatRate, RateTotals>,
}

/// Round to 2 fractional digits, half away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute one line. Negative quantity and price clamp to zero, discount
/// clamps to [0, 100]; out-of-range inputs are never an error.
pub fn calc_line(
    quantity: Decimal,
    unit_net_price: Decimal,
    discount_percent: Decimal,
    vat_rate: VatRate,
) -> LineCalculation {
    let quantity = quantity.max(Decimal::ZERO);
    let unit = unit_net_price.max(Decimal::ZERO);
    let discount = discount_percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);

    let base = round2(quantity * unit);
    let net = round2(base * (Decimal::ONE - discount / Decimal::ONE_HUNDRED));

    match vat_rate.percent() {
        Some(rate) => {
            let vat = round2(net * rate / Decimal::ONE_HUNDRED);
            let gross = round2(net + vat);
            LineCalculation { net, vat, gross }
        }
        None => LineCalculation {
            net,
            vat: Decimal::ZERO,
            gross: net,
        },
    }
}

impl LineItem {
    pub fn calc(&self) -> LineCalculation {
        calc_line(
            self.quantity,
            self.unit_net_price,
            self.discount_percent,
            self.vat_rate,
        )
    }
}

/// Fold [`calc_line`] over all lines, re-rounding after every running
/// addition. The re-round after each step is the reference summation policy,
/// kept even where the decimal type would make it a no-op.
pub fn sum_totals(lines: &[LineItem]) -> Totals {
    let mut totals = Totals::default();
    for line in lines {
        let calc = line.calc();
        let rate = totals.by_rate.entry(line.vat_rate).or_default();
        rate.net = round2(rate.net + calc.net);
        rate.vat = round2(rate.vat + calc.vat);
        rate.gross = round2(rate.gross + calc.gross);
        totals.net = round2(totals.net + calc.net);
        totals.vat = round2(totals.vat + calc.vat);
        totals.gross = round2(totals.gross + calc.gross);
    }
    totals
}
