use std::collections::HashSet;

use chrono::Timelike;
use rust_decimal::Decimal;

use crate::config::AlertSettings;
use crate::core::{nip, AlertLevel, AlertType, FraudAlert, Invoice};
use crate::money::round2;

/// Everything a rule may consult besides the invoice itself: the full list,
/// the settings, and the registry snapshots taken at the start of the run.
pub struct RuleContext<'a> {
    pub invoices: &'a [Invoice],
    pub settings: &'a AlertSettings,
    pub known_counterparties: &'a HashSet<String>,
    pub dismissed: &'a HashSet<(String, AlertType)>,
}

impl RuleContext<'_> {
    pub fn is_dismissed(&self, invoice_id: &str, alert: AlertType) -> bool {
        self.dismissed.contains(&(invoice_id.to_string(), alert))
    }
}

/// A fraud-signal rule evaluated against one invoice. Rules are stateless;
/// a rule that cannot evaluate (unparseable timestamp, disabled switch,
/// dismissed pair) abstains by returning `None`.
pub trait Rule {
    fn alert_type(&self) -> AlertType;
    fn severity(&self) -> AlertLevel;
    fn evaluate(&self, invoice: &Invoice, ctx: &RuleContext) -> Option<FraudAlert>;

    fn emit(&self, message: String) -> Option<FraudAlert> {
        Some(FraudAlert {
            alert_type: self.alert_type(),
            level: self.severity(),
            message,
        })
    }
}

/// The five rules in their fixed evaluation order.
pub fn default_rules() -> Vec<Box<dyn Rule + Send + Sync>> {
    vec![
        Box::new(UnknownContractorRule),
        Box::new(DuplicateRule),
        Box::new(HighAmountRule),
        Box::new(UnusualHourRule),
        Box::new(RoundAmountRule),
    ]
}

fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", round2(amount))
}

// --- Individual rules ---

/// First high-value invoice from a counterparty the user has not marked
/// known. The "no other invoice from this counterparty" check keeps a
/// counterparty already seen several times (just not yet marked known)
/// from flooding alerts.
pub struct UnknownContractorRule;

impl Rule for UnknownContractorRule {
    fn alert_type(&self) -> AlertType {
        AlertType::UnknownContractor
    }

    fn severity(&self) -> AlertLevel {
        AlertLevel::High
    }

    fn evaluate(&self, invoice: &Invoice, ctx: &RuleContext) -> Option<FraudAlert> {
        if ctx.is_dismissed(&invoice.id, self.alert_type()) {
            return None;
        }
        let threshold = ctx.settings.unknown_counterparty_threshold;
        if threshold <= Decimal::ZERO || invoice.gross_amount < threshold {
            return None;
        }
        let counterparty = nip::sanitize(&invoice.counterparty_nip);
        if counterparty.is_empty() || ctx.known_counterparties.contains(&counterparty) {
            return None;
        }
        let seen_elsewhere = ctx.invoices.iter().any(|other| {
            other.id != invoice.id && nip::sanitize(&other.counterparty_nip) == counterparty
        });
        if seen_elsewhere {
            return None;
        }
        let who = if invoice.counterparty_name.trim().is_empty() {
            invoice.counterparty_nip.trim()
        } else {
            invoice.counterparty_name.trim()
        };
        self.emit(format!(
            "First invoice from unknown counterparty {who} for {}",
            format_amount(invoice.gross_amount)
        ))
    }
}

/// Another invoice from the same counterparty with a matching amount
/// (within 0.01) issued inside the configured window. Pairs where either
/// timestamp fails to parse never match.
pub struct DuplicateRule;

impl Rule for DuplicateRule {
    fn alert_type(&self) -> AlertType {
        AlertType::Duplicate
    }

    fn severity(&self) -> AlertLevel {
        AlertLevel::Medium
    }

    fn evaluate(&self, invoice: &Invoice, ctx: &RuleContext) -> Option<FraudAlert> {
        if ctx.is_dismissed(&invoice.id, self.alert_type()) {
            return None;
        }
        if !ctx.settings.duplicates.enabled {
            return None;
        }
        let issued = invoice.issued_at()?;
        let counterparty = nip::sanitize(&invoice.counterparty_nip);
        let window_days = ctx.settings.duplicates.window_days;
        let window_seconds = window_days.saturating_mul(86_400);
        let tolerance = Decimal::new(1, 2); // 0.01

        let matches = ctx
            .invoices
            .iter()
            .filter(|other| {
                other.id != invoice.id
                    && nip::sanitize(&other.counterparty_nip) == counterparty
                    && (other.gross_amount - invoice.gross_amount).abs() <= tolerance
                    && other
                        .issued_at()
                        .map(|o| (o - issued).num_seconds().abs() <= window_seconds)
                        .unwrap_or(false)
            })
            .count();
        if matches == 0 {
            return None;
        }
        self.emit(format!(
            "{matches} invoice(s) from the same counterparty with a matching amount within {window_days} days"
        ))
    }
}

/// Gross amount at or above the user's threshold. Fires independently of
/// the unknown-counterparty rule; both may land on the same invoice.
pub struct HighAmountRule;

impl Rule for HighAmountRule {
    fn alert_type(&self) -> AlertType {
        AlertType::HighAmount
    }

    fn severity(&self) -> AlertLevel {
        AlertLevel::Low
    }

    fn evaluate(&self, invoice: &Invoice, ctx: &RuleContext) -> Option<FraudAlert> {
        if ctx.is_dismissed(&invoice.id, self.alert_type()) {
            return None;
        }
        let threshold = ctx.settings.high_amount_threshold;
        if threshold <= Decimal::ZERO || invoice.gross_amount < threshold {
            return None;
        }
        self.emit(format!(
            "Gross amount {} meets or exceeds the {} threshold",
            format_amount(invoice.gross_amount),
            format_amount(threshold)
        ))
    }
}

/// Issue time strictly outside the inclusive business-hours window,
/// compared as minutes since midnight. A window with start > end is empty
/// under this comparison; it does not wrap past midnight.
pub struct UnusualHourRule;

impl Rule for UnusualHourRule {
    fn alert_type(&self) -> AlertType {
        AlertType::UnusualHour
    }

    fn severity(&self) -> AlertLevel {
        AlertLevel::Low
    }

    fn evaluate(&self, invoice: &Invoice, ctx: &RuleContext) -> Option<FraudAlert> {
        if ctx.is_dismissed(&invoice.id, self.alert_type()) {
            return None;
        }
        let hours = &ctx.settings.unusual_hours;
        if !hours.enabled {
            return None;
        }
        // a bare issue date has no time of day, so the rule abstains
        let time = invoice.issued_time_of_day()?;
        let (start, end) = hours.window_minutes()?;
        let minutes = time.hour() * 60 + time.minute();
        if minutes >= start && minutes <= end {
            return None;
        }
        self.emit(format!(
            "Issued at {:02}:{:02}, outside the {} to {} window",
            time.hour(),
            time.minute(),
            hours.start,
            hours.end
        ))
    }
}

/// Suspiciously round gross amounts. Round thousands flag from 1000 up;
/// round hundreds only from 5000 up. The asymmetric floors are deliberate
/// tuning.
pub struct RoundAmountRule;

impl Rule for RoundAmountRule {
    fn alert_type(&self) -> AlertType {
        AlertType::RoundAmount
    }

    fn severity(&self) -> AlertLevel {
        AlertLevel::Low
    }

    fn evaluate(&self, invoice: &Invoice, ctx: &RuleContext) -> Option<FraudAlert> {
        if ctx.is_dismissed(&invoice.id, self.alert_type()) {
            return None;
        }
        if !ctx.settings.round_amounts.enabled {
            return None;
        }
        let amount = invoice.gross_amount;
        let round_thousand =
            amount >= Decimal::from(1_000) && (amount % Decimal::from(1_000)).is_zero();
        let round_hundred =
            amount >= Decimal::from(5_000) && (amount % Decimal::from(100)).is_zero();
        if !(round_thousand || round_hundred) {
            return None;
        }
        self.emit(format!(
            "Suspiciously round gross amount {}",
            format_amount(amount)
        ))
    }
}
