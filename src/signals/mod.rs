pub mod rules;

use std::collections::HashMap;

use crate::config::AlertSettings;
use crate::core::{
    AlertLevel, AlertRegistry, AlertsSummary, FraudAlert, FraudAnalysisResult, Invoice,
};
use rules::{default_rules, Rule, RuleContext};

/// Runs the rule set over an invoice list and folds the fired alerts into a
/// per-invoice severity. Analysis is synchronous and side-effect free: the
/// registry is read exactly twice, up front, so concurrent registry mutations
/// cannot change a run mid-flight.
pub struct FraudEngine {
    rules: Vec<Box<dyn Rule + Send + Sync>>,
}

impl FraudEngine {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    pub fn analyze(
        &self,
        invoices: &[Invoice],
        settings: &AlertSettings,
        registry: &dyn AlertRegistry,
    ) -> HashMap<String, FraudAnalysisResult> {
        if !settings.enabled {
            return invoices
                .iter()
                .map(|inv| {
                    (
                        inv.id.clone(),
                        FraudAnalysisResult {
                            invoice_id: inv.id.clone(),
                            alert_level: AlertLevel::None,
                            alerts: Vec::new(),
                        },
                    )
                })
                .collect();
        }

        // One snapshot per call; see the concurrency note above.
        let dismissed = registry.dismissed_alerts();
        let known = registry.known_counterparties();
        let ctx = RuleContext {
            invoices,
            settings,
            known_counterparties: &known,
            dismissed: &dismissed,
        };

        let mut results = HashMap::with_capacity(invoices.len());
        for invoice in invoices {
            let alerts: Vec<FraudAlert> = self
                .rules
                .iter()
                .filter_map(|rule| rule.evaluate(invoice, &ctx))
                .collect();
            let level = alerts
                .iter()
                .map(|a| a.level)
                .max()
                .unwrap_or(AlertLevel::None);
            if level > AlertLevel::None {
                tracing::debug!(
                    invoice = %invoice.id,
                    level = ?level,
                    alerts = alerts.len(),
                    "invoice flagged"
                );
            }
            results.insert(
                invoice.id.clone(),
                FraudAnalysisResult {
                    invoice_id: invoice.id.clone(),
                    alert_level: level,
                    alerts,
                },
            );
        }
        results
    }
}

impl Default for FraudEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Count invoices by their overall level. `total` counts invoices carrying
/// at least one alert, regardless of how many they carry.
pub fn alerts_summary(results: &HashMap<String, FraudAnalysisResult>) -> AlertsSummary {
    let mut summary = AlertsSummary::default();
    for result in results.values() {
        match result.alert_level {
            AlertLevel::High => summary.high += 1,
            AlertLevel::Medium => summary.medium += 1,
            AlertLevel::Low => summary.low += 1,
            AlertLevel::None => {}
        }
    }
    summary.total = summary.high + summary.medium + summary.low;
    summary
}
