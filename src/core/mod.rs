pub mod nip;

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An invoice as supplied by the caller. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier within a single analysis run (e.g. a registry number).
    pub id: String,
    /// Issue timestamp as the upstream system delivered it. Parsed lazily;
    /// rules that need an instant abstain when it does not parse.
    pub issue_date: String,
    /// Counterparty tax identifier (NIP). May be empty.
    pub counterparty_nip: String,
    pub counterparty_name: String,
    /// Gross amount, 2-decimal currency value.
    pub gross_amount: Decimal,
}

impl Invoice {
    /// The issue instant, or `None` if the raw timestamp does not parse.
    /// A bare date reads as midnight; rules that need an actual time of day
    /// use [`Invoice::issued_time_of_day`] instead.
    pub fn issued_at(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.issue_date).or_else(|| {
            NaiveDate::parse_from_str(self.issue_date.trim(), "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
    }

    /// The issue time of day, only when the raw value actually carries one.
    /// Bare dates yield `None` so the midnight placeholder never reads as
    /// an after-hours issue time.
    pub fn issued_time_of_day(&self) -> Option<NaiveTime> {
        parse_timestamp(&self.issue_date).map(|dt| dt.time())
    }
}

/// Tolerant timestamp parsing: RFC 3339 first (keeping the wall-clock time),
/// then the common bare datetime formats. Date-only values are rejected here;
/// see [`Invoice::issued_at`] for the date-tolerant variant.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    None
}

/// The five fraud-signal rule identifiers. A closed set: dismissals are keyed
/// by these tags, and unknown tags read back from storage are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    UnknownContractor,
    Duplicate,
    HighAmount,
    UnusualHour,
    RoundAmount,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::UnknownContractor => "unknown_contractor",
            AlertType::Duplicate => "duplicate",
            AlertType::HighAmount => "high_amount",
            AlertType::UnusualHour => "unusual_hour",
            AlertType::RoundAmount => "round_amount",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "unknown_contractor" => Some(AlertType::UnknownContractor),
            "duplicate" => Some(AlertType::Duplicate),
            "high_amount" => Some(AlertType::HighAmount),
            "unusual_hour" => Some(AlertType::UnusualHour),
            "round_amount" => Some(AlertType::RoundAmount),
            _ => None,
        }
    }
}

/// Per-invoice severity, ordered so the overall level is a plain `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    None,
    Low,
    Medium,
    High,
}

/// A single fired rule on a single invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlert {
    pub alert_type: AlertType,
    pub level: AlertLevel,
    pub message: String,
}

/// Analysis output for one invoice: every non-suppressed alert in rule
/// order, plus the folded severity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAnalysisResult {
    pub invoice_id: String,
    pub alert_level: AlertLevel,
    pub alerts: Vec<FraudAlert>,
}

/// Population-level counts by overall invoice level (not by alert count).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertsSummary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry storage error: {0}")]
    Storage(String),
}

/// Durable sets the rules consult before emitting: (invoice, rule) pairs the
/// user has dismissed, and counterparty ids marked trusted. The engine
/// snapshots both once per analysis call and never expires entries itself.
pub trait AlertRegistry {
    /// Full dismissed-pair snapshot. Read failures degrade to an empty set.
    fn dismissed_alerts(&self) -> HashSet<(String, AlertType)>;

    /// Full known-counterparty snapshot (sanitized NIPs).
    fn known_counterparties(&self) -> HashSet<String>;

    fn dismiss(&self, invoice_id: &str, alert: AlertType) -> Result<(), RegistryError>;

    fn undismiss(&self, invoice_id: &str, alert: AlertType) -> Result<(), RegistryError>;

    fn clear_all_dismissed(&self) -> Result<(), RegistryError>;

    /// Mark a counterparty as trusted. The id is sanitized before storage so
    /// formatted and bare NIPs agree.
    fn mark_known(&self, counterparty_id: &str) -> Result<(), RegistryError>;

    fn is_dismissed(&self, invoice_id: &str, alert: AlertType) -> bool {
        self.dismissed_alerts()
            .contains(&(invoice_id.to_string(), alert))
    }

    fn is_known_counterparty(&self, counterparty_id: &str) -> bool {
        self.known_counterparties()
            .contains(&nip::sanitize(counterparty_id))
    }
}

/// In-memory registry. Useful for tests and for callers that persist the
/// sets through their own store.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    dismissed: Mutex<HashSet<(String, AlertType)>>,
    known: Mutex<HashSet<String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlertRegistry for MemoryRegistry {
    fn dismissed_alerts(&self) -> HashSet<(String, AlertType)> {
        self.dismissed.lock().unwrap().clone()
    }

    fn known_counterparties(&self) -> HashSet<String> {
        self.known.lock().unwrap().clone()
    }

    fn dismiss(&self, invoice_id: &str, alert: AlertType) -> Result<(), RegistryError> {
        self.dismissed
            .lock()
            .unwrap()
            .insert((invoice_id.to_string(), alert));
        Ok(())
    }

    fn undismiss(&self, invoice_id: &str, alert: AlertType) -> Result<(), RegistryError> {
        self.dismissed
            .lock()
            .unwrap()
            .remove(&(invoice_id.to_string(), alert));
        Ok(())
    }

    fn clear_all_dismissed(&self) -> Result<(), RegistryError> {
        self.dismissed.lock().unwrap().clear();
        Ok(())
    }

    fn mark_known(&self, counterparty_id: &str) -> Result<(), RegistryError> {
        self.known
            .lock()
            .unwrap()
            .insert(nip::sanitize(counterparty_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_level_ordering() {
        assert!(AlertLevel::None < AlertLevel::Low);
        assert!(AlertLevel::Low < AlertLevel::Medium);
        assert!(AlertLevel::Medium < AlertLevel::High);
    }

    #[test]
    fn alert_type_tag_roundtrip() {
        for alert in [
            AlertType::UnknownContractor,
            AlertType::Duplicate,
            AlertType::HighAmount,
            AlertType::UnusualHour,
            AlertType::RoundAmount,
        ] {
            assert_eq!(AlertType::from_tag(alert.as_str()), Some(alert));
        }
        assert_eq!(AlertType::from_tag("velocity"), None);
    }

    #[test]
    fn alert_type_serde_tag_matches_as_str() {
        let json = serde_json::to_string(&AlertType::UnknownContractor).unwrap();
        assert_eq!(json, "\"unknown_contractor\"");
        let json = serde_json::to_string(&AlertType::RoundAmount).unwrap();
        assert_eq!(json, "\"round_amount\"");
    }

    #[test]
    fn parse_timestamp_formats() {
        assert!(parse_timestamp("2024-01-05T10:30:00").is_some());
        assert!(parse_timestamp("2024-01-05 10:30:00").is_some());
        assert!(parse_timestamp("2024-01-05T10:30:00+01:00").is_some());
        assert!(parse_timestamp("2024-01-05").is_none());
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn date_only_issue_date_reads_as_midnight_instant() {
        let inv = Invoice {
            id: "FV/1".into(),
            issue_date: "2024-01-05".into(),
            counterparty_nip: "5261040828".into(),
            counterparty_name: "Firma".into(),
            gross_amount: "100.00".parse().unwrap(),
        };
        let issued = inv.issued_at().unwrap();
        assert_eq!(issued, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_time(NaiveTime::MIN));
        // but it carries no usable time of day
        assert!(inv.issued_time_of_day().is_none());
    }

    #[test]
    fn clocked_issue_date_exposes_time_of_day() {
        let inv = Invoice {
            id: "FV/1".into(),
            issue_date: "2024-01-05T03:15:00".into(),
            counterparty_nip: "5261040828".into(),
            counterparty_name: "Firma".into(),
            gross_amount: "100.00".parse().unwrap(),
        };
        let time = inv.issued_time_of_day().unwrap();
        assert_eq!(time, NaiveTime::from_hms_opt(3, 15, 0).unwrap());
    }

    #[test]
    fn rfc3339_keeps_wall_clock_time() {
        use chrono::Timelike;
        let dt = parse_timestamp("2024-01-05T23:30:00+02:00").unwrap();
        assert_eq!(dt.hour(), 23);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn memory_registry_dismissals() {
        let reg = MemoryRegistry::new();
        assert!(!reg.is_dismissed("FV/1", AlertType::HighAmount));
        reg.dismiss("FV/1", AlertType::HighAmount).unwrap();
        assert!(reg.is_dismissed("FV/1", AlertType::HighAmount));
        assert!(!reg.is_dismissed("FV/1", AlertType::Duplicate));
        reg.undismiss("FV/1", AlertType::HighAmount).unwrap();
        assert!(!reg.is_dismissed("FV/1", AlertType::HighAmount));
    }

    #[test]
    fn memory_registry_clear_all() {
        let reg = MemoryRegistry::new();
        reg.dismiss("FV/1", AlertType::HighAmount).unwrap();
        reg.dismiss("FV/2", AlertType::Duplicate).unwrap();
        reg.clear_all_dismissed().unwrap();
        assert!(reg.dismissed_alerts().is_empty());
    }

    #[test]
    fn memory_registry_known_counterparty_sanitized() {
        let reg = MemoryRegistry::new();
        reg.mark_known("PL 526-104-08-28").unwrap();
        assert!(reg.is_known_counterparty("5261040828"));
        assert!(reg.is_known_counterparty("526-104-08-28"));
        assert!(!reg.is_known_counterparty("1234567890"));
    }
}
