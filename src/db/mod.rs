pub mod schema;

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OptionalExtension};
use tracing::warn;

use crate::core::{nip, AlertRegistry, AlertType, RegistryError};

/// Sqlite-backed alert registry. The connection is wrapped in a mutex so a
/// cloned handle can be shared across threads; mutations serialize on it,
/// which is all the visibility the engine's read-once snapshots need.
#[derive(Clone)]
pub struct SqliteRegistry {
    conn: Arc<Mutex<Connection>>,
}

fn storage(e: rusqlite::Error) -> RegistryError {
    RegistryError::Storage(e.to_string())
}

impl SqliteRegistry {
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let conn = Connection::open(path).map_err(storage)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(storage)?;
        schema::migrate(&conn).map_err(storage)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl AlertRegistry for SqliteRegistry {
    /// Malformed rows and storage failures degrade to an empty set: the
    /// worst case is re-showing alerts the user had dismissed.
    fn dismissed_alerts(&self) -> HashSet<(String, AlertType)> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare("SELECT invoice_id, alert_type FROM dismissed_alerts") {
            Ok(stmt) => stmt,
            Err(e) => {
                warn!("Failed to read dismissed alerts: {e}");
                return HashSet::new();
            }
        };
        let rows = match stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        }) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to query dismissed alerts: {e}");
                return HashSet::new();
            }
        };

        let mut set = HashSet::new();
        for row in rows {
            match row {
                Ok((invoice_id, tag)) => match AlertType::from_tag(&tag) {
                    Some(alert) => {
                        set.insert((invoice_id, alert));
                    }
                    None => warn!("Skipping dismissed alert with unknown type tag {tag:?}"),
                },
                Err(e) => warn!("Skipping malformed dismissed alert row: {e}"),
            }
        }
        set
    }

    fn known_counterparties(&self) -> HashSet<String> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare("SELECT nip FROM known_counterparties") {
            Ok(stmt) => stmt,
            Err(e) => {
                warn!("Failed to read known counterparties: {e}");
                return HashSet::new();
            }
        };
        let rows = match stmt.query_map([], |row| row.get::<_, String>(0)) {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Failed to query known counterparties: {e}");
                return HashSet::new();
            }
        };

        let mut set = HashSet::new();
        for row in rows {
            match row {
                Ok(id) => {
                    set.insert(id);
                }
                Err(e) => warn!("Skipping malformed counterparty row: {e}"),
            }
        }
        set
    }

    fn is_dismissed(&self, invoice_id: &str, alert: AlertType) -> bool {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM dismissed_alerts WHERE invoice_id = ?1 AND alert_type = ?2",
                rusqlite::params![invoice_id, alert.as_str()],
                |_| Ok(()),
            )
            .optional();
        match found {
            Ok(hit) => hit.is_some(),
            Err(e) => {
                warn!("Dismissed-alert lookup failed: {e}");
                false
            }
        }
    }

    fn is_known_counterparty(&self, counterparty_id: &str) -> bool {
        let conn = self.conn.lock().unwrap();
        let found = conn
            .query_row(
                "SELECT 1 FROM known_counterparties WHERE nip = ?1",
                rusqlite::params![nip::sanitize(counterparty_id)],
                |_| Ok(()),
            )
            .optional();
        match found {
            Ok(hit) => hit.is_some(),
            Err(e) => {
                warn!("Known-counterparty lookup failed: {e}");
                false
            }
        }
    }

    fn dismiss(&self, invoice_id: &str, alert: AlertType) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO dismissed_alerts (invoice_id, alert_type, created_at)
             VALUES (?1, ?2, datetime('now'))",
            rusqlite::params![invoice_id, alert.as_str()],
        )
        .map_err(storage)?;
        Ok(())
    }

    fn undismiss(&self, invoice_id: &str, alert: AlertType) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM dismissed_alerts WHERE invoice_id = ?1 AND alert_type = ?2",
            rusqlite::params![invoice_id, alert.as_str()],
        )
        .map_err(storage)?;
        Ok(())
    }

    fn clear_all_dismissed(&self) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM dismissed_alerts", [])
            .map_err(storage)?;
        Ok(())
    }

    fn mark_known(&self, counterparty_id: &str) -> Result<(), RegistryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO known_counterparties (nip, created_at)
             VALUES (?1, datetime('now'))",
            rusqlite::params![nip::sanitize(counterparty_id)],
        )
        .map_err(storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn open_test_db() -> SqliteRegistry {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "fraudradar_test_{}_{}.db",
            std::process::id(),
            id
        ));
        // Remove if leftover from previous run
        let _ = std::fs::remove_file(&path);
        SqliteRegistry::open(&path).unwrap()
    }

    #[test]
    fn dismiss_roundtrip() {
        let reg = open_test_db();
        assert!(!reg.is_dismissed("FV/2024/001", AlertType::HighAmount));
        reg.dismiss("FV/2024/001", AlertType::HighAmount).unwrap();
        assert!(reg.is_dismissed("FV/2024/001", AlertType::HighAmount));
        assert!(!reg.is_dismissed("FV/2024/001", AlertType::Duplicate));
        assert!(!reg.is_dismissed("FV/2024/002", AlertType::HighAmount));
    }

    #[test]
    fn dismiss_is_idempotent() {
        let reg = open_test_db();
        reg.dismiss("FV/1", AlertType::RoundAmount).unwrap();
        reg.dismiss("FV/1", AlertType::RoundAmount).unwrap();
        assert_eq!(reg.dismissed_alerts().len(), 1);
    }

    #[test]
    fn undismiss_removes_only_that_pair() {
        let reg = open_test_db();
        reg.dismiss("FV/1", AlertType::HighAmount).unwrap();
        reg.dismiss("FV/1", AlertType::UnusualHour).unwrap();
        reg.undismiss("FV/1", AlertType::HighAmount).unwrap();
        assert!(!reg.is_dismissed("FV/1", AlertType::HighAmount));
        assert!(reg.is_dismissed("FV/1", AlertType::UnusualHour));
    }

    #[test]
    fn clear_all_dismissed() {
        let reg = open_test_db();
        reg.dismiss("FV/1", AlertType::HighAmount).unwrap();
        reg.dismiss("FV/2", AlertType::Duplicate).unwrap();
        reg.clear_all_dismissed().unwrap();
        assert!(reg.dismissed_alerts().is_empty());
    }

    #[test]
    fn dismissed_snapshot_contents() {
        let reg = open_test_db();
        reg.dismiss("FV/1", AlertType::UnknownContractor).unwrap();
        reg.dismiss("FV/2", AlertType::Duplicate).unwrap();
        let snapshot = reg.dismissed_alerts();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&("FV/1".to_string(), AlertType::UnknownContractor)));
        assert!(snapshot.contains(&("FV/2".to_string(), AlertType::Duplicate)));
    }

    #[test]
    fn mark_known_sanitizes_before_storage() {
        let reg = open_test_db();
        reg.mark_known("PL 526-104-08-28").unwrap();
        assert!(reg.is_known_counterparty("5261040828"));
        assert!(reg.is_known_counterparty("526-104-08-28"));
        assert!(!reg.is_known_counterparty("1234567890"));
        let snapshot = reg.known_counterparties();
        assert!(snapshot.contains("5261040828"));
    }

    #[test]
    fn mark_known_is_idempotent() {
        let reg = open_test_db();
        reg.mark_known("5261040828").unwrap();
        reg.mark_known("PL5261040828").unwrap();
        assert_eq!(reg.known_counterparties().len(), 1);
    }

    #[test]
    fn unknown_alert_tags_are_skipped_on_read() {
        let reg = open_test_db();
        reg.dismiss("FV/1", AlertType::HighAmount).unwrap();
        {
            let conn = reg.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO dismissed_alerts (invoice_id, alert_type, created_at)
                 VALUES ('FV/2', 'velocity', datetime('now'))",
                [],
            )
            .unwrap();
        }
        // the legacy tag is ignored, the valid one survives
        let snapshot = reg.dismissed_alerts();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&("FV/1".to_string(), AlertType::HighAmount)));
    }

    #[test]
    fn reopen_persists_state() {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "fraudradar_reopen_{}_{}.db",
            std::process::id(),
            id
        ));
        let _ = std::fs::remove_file(&path);
        {
            let reg = SqliteRegistry::open(&path).unwrap();
            reg.dismiss("FV/1", AlertType::HighAmount).unwrap();
            reg.mark_known("5261040828").unwrap();
        }
        let reg = SqliteRegistry::open(&path).unwrap();
        assert!(reg.is_dismissed("FV/1", AlertType::HighAmount));
        assert!(reg.is_known_counterparty("5261040828"));
    }
}
