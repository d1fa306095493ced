use rusqlite::Connection;

pub fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS dismissed_alerts (
            invoice_id  TEXT NOT NULL,
            alert_type  TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (invoice_id, alert_type)
        );

        CREATE TABLE IF NOT EXISTS known_counterparties (
            nip         TEXT PRIMARY KEY,
            created_at  TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}
