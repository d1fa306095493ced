use std::path::Path;

use tracing_subscriber::EnvFilter;

use fraudradar::config::Config;
use fraudradar::core::Invoice;
use fraudradar::db::SqliteRegistry;
use fraudradar::signals::{alerts_summary, FraudEngine};

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("fraudradar=info".parse().unwrap()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let invoices_path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("usage: fraudradar <invoices.json> [config.toml] [registry.db]");
            std::process::exit(2);
        }
    };
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());

    // Load configuration
    let config = Config::load(&config_path);
    let db_path = args.next().unwrap_or_else(|| config.database.path.clone());

    // Open the alert registry database
    if let Some(parent) = Path::new(&db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).expect("Failed to create registry directory");
        }
    }
    let registry =
        SqliteRegistry::open(Path::new(&db_path)).expect("Failed to open alert registry database");
    tracing::info!("Alert registry opened at {db_path}");

    let raw = std::fs::read_to_string(&invoices_path).expect("Failed to read invoice file");
    let invoices: Vec<Invoice> =
        serde_json::from_str(&raw).expect("Failed to parse invoice JSON");
    tracing::info!("Loaded {} invoices from {invoices_path}", invoices.len());

    let engine = FraudEngine::new();
    let results = engine.analyze(&invoices, &config.alerts, &registry);
    let summary = alerts_summary(&results);
    tracing::info!(
        "{} of {} invoices flagged ({} high / {} medium / {} low)",
        summary.total,
        invoices.len(),
        summary.high,
        summary.medium,
        summary.low
    );

    let report = serde_json::json!({
        "results": results,
        "summary": summary,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).expect("Failed to serialize report")
    );
}
