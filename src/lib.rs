//! Invoice anomaly / fraud-signal detection engine.
//!
//! Five deterministic rules (unknown counterparty, duplicate, high amount,
//! unusual hour, round amount) scan an invoice list and produce per-invoice
//! alerts with an aggregated severity, plus summary counts. A VAT-aware
//! line/totals calculator backs the amount-based checks. Dismissals and
//! trusted counterparties live behind the [`core::AlertRegistry`] seam,
//! with an in-memory and a sqlite implementation provided.

pub mod config;
pub mod core;
pub mod db;
pub mod money;
pub mod signals;
