//! Upload-and-reconcile example

use bigdecimal::BigDecimal;
use reconciliation_core::utils::{MemoryStore, MemoryUploadParser};
use reconciliation_core::{start_queue, CoreConfig, MatchStatus, TransactionRecord, UploadJob};
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn record(
    id: &str,
    txn: &str,
    amount: &str,
    reference: &str,
) -> Result<TransactionRecord, Box<dyn std::error::Error>> {
    Ok(TransactionRecord::new(
        id.to_string(),
        txn.to_string(),
        Some(BigDecimal::from_str(amount)?),
        Some(reference.to_string()),
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    println!("🧾 Reconciliation Core - Upload Example\n");

    // 1. Load the system of record
    println!("📊 Loading system records...");
    let store = Arc::new(MemoryStore::new());
    store.set_system_records(vec![
        record("s1", "TXN001", "1500.00", "REF001")?,
        record("s2", "TXN002", "250.00", "REF002")?,
        record("s8", "TXN008", "1799.50", "REF008")?,
    ])?;
    println!("  ✓ 3 system records loaded\n");

    // 2. Register an uploaded file
    println!("📁 Registering upload...");
    store.add_upload_job(UploadJob::new(
        "demo-job-1".to_string(),
        "bank_statement.csv".to_string(),
    ))?;

    let parser = Arc::new(MemoryUploadParser::new());
    parser.add_file(
        "demo-job-1",
        vec![
            record("u1", "TXN001", "1500.00", "REF001")?,
            record("u2", "TXN008", "1800.00", "REF008")?,
            record("u3", "TXN999", "75.00", "REF999")?,
            record("u4", "TXN001", "1500.00", "REF001")?,
        ],
    )?;
    println!("  ✓ bank_statement.csv (4 rows)\n");

    // 3. Queue processing and reconciliation
    println!("⚙️  Running jobs...");
    let mut config = CoreConfig::default();
    config.reconciliation.tolerance = BigDecimal::from_str("0.0001")?;
    let queue = start_queue(Arc::clone(&store), parser, config)?;

    queue.submit_file_processing_job("demo-job-1")?;
    queue.submit_reconciliation_job("demo-job-1", "1")?;
    queue.wait_idle().await;

    for job in queue.jobs() {
        println!("  ✓ {} job {:?}", job.job_type(), job.status);
        if let Some(error) = &job.error {
            println!("    ✗ {}", error);
        }
    }
    println!();

    // 4. Report
    let Some(run) = store.reconciliation("demo-job-1")? else {
        println!("❌ No reconciliation run was stored");
        queue.shutdown().await;
        return Ok(());
    };

    println!("📋 Results:");
    for result in &run.results {
        let icon = match result.match_status {
            MatchStatus::Matched => "✅",
            MatchStatus::PartiallyMatched => "🟡",
            MatchStatus::NotMatched => "❌",
            MatchStatus::Duplicate => "🔁",
        };
        println!(
            "  {} {} -> {} ({}, score {:.2})",
            icon,
            result.uploaded_record_id,
            result.system_record_id.as_deref().unwrap_or("-"),
            result.match_status,
            result.match_score
        );
        for difference in &result.differences {
            println!(
                "      {}: uploaded {} vs system {} (variance {:.6})",
                difference.field,
                difference.uploaded_value,
                difference.system_value,
                difference.variance
            );
        }
    }

    let summary = &run.summary;
    println!("\n📈 Summary:");
    println!("  Matched:           {}", summary.matched);
    println!("  Partially matched: {}", summary.partially_matched);
    println!("  Not matched:       {}", summary.not_matched);
    println!("  Duplicate:         {}", summary.duplicate);
    println!("  Accuracy:          {:.2}%", summary.accuracy);

    queue.shutdown().await;
    println!("\n🎉 Done!");

    Ok(())
}
