//! Index statistics and health overview.
//!
//! A quick summary of what's indexed: parent and child counts, keyword
//! index state, and database size. Used by `abx stats` to give confidence
//! that ingestion cycles are working as expected.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::keyword::{KeywordIndex, KeywordStatus};
use crate::store::IndexStore;

/// Run the stats command: load the persisted generation and print a
/// summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    let store = IndexStore::open(pool).await?;

    let keyword = KeywordIndex::new(config.keyword.enabled);
    keyword.rebuild_from(&store.snapshot());

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Answerbase — Index Stats");
    println!("========================");
    println!();
    println!("  Database:  {}", config.db.path.display());
    println!("  Size:      {}", format_bytes(db_size));
    println!();
    println!("  Parents:   {}", store.parent_count());
    println!("  Children:  {}", store.child_count());
    println!(
        "  Keyword:   {}",
        match keyword.status() {
            KeywordStatus::Disabled => "disabled (vector-only retrieval)".to_string(),
            KeywordStatus::Empty => "empty".to_string(),
            KeywordStatus::Ready { children } => format!("ready ({} children)", children),
        }
    );
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
