//! Stats, channel listing and provisioning commands

use crate::config::Config;
use crate::error::Result;
use crate::lifecycle::Readiness;
use crate::meta::{ChannelSummary, MetaDb};
use crate::provision::{ProvisionOutcome, Provisioner};
use crate::stats::{IndexStats, StatsAggregator};
use tracing::info;

/// Collect index statistics
pub async fn cmd_stats(stats: &StatsAggregator, readiness: &Readiness) -> Result<IndexStats> {
    info!("Getting stats");
    stats.collect(readiness.artifact_version()).await
}

/// Print index statistics to console
pub fn print_stats(stats: &IndexStats) {
    println!("\n📊 rag-query Stats\n");
    println!("Index: {}", stats.db_root);
    println!(
        "Artifact version: {}",
        stats.artifact_version.as_deref().unwrap_or("unknown")
    );
    println!("\nQdrant:");
    println!("  Collection: {}", stats.collection);
    println!("  Points: {}", stats.qdrant_points);
    println!("\nEmbedding Model: {}", stats.embedding_model);
    println!("\nMetadata:");
    println!("  Files: {}", stats.indexed_files);
    println!("  Messages: {}", stats.indexed_messages);
    println!("  Channels: {}", stats.indexed_channels);
    println!(
        "  Last indexed: {}",
        stats.last_indexed.as_deref().unwrap_or("never")
    );
}

/// List indexed channels by message volume
pub async fn cmd_channels(
    db: &MetaDb,
    limit: usize,
    name_contains: Option<&str>,
) -> Result<Vec<ChannelSummary>> {
    info!("Listing channels");
    db.list_channels(limit, name_contains).await
}

/// Print channel list to console
pub fn print_channels(channels: &[ChannelSummary]) {
    println!("\n📚 Indexed Channels\n");

    if channels.is_empty() {
        println!("No channels indexed.");
        return;
    }

    for c in channels {
        println!(
            "• #{} ({} messages in {} files, last indexed {})",
            c.channel,
            c.message_count,
            c.file_count,
            c.last_indexed.as_deref().unwrap_or("never")
        );
    }
}

/// Run the provisioning pipeline once
pub async fn cmd_provision(config: &Config, readiness: &Readiness) -> Result<ProvisionOutcome> {
    Provisioner::new(config).run(readiness).await
}

/// Print provisioning outcome to console
pub fn print_provision_outcome(outcome: &ProvisionOutcome, config: &Config) {
    match outcome {
        ProvisionOutcome::AlreadyPresent => println!(
            "✓ Index already present at {}",
            config.index.dir.display()
        ),
        ProvisionOutcome::Installed { version } => println!(
            "✓ Installed artifact version {} into {}",
            version,
            config.index.dir.display()
        ),
    }
}
