use article_lookup_lib::{aggregator, exporter, input_loader, logger};
use article_lookup_lib::{AppConfig, BatchScheduler, HttpLookupClient, Lookup};

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use log::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logger::init();

    let mut args = std::env::args().skip(1);
    let Some(input_file) = args.next() else {
        error!("Usage: article-lookup <articles.csv|articles.tsv|articles.xlsx> [output.tsv]");
        std::process::exit(2);
    };
    let output_file = match args.next() {
        Some(path) => PathBuf::from(path),
        None => default_output(Path::new(&input_file)),
    };

    let config = AppConfig::from_env()?;

    // A parse failure stops here, before any lookup is sent.
    let mut table = input_loader::load_records(&input_file)?;
    if table.is_empty() {
        warn!("No articles found in {}. Expected a header row with an 'article' column.", input_file);
    }

    let lookup: Arc<dyn Lookup> = Arc::new(HttpLookupClient::from_config(&config)?);
    let scheduler = BatchScheduler::new(config.scheduler);
    info!(
        "Looking up {} articles, {} at a time, {}s between batches",
        table.len(),
        config.scheduler.batch_size,
        config.scheduler.inter_batch_delay.as_secs()
    );

    let results = scheduler.run(table.work_items(), lookup).await?;
    table.records = aggregator::merge(&table.records, &results);

    let progress = scheduler.progress().snapshot();
    if let Some(message) = &progress.last_error {
        warn!("{} ({} of {} articles affected)", message, aggregator::failed_count(&results), results.len());
    }

    exporter::export_file(&table, &output_file)?;
    info!("Done. {} / {} articles processed.", progress.completed_count, progress.total_count);
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let name = input.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    input.with_file_name(exporter::export_file_name(name))
}
