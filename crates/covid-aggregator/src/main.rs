mod bootstrap;

use std::sync::Arc;

use anyhow::{Context, Result};
use covid_core::formatting::{format_count, format_delta, percentage};
use covid_core::models::{Metric, SnapshotPolicy};
use covid_core::settings::Settings;
use covid_data::analysis::PipelineOutput;
use covid_data::remote::HttpTimelineSource;
use covid_data::writer::{write_aggregated_csv, write_snapshot_csv};
use covid_runtime::data_manager::PipelineSource;
use covid_runtime::orchestrator::RefreshOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("COVID-19 aggregator v{} starting", env!("CARGO_PKG_VERSION"));

    // The remote client is blocking and must be built off the async runtime.
    let source = {
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || build_source(&settings))
            .await
            .context("source setup task panicked")??
    };
    tracing::info!(
        "Source: {:?}, output: {}",
        source,
        settings.output_path().display()
    );

    if settings.watch {
        run_watch(&settings, source).await
    } else {
        let output = tokio::task::spawn_blocking(move || source.run())
            .await
            .context("pipeline task panicked")??;
        publish(&settings, &output)
    }
}

/// Resolve where the pipeline reads from.
fn build_source(settings: &Settings) -> Result<PipelineSource> {
    if let Some(url) = &settings.remote_url {
        let client = HttpTimelineSource::new(url)?;
        return Ok(PipelineSource::Remote {
            source: Arc::new(client),
            regions: settings.regions.clone(),
        });
    }

    let mut config = settings.pipeline_config()?;
    if settings.data_dir.is_none() {
        match bootstrap::discover_data_dir(&config.schema) {
            Some(dir) => {
                tracing::info!("Using data directory {}", dir.display());
                config.data_dir = dir;
            }
            None => tracing::warn!(
                "No {} files found in the usual places; searching {}",
                config.schema.name,
                config.data_dir.display()
            ),
        }
    }
    Ok(PipelineSource::Local(config))
}

/// Rebuild on every interval until Ctrl+C.
async fn run_watch(settings: &Settings, source: PipelineSource) -> Result<()> {
    tracing::info!("Refreshing every {}s", settings.refresh_rate);
    let (mut rx, handle) = RefreshOrchestrator::new(settings.refresh_rate, source).start();

    loop {
        tokio::select! {
            update = rx.recv() => {
                let Some(update) = update else {
                    tracing::warn!("Refresh loop ended");
                    break;
                };
                if update.stale {
                    tracing::warn!(
                        "Refresh #{} failed, keeping previous table: {}",
                        update.refresh_count,
                        update.last_error.as_deref().unwrap_or("unknown error")
                    );
                    continue;
                }
                if let Err(e) = publish(settings, &update.output) {
                    tracing::error!("Failed to publish refresh #{}: {:#}", update.refresh_count, e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; stopping refresh task");
                break;
            }
        }
    }

    handle.abort();
    Ok(())
}

/// Write the configured outputs and print the run summary.
fn publish(settings: &Settings, output: &PipelineOutput) -> Result<()> {
    let policy = SnapshotPolicy::from_name(&settings.snapshot_policy).unwrap_or_default();
    let path = settings.output_path();

    let written = write_aggregated_csv(&path, &output.table)
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!("Wrote {} rows to {}", written, path.display());

    if let Some(snapshot_path) = &settings.snapshot_output {
        let written = write_snapshot_csv(snapshot_path, &output.table, policy)
            .with_context(|| format!("writing {}", snapshot_path.display()))?;
        tracing::info!("Wrote {} snapshot rows to {}", written, snapshot_path.display());
    }

    for column in &output.metadata.dropped_columns {
        tracing::warn!("Dropped column {}", column);
    }
    if !output.metadata.failed_regions.is_empty() {
        tracing::warn!(
            "No data for regions: {}",
            output.metadata.failed_regions.join(", ")
        );
    }

    print_summary(settings.top, policy, output);
    Ok(())
}

fn print_summary(top: usize, policy: SnapshotPolicy, output: &PipelineOutput) {
    let table = &output.table;
    let Some((first, last)) = table.date_range() else {
        println!("No data.");
        return;
    };

    println!(
        "{} regions, {} rows, {} to {}",
        format_count(output.metadata.regions as i64),
        format_count(output.metadata.rows as i64),
        first,
        last
    );
    if top == 0 {
        return;
    }

    println!();
    println!(
        "{:<32} {:>12} {:>10} {:>10} {:>7}",
        "Region", "Confirmed", "New", "Deaths", "CFR %"
    );
    for row in table.top_n(top, Metric::Confirmed, policy) {
        println!(
            "{:<32} {:>12} {:>10} {:>10} {:>7.2}",
            row.region.label(),
            format_count(row.confirmed),
            format_delta(row.new_confirmed),
            format_count(row.deaths),
            percentage(row.deaths, row.confirmed, 2)
        );
    }
}
