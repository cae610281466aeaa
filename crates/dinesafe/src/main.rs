use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use dinesafe_core::{
    CkanFetcher, Config, DatasetLoader, Freshness, PipelineError, SnapshotMetadata, SnapshotState,
    SnapshotStore,
};
use dinesafe_parser::{
    heatmap_points, DatasetSummary, EstablishmentStatus, FilterDomains, HeatmapPoint,
    InspectionFilter, Severity,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "DineSafe inspection ingestion CLI", long_about = None)]
struct Cli {
    /// TOML configuration file (DINESAFE_* environment variables still apply)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, normalize and persist a new snapshot
    Refresh,
    /// Show the latest snapshot metadata and its freshness
    Status(MaxAgeArgs),
    /// Load the dataset (fetching if needed) and print a summary
    Summary(SummaryArgs),
    /// Print the values available to each dashboard filter
    Domains(MaxAgeArgs),
    /// Print the busiest mapped locations
    Map(MapArgs),
    /// List snapshot data files on disk
    Snapshots,
}

#[derive(Args, Debug, Default)]
struct MaxAgeArgs {
    /// Maximum acceptable age in seconds (defaults to the configured value)
    #[arg(long)]
    max_age: Option<u64>,
}

#[derive(Args, Debug)]
struct MapArgs {
    #[command(flatten)]
    age: MaxAgeArgs,
    /// Number of locations to print
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

#[derive(Args, Debug, Default)]
struct SummaryArgs {
    #[command(flatten)]
    age: MaxAgeArgs,
    /// Restrict to a severity (repeatable)
    #[arg(long = "severity", value_parser = parse_severity)]
    severities: Vec<Severity>,
    /// Restrict to an establishment status (repeatable)
    #[arg(long = "status", value_parser = parse_status)]
    statuses: Vec<EstablishmentStatus>,
    /// Restrict to an establishment type (repeatable)
    #[arg(long = "type")]
    establishment_types: Vec<String>,
    /// First inspection date to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last inspection date to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Case-insensitive substring of the establishment name
    #[arg(long)]
    name: Option<String>,
}

impl SummaryArgs {
    fn filter(&self) -> InspectionFilter {
        InspectionFilter {
            severities: self.severities.clone(),
            statuses: self.statuses.clone(),
            establishment_types: self.establishment_types.clone(),
            date_from: self.from,
            date_to: self.to,
            name_contains: self.name.clone(),
        }
    }
}

fn parse_severity(value: &str) -> std::result::Result<Severity, String> {
    Severity::recognize(value).ok_or_else(|| format!("unknown severity '{value}'"))
}

fn parse_status(value: &str) -> std::result::Result<EstablishmentStatus, String> {
    EstablishmentStatus::recognize(value).ok_or_else(|| format!("unknown status '{value}'"))
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Refresh => {
            let mut loader = build_loader(&config)?;
            let loaded = loader.refresh().context("refresh failed")?;
            print_metadata(&loaded.metadata);
            Ok(())
        }
        Command::Status(args) => {
            let loader = build_loader(&config)?;
            let max_age = max_age(&config, &args);
            let state = loader.snapshot_state(max_age)?;
            let metadata = match state {
                SnapshotState::Absent => None,
                SnapshotState::Fresh | SnapshotState::Stale => loader.latest_metadata()?,
            };
            match metadata {
                Some(metadata) => {
                    print_metadata(&metadata);
                    println!(
                        "{} (age {}, max age {})",
                        state.as_str(),
                        format_age(metadata.age(Utc::now())),
                        format_duration(max_age)
                    );
                }
                None => println!("{}: no usable snapshot on disk", state.as_str()),
            }
            Ok(())
        }
        Command::Summary(args) => {
            let mut loader = build_loader(&config)?;
            let loaded = load(&mut loader, max_age(&config, &args.age))?;
            let filter = args.filter();
            let dataset = filter
                .apply(&loaded.dataset)
                .context("failed to filter inspections")?;
            if !filter.is_unrestricted() {
                info!(rows = dataset.height(), "Applied inspection filter");
            }
            let summary =
                DatasetSummary::from_dataset(&dataset).context("failed to summarise dataset")?;
            print_data_as_of(&loaded.metadata, loaded.freshness);
            print_summary(&summary);
            Ok(())
        }
        Command::Domains(args) => {
            let mut loader = build_loader(&config)?;
            let loaded = load(&mut loader, max_age(&config, &args))?;
            let domains = FilterDomains::from_dataset(&loaded.dataset)
                .context("failed to collect filter domains")?;
            print_data_as_of(&loaded.metadata, loaded.freshness);
            print_domains(&domains);
            Ok(())
        }
        Command::Map(args) => {
            let mut loader = build_loader(&config)?;
            let loaded = load(&mut loader, max_age(&config, &args.age))?;
            let points =
                heatmap_points(&loaded.dataset).context("failed to group map locations")?;
            print_data_as_of(&loaded.metadata, loaded.freshness);
            print_map(&points, args.limit);
            Ok(())
        }
        Command::Snapshots => {
            let store = SnapshotStore::new(&config.snapshot_dir);
            let current = store.latest_metadata()?.map(|metadata| metadata.data_file);
            let files = store.list_snapshots()?;
            if files.is_empty() {
                println!("No snapshots in {}", store.dir().display());
            }
            for path in files {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let marker = if current.as_deref() == Some(name.as_str()) { "*" } else { " " };
                println!("{marker} {}", path.display());
            }
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_loader(config: &Config) -> Result<DatasetLoader<CkanFetcher>> {
    let fetcher = CkanFetcher::from_config(config).context("failed to build CKAN client")?;
    Ok(DatasetLoader::new(
        fetcher,
        SnapshotStore::new(&config.snapshot_dir),
    ))
}

fn max_age(config: &Config, args: &MaxAgeArgs) -> Duration {
    args.max_age
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.max_age())
}

fn load(
    loader: &mut DatasetLoader<CkanFetcher>,
    max_age: Duration,
) -> Result<dinesafe_core::LoadedDataset> {
    match loader.get_dataset(max_age) {
        Ok(loaded) => Ok(loaded),
        Err(err @ PipelineError::SnapshotAbsent { .. }) => {
            Err(anyhow!(err).context("no data available yet"))
        }
        Err(err) => Err(anyhow!(err).context("failed to load the DineSafe dataset")),
    }
}

fn print_data_as_of(metadata: &SnapshotMetadata, freshness: Freshness) {
    let stamp = metadata.fetched_at.format("%Y-%m-%d %H:%M:%S UTC");
    match freshness {
        Freshness::Fresh => println!("Data as of {stamp}"),
        Freshness::Stale => {
            warn!(fetched_at = %metadata.fetched_at, "Serving stale data");
            println!("Data as of {stamp} (STALE: refresh failed)");
        }
    }
}

fn print_metadata(metadata: &SnapshotMetadata) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Field", "Value"]);
    let date_range = metadata
        .date_range
        .map(|range| format!("{} .. {}", range.min, range.max))
        .unwrap_or_else(|| "-".to_string());
    let rows = [
        ("data file", metadata.data_file.clone()),
        ("fetched at", metadata.fetched_at.to_rfc3339()),
        ("rows", metadata.row_count.to_string()),
        ("establishments", metadata.unique_establishments.to_string()),
        ("inspection dates", date_range),
        ("schema version", metadata.schema_version.to_string()),
        ("source", metadata.source.clone()),
        ("payload hash", metadata.payload_hash.clone()),
        ("rows dropped", metadata.report.dropped_rows().to_string()),
        ("values coerced", metadata.report.coerced_values.to_string()),
    ];
    for (field, value) in rows {
        table.add_row(vec![field.to_string(), value]);
    }
    if !metadata.report.missing_columns.is_empty() {
        table.add_row(vec![
            "missing columns".to_string(),
            metadata.report.missing_columns.join(", "),
        ]);
    }
    println!("{table}");
}

fn print_summary(summary: &DatasetSummary) {
    let mut overview = Table::new();
    overview.load_preset(UTF8_FULL).set_header(vec!["Metric", "Value"]);
    overview.add_row(vec![
        "Total inspections".to_string(),
        summary.total_inspections.to_string(),
    ]);
    overview.add_row(vec![
        "Unique establishments".to_string(),
        summary.unique_establishments.to_string(),
    ]);
    overview.add_row(vec![
        "Inspections per establishment".to_string(),
        format!("{:.2}", summary.inspections_per_establishment()),
    ]);
    if let Some((min, max)) = summary.date_range {
        overview.add_row(vec![
            "Inspection dates".to_string(),
            format!("{min} .. {max} ({} days)", summary.date_range_days),
        ]);
    }
    println!("{overview}");

    print_counts("Severity", &summary.severity_counts);
    print_counts("Status", &summary.status_counts);
    print_counts("Establishment type", &summary.establishment_type_counts);
}

fn print_counts(label: &str, counts: &[(String, usize)]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![label, "Count"]);
    for (value, count) in counts {
        table.add_row(vec![value.clone(), count.to_string()]);
    }
    println!("{table}");
}

fn print_map(points: &[HeatmapPoint], limit: usize) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Establishment",
        "Address",
        "Lat/Lon",
        "Inspections",
        "Status",
        "Severities",
    ]);
    for point in points.iter().take(limit) {
        let severities = point
            .severity_counts
            .iter()
            .map(|(severity, count)| format!("{severity}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            point.establishment_name.clone(),
            point.establishment_address.clone(),
            format!("{:.5}, {:.5}", point.latitude, point.longitude),
            point.inspection_count.to_string(),
            point.status.clone(),
            severities,
        ]);
    }
    println!("{table}");
    if points.len() > limit {
        println!("{} more locations not shown", points.len() - limit);
    }
}

fn print_domains(domains: &FilterDomains) {
    let join = |values: Vec<&str>| values.join(", ");
    println!(
        "Severities: {}",
        join(domains.severities.iter().map(Severity::as_str).collect())
    );
    println!(
        "Statuses: {}",
        join(domains.statuses.iter().map(EstablishmentStatus::as_str).collect())
    );
    println!(
        "Establishment types: {}",
        join(domains.establishment_types.iter().map(String::as_str).collect())
    );
    match domains.date_range {
        Some((min, max)) => println!("Inspection dates: {min} .. {max}"),
        None => println!("Inspection dates: -"),
    }
}

fn format_age(age: TimeDelta) -> String {
    format_duration(age.to_std().unwrap_or_default())
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
