use dash_pipeline::dashboards::covid::{self, CovidReport};
use dash_pipeline::dashboards::SalesReport;
use dash_pipeline::data::CsvSource;
use dash_pipeline::export::to_csv_string;
use dash_pipeline::filter::FilterSpec;
use dash_pipeline::{
    Pipeline, PipelineConfig, RunRequest, SnapshotCache, StageOutcome, SyntheticSalesSource,
};
use std::env;
use tracing_subscriber::EnvFilter;

// Usage: dashboard_report [covid.csv | -] [config.json]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    let config = match args.get(2) {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    let mut cache = SnapshotCache::new(config.cache_ttl());

    match args.get(1).map(String::as_str) {
        Some(path) if path != "-" => covid_report(path, &mut cache),
        _ => sales_report(&config, &mut cache),
    }
}

fn sales_report(
    config: &PipelineConfig,
    cache: &mut SnapshotCache,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("E-Commerce Analytics Report");
    println!("===========================");

    let source = SyntheticSalesSource::new(config.forecast.seed);
    let request = RunRequest::sales(FilterSpec::new(), config);
    let output = Pipeline::run(cache, &source, &request)?;

    for warning in &output.warnings {
        println!("warning: {warning}");
    }

    let report = SalesReport::build(&output.view)?;
    println!("\n{}", report.kpis);

    println!("Top products by revenue:");
    print!("{}", to_csv_string(&report.top_products.round(2), config.export.delimiter_byte()?)?);

    match &output.forecast {
        StageOutcome::Ready(forecast) => println!("\n{forecast}"),
        StageOutcome::Unavailable(e) => println!("\nForecast unavailable: {e}"),
        _ => println!("\nForecast skipped"),
    }

    match &output.segmentation {
        StageOutcome::Ready(segments) => {
            println!("{segments}");
            print!(
                "{}",
                to_csv_string(&segments.summary_table()?.round(2), config.export.delimiter_byte()?)?
            );
        }
        StageOutcome::Unavailable(e) => println!("Segmentation unavailable: {e}"),
        _ => println!("Segmentation skipped"),
    }

    Ok(())
}

fn covid_report(path: &str, cache: &mut SnapshotCache) -> Result<(), Box<dyn std::error::Error>> {
    println!("COVID-19 Report");
    println!("===============");

    let source = CsvSource::covid(path);
    let snapshot = cache.get_or_reload(&source)?;

    let locations = covid::locations_for(&snapshot, covid::ALL_CONTINENTS)?;
    let selection = covid::default_selection(&locations);
    let range = covid::default_date_range(&snapshot)?;
    let view = covid::covid_filter(&selection, range).apply(&snapshot)?;

    println!("Locations: {}", selection.join(", "));
    if let Some((start, end)) = range {
        println!("Dates:     {start} to {end}");
    }

    let report = CovidReport::build(&view, "total_cases")?;
    println!("\n{}", report.global);

    match &report.latest {
        Some(latest) => {
            println!("Latest total cases:");
            print!("{}", to_csv_string(latest, b',')?);
        }
        None => println!("total_cases column missing, per-location tables skipped"),
    }

    if let Some(summary) = &report.summary {
        println!("\nStatistical summary:");
        print!("{}", to_csv_string(summary, b',')?);
    }

    Ok(())
}
