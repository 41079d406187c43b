// Entry point and high-level CLI flow.
//
// - `build` recomputes the aggregate from the raw disclosure files.
// - `show` and `year` read the cached aggregate (rebuilding on a miss) and
//   print markdown previews.
// - `export` writes the rankings as CSV.
// - `categorize` / `categorize-stats` run the offline theme tagging.
mod cache;
mod categorize;
mod config;
mod error;
mod loader;
mod output;
mod reports;
mod types;
mod util;

use clap::{Parser, Subcommand};
use config::{AggregateConfig, DataPaths, DEFAULT_BUCKET_WIDTH};
use error::{ReportError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use types::AggregatedData;

#[derive(Parser)]
#[command(name = "appg-report")]
#[command(about = "Aggregate APPG benefit disclosures by year, group and funder")]
struct Cli {
    /// Directory holding one raw disclosure JSON file per year.
    #[arg(long, global = true, env = "APPG_RAW_DIR", default_value = "data/raw")]
    raw_dir: PathBuf,
    /// Directory the aggregate artifact is written to.
    #[arg(long, global = true, env = "APPG_CACHE_DIR", default_value = "data/cache")]
    cache_dir: PathBuf,
    #[arg(long, global = true, env = "APPG_BUCKET_WIDTH", default_value_t = DEFAULT_BUCKET_WIDTH)]
    bucket_width: f64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the aggregate artifact from the raw files.
    Build,
    /// Print the cross-year overview.
    Show {
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Print one year's group and funder rankings.
    Year {
        year: i32,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Write rankings as CSV files.
    Export {
        #[arg(long, default_value = "reports")]
        out: PathBuf,
    },
    /// Tag uncategorized groups in the raw files with theme categories.
    Categorize {
        #[arg(long, default_value = categorize::DEFAULT_MODEL)]
        model: String,
        #[arg(long, env = "OPENAI_BASE_URL", default_value = categorize::DEFAULT_BASE_URL)]
        base_url: String,
    },
    /// Show how much of the raw data is categorized.
    CategorizeStats,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("APPG_LOG").unwrap_or_else(|_| EnvFilter::new("appg_report=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_overview(data: &AggregatedData, top: usize) {
    let stats = &data.overall_stats;
    println!("APPG Benefits Overview\n");
    println!(
        "{} years, {} distinct groups, {} total value",
        stats.total_years,
        util::format_int(stats.total_groups as u64),
        util::format_currency(stats.total_value)
    );
    if let Some(top_group) = &stats.most_funded_group {
        println!(
            "Most funded: {} ({}) with {} in {}",
            top_group.title,
            top_group.name,
            util::format_currency(top_group.total),
            top_group.year
        );
    }
    println!();

    output::preview_table(
        "Yearly Summary",
        None,
        &reports::year_overview_rows(data),
        usize::MAX,
    );
    output::preview_table(
        "Group Comparison Across Years",
        Some(format!("Top {} by total across years", top).as_str()),
        &reports::comparison_rows(&data.group_comparisons),
        top,
    );
}

fn handle_build(config: &AggregateConfig) -> Result<ExitCode> {
    let data = cache::rebuild(config)?;
    println!(
        "Built aggregated data: {} ({} years)",
        config.paths.artifact().display(),
        data.overall_stats.total_years
    );
    Ok(ExitCode::SUCCESS)
}

fn handle_show(config: &AggregateConfig, top: usize) -> Result<ExitCode> {
    let data = cache::load_or_build(config)?;
    print_overview(&data, top);
    Ok(ExitCode::SUCCESS)
}

fn handle_year(config: &AggregateConfig, year: i32, top: usize) -> Result<ExitCode> {
    let Some(summary) = cache::year_summary(config, year)? else {
        println!("No data found for {}.", year);
        return Ok(ExitCode::FAILURE);
    };

    println!("APPG Benefits {}\n", year);
    println!(
        "Total groups: {} | Groups with benefits: {} | Total value: {} | Average benefit: {}",
        summary.total_groups,
        summary.groups_with_benefits,
        util::format_currency(summary.total_value),
        util::format_currency(summary.average_benefit)
    );
    if summary.skipped_benefits > 0 {
        println!(
            "Note: {} benefit lines had no usable funder or value.",
            util::format_int(summary.skipped_benefits as u64)
        );
    }
    println!();

    let shown = |total: usize| format!("{} of {}", top.min(total), total);
    output::preview_table(
        "Top Groups",
        Some(shown(summary.all_groups.len()).as_str()),
        &reports::group_ranking_rows(summary.top_groups(top)),
        top,
    );
    output::preview_table(
        "Top Funders",
        Some(shown(summary.all_funders.len()).as_str()),
        &reports::funder_ranking_rows(summary.top_funders(top)),
        top,
    );
    if !summary.all_subcategories.is_empty() {
        println!("Top Funded Subcategories\n");
        for (idx, sub) in summary.top_subcategories(top).iter().enumerate() {
            println!(
                "#{} {} ({}) - {} across {} groups",
                idx + 1,
                sub.name,
                sub.category,
                util::format_currency(sub.total_amount),
                sub.appg_count
            );
        }
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_export(config: &AggregateConfig, out: &Path) -> Result<ExitCode> {
    let data = cache::load_or_build(config)?;
    fs::create_dir_all(out).map_err(|e| ReportError::io(out, e))?;

    output::write_csv(&out.join("year_overview.csv"), &reports::year_overview_rows(&data))?;
    output::write_csv(
        &out.join("group_comparisons.csv"),
        &reports::comparison_rows(&data.group_comparisons),
    )?;
    for summary in &data.year_summaries {
        output::write_csv(
            &out.join(format!("{}_groups.csv", summary.year)),
            &reports::group_ranking_rows(&summary.all_groups),
        )?;
        output::write_csv(
            &out.join(format!("{}_funders.csv", summary.year)),
            &reports::funder_ranking_rows(&summary.all_funders),
        )?;
    }
    println!(
        "Exported {} yearly reports to {}",
        data.year_summaries.len(),
        out.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn handle_categorize(paths: &DataPaths, model: &str, base_url: &str) -> Result<ExitCode> {
    let client = categorize::OpenAiClient::from_env(base_url, model)?;
    let outcome =
        categorize::categorize_all(&client, paths, &categorize::CategorizeOptions::default())?;
    println!("Categorization complete!");
    println!("  Total APPGs categorized: {}", outcome.processed);
    println!("  Total APPGs skipped (already categorized): {}", outcome.skipped);
    println!("Next step: run `build` to refresh the aggregated data.");
    Ok(ExitCode::SUCCESS)
}

fn handle_categorize_stats(paths: &DataPaths) -> Result<ExitCode> {
    let stats = categorize::categorization_stats(paths)?;
    println!("Categorization Statistics");
    println!("  Total APPGs: {}", stats.total_groups);
    println!(
        "  Categorized: {} ({}%)",
        stats.categorized,
        stats.coverage_pct().round()
    );
    println!("  Uncategorized: {}\n", stats.total_groups - stats.categorized);
    println!("Category Distribution:");
    for (key, count) in &stats.distribution {
        println!("  {}: {} APPGs", key, count);
    }
    Ok(ExitCode::SUCCESS)
}

fn run(cli: Cli) -> Result<ExitCode> {
    let paths = DataPaths::new(cli.raw_dir, cli.cache_dir);
    let config = AggregateConfig::new(paths.clone()).with_bucket_width(cli.bucket_width);
    match cli.command {
        Command::Build => handle_build(&config),
        Command::Show { top } => handle_show(&config, top),
        Command::Year { year, top } => handle_year(&config, year, top),
        Command::Export { out } => handle_export(&config, &out),
        Command::Categorize { model, base_url } => handle_categorize(&paths, &model, &base_url),
        Command::CategorizeStats => handle_categorize_stats(&paths),
    }
}

fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_year_subcommand() {
        let cli = Cli::try_parse_from(["appg-report", "--raw-dir", "in", "year", "2022", "--top", "5"])
            .unwrap();
        assert_eq!(cli.raw_dir, PathBuf::from("in"));
        match cli.command {
            Command::Year { year, top } => assert_eq!((year, top), (2022, 5)),
            _ => panic!("expected year command"),
        }
    }
}
