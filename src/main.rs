use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use household_trends::analysis::{year_over_year, DeltaMode, DeltaRequest, RankedSubset};
use household_trends::config::{load_config, AnalysisConfig};
use household_trends::data::loader::{load_file, TableLayout};
use household_trends::data::model::Year;
use household_trends::export::{write_ranked, write_table};
use household_trends::pipeline;

#[derive(Parser)]
#[command(name = "household-trends", about = "Rank regions by change in household counts")]
struct Cli {
    #[command(flatten)]
    layout: LayoutArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct LayoutArgs {
    /// Column holding the region identifier
    #[arg(long, global = true, default_value = "region")]
    id_column: String,
    /// Only headers starting with this prefix are year columns
    #[arg(long, global = true)]
    year_prefix: Option<String>,
    /// Centroid latitude column, used by the continental filter
    #[arg(long, global = true, default_value = "CENTLAT")]
    latitude_column: String,
    /// Centroid longitude column
    #[arg(long, global = true, default_value = "CENTLON")]
    longitude_column: String,
}

impl LayoutArgs {
    fn layout(&self) -> TableLayout {
        TableLayout {
            id_column: self.id_column.clone(),
            year_prefix: self.year_prefix.clone(),
            latitude_column: self.latitude_column.clone(),
            longitude_column: self.longitude_column.clone(),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Percentage,
    Absolute,
}

impl From<ModeArg> for DeltaMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Percentage => DeltaMode::Percentage,
            ModeArg::Absolute => DeltaMode::Absolute,
        }
    }
}

#[derive(Args)]
struct FilterArgs {
    /// Drop regions at or below this value in any compared year
    #[arg(long)]
    min_value: Option<f64>,
    /// Keep only regions centred in the continental US
    #[arg(long)]
    continental: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a table: regions, years, centroid coverage
    Inspect { input: PathBuf },
    /// Compute one delta and rank regions by it
    Delta {
        input: PathBuf,
        /// Base year
        #[arg(long = "from")]
        year_a: Year,
        /// Comparison year
        #[arg(long = "to")]
        year_b: Year,
        #[arg(long, value_enum, default_value = "percentage")]
        mode: ModeArg,
        /// Divide by the number of elapsed years
        #[arg(long)]
        annualize: bool,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 20)]
        top: usize,
        #[arg(long)]
        ascending: bool,
        /// Round exported values to this many decimals
        #[arg(long)]
        round: Option<u32>,
        /// Write the ranking to a .csv or .json file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Add a change column for every consecutive pair of years
    Yoy {
        input: PathBuf,
        #[arg(long, value_enum, default_value = "percentage")]
        mode: ModeArg,
        #[command(flatten)]
        filters: FilterArgs,
        /// Augmented table, .csv
        #[arg(long)]
        output: PathBuf,
    },
    /// Run a JSON analysis plan
    Run { config: PathBuf },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let layout = cli.layout.layout();

    match cli.command {
        Commands::Inspect { input } => inspect(&input, &layout),
        Commands::Delta {
            input,
            year_a,
            year_b,
            mode,
            annualize,
            filters,
            top,
            ascending,
            round,
            output,
        } => {
            let mut request = DeltaRequest::new(year_a, year_b, mode.into());
            request.annualize = annualize;

            let mut config = AnalysisConfig::new(input);
            config.layout = layout;
            config.min_value = filters.min_value;
            config.continental = filters.continental;
            config.deltas = vec![request];
            config.top = top;
            config.ascending = ascending;
            config.round = round;

            let report = pipeline::run(&config)?;
            report.filtered_out.log_summary("filters");
            for ranked in &report.rankings {
                print_ranking(ranked);
                if let Some(path) = &output {
                    write_ranked(path, ranked)?;
                }
            }
            Ok(())
        }
        Commands::Yoy {
            input,
            mode,
            filters,
            output,
        } => {
            let mut config = AnalysisConfig::new(input);
            config.layout = layout;
            config.min_value = filters.min_value;
            config.continental = filters.continental;
            // Year-over-year touches every year, so the threshold does too.
            let loaded = load_file(&config.input, &config.layout)?;
            config.min_value_years = loaded.years().iter().copied().collect();

            let (mut table, dropped) = pipeline::prepare(&loaded, &config)?;
            dropped.log_summary("filters");
            let names = year_over_year(&mut table, mode.into())
                .context("computing year-over-year changes")?;
            for name in &names {
                if let Some(column) = table.column(name) {
                    println!("{name}: {} of {} regions", column.populated(), table.len());
                }
            }
            write_table(&output, &table)
        }
        Commands::Run { config } => {
            let config = load_config(&config)?;
            let report = pipeline::run(&config)?;
            report.filtered_out.log_summary("filters");
            for ranked in &report.rankings {
                print_ranking(ranked);
            }
            for path in &report.written {
                println!("wrote {}", path.display());
            }
            Ok(())
        }
    }
}

fn inspect(input: &Path, layout: &TableLayout) -> Result<()> {
    let table = load_file(input, layout)?;
    let placed = table.regions().iter().filter(|r| r.centroid.is_some()).count();
    println!("{table}");
    println!("{placed} of {} regions have a centroid", table.len());
    for year in table.years() {
        let present = table
            .regions()
            .iter()
            .filter(|r| r.value(*year).is_some())
            .count();
        println!("  {year}: {present} values");
    }
    Ok(())
}

fn print_ranking(ranked: &RankedSubset) {
    let direction = if ranked.ascending { "bottom" } else { "top" };
    println!("{direction} {} by {}", ranked.len(), ranked.metric);
    if ranked.is_empty() {
        println!("  (no regions)");
    }
    for (i, entry) in ranked.entries.iter().enumerate() {
        println!("  {:>3}. {:<40} {:>12.4}", i + 1, entry.region, entry.value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_columns_come_from_flags() {
        let cli = Cli::try_parse_from([
            "household-trends",
            "inspect",
            "tracts.csv",
            "--latitude-column",
            "INTPTLAT",
            "--longitude-column",
            "INTPTLON",
        ])
        .unwrap();
        let layout = cli.layout.layout();
        assert_eq!(layout.latitude_column, "INTPTLAT");
        assert_eq!(layout.longitude_column, "INTPTLON");
    }

    #[test]
    fn centroid_columns_default_to_census_names() {
        let cli = Cli::try_parse_from(["household-trends", "inspect", "t.csv"]).unwrap();
        let layout = cli.layout.layout();
        assert_eq!(layout.latitude_column, "CENTLAT");
        assert_eq!(layout.longitude_column, "CENTLON");
    }
}
