use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use geojoin::diagnostics;
use geojoin::scale::ScaleDomain;
use geojoin::{Config, Session};

#[derive(Parser)]
#[command(name = "geojoin", version, about = "Join geometry with measurements and build stacked series")]
struct Cli {
    /// TOML configuration (key policy, column names, placeholders, ...).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Join geometry and measurements; print matched values and domain.
    Snapshot {
        #[arg(long)]
        geometry: PathBuf,
        #[arg(long)]
        data: PathBuf,
        /// Code → label table for numeric identifiers.
        #[arg(long)]
        translation: Option<PathBuf>,
        /// Stretch the domain to include zero.
        #[arg(long)]
        zero_based: bool,
    },
    /// Print the stacked series of one entity.
    Series {
        #[arg(long)]
        data: PathBuf,
        #[arg(long)]
        entity: String,
        /// Stacking order, comma separated. Defaults to first-seen order.
        #[arg(long, value_delimiter = ',')]
        categories: Option<Vec<String>>,
        /// First period of a fixed, zero-filled range.
        #[arg(long, requires = "to")]
        from: Option<i32>,
        #[arg(long, requires = "from")]
        to: Option<i32>,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let mut session = Session::new(config);

    match cli.command {
        Command::Snapshot {
            geometry,
            data,
            translation,
            zero_based,
        } => {
            session.load_geometry(&geometry)?;
            session.load_measurements(&data)?;
            if let Some(path) = translation {
                session.load_translation(&path)?;
            }
            let mut resolution = session.resolve()?;
            if zero_based {
                resolution.domain = resolution.domain.map(ScaleDomain::anchored_at_zero);
            }
            for key in &resolution.unmatched_geo {
                log::warn!("no data for {key}");
            }
            for key in &resolution.unmatched_rows {
                log::warn!("no geometry for {key}");
            }
            diagnostics::log_all("snapshot", &resolution.diagnostics);
            print_json(&resolution)
        }
        Command::Series {
            data,
            entity,
            categories,
            from,
            to,
        } => {
            if let (Some(from), Some(to)) = (from, to) {
                session.config.series.period_range = Some((from, to));
            }
            session.load_measurements(&data)?;
            if !session.has_entity(&entity) {
                log::warn!("no rows for '{entity}' in {}", data.display());
            }
            let built = session.series(&entity, categories.as_deref())?;
            log::info!("stacking order: {}", built.series.categories.join(", "));
            diagnostics::log_all(&entity, &built.diagnostics);
            print_json(&built)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value).context("writing JSON")?;
    writeln!(out).context("writing JSON")?;
    Ok(())
}
