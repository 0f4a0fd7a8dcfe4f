use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use biodyn_plot::{extract, DisplayPolicy, ExtractOptions, Gating, PlotSettings, Plotter, ResultsStore};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Comparison plots for dynamic-simulation results", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plot every category present in a results file
    Extract(ExtractArgs),
    /// List the entries of a results file with their shapes
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct ExtractArgs {
    /// Results file (JSON: case id -> entries)
    #[arg(value_hint = ValueHint::FilePath)]
    results: PathBuf,

    /// Save one PNG per category
    #[arg(long, action = ArgAction::SetTrue)]
    save: bool,

    /// Directory for saved plots (defaults to `plots/` next to the results)
    #[arg(long, value_hint = ValueHint::DirPath)]
    output_dir: Option<PathBuf>,

    /// Open each figure in a viewer when a display is available
    #[arg(long, action = ArgAction::SetTrue)]
    show: bool,

    /// Raster resolution (overrides the style file)
    #[arg(long)]
    dpi: Option<u32>,

    /// Optional JSON style file (fonts, line width, dpi)
    #[arg(long, value_hint = ValueHint::FilePath)]
    style: Option<PathBuf>,

    /// Only plot other categories when ground reaction forces are present
    #[arg(long, action = ArgAction::SetTrue)]
    require_grf: bool,

    /// Command used to open figures
    #[arg(long, default_value = "xdg-open")]
    viewer: String,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Results file to inspect
    #[arg(value_hint = ValueHint::FilePath)]
    results: PathBuf,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Extract(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Extract(args) => handle_extract(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

fn handle_extract(args: ExtractArgs) -> Result<()> {
    let mut settings = match &args.style {
        Some(path) => PlotSettings::from_json_file(path)
            .with_context(|| format!("failed to load style {}", path.display()))?,
        None => PlotSettings::default(),
    };
    if let Some(dpi) = args.dpi {
        settings.dpi = dpi;
    }
    settings.validate()?;

    if !args.save && !args.show {
        info!("Neither --save nor --show given; figures are composed but not written");
    }

    let display = DisplayPolicy::detect().with_viewer(args.viewer.clone());
    let plotter = Plotter::new(settings, display);
    let options = ExtractOptions {
        show: args.show,
        save: args.save,
        output_dir: args.output_dir.clone(),
        gating: if args.require_grf {
            Gating::RequireGrf
        } else {
            Gating::Independent
        },
    };

    let extraction = extract(&args.results, &options, &plotter)
        .with_context(|| format!("failed to extract {}", args.results.display()))?;
    debug!("Case {} produced {} plot(s)", extraction.case_id, extraction.plotted.len());

    let keys: Vec<String> = extraction
        .results
        .keys()
        .map(|k| format!("'{}'", k))
        .collect();
    println!(
        "Time range: {:.2} - {:.2} seconds",
        extraction.time.first(),
        extraction.time.last()
    );
    println!("Available data keys: [{}]", keys.join(", "));
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    let store = ResultsStore::load(&args.results)
        .with_context(|| format!("failed to read {}", args.results.display()))?;

    let mut report = String::new();
    writeln!(report, "File: {}", store.path().display())?;
    for (case_id, case) in store.cases() {
        writeln!(report, "Case: {}", case_id)?;
        let mut count = 0usize;
        for key in case.keys() {
            let kind = case
                .entry_kind(key)
                .ok_or_else(|| anyhow!("entry {} vanished while inspecting", key))?;
            writeln!(report, "  {:<28} {}", key, kind)?;
            count += 1;
        }
        match case.time() {
            Ok(time) => writeln!(
                report,
                "  time axis: {} samples, {:.3} - {:.3} s",
                time.len(),
                time.first(),
                time.last()
            )?,
            Err(err) => writeln!(report, "  time axis: unavailable ({})", err)?,
        }
        writeln!(report, "  {} entries", count)?;
    }

    match &args.output {
        Some(path) => {
            fs::write(path, &report)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Wrote inspection report: {}", path.display());
        }
        None => {
            io::stdout()
                .write_all(report.as_bytes())
                .context("failed to write report to stdout")?;
        }
    }
    Ok(())
}
