use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::category::{Category, ChannelDescriptor};
use crate::channels::{ChannelSet, TimeSeries};
use crate::labels::normalize_labels;
use crate::layout::{Figure, PlotInput};
use crate::render::Plotter;
use crate::store::{CaseResults, ResultsStore};
use crate::PlotError;

/// Rows of the availability report: display name and the key that marks it present.
pub const PRESENCE_ENTRIES: [(&str, &str); 8] = [
    ("Ground Reaction Forces", "GRF"),
    ("Ground Reaction Moments", "GRM"),
    ("Centers of Pressure", "COP"),
    ("Muscle Activations", "muscle_activations"),
    ("Joint Torques", "torques"),
    ("Joint Kinematics", "coordinate_values"),
    ("Knee Adduction Moment (KAM)", "KAM"),
    ("Medial Compartment Force (MCF)", "MCF"),
];

/// How categories decide whether to plot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Gating {
    /// Each category needs only its own value and label keys.
    #[default]
    Independent,
    /// Categories other than ground reaction forces are only attempted
    /// when ground reaction forces are present.
    RequireGrf,
}

#[derive(Clone, Debug, Default)]
pub struct ExtractOptions {
    pub show: bool,
    pub save: bool,
    /// Defaults to `<results dir>/plots` when saving.
    pub output_dir: Option<PathBuf>,
    pub gating: Gating,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlottedCategory {
    pub category: Category,
    pub path: Option<PathBuf>,
    /// The figure as composed, for callers that inspect what was drawn.
    pub figure: Figure,
}

/// Outcome of one extraction run.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub time: TimeSeries,
    pub case_id: String,
    pub results: CaseResults,
    pub plotted: Vec<PlottedCategory>,
}

impl Extraction {
    pub fn plot_for(&self, category: Category) -> Option<&PlottedCategory> {
        self.plotted.iter().find(|p| p.category == category)
    }
}

/// Load a results file, print the availability report and plot every
/// category present in its first case. Console lines go to stdout.
pub fn extract(
    results_path: &Path,
    options: &ExtractOptions,
    plotter: &Plotter,
) -> Result<Extraction, PlotError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    extract_to(results_path, options, plotter, &mut out)
}

/// Same as [`extract`] with console lines written to `out`.
pub fn extract_to<W: Write>(
    results_path: &Path,
    options: &ExtractOptions,
    plotter: &Plotter,
    out: &mut W,
) -> Result<Extraction, PlotError> {
    let store = ResultsStore::load(results_path)?;
    let (case_id, case) = store.first_case();
    if store.len() > 1 {
        warn!("{} cases in {}; using the first ({})", store.len(), results_path.display(), case_id);
    }
    let time = case.time()?;
    debug!("Case {}: {} samples from {:.3} to {:.3} s", case_id, time.len(), time.first(), time.last());

    let output_dir = if options.save {
        let dir = options
            .output_dir
            .clone()
            .unwrap_or_else(|| default_output_dir(results_path));
        fs::create_dir_all(&dir).map_err(|source| PlotError::Io {
            path: dir.clone(),
            source,
        })?;
        Some(dir)
    } else {
        None
    };

    write_console(out, &presence_report(case))?;

    let grf_present = is_present(case, &Category::GroundReactionForces.descriptor());
    let mut plotted = Vec::new();
    for category in Category::ALL {
        let descriptor = category.descriptor();
        if !is_present(case, &descriptor) {
            debug!("Skipping {}: keys not present", descriptor.title);
            continue;
        }
        if options.gating == Gating::RequireGrf
            && category != Category::GroundReactionForces
            && !grf_present
        {
            debug!("Skipping {}: ground reaction forces missing", descriptor.title);
            continue;
        }

        let path = output_dir.as_ref().map(|dir| dir.join(descriptor.file_name()));
        let figure = plot_category(case, &time, &descriptor, plotter, path.as_deref(), options.show)?;
        if let Some(figure) = figure {
            write_console(out, &format!("✓ Plotted {}\n", descriptor.title))?;
            plotted.push(PlottedCategory {
                category,
                path,
                figure,
            });
        }
    }
    info!("Plotted {} categor{}", plotted.len(), if plotted.len() == 1 { "y" } else { "ies" });

    Ok(Extraction {
        time,
        case_id: case_id.to_string(),
        results: case.clone(),
        plotted,
    })
}

/// The availability block printed once per run.
pub fn presence_report(case: &CaseResults) -> String {
    let mut report = String::from("Available biomechanics data:\n");
    for (name, key) in PRESENCE_ENTRIES {
        let mark = if case.contains(key) { '✓' } else { '✗' };
        report.push_str(&format!("  • {}: {}\n", name, mark));
    }
    report
}

fn default_output_dir(results_path: &Path) -> PathBuf {
    results_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join("plots")
}

fn is_present(case: &CaseResults, descriptor: &ChannelDescriptor) -> bool {
    case.contains(descriptor.keys.values) && case.contains(descriptor.keys.labels)
}

fn write_console<W: Write>(out: &mut W, text: &str) -> Result<(), PlotError> {
    out.write_all(text.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|source| PlotError::Io {
            path: PathBuf::from("<stdout>"),
            source,
        })
}

/// Returns `None` when the category holds no channels.
fn plot_category(
    case: &CaseResults,
    time: &TimeSeries,
    descriptor: &ChannelDescriptor,
    plotter: &Plotter,
    path: Option<&Path>,
    show: bool,
) -> Result<Option<Figure>, PlotError> {
    let keys = descriptor.keys;
    let mut names = case.labels(keys.labels)?.unwrap_or_default();
    if names.is_empty() {
        warn!("{} has no channel labels; skipping", descriptor.title);
        return Ok(None);
    }
    if let Some(kind) = descriptor.label_kind {
        names = normalize_labels(&names, kind);
    }

    let Some(raw) = case.matrix(keys.values)? else {
        return Ok(None);
    };
    let primary = ChannelSet::aligned(keys.values, raw.view(), time)?.expect_channels(keys.values, names.len())?;

    let reference = match keys.reference {
        Some(key) => match case.matrix(key)? {
            Some(raw) => Some(ChannelSet::aligned(key, raw.view(), time)?),
            None => None,
        },
        None => None,
    };
    let rotational = match keys.rotational {
        Some(key) => case.labels(key)?.unwrap_or_default(),
        None => Vec::new(),
    };

    let input = PlotInput {
        time,
        primary: &primary,
        names: &names,
        reference: reference.as_ref(),
        rotational: &rotational,
    };
    plotter.render(&input, descriptor, path, show).map(Some)
}
