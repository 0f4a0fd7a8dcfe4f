//! Result extraction and comparison plotting for dynamic-simulation outputs.
//!
//! A results file holds, per case, multi-channel time series (ground reaction
//! forces, joint kinematics, activations, ...). Each plottable category is
//! described by a [`ChannelDescriptor`]; one generic plotter turns any
//! descriptor plus its channels into a grid figure.

use std::error::Error as StdError;
use std::path::PathBuf;

use plotters::drawing::DrawingAreaErrorKind;
use thiserror::Error;

mod category;
mod channels;
mod extract;
mod font;
mod labels;
mod layout;
mod render;
mod settings;
mod store;

pub use category::{
    Category, ChannelDescriptor, GridPolicy, LegendPolicy, LineDash, PrimaryStyle,
    ReferenceStyle, StoreKeys, UnitRule, YLabelPolicy, RAD_TO_DEG,
};
pub use channels::{ChannelSet, TimeSeries};
pub use extract::{
    extract, extract_to, presence_report, ExtractOptions, Extraction, Gating, PlottedCategory,
    PRESENCE_ENTRIES,
};
pub use font::FontSafeBackend;
pub use labels::{normalize_label, normalize_labels, LabelKind};
pub use layout::{
    compose_figure, Figure, GridShape, LegendEntry, Panel, PlotInput, Series, SeriesRole,
};
pub use render::{DisplayPolicy, Plotter};
pub use settings::PlotSettings;
pub use store::{CaseResults, EntryKind, ResultsStore};

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse results file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("results file {0} contains no cases")]
    EmptyStore(PathBuf),
    #[error("results are missing the `time` entry")]
    MissingTime,
    #[error("entry `{key}` is not a numeric array: {reason}")]
    InvalidArray { key: String, reason: String },
    #[error("entry `{key}` is not a list of labels")]
    InvalidLabels { key: String },
    #[error("invalid time series: {0}")]
    InvalidTime(String),
    #[error("`{key}` has {found} samples per channel; expected {expected} or {}", .expected + 1)]
    ShapeMismatch {
        key: String,
        expected: usize,
        found: usize,
    },
    #[error("`{key}` has {rows} channels but {names} labels")]
    ChannelCount {
        key: String,
        rows: usize,
        names: usize,
    },
    #[error("`{0}` has no channels to plot")]
    NoChannels(String),
    #[error("invalid plot settings: {0}")]
    Settings(String),
    #[error("rendering failed: {0}")]
    Render(String),
}

impl<E: StdError + Send + Sync> From<DrawingAreaErrorKind<E>> for PlotError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        PlotError::Render(err.to_string())
    }
}
