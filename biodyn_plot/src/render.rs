use std::env;
use std::fs::{self, File};
use std::panic;
use std::path::{Path, PathBuf};
use std::process::Command;

use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use plotters_backend::text_anchor::{HPos, Pos, VPos};
use tracing::{debug, info, warn};

use crate::category::{ChannelDescriptor, LineDash};
use crate::font::FontSafeBackend;
use crate::layout::{compose_figure, Figure, LegendEntry, Panel, PlotInput, Series, SeriesRole};
use crate::settings::PlotSettings;
use crate::PlotError;

const TIME_AXIS_LABEL: &str = "Time (s)";
const DEFAULT_VIEWER: &str = "xdg-open";

/// Whether figures may be shown on screen. Detected once at process start
/// and handed to the [`Plotter`]; tests construct it directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayPolicy {
    has_display: bool,
    viewer: String,
}

impl DisplayPolicy {
    pub fn detect() -> Self {
        let has_display = env::var("DISPLAY").map(|v| !v.is_empty()).unwrap_or(false);
        if !has_display {
            info!("No display found; figures will not be shown");
        }
        Self {
            has_display,
            viewer: DEFAULT_VIEWER.to_string(),
        }
    }

    pub fn headless() -> Self {
        Self {
            has_display: false,
            viewer: DEFAULT_VIEWER.to_string(),
        }
    }

    pub fn interactive(viewer: impl Into<String>) -> Self {
        Self {
            has_display: true,
            viewer: viewer.into(),
        }
    }

    pub fn with_viewer(mut self, viewer: impl Into<String>) -> Self {
        self.viewer = viewer.into();
        self
    }

    pub fn has_display(&self) -> bool {
        self.has_display
    }

    pub fn viewer(&self) -> &str {
        &self.viewer
    }

    /// Launch the viewer on `path`. Viewer failures are logged, never fatal.
    fn open(&self, path: &Path) -> bool {
        match Command::new(&self.viewer).arg(path).status() {
            Ok(status) if status.success() => {
                debug!("Opened {} with {}", path.display(), self.viewer);
                true
            }
            Ok(status) => {
                warn!("{} exited with {} for {}", self.viewer, status, path.display());
                false
            }
            Err(err) => {
                warn!("Could not launch viewer {}: {}", self.viewer, err);
                false
            }
        }
    }
}

/// Renders one figure per call. Holds no per-figure state.
#[derive(Clone, Debug)]
pub struct Plotter {
    settings: PlotSettings,
    display: DisplayPolicy,
}

impl Plotter {
    pub fn new(settings: PlotSettings, display: DisplayPolicy) -> Self {
        Self { settings, display }
    }

    pub fn display(&self) -> &DisplayPolicy {
        &self.display
    }

    /// Compose the figure for one category, persist it when `output_path`
    /// is given and show it when `show` is set and a display exists.
    pub fn render(
        &self,
        input: &PlotInput<'_>,
        descriptor: &ChannelDescriptor,
        output_path: Option<&Path>,
        show: bool,
    ) -> Result<Figure, PlotError> {
        let figure = compose_figure(input, descriptor)?;

        if let Some(path) = output_path {
            self.save(&figure, path)?;
            info!("Wrote {}: {}", figure.title, path.display());
        }

        if show {
            self.show(&figure, output_path)?;
        }

        Ok(figure)
    }

    /// Open the figure when a display exists. Unsaved figures are first
    /// written to a uniquely named file in the temp dir, which is left for
    /// the viewer. Returns the path handed to the viewer.
    fn show(
        &self,
        figure: &Figure,
        output_path: Option<&Path>,
    ) -> Result<Option<PathBuf>, PlotError> {
        if !self.display.has_display() {
            debug!("No display; not showing {}", figure.title);
            return Ok(None);
        }
        let shown = match output_path {
            Some(path) => path.to_path_buf(),
            None => {
                let temp = tempfile::Builder::new()
                    .prefix(&format!("biodyn_plot_{}_", figure.file_stem))
                    .suffix(".png")
                    .tempfile()
                    .map_err(|source| PlotError::Io {
                        path: env::temp_dir(),
                        source,
                    })?
                    .into_temp_path();
                self.save(figure, &temp)?;
                temp.keep().map_err(|err| PlotError::Io {
                    path: err.path.to_path_buf(),
                    source: err.error,
                })?
            }
        };
        self.display.open(&shown);
        Ok(Some(shown))
    }

    /// Canvas size in pixels: figure inches times DPI.
    pub fn canvas_size(&self, figure: &Figure) -> (u32, u32) {
        (
            self.settings.inches_to_px(figure.size_inches.0),
            self.settings.inches_to_px(figure.size_inches.1),
        )
    }

    pub fn save(&self, figure: &Figure, path: &Path) -> Result<(), PlotError> {
        File::create(path).map_err(|source| PlotError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let size = self.canvas_size(figure);
        let draw = || -> Result<(), PlotError> {
            let backend = BitMapBackend::new(path, size);
            let root = FontSafeBackend::new(backend).into_drawing_area();
            draw_figure(&root, figure, &self.settings)?;
            root.present()?;
            Ok(())
        };

        let result = panic::catch_unwind(panic::AssertUnwindSafe(draw))
            .unwrap_or_else(|_| {
                Err(PlotError::Render(format!(
                    "plotting backend panicked while drawing {}",
                    path.display()
                )))
            });
        if result.is_err() {
            // Do not leave an empty or half-written image behind.
            if let Err(err) = fs::remove_file(path) {
                debug!("Could not remove {}: {}", path.display(), err);
            }
        }
        result
    }
}

fn font<'a>(settings: &'a PlotSettings, points: f64, style: FontStyle) -> FontDesc<'a> {
    FontDesc::new(
        FontFamily::from(settings.font_family.as_str()),
        settings.px(points) as f64,
        style,
    )
}

fn draw_figure<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    figure: &Figure,
    settings: &PlotSettings,
) -> Result<(), PlotError> {
    root.fill(&WHITE)?;

    let legend_rows = figure.legend.len() as f64;
    let header_pt = (settings.suptitle_font_pt * 2.5).max(legend_rows * settings.legend_font_pt * 1.5 + 12.0);
    let (header, body) = root.split_vertically(settings.px(header_pt));
    draw_header(&header, figure, settings)?;

    let cells = body.split_evenly((figure.grid.rows, figure.grid.cols));
    for panel in &figure.panels {
        draw_panel(&cells[panel.row * figure.grid.cols + panel.col], panel, settings)?;
    }
    Ok(())
}

fn draw_header<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    figure: &Figure,
    settings: &PlotSettings,
) -> Result<(), PlotError> {
    let (width, height) = area.dim_in_pixel();
    let title_style = TextStyle::from(font(settings, settings.suptitle_font_pt, FontStyle::Bold))
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Center));
    area.draw(&Text::new(
        figure.title.clone(),
        (width as i32 / 2, height as i32 / 2),
        title_style,
    ))?;

    if figure.legend.is_empty() {
        return Ok(());
    }

    let legend_style = TextStyle::from(font(settings, settings.legend_font_pt, FontStyle::Normal))
        .color(&BLACK)
        .pos(Pos::new(HPos::Left, VPos::Center));
    let sample_len = settings.px(28.0) as i32;
    let gap = settings.px(6.0) as i32;
    let row_height = settings.px(settings.legend_font_pt * 1.5) as i32;

    let mut label_width = 0;
    for entry in &figure.legend {
        let (w, _) = area.estimate_text_size(&entry.label, &legend_style)?;
        label_width = label_width.max(w as i32);
    }

    let x0 = width as i32 - 2 * gap - label_width - gap - sample_len;
    for (row, entry) in figure.legend.iter().enumerate() {
        let y = gap + row_height / 2 + row as i32 * row_height;
        draw_legend_sample(area, entry, (x0, y), sample_len, settings)?;
        area.draw(&Text::new(
            entry.label.clone(),
            (x0 + sample_len + gap, y),
            legend_style.clone(),
        ))?;
    }
    Ok(())
}

fn draw_legend_sample<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    entry: &LegendEntry,
    (x, y): (i32, i32),
    len: i32,
    settings: &PlotSettings,
) -> Result<(), PlotError> {
    let style = ShapeStyle {
        color: entry.color.to_rgba(),
        filled: false,
        stroke_width: settings.px(settings.line_width_pt),
    };
    let (dash, spacing) = match dash_pattern(entry.dash, settings) {
        Some((dash, spacing)) => (dash as i32, spacing as i32),
        None => (len, 0),
    };
    let mut start = x;
    while start < x + len {
        let end = (start + dash).min(x + len);
        area.draw(&PathElement::new(vec![(start, y), (end, y)], style))?;
        start = end + spacing.max(1);
    }
    Ok(())
}

/// Dash and gap length in pixels; `None` for solid lines.
fn dash_pattern(dash: LineDash, settings: &PlotSettings) -> Option<(u32, u32)> {
    match dash {
        LineDash::Solid => None,
        LineDash::Dashed => Some((settings.px(7.0), settings.px(3.0))),
        LineDash::Dotted => Some((settings.px(1.5), settings.px(3.0))),
    }
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    panel: &Panel,
    settings: &PlotSettings,
) -> Result<(), PlotError> {
    let tick_px = settings.px(settings.tick_font_pt);
    let label_px = settings.px(settings.label_font_pt);
    let x_area = match (panel.x_label, panel.x_tick_labels) {
        (true, _) => tick_px * 2 + label_px * 2,
        (false, true) => tick_px * 2,
        (false, false) => tick_px / 2,
    };
    let y_area = if panel.y_label {
        tick_px * 4 + label_px * 2
    } else {
        tick_px * 4
    };

    let mut chart = ChartBuilder::on(area)
        .caption(panel.title.as_str(), font(settings, settings.title_font_pt, FontStyle::Bold))
        .margin(settings.px(6.0))
        .x_label_area_size(x_area)
        .y_label_area_size(y_area)
        .build_cartesian_2d(
            panel.x_range.0..panel.x_range.1,
            panel.y_range.0..panel.y_range.1,
        )?;

    let blank = |_: &f64| String::new();
    let mut mesh = chart.configure_mesh();
    mesh.disable_mesh()
        .x_labels(5)
        .y_labels(5)
        .label_style(font(settings, settings.tick_font_pt, FontStyle::Normal))
        .axis_desc_style(font(settings, settings.label_font_pt, FontStyle::Bold));
    if panel.x_label {
        mesh.x_desc(TIME_AXIS_LABEL);
    }
    if panel.y_label {
        mesh.y_desc(panel.unit.as_str());
    }
    if !panel.x_tick_labels {
        mesh.x_label_formatter(&blank);
    }
    mesh.draw()?;

    for series in &panel.series {
        draw_series(&mut chart, series, settings)?;
    }
    Ok(())
}

fn draw_series<DB: DrawingBackend>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>,
    series: &Series,
    settings: &PlotSettings,
) -> Result<(), PlotError> {
    let width_pt = match series.role {
        SeriesRole::ZeroLine => settings.line_width_pt * 0.5,
        _ => settings.line_width_pt,
    };
    let style = ShapeStyle {
        color: series.color.mix(series.alpha),
        filled: false,
        stroke_width: settings.px(width_pt),
    };

    for run in series.finite_runs() {
        match dash_pattern(series.dash, settings) {
            None => {
                chart.draw_series(LineSeries::new(run, style))?;
            }
            Some((dash, spacing)) => {
                chart.draw_series(DashedLineSeries::new(run, dash, spacing, style))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::channels::{ChannelSet, TimeSeries};
    use ndarray::Array2;

    fn low_res() -> PlotSettings {
        PlotSettings {
            dpi: 30,
            ..PlotSettings::default()
        }
    }

    fn kam_figure() -> Figure {
        let time = TimeSeries::new(vec![0.0, 0.1, 0.2]).unwrap();
        let data = ndarray::array![[0.1, -0.2, 0.3], [0.0, 0.2, -0.1]];
        let primary = ChannelSet::aligned("KAM", data.view(), &time).unwrap();
        let names = vec!["KAM_r".to_string(), "KAM_l".to_string()];
        let input = PlotInput {
            time: &time,
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        compose_figure(&input, &Category::KneeAdductionMoments.descriptor()).unwrap()
    }

    fn is_png(path: &Path) -> bool {
        std::fs::read(path).map(|b| b.starts_with(b"\x89PNG")).unwrap_or(false)
    }

    #[test]
    fn canvas_follows_dpi() {
        let plotter = Plotter::new(PlotSettings::default(), DisplayPolicy::headless());
        let time = TimeSeries::new(vec![0.0, 0.5, 1.0]).unwrap();
        let primary = ChannelSet::aligned("GRF", Array2::zeros((6, 3)).view(), &time).unwrap();
        let names: Vec<String> = (0..6).map(|i| format!("f{}", i)).collect();
        let input = PlotInput {
            time: &time,
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        let figure = plotter
            .render(&input, &Category::GroundReactionForces.descriptor(), None, true)
            .unwrap();
        assert_eq!(plotter.canvas_size(&figure), (4500, 2400));
    }

    #[test]
    fn saves_png_without_display() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("joint_powers.png");
        let plotter = Plotter::new(low_res(), DisplayPolicy::headless());
        let time = TimeSeries::new(vec![0.0, 0.1, 0.2, 0.3]).unwrap();
        let mut data = Array2::zeros((3, 4));
        data[[0, 1]] = 12.0;
        data[[2, 3]] = f64::NAN;
        let primary = ChannelSet::aligned("powers", data.view(), &time).unwrap();
        let names = vec!["hip".to_string(), "knee".to_string(), "ankle".to_string()];
        let input = PlotInput {
            time: &time,
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        plotter
            .render(&input, &Category::JointPowers.descriptor(), Some(&path), false)
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }

    #[test]
    fn unwritable_path_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("grf.png");
        let plotter = Plotter::new(low_res(), DisplayPolicy::headless());
        let time = TimeSeries::new(vec![0.0, 1.0]).unwrap();
        let primary = ChannelSet::aligned("KAM", Array2::zeros((1, 2)).view(), &time).unwrap();
        let names = vec!["KAM_l".to_string()];
        let input = PlotInput {
            time: &time,
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        let err = plotter
            .render(&input, &Category::KneeAdductionMoments.descriptor(), Some(&path), false)
            .unwrap_err();
        assert!(matches!(err, PlotError::Io { .. }));
    }

    #[test]
    fn display_policy_is_explicit() {
        assert!(!DisplayPolicy::headless().has_display());
        let policy = DisplayPolicy::interactive("feh");
        assert!(policy.has_display());
        assert_eq!(policy.viewer(), "feh");
        assert_eq!(DisplayPolicy::headless().with_viewer("eog").viewer(), "eog");
    }

    #[test]
    fn solid_lines_have_no_dash_pattern() {
        let settings = PlotSettings::default();
        assert!(dash_pattern(LineDash::Solid, &settings).is_none());
        let (dash, _) = dash_pattern(LineDash::Dashed, &settings).unwrap();
        let (dot, _) = dash_pattern(LineDash::Dotted, &settings).unwrap();
        assert!(dot < dash);
    }

    #[test]
    fn unsaved_figure_is_shown_from_a_temp_file() {
        let plotter = Plotter::new(low_res(), DisplayPolicy::interactive("true"));
        let figure = kam_figure();
        let shown = plotter.show(&figure, None).unwrap().unwrap();
        let name = shown.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("biodyn_plot_knee_adduction_moments_"), "{}", name);
        assert!(name.ends_with(".png"));
        assert_eq!(shown.parent(), Some(env::temp_dir().as_path()));
        assert!(is_png(&shown));

        let again = plotter.show(&figure, None).unwrap().unwrap();
        assert_ne!(shown, again);
        std::fs::remove_file(shown).unwrap();
        std::fs::remove_file(again).unwrap();
    }

    #[test]
    fn saved_figure_is_shown_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knee_adduction_moments.png");
        let plotter = Plotter::new(low_res(), DisplayPolicy::interactive("true"));
        let figure = kam_figure();
        plotter.save(&figure, &path).unwrap();
        assert_eq!(plotter.show(&figure, Some(&path)).unwrap(), Some(path.clone()));
    }

    #[test]
    fn nothing_is_shown_without_display() {
        let plotter = Plotter::new(low_res(), DisplayPolicy::headless());
        assert_eq!(plotter.show(&kam_figure(), None).unwrap(), None);
    }

    #[test]
    fn failing_viewer_only_warns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knee_adduction_moments.png");
        let time = TimeSeries::new(vec![0.0, 0.1, 0.2]).unwrap();
        let primary = ChannelSet::aligned("KAM", Array2::zeros((1, 3)).view(), &time).unwrap();
        let names = vec!["KAM_r".to_string()];
        let input = PlotInput {
            time: &time,
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        let descriptor = Category::KneeAdductionMoments.descriptor();

        for viewer in ["false", "/nonexistent/biodyn-viewer"] {
            let policy = DisplayPolicy::interactive(viewer);
            assert!(!policy.open(&path));
            let plotter = Plotter::new(low_res(), policy);
            plotter.render(&input, &descriptor, Some(&path), true).unwrap();
            assert!(is_png(&path));
        }
        assert!(DisplayPolicy::interactive("true").open(&path));
    }

    #[test]
    fn failed_render_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knee_adduction_moments.png");
        let plotter = Plotter::new(low_res(), DisplayPolicy::headless());
        let mut figure = kam_figure();
        // Panel outside the grid makes drawing fail part way through.
        figure.panels[1].row = 9;
        let err = plotter.save(&figure, &path).unwrap_err();
        assert!(matches!(err, PlotError::Render(_)));
        assert!(!path.exists());
    }
}
