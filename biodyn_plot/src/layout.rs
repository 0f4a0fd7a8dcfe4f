//! Grid allocation and figure composition.
//!
//! [`compose_figure`] turns channels plus a [`ChannelDescriptor`] into a
//! fully resolved [`Figure`]: every scale factor, unit, axis label decision
//! and legend entry is settled here so drawing is a straight walk over the
//! model.

use plotters::style::RGBColor;

use crate::category::{ChannelDescriptor, GridPolicy, LegendPolicy, LineDash, YLabelPolicy};
use crate::channels::{ChannelSet, TimeSeries};
use crate::PlotError;

const Y_PADDING_FRACTION: f64 = 0.05;

/// Row-major panel grid. Always at least 1x1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub fn for_policy(policy: GridPolicy, channels: usize) -> Self {
        let n = channels.max(1);
        match policy {
            GridPolicy::Square => {
                let cols = (n as f64).sqrt().ceil() as usize;
                Self {
                    rows: n.div_ceil(cols),
                    cols,
                }
            }
            GridPolicy::FixedTwoByThree => Self {
                rows: n.div_ceil(3).max(2),
                cols: 3,
            },
            GridPolicy::CenterOfPressure if n == 6 => Self { rows: 2, cols: 3 },
            GridPolicy::CenterOfPressure => {
                let cols = n.min(3);
                Self {
                    rows: n.div_ceil(cols),
                    cols,
                }
            }
        }
    }

    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }

    /// `(row, col)` of the panel at `index`.
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.cols, index % self.cols)
    }

    /// True for the lowest occupied panel of its column.
    pub fn is_bottom_occupied(&self, index: usize, channels: usize) -> bool {
        let (row, _) = self.position(index);
        row + 1 == self.rows || index + self.cols >= channels
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeriesRole {
    Reference,
    Primary,
    ZeroLine,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub role: SeriesRole,
    pub label: Option<String>,
    pub color: RGBColor,
    /// Opacity in `0.0..=1.0`.
    pub alpha: f64,
    pub dash: LineDash,
    /// Already scaled; NaN marks a gap.
    pub points: Vec<(f64, f64)>,
}

impl Series {
    /// Contiguous runs of finite points.
    pub fn finite_runs(&self) -> Vec<Vec<(f64, f64)>> {
        let mut runs = Vec::new();
        let mut current = Vec::new();
        for &(x, y) in &self.points {
            if x.is_finite() && y.is_finite() {
                current.push((x, y));
            } else if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            runs.push(current);
        }
        runs
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Panel {
    pub index: usize,
    pub row: usize,
    pub col: usize,
    pub title: String,
    pub unit: String,
    pub series: Vec<Series>,
    pub x_range: (f64, f64),
    pub y_range: (f64, f64),
    pub x_label: bool,
    pub x_tick_labels: bool,
    pub y_label: bool,
}

impl Panel {
    pub fn series_by_role(&self, role: SeriesRole) -> Option<&Series> {
        self.series.iter().find(|s| s.role == role)
    }

    fn has_labels(&self) -> bool {
        self.series.iter().any(|s| s.label.is_some())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: RGBColor,
    pub dash: LineDash,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Figure {
    pub title: String,
    pub file_stem: String,
    pub grid: GridShape,
    pub size_inches: (f64, f64),
    /// One panel per channel; grid cells past the last channel are removed.
    pub panels: Vec<Panel>,
    pub legend: Vec<LegendEntry>,
}

impl Figure {
    pub fn removed_cells(&self) -> usize {
        self.grid.cells() - self.panels.len()
    }

    pub fn panel_at(&self, row: usize, col: usize) -> Option<&Panel> {
        self.panels.iter().find(|p| p.row == row && p.col == col)
    }
}

/// Everything one category contributes to a figure.
#[derive(Clone, Copy, Debug)]
pub struct PlotInput<'a> {
    pub time: &'a TimeSeries,
    pub primary: &'a ChannelSet,
    pub names: &'a [String],
    pub reference: Option<&'a ChannelSet>,
    /// Channel names measured in radians.
    pub rotational: &'a [String],
}

pub fn compose_figure(input: &PlotInput<'_>, descriptor: &ChannelDescriptor) -> Result<Figure, PlotError> {
    let channels = input.names.len();
    if channels == 0 {
        return Err(PlotError::NoChannels(descriptor.keys.values.to_string()));
    }
    check_shape(descriptor.keys.values, input.primary, channels, input.time)?;
    if let (Some(reference), Some(key)) = (input.reference, descriptor.keys.reference) {
        check_shape(key, reference, channels, input.time)?;
    }

    let grid = GridShape::for_policy(descriptor.grid, channels);
    let time = input.time.as_slice();
    let x_range = if time.len() > 1 {
        (input.time.first(), input.time.last())
    } else {
        (input.time.first() - 0.5, input.time.first() + 0.5)
    };

    let mut panels = Vec::with_capacity(channels);
    for (index, name) in input.names.iter().enumerate() {
        let (row, col) = grid.position(index);
        let (scale, unit) = descriptor.units.resolve(name, input.rotational);
        let mut series = Vec::new();

        if let (Some(reference), Some(style)) = (input.reference, descriptor.reference) {
            if !(style.undefined_rows_absent && reference.row_is_undefined(index)) {
                series.push(Series {
                    role: SeriesRole::Reference,
                    label: Some(style.label.to_string()),
                    color: RGBColor(0, 0, 0),
                    alpha: 1.0,
                    dash: style.dash,
                    points: zip_points(time, &reference.scaled_row(index, scale)),
                });
            }
        }

        series.push(Series {
            role: SeriesRole::Primary,
            label: descriptor.primary.label.map(str::to_string),
            color: descriptor.primary.color,
            alpha: 1.0,
            dash: LineDash::Solid,
            points: zip_points(time, &input.primary.scaled_row(index, scale)),
        });

        if descriptor.zero_line {
            series.push(Series {
                role: SeriesRole::ZeroLine,
                label: None,
                color: RGBColor(128, 128, 128),
                alpha: 0.3,
                dash: LineDash::Solid,
                points: vec![(x_range.0, 0.0), (x_range.1, 0.0)],
            });
        }

        let y_range = match descriptor.y_bounds {
            Some(bounds) => bounds,
            None => auto_range(&series),
        };
        let bottom = grid.is_bottom_occupied(index, channels);

        panels.push(Panel {
            index,
            row,
            col,
            title: name.clone(),
            unit: unit.to_string(),
            series,
            x_range,
            y_range,
            x_label: bottom,
            x_tick_labels: bottom || !descriptor.shared_x,
            y_label: match descriptor.y_label {
                YLabelPolicy::EveryPanel => true,
                YLabelPolicy::LeftColumn => col == 0,
            },
        });
    }

    let legend_allowed = match descriptor.legend {
        LegendPolicy::FirstLabelledPanel => true,
        LegendPolicy::OnlyWithReference => input.reference.is_some(),
    };
    let legend = if legend_allowed {
        panels
            .iter()
            .find(|panel| panel.has_labels())
            .map(|panel| {
                panel
                    .series
                    .iter()
                    .filter_map(|s| {
                        s.label.as_ref().map(|label| LegendEntry {
                            label: label.clone(),
                            color: s.color,
                            dash: s.dash,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let size_inches = descriptor.figure_inches(grid.rows, grid.cols, channels);

    Ok(Figure {
        title: descriptor.title.to_string(),
        file_stem: descriptor.file_stem.to_string(),
        grid,
        size_inches,
        panels,
        legend,
    })
}

fn check_shape(key: &str, set: &ChannelSet, channels: usize, time: &TimeSeries) -> Result<(), PlotError> {
    if set.channels() != channels {
        return Err(PlotError::ChannelCount {
            key: key.to_string(),
            rows: set.channels(),
            names: channels,
        });
    }
    if set.samples() != time.len() {
        return Err(PlotError::ShapeMismatch {
            key: key.to_string(),
            expected: time.len(),
            found: set.samples(),
        });
    }
    Ok(())
}

fn zip_points(time: &[f64], values: &[f64]) -> Vec<(f64, f64)> {
    time.iter().copied().zip(values.iter().copied()).collect()
}

fn auto_range(series: &[Series]) -> (f64, f64) {
    let (min, max) = series
        .iter()
        .flat_map(|s| s.points.iter().map(|&(_, y)| y))
        .filter(|y| y.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), y| (lo.min(y), hi.max(y)));
    if !min.is_finite() || !max.is_finite() {
        return (-1.0, 1.0);
    }
    let span = max - min;
    if span < 1e-12 {
        return (min - 0.5, max + 0.5);
    }
    let pad = span * Y_PADDING_FRACTION;
    (min - pad, max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use std::f64::consts::PI;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("ch{}", i)).collect()
    }

    fn time(n: usize) -> TimeSeries {
        TimeSeries::new((0..n).map(|i| i as f64 * 0.01).collect()).unwrap()
    }

    fn channels(rows: usize, cols: usize, value: f64) -> ChannelSet {
        let data = Array2::from_elem((rows, cols), value);
        ChannelSet::aligned("test", data.view(), &time(cols)).unwrap()
    }

    #[test]
    fn square_grid_sizes() {
        assert_eq!(GridShape::for_policy(GridPolicy::Square, 1), GridShape { rows: 1, cols: 1 });
        assert_eq!(GridShape::for_policy(GridPolicy::Square, 2), GridShape { rows: 1, cols: 2 });
        assert_eq!(GridShape::for_policy(GridPolicy::Square, 7), GridShape { rows: 3, cols: 3 });
        assert_eq!(GridShape::for_policy(GridPolicy::Square, 10), GridShape { rows: 3, cols: 4 });
        assert_eq!(GridShape::for_policy(GridPolicy::Square, 0), GridShape { rows: 1, cols: 1 });
    }

    #[test]
    fn fixed_and_cop_grids() {
        assert_eq!(GridShape::for_policy(GridPolicy::FixedTwoByThree, 6), GridShape { rows: 2, cols: 3 });
        assert_eq!(GridShape::for_policy(GridPolicy::FixedTwoByThree, 4), GridShape { rows: 2, cols: 3 });
        assert_eq!(GridShape::for_policy(GridPolicy::FixedTwoByThree, 9), GridShape { rows: 3, cols: 3 });
        assert_eq!(GridShape::for_policy(GridPolicy::CenterOfPressure, 6), GridShape { rows: 2, cols: 3 });
        assert_eq!(GridShape::for_policy(GridPolicy::CenterOfPressure, 4), GridShape { rows: 2, cols: 3 });
        assert_eq!(GridShape::for_policy(GridPolicy::CenterOfPressure, 2), GridShape { rows: 1, cols: 2 });
        assert_eq!(GridShape::for_policy(GridPolicy::CenterOfPressure, 1), GridShape { rows: 1, cols: 1 });
    }

    #[test]
    fn seven_channels_remove_two_cells() {
        let descriptor = Category::MuscleActivations.descriptor();
        let names = names(7);
        let primary = channels(7, 5, 0.5);
        let input = PlotInput {
            time: &time(5),
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        let figure = compose_figure(&input, &descriptor).unwrap();
        assert_eq!(figure.grid, GridShape { rows: 3, cols: 3 });
        assert_eq!(figure.panels.len(), 7);
        assert_eq!(figure.removed_cells(), 2);
        assert!(figure.panel_at(2, 1).is_none());
        assert!(figure.panel_at(2, 0).is_some());
    }

    #[test]
    fn single_channel_is_addressable() {
        let descriptor = Category::KneeAdductionMoments.descriptor();
        let names = vec!["KAM_r".to_string()];
        let primary = channels(1, 4, 2.0);
        let input = PlotInput {
            time: &time(4),
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        let figure = compose_figure(&input, &descriptor).unwrap();
        assert_eq!(figure.grid, GridShape { rows: 1, cols: 1 });
        let panel = figure.panel_at(0, 0).unwrap();
        assert!(panel.x_label);
        assert!(panel.series_by_role(SeriesRole::ZeroLine).is_some());
        // zero guide pulls the auto range down to include 0
        assert!(panel.y_range.0 <= 0.0 && panel.y_range.1 >= 2.0);
    }

    #[test]
    fn rotational_channels_are_scaled() {
        let descriptor = Category::JointCoordinates.descriptor();
        let names = vec!["knee_angle_r".to_string(), "pelvis_tx".to_string()];
        let t = time(3);
        let raw = array![[PI / 2.0, PI / 2.0, PI / 2.0], [0.25, 0.25, 0.25]];
        let primary = ChannelSet::aligned("coordinate_values", raw.view(), &t).unwrap();
        let rotational = vec!["knee_angle_r".to_string()];
        let input = PlotInput {
            time: &t,
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &rotational,
        };
        let figure = compose_figure(&input, &descriptor).unwrap();

        let knee = figure.panels[0].series_by_role(SeriesRole::Primary).unwrap();
        assert_relative_eq!(knee.points[0].1, 90.0, epsilon = 1e-9);
        assert_eq!(figure.panels[0].unit, "(deg)");

        let pelvis = figure.panels[1].series_by_role(SeriesRole::Primary).unwrap();
        assert_relative_eq!(pelvis.points[2].1, 0.25);
        assert_eq!(figure.panels[1].unit, "(m)");
    }

    #[test]
    fn undefined_reference_row_only_hides_that_channel() {
        let descriptor = Category::MuscleActivations.descriptor();
        let names = names(2);
        let t = time(3);
        let primary = channels(2, 3, 0.3);
        let emg_raw = array![[f64::NAN, f64::NAN, f64::NAN], [0.1, f64::NAN, 0.2]];
        let emg = ChannelSet::aligned("muscle_activations_emg", emg_raw.view(), &t).unwrap();
        let input = PlotInput {
            time: &t,
            primary: &primary,
            names: &names,
            reference: Some(&emg),
            rotational: &[],
        };
        let figure = compose_figure(&input, &descriptor).unwrap();
        assert!(figure.panels[0].series_by_role(SeriesRole::Reference).is_none());
        let reference = figure.panels[1].series_by_role(SeriesRole::Reference).unwrap();
        assert_eq!(reference.dash, LineDash::Dashed);
        assert_eq!(reference.finite_runs().len(), 2);

        // first panel has only "Simulation"; the legend comes from it
        let labels: Vec<&str> = figure.legend.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Simulation"]);
    }

    #[test]
    fn reference_drawn_before_primary() {
        let descriptor = Category::GroundReactionForces.descriptor();
        let names = names(6);
        let primary = channels(6, 4, 100.0);
        let experimental = channels(6, 4, 90.0);
        let input = PlotInput {
            time: &time(4),
            primary: &primary,
            names: &names,
            reference: Some(&experimental),
            rotational: &[],
        };
        let figure = compose_figure(&input, &descriptor).unwrap();
        assert_eq!(figure.grid, GridShape { rows: 2, cols: 3 });
        assert_eq!(figure.removed_cells(), 0);
        let roles: Vec<SeriesRole> = figure.panels[0].series.iter().map(|s| s.role).collect();
        assert_eq!(roles, vec![SeriesRole::Reference, SeriesRole::Primary]);
        let labels: Vec<&str> = figure.legend.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Experimental", "Simulation"]);
        // force panels label every y axis and keep tick labels
        assert!(figure.panels.iter().all(|p| p.y_label && p.x_tick_labels));
        assert_eq!(figure.panels.iter().filter(|p| p.x_label).count(), 3);
    }

    #[test]
    fn axis_labels_on_bottom_occupied_row() {
        let descriptor = Category::MuscleActivations.descriptor();
        let names = names(7);
        let primary = channels(7, 3, 0.5);
        let input = PlotInput {
            time: &time(3),
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        let figure = compose_figure(&input, &descriptor).unwrap();
        let with_x: Vec<usize> = figure.panels.iter().filter(|p| p.x_label).map(|p| p.index).collect();
        // column 2 ends on row 1 because cell (2, 2) was removed
        assert_eq!(with_x, vec![4, 5, 6]);
        assert!(!figure.panels[0].x_tick_labels);
        assert!(figure.panels[5].x_tick_labels);
        let with_y: Vec<usize> = figure.panels.iter().filter(|p| p.y_label).map(|p| p.index).collect();
        assert_eq!(with_y, vec![0, 3, 6]);
        assert!(figure.panels.iter().all(|p| p.y_range == (0.0, 1.0)));
    }

    #[test]
    fn torque_legend_requires_reference() {
        let descriptor = Category::JointTorques.descriptor();
        let names = names(2);
        let primary = channels(2, 3, 10.0);
        let mut input = PlotInput {
            time: &time(3),
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        assert!(compose_figure(&input, &descriptor).unwrap().legend.is_empty());

        let mocap = channels(2, 3, 12.0);
        input.reference = Some(&mocap);
        assert_eq!(compose_figure(&input, &descriptor).unwrap().legend.len(), 2);
    }

    #[test]
    fn unlabelled_categories_have_no_legend() {
        let descriptor = Category::JointPowers.descriptor();
        let names = names(3);
        let primary = channels(3, 3, -5.0);
        let input = PlotInput {
            time: &time(3),
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        assert!(compose_figure(&input, &descriptor).unwrap().legend.is_empty());
    }

    #[test]
    fn mismatched_names_are_rejected() {
        let descriptor = Category::KneeAdductionMoments.descriptor();
        let names = names(3);
        let primary = channels(2, 3, 1.0);
        let input = PlotInput {
            time: &time(3),
            primary: &primary,
            names: &names,
            reference: None,
            rotational: &[],
        };
        assert!(matches!(
            compose_figure(&input, &descriptor),
            Err(PlotError::ChannelCount { rows: 2, names: 3, .. })
        ));

        let empty: Vec<String> = Vec::new();
        let input = PlotInput { names: &empty, ..input };
        assert!(matches!(compose_figure(&input, &descriptor), Err(PlotError::NoChannels(_))));
    }

    #[test]
    fn flat_series_get_a_visible_range() {
        let series = vec![Series {
            role: SeriesRole::Primary,
            label: None,
            color: RGBColor(0, 0, 0),
            alpha: 1.0,
            dash: LineDash::Solid,
            points: vec![(0.0, 3.0), (1.0, 3.0)],
        }];
        assert_eq!(auto_range(&series), (2.5, 3.5));
    }
}
