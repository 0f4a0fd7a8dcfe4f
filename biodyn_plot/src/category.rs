//! Per-category plotting rules.
//!
//! Every signal category shares one rendering algorithm; what differs between
//! them (grid policy, units, reference overlay, bounds, store keys) is data in
//! [`ChannelDescriptor`].

use std::f64::consts::PI;

use plotters::style::RGBColor;
use serde::{Deserialize, Serialize};

use crate::labels::LabelKind;

pub const RAD_TO_DEG: f64 = 180.0 / PI;

// matplotlib "tab" palette
pub const TAB_BLUE: RGBColor = RGBColor(31, 119, 180);
pub const TAB_ORANGE: RGBColor = RGBColor(255, 127, 14);
pub const TAB_GREEN: RGBColor = RGBColor(44, 160, 44);
pub const TAB_RED: RGBColor = RGBColor(214, 39, 40);
pub const TAB_PURPLE: RGBColor = RGBColor(148, 103, 189);

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Category {
    GroundReactionForces,
    GroundReactionMoments,
    CentersOfPressure,
    JointCoordinates,
    JointSpeeds,
    JointTorques,
    JointPowers,
    KneeAdductionMoments,
    MuscleActivations,
}

impl Category {
    /// Plotting order used by the extraction run.
    pub const ALL: [Category; 9] = [
        Category::GroundReactionForces,
        Category::JointCoordinates,
        Category::JointSpeeds,
        Category::JointTorques,
        Category::JointPowers,
        Category::KneeAdductionMoments,
        Category::MuscleActivations,
        Category::CentersOfPressure,
        Category::GroundReactionMoments,
    ];

    pub fn descriptor(self) -> ChannelDescriptor {
        match self {
            Category::GroundReactionForces => ChannelDescriptor {
                category: self,
                title: "Ground Reaction Forces",
                file_stem: "ground_reaction_forces",
                keys: StoreKeys::new("GRF", "GRF_labels").with_reference("GRF_experimental"),
                label_kind: Some(LabelKind::Grf),
                grid: GridPolicy::FixedTwoByThree,
                units: UnitRule::Linear("Force (N)"),
                primary: PrimaryStyle::new(TAB_BLUE, Some("Simulation")),
                reference: Some(ReferenceStyle::new("Experimental", LineDash::Dashed)),
                y_bounds: None,
                zero_line: false,
                y_label: YLabelPolicy::EveryPanel,
                shared_x: false,
                legend: LegendPolicy::FirstLabelledPanel,
            },
            Category::GroundReactionMoments => ChannelDescriptor {
                category: self,
                title: "Ground Reaction Moments",
                file_stem: "ground_reaction_moments",
                keys: StoreKeys::new("GRM", "GRM_labels"),
                label_kind: Some(LabelKind::Grm),
                grid: GridPolicy::FixedTwoByThree,
                units: UnitRule::Linear("Moment (N⋅m)"),
                primary: PrimaryStyle::new(TAB_PURPLE, Some("Simulation")),
                reference: None,
                y_bounds: None,
                zero_line: false,
                y_label: YLabelPolicy::EveryPanel,
                shared_x: false,
                legend: LegendPolicy::FirstLabelledPanel,
            },
            Category::CentersOfPressure => ChannelDescriptor {
                category: self,
                title: "Centers of Pressure",
                file_stem: "centers_of_pressure",
                keys: StoreKeys::new("COP", "COP_labels"),
                label_kind: Some(LabelKind::Cop),
                grid: GridPolicy::CenterOfPressure,
                units: UnitRule::Linear("Position (m)"),
                primary: PrimaryStyle::new(TAB_GREEN, Some("Simulation")),
                reference: None,
                y_bounds: None,
                zero_line: false,
                y_label: YLabelPolicy::EveryPanel,
                shared_x: false,
                legend: LegendPolicy::FirstLabelledPanel,
            },
            Category::JointCoordinates => ChannelDescriptor {
                category: self,
                title: "Joint Coordinates",
                file_stem: "joint_coordinates",
                keys: StoreKeys::new("coordinate_values", "coordinates")
                    .with_reference("coordinate_values_toTrack")
                    .with_rotational("rotationalCoordinates"),
                label_kind: None,
                grid: GridPolicy::Square,
                units: UnitRule::Rotational {
                    angular: "(deg)",
                    linear: "(m)",
                },
                primary: PrimaryStyle::new(TAB_BLUE, Some("Dynamic Simulation")),
                reference: Some(ReferenceStyle::new("Tracked (OpenCap)", LineDash::Dotted)),
                y_bounds: None,
                zero_line: false,
                y_label: YLabelPolicy::EveryPanel,
                shared_x: true,
                legend: LegendPolicy::FirstLabelledPanel,
            },
            Category::JointSpeeds => ChannelDescriptor {
                category: self,
                title: "Joint Coordinate Speeds",
                file_stem: "joint_speeds",
                keys: StoreKeys::new("coordinate_speeds", "coordinates")
                    .with_reference("coordinate_speeds_toTrack")
                    .with_rotational("rotationalCoordinates"),
                label_kind: None,
                grid: GridPolicy::Square,
                units: UnitRule::Rotational {
                    angular: "(deg/s)",
                    linear: "(m/s)",
                },
                primary: PrimaryStyle::new(TAB_ORANGE, Some("Dynamic Simulation")),
                reference: Some(ReferenceStyle::new("Tracked (OpenCap)", LineDash::Dotted)),
                y_bounds: None,
                zero_line: false,
                y_label: YLabelPolicy::EveryPanel,
                shared_x: true,
                legend: LegendPolicy::FirstLabelledPanel,
            },
            Category::JointTorques => ChannelDescriptor {
                category: self,
                title: "Joint Torques",
                file_stem: "joint_torques",
                keys: StoreKeys::new("torques", "coordinates").with_reference("torques_mocap"),
                label_kind: None,
                grid: GridPolicy::Square,
                units: UnitRule::Linear("(N⋅m)"),
                primary: PrimaryStyle::new(TAB_RED, Some("OpenCap Analysis")),
                reference: Some(ReferenceStyle::new("Mocap-based ID", LineDash::Dashed)),
                y_bounds: None,
                zero_line: false,
                y_label: YLabelPolicy::EveryPanel,
                shared_x: true,
                legend: LegendPolicy::OnlyWithReference,
            },
            Category::JointPowers => ChannelDescriptor {
                category: self,
                title: "Joint Powers",
                file_stem: "joint_powers",
                keys: StoreKeys::new("powers", "coordinates_power"),
                label_kind: None,
                grid: GridPolicy::Square,
                units: UnitRule::Linear("(W)"),
                primary: PrimaryStyle::new(TAB_GREEN, None),
                reference: None,
                y_bounds: None,
                zero_line: true,
                y_label: YLabelPolicy::EveryPanel,
                shared_x: true,
                legend: LegendPolicy::FirstLabelledPanel,
            },
            Category::KneeAdductionMoments => ChannelDescriptor {
                category: self,
                title: "Knee Adduction Moments (KAM)",
                file_stem: "knee_adduction_moments",
                keys: StoreKeys::new("KAM", "KAM_labels"),
                label_kind: None,
                grid: GridPolicy::Square,
                units: UnitRule::Linear("(N⋅m)"),
                primary: PrimaryStyle::new(TAB_PURPLE, None),
                reference: None,
                y_bounds: None,
                zero_line: true,
                y_label: YLabelPolicy::EveryPanel,
                shared_x: false,
                legend: LegendPolicy::FirstLabelledPanel,
            },
            Category::MuscleActivations => ChannelDescriptor {
                category: self,
                title: "Muscle Activations",
                file_stem: "muscle_activations",
                keys: StoreKeys::new("muscle_activations", "muscles")
                    .with_reference("muscle_activations_emg"),
                label_kind: None,
                grid: GridPolicy::Square,
                units: UnitRule::Linear("Activation"),
                primary: PrimaryStyle::new(TAB_RED, Some("Simulation")),
                reference: Some(
                    ReferenceStyle::new("EMG", LineDash::Dashed).undefined_rows_absent(),
                ),
                y_bounds: Some((0.0, 1.0)),
                zero_line: false,
                y_label: YLabelPolicy::LeftColumn,
                shared_x: true,
                legend: LegendPolicy::FirstLabelledPanel,
            },
        }
    }
}

/// Keys a category reads from one case of the results store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreKeys {
    pub values: &'static str,
    pub labels: &'static str,
    pub reference: Option<&'static str>,
    pub rotational: Option<&'static str>,
}

impl StoreKeys {
    const fn new(values: &'static str, labels: &'static str) -> Self {
        Self {
            values,
            labels,
            reference: None,
            rotational: None,
        }
    }

    const fn with_reference(mut self, key: &'static str) -> Self {
        self.reference = Some(key);
        self
    }

    const fn with_rotational(mut self, key: &'static str) -> Self {
        self.rotational = Some(key);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridPolicy {
    /// `cols = ceil(sqrt(n))`, `rows = ceil(n / cols)`.
    Square,
    /// 2x3 for the canonical left/right x/y/z layout.
    FixedTwoByThree,
    /// 2x3 for six channels, otherwise at most three columns.
    CenterOfPressure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitRule {
    Linear(&'static str),
    /// Channels listed as rotational are converted from radians to degrees.
    Rotational {
        angular: &'static str,
        linear: &'static str,
    },
}

impl UnitRule {
    /// Scale factor and unit label for one channel.
    pub fn resolve(&self, channel: &str, rotational: &[String]) -> (f64, &'static str) {
        match *self {
            UnitRule::Linear(unit) => (1.0, unit),
            UnitRule::Rotational { angular, linear } => {
                if rotational.iter().any(|name| name == channel) {
                    (RAD_TO_DEG, angular)
                } else {
                    (1.0, linear)
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineDash {
    Solid,
    Dashed,
    Dotted,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimaryStyle {
    pub color: RGBColor,
    pub label: Option<&'static str>,
}

impl PrimaryStyle {
    const fn new(color: RGBColor, label: Option<&'static str>) -> Self {
        Self { color, label }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceStyle {
    pub label: &'static str,
    pub dash: LineDash,
    /// An all-NaN reference row counts as "no reference" for that channel.
    pub undefined_rows_absent: bool,
}

impl ReferenceStyle {
    const fn new(label: &'static str, dash: LineDash) -> Self {
        Self {
            label,
            dash,
            undefined_rows_absent: false,
        }
    }

    const fn undefined_rows_absent(mut self) -> Self {
        self.undefined_rows_absent = true;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum YLabelPolicy {
    EveryPanel,
    LeftColumn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegendPolicy {
    FirstLabelledPanel,
    /// Legend only when a comparison dataset was supplied.
    OnlyWithReference,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChannelDescriptor {
    pub category: Category,
    pub title: &'static str,
    pub file_stem: &'static str,
    pub keys: StoreKeys,
    pub label_kind: Option<LabelKind>,
    pub grid: GridPolicy,
    pub units: UnitRule,
    pub primary: PrimaryStyle,
    pub reference: Option<ReferenceStyle>,
    pub y_bounds: Option<(f64, f64)>,
    pub zero_line: bool,
    pub y_label: YLabelPolicy,
    /// Interior panels hide their x tick labels.
    pub shared_x: bool,
    pub legend: LegendPolicy,
}

impl ChannelDescriptor {
    pub fn file_name(&self) -> String {
        format!("{}.png", self.file_stem)
    }

    /// Figure size in inches for a grid of `rows` x `cols`.
    pub fn figure_inches(&self, rows: usize, cols: usize, channels: usize) -> (f64, f64) {
        match (self.grid, self.category) {
            (GridPolicy::FixedTwoByThree, _) if rows <= 2 => (15.0, 8.0),
            (GridPolicy::CenterOfPressure, _) if channels == 6 => (15.0, 8.0),
            (GridPolicy::FixedTwoByThree, _) => (15.0, 4.0 * rows as f64),
            (GridPolicy::CenterOfPressure, _) | (_, Category::KneeAdductionMoments) => {
                (5.0 * cols as f64, 4.0 * rows as f64)
            }
            _ => (4.0 * cols as f64, 3.0 * rows as f64),
        }
    }
}
