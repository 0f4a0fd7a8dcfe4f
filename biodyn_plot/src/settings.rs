use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::PlotError;

/// Typography and raster settings shared by every figure. Sizes are in
/// points and converted to pixels through `dpi`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlotSettings {
    pub dpi: u32,
    pub line_width_pt: f64,
    pub label_font_pt: f64,
    pub title_font_pt: f64,
    pub tick_font_pt: f64,
    pub legend_font_pt: f64,
    pub suptitle_font_pt: f64,
    pub font_family: String,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            dpi: 300,
            line_width_pt: 2.0,
            label_font_pt: 14.0,
            title_font_pt: 14.0,
            tick_font_pt: 14.0,
            legend_font_pt: 14.0,
            suptitle_font_pt: 16.0,
            font_family: "sans-serif".to_string(),
        }
    }
}

impl PlotSettings {
    /// Load overrides from a JSON style file; missing fields keep defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, PlotError> {
        let text = fs::read_to_string(path).map_err(|source| PlotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: PlotSettings = serde_json::from_str(&text).map_err(|source| {
            PlotError::Settings(format!("{} is not a valid style file: {}", path.display(), source))
        })?;
        settings.validate()?;
        debug!("Loaded plot style from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), PlotError> {
        if self.dpi == 0 {
            return Err(PlotError::Settings("dpi must be > 0".into()));
        }
        let sizes = [
            ("line_width_pt", self.line_width_pt),
            ("label_font_pt", self.label_font_pt),
            ("title_font_pt", self.title_font_pt),
            ("tick_font_pt", self.tick_font_pt),
            ("legend_font_pt", self.legend_font_pt),
            ("suptitle_font_pt", self.suptitle_font_pt),
        ];
        for (name, value) in sizes {
            if !(value.is_finite() && value > 0.0) {
                return Err(PlotError::Settings(format!("{} must be a positive number", name)));
            }
        }
        Ok(())
    }

    /// Convert a size in points to whole pixels (at least one).
    pub fn px(&self, points: f64) -> u32 {
        ((points * self.dpi as f64 / 72.0).round() as u32).max(1)
    }

    /// Convert a figure dimension in inches to pixels.
    pub fn inches_to_px(&self, inches: f64) -> u32 {
        ((inches * self.dpi as f64).round() as u32).max(1)
    }
}
