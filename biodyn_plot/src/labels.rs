// Display labels for ground-contact channels exported by the simulation
// pipeline (e.g. `ground_force_right_vx` -> `GRF R_x`).

use serde::{Deserialize, Serialize};

const GROUND_FORCE_MARKER: &str = "ground_force";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum LabelKind {
    /// Center of pressure (`..._px`, `..._py`, `..._pz`).
    Cop,
    /// Ground reaction force (`..._vx`, `..._vy`, `..._vz`).
    Grf,
    /// Ground reaction moment (axis is the final character).
    Grm,
}

impl LabelKind {
    pub fn prefix(self) -> &'static str {
        match self {
            LabelKind::Cop => "CoP",
            LabelKind::Grf => "GRF",
            LabelKind::Grm => "GRM",
        }
    }

    fn axis_suffixes(self) -> Option<[(&'static str, &'static str); 3]> {
        match self {
            LabelKind::Cop => Some([("px", "x"), ("py", "y"), ("pz", "z")]),
            LabelKind::Grf => Some([("vx", "x"), ("vy", "y"), ("vz", "z")]),
            LabelKind::Grm => None,
        }
    }
}

/// Map a raw channel name to `"{prefix} {side}_{axis}"`.
///
/// Names that do not mention `ground_force` are returned unchanged. With no
/// side marker the output keeps the underscore (`"GRF _x"`).
pub fn normalize_label(raw: &str, kind: LabelKind) -> String {
    if !raw.contains(GROUND_FORCE_MARKER) {
        return raw.to_string();
    }

    let side = if raw.contains("left") {
        "L"
    } else if raw.contains("right") {
        "R"
    } else {
        ""
    };

    let last_token = raw.rsplit('_').next().unwrap_or(raw);
    let axis = match kind.axis_suffixes() {
        Some(suffixes) => suffixes
            .iter()
            .find(|(suffix, _)| raw.ends_with(suffix))
            .map(|(_, axis)| (*axis).to_string())
            .unwrap_or_else(|| last_token.to_string()),
        None => last_token
            .chars()
            .last()
            .map(String::from)
            .unwrap_or_default(),
    };

    format!("{} {}_{}", kind.prefix(), side, axis)
}

pub fn normalize_labels(raw: &[String], kind: LabelKind) -> Vec<String> {
    raw.iter().map(|name| normalize_label(name, kind)).collect()
}
