use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};

use crate::PlotError;

/// Strictly increasing sample times shared by every channel of one figure.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    values: Array1<f64>,
}

impl TimeSeries {
    pub fn new(values: Vec<f64>) -> Result<Self, PlotError> {
        if values.is_empty() {
            return Err(PlotError::InvalidTime("time vector is empty".into()));
        }
        if let Some(idx) = values
            .windows(2)
            .position(|pair| !pair[0].is_finite() || pair[1] <= pair[0])
        {
            return Err(PlotError::InvalidTime(format!(
                "time is not strictly increasing at sample {}",
                idx + 1
            )));
        }
        if !values[values.len() - 1].is_finite() {
            return Err(PlotError::InvalidTime("time contains non-finite values".into()));
        }
        Ok(Self {
            values: Array1::from(values),
        })
    }

    /// Build the working time vector from a stored time row. The stored row
    /// carries one more sample than the per-step dynamics arrays, so the final
    /// sample is dropped.
    pub fn from_stored_row(row: ArrayView1<'_, f64>) -> Result<Self, PlotError> {
        if row.len() < 2 {
            return Err(PlotError::InvalidTime(format!(
                "stored time row has {} samples; need at least 2",
                row.len()
            )));
        }
        Self::new(row.slice(s![..-1]).to_vec())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        self.values.as_slice().unwrap_or(&[])
    }

    pub fn first(&self) -> f64 {
        self.values[0]
    }

    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }
}

/// Channel table: rows are channels, columns are samples aligned to a
/// [`TimeSeries`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSet {
    data: Array2<f64>,
}

impl ChannelSet {
    /// Align `raw` to `time`. One trailing extra sample is dropped; any other
    /// column count is a shape mismatch.
    pub fn aligned(key: &str, raw: ArrayView2<'_, f64>, time: &TimeSeries) -> Result<Self, PlotError> {
        let samples = time.len();
        let columns = raw.ncols();
        let data = if columns == samples {
            raw.to_owned()
        } else if columns == samples + 1 {
            raw.slice(s![.., ..samples]).to_owned()
        } else {
            return Err(PlotError::ShapeMismatch {
                key: key.to_string(),
                expected: samples,
                found: columns,
            });
        };
        Ok(Self { data })
    }

    /// Require exactly one row per channel name.
    pub fn expect_channels(self, key: &str, names: usize) -> Result<Self, PlotError> {
        if self.data.nrows() != names {
            return Err(PlotError::ChannelCount {
                key: key.to_string(),
                rows: self.data.nrows(),
                names,
            });
        }
        Ok(self)
    }

    pub fn channels(&self) -> usize {
        self.data.nrows()
    }

    pub fn samples(&self) -> usize {
        self.data.ncols()
    }

    pub fn row(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.data.row(idx)
    }

    /// True when every sample of the channel is NaN.
    pub fn row_is_undefined(&self, idx: usize) -> bool {
        self.data.row(idx).iter().all(|v| v.is_nan())
    }

    /// Channel values multiplied by `scale`.
    pub fn scaled_row(&self, idx: usize, scale: f64) -> Vec<f64> {
        self.data.row(idx).iter().map(|v| v * scale).collect()
    }
}
