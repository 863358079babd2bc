//! Frame buffers and capture bookkeeping.

use crate::error::{AppResult, DaqError};
use crate::modes::ReadMode;
use serde::{Deserialize, Serialize};

/// Default detector width (spectral trace length).
pub const DEFAULT_WIDTH: usize = 1024;
/// Default detector height (image rows).
pub const DEFAULT_HEIGHT: usize = 256;

/// Sensor dimensions of a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorGeometry {
    /// Columns (spectral axis).
    pub width: usize,
    /// Rows (spatial axis).
    pub height: usize,
}

impl DetectorGeometry {
    /// Create a geometry.
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Number of elements a readout in `read_mode` produces.
    ///
    /// Full vertical binning collapses every row, so a spectral readout is one row wide.
    pub fn element_count(&self, read_mode: ReadMode) -> usize {
        match read_mode {
            ReadMode::Spectral => self.width,
            ReadMode::Image => self.width * self.height,
        }
    }

    /// `(width, height)` of a readout in `read_mode`.
    pub fn shape(&self, read_mode: ReadMode) -> (usize, usize) {
        match read_mode {
            ReadMode::Spectral => (self.width, 1),
            ReadMode::Image => (self.width, self.height),
        }
    }
}

impl Default for DetectorGeometry {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

/// One detector readout.
///
/// Intensities are signed so that dark-subtracted and blank-normalized values can go
/// negative without clamping. Image data is stored row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBuffer {
    data: Vec<i32>,
    width: usize,
    height: usize,
}

impl FrameBuffer {
    /// A 1-D spectral trace.
    pub fn spectral(data: Vec<i32>) -> Self {
        let width = data.len();
        Self {
            data,
            width,
            height: 1,
        }
    }

    /// A 2-D image; `data.len()` must equal `width * height`.
    pub fn image(data: Vec<i32>, width: usize, height: usize) -> AppResult<Self> {
        if width.checked_mul(height) != Some(data.len()) {
            return Err(DaqError::Configuration(format!(
                "image buffer of {} elements does not match {}x{}",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// A readout shaped for `read_mode` on `geometry`, every element set to `value`.
    pub fn filled(geometry: DetectorGeometry, read_mode: ReadMode, value: i32) -> Self {
        let (width, height) = geometry.shape(read_mode);
        Self {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Rows (1 for spectral traces).
    pub fn height(&self) -> usize {
        self.height
    }

    /// Read mode implied by the buffer shape.
    pub fn read_mode(&self) -> ReadMode {
        if self.height > 1 {
            ReadMode::Image
        } else {
            ReadMode::Spectral
        }
    }

    /// Intensities, row-major.
    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.data
    }

    /// Intensity at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> Option<i32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y * self.width + x).copied()
    }

    /// Consume the buffer, returning the raw intensities.
    pub fn into_vec(self) -> Vec<i32> {
        self.data
    }

    /// Summary statistics for display.
    pub fn stats(&self) -> FrameStats {
        let min = self.data.iter().copied().min().unwrap_or(0);
        let max = self.data.iter().copied().max().unwrap_or(0);
        let sum: i64 = self.data.iter().map(|&v| v as i64).sum();
        let mean = if self.data.is_empty() {
            0.0
        } else {
            sum as f64 / self.data.len() as f64
        };
        FrameStats { min, max, mean }
    }
}

/// Minimum, maximum and mean of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    /// Smallest intensity.
    pub min: i32,
    /// Largest intensity.
    pub max: i32,
    /// Mean intensity.
    pub mean: f64,
}

/// The composite capture primitives exposed by a frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Detector unexposed.
    Dark,
    /// Single lamp exposure.
    Flash,
    /// Exposure with the excitation laser and lamp open.
    Trans,
    /// Full-resolution image.
    Image,
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureKind::Dark => write!(f, "dark"),
            CaptureKind::Flash => write!(f, "flash"),
            CaptureKind::Trans => write!(f, "trans"),
            CaptureKind::Image => write!(f, "image"),
        }
    }
}

/// Position of a capture within an acquisition run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepTag {
    /// The dark reference taken at run start.
    Reference,
    /// The single excitation capture before the step loop.
    Excitation,
    /// Step `n` of the loop, counting from zero.
    Step(u32),
}

impl std::fmt::Display for StepTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepTag::Reference => write!(f, "reference"),
            StepTag::Excitation => write!(f, "excitation"),
            StepTag::Step(n) => write!(f, "step {}", n),
        }
    }
}
