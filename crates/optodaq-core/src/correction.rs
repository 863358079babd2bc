//! Dark subtraction and blank normalization.
//!
//! Both transforms mutate the frame in place and never touch the reference. An
//! absent reference is a no-op; a reference with a different element count is
//! rejected with [`DaqError::ShapeMismatch`].
//!
//! The transforms do not commute. Dark must be removed from the blank (when the
//! blank is captured) and from every sample frame *before* blank normalization;
//! [`correct`] encodes that order and is what acquisition code should call.

use crate::error::{AppResult, DaqError, ReferenceKind};
use crate::frame::FrameBuffer;

/// `frame[i] -= dark[i]` for every element, clamped to the `i32` range.
pub fn apply_dark(frame: &mut FrameBuffer, dark: Option<&FrameBuffer>) -> AppResult<()> {
    let Some(dark) = dark else {
        return Ok(());
    };
    check_shape(ReferenceKind::Dark, frame, dark)?;

    for (value, offset) in frame.as_mut_slice().iter_mut().zip(dark.as_slice()) {
        *value = value.saturating_sub(*offset);
    }
    Ok(())
}

/// `frame[i] = blank[i] - frame[i]` for every element (blank minus sample), clamped
/// to the `i32` range.
pub fn apply_blank(frame: &mut FrameBuffer, blank: Option<&FrameBuffer>) -> AppResult<()> {
    let Some(blank) = blank else {
        return Ok(());
    };
    check_shape(ReferenceKind::Blank, frame, blank)?;

    for (value, reference) in frame.as_mut_slice().iter_mut().zip(blank.as_slice()) {
        *value = reference.saturating_sub(*value);
    }
    Ok(())
}

/// Dark subtraction followed by blank normalization.
///
/// Both shapes are checked before the frame is modified, so a mismatched blank
/// never leaves a half-corrected frame behind.
pub fn correct(
    frame: &mut FrameBuffer,
    dark: Option<&FrameBuffer>,
    blank: Option<&FrameBuffer>,
) -> AppResult<()> {
    if let Some(blank) = blank {
        check_shape(ReferenceKind::Blank, frame, blank)?;
    }
    apply_dark(frame, dark)?;
    apply_blank(frame, blank)
}

fn check_shape(
    reference: ReferenceKind,
    frame: &FrameBuffer,
    reference_frame: &FrameBuffer,
) -> AppResult<()> {
    if frame.len() != reference_frame.len() {
        return Err(DaqError::ShapeMismatch {
            reference,
            expected: frame.len(),
            actual: reference_frame.len(),
        });
    }
    Ok(())
}
