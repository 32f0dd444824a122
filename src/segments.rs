//! Segment geometry for multi-page capture.
//!
//! Pure functions: given the measured content height and the configured
//! segment height, produce the list of (offset, height) slices the capturer
//! scrolls through. Separated from the capture I/O so the math is testable
//! without a browser.

use crate::config::VIEWPORT_HARD_CAP;

/// One vertical slice of the content, top-to-bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Scroll offset in CSS pixels from the top of the document.
    pub offset: u32,
    /// Capture height of this slice.
    pub height: u32,
}

/// Slice `total_height` into segments of `segment_height`.
///
/// The segment count is the rounded quotient, so a trailing sliver shorter
/// than half a segment is absorbed into the final slice rather than becoming
/// its own near-empty capture. Heights always sum to `total_height`, and the
/// final slice height equals the remaining content below the previous
/// offsets.
pub fn segment_plan(total_height: u32, segment_height: u32) -> Vec<Segment> {
    if segment_height == 0 || total_height <= segment_height {
        return vec![Segment {
            offset: 0,
            height: total_height,
        }];
    }

    let count = ((total_height as f64 / segment_height as f64).round() as u32).max(1);
    let mut plan = Vec::with_capacity(count as usize);
    for i in 0..count {
        let offset = segment_height * i;
        let height = if i + 1 == count {
            total_height - offset
        } else {
            segment_height
        };
        plan.push(Segment { offset, height });
    }
    plan
}

/// Viewport height used while walking the segments: one segment plus a small
/// overlap margin, clamped to what the engine accepts.
pub fn segment_viewport_height(segment_height: u32) -> u32 {
    (segment_height + 100).min(VIEWPORT_HARD_CAP)
}

/// Viewport height for the final segment, clamped to the hard cap.
pub fn last_viewport_height(remaining: u32) -> u32 {
    remaining.clamp(1, VIEWPORT_HARD_CAP)
}
