//! Text Fitter: the largest font size that keeps a string inside a box.

// ============================================================================
// Data Structures
// ============================================================================

/// Anything that can report the rendered width of a string, in points.
pub trait TextMeasure {
    fn text_width(&self, text: &str, size: f32) -> f32;
}

/// Search bounds for [`fit_font_size`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeBounds {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

impl SizeBounds {
    /// Certificate fields: 6 to 12 pt in half-point steps.
    pub const CERTIFICATE: SizeBounds = SizeBounds {
        min: 6.0,
        max: 12.0,
        step: 0.5,
    };

    /// Rank-card fields carry their own ceiling; the floor and step are shared.
    pub const fn rank_card(max: f32) -> Self {
        SizeBounds {
            min: 6.0,
            max,
            step: 0.4,
        }
    }
}

// ============================================================================
// Fitting
// ============================================================================

/// Step down from `min(bounds.max, base_size)` until `text` fits `max_width`
/// or the floor is reached. Text that overflows at the floor is accepted.
pub fn fit_font_size<M: TextMeasure + ?Sized>(
    text: &str,
    max_width: f32,
    font: &M,
    base_size: f32,
    bounds: SizeBounds,
) -> f32 {
    if text.is_empty() {
        return base_size;
    }
    let mut size = bounds.max.min(base_size);
    if bounds.step > 0.0 {
        while size > bounds.min && font.text_width(text, size) > max_width {
            size -= bounds.step;
        }
    }
    size.max(bounds.min)
}
