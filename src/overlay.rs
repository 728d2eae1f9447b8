//! Overlay Renderer: draws placements onto transparent pages with printpdf.
//!
//! All pages of one composition are rendered into a single printpdf document
//! so font programs are embedded once. The result is handed back as a parsed
//! `lopdf` document for the composer to merge.

use crate::error::AppError;
use crate::fit::{fit_font_size, TextMeasure};
use crate::fonts::LoadedFont;
use crate::layout::{FontRole, Placement, TextAnchor, TextStyle};
use crate::template::{PageGeometry, Rotation};
use log::debug;
use printpdf::{CurTransMat, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Pt};

// ============================================================================
// Constants
// ============================================================================

const OVERLAY_TITLE: &str = "Overlay";
const OVERLAY_LAYER: &str = "Text";

// ============================================================================
// Data Structures
// ============================================================================

/// The base font and optional signature font for one composition.
#[derive(Debug, Clone)]
pub struct OverlayFonts {
    pub base: LoadedFont,
    pub script: Option<LoadedFont>,
}

impl OverlayFonts {
    pub fn new(base: LoadedFont, script: Option<LoadedFont>) -> Self {
        OverlayFonts { base, script }
    }

    pub fn for_role(&self, role: FontRole) -> &LoadedFont {
        match role {
            FontRole::Base => &self.base,
            FontRole::Signature => self.script.as_ref().unwrap_or(&self.base),
        }
    }

    /// Sizing inputs for layouts, given the configured sizes.
    pub fn text_style(&self, font_size: f32, script_font_size: Option<f32>) -> TextStyle {
        TextStyle {
            font_size,
            script_font_size,
            has_script_font: self.script.is_some(),
        }
    }
}

/// Font references registered in the printpdf document.
struct RegisteredFonts {
    base: IndirectFontRef,
    script: Option<IndirectFontRef>,
}

impl RegisteredFonts {
    fn for_role(&self, role: FontRole) -> &IndirectFontRef {
        match role {
            FontRole::Base => &self.base,
            FontRole::Signature => self.script.as_ref().unwrap_or(&self.base),
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

/// Render one overlay page per entry of `pages`, each sized to `page`.
pub fn render_overlay(
    page: &PageGeometry,
    pages: &[Vec<Placement>],
    fonts: &OverlayFonts,
) -> Result<lopdf::Document, AppError> {
    let doc = PdfDocument::empty(OVERLAY_TITLE);

    // Fonts must exist in the document before any text references them.
    let registered = RegisteredFonts {
        base: register_font(&doc, &fonts.base)?,
        script: fonts
            .script
            .as_ref()
            .map(|font| register_font(&doc, font))
            .transpose()?,
    };

    let width = Mm::from(Pt(page.width()));
    let height = Mm::from(Pt(page.height()));
    for (index, placements) in pages.iter().enumerate() {
        let (page_index, layer_index) = doc.add_page(width, height, OVERLAY_LAYER);
        let layer = doc.get_page(page_index).get_layer(layer_index);
        for placement in placements {
            draw_placement(&layer, placement, fonts, &registered);
        }
        debug!("Rendered overlay page {} with {} placement(s)", index + 1, placements.len());
    }

    let bytes = doc.save_to_bytes()?;
    Ok(lopdf::Document::load_mem(&bytes)?)
}

fn register_font(doc: &PdfDocumentReference, font: &LoadedFont) -> Result<IndirectFontRef, AppError> {
    let registered = match (font.builtin(), font.font_data()) {
        (Some(builtin), _) => doc.add_builtin_font(builtin),
        (None, Some(data)) => doc.add_external_font(data),
        (None, None) => {
            return Err(AppError::FontError(format!("{} has no font program", font.name)));
        }
    };
    registered.map_err(|e| AppError::FontError(format!("{}: {}", font.name, e)))
}

/// Fit, then draw one string in a rotated frame at the placement origin.
fn draw_placement(
    layer: &PdfLayerReference,
    placement: &Placement,
    fonts: &OverlayFonts,
    registered: &RegisteredFonts,
) {
    if placement.text.is_empty() {
        return;
    }
    let font = fonts.for_role(placement.role);
    let size = fit_font_size(
        &placement.text,
        placement.max_width,
        font,
        placement.base_size,
        placement.bounds,
    );
    let local = match placement.anchor {
        TextAnchor::Centered => (-font.text_width(&placement.text, size) / 2.0, -size / 2.0),
        TextAnchor::BaselineStart => (0.0, 0.0),
    };

    layer.save_graphics_state();
    layer.set_ctm(CurTransMat::Raw(text_matrix(placement.origin, placement.rotation, local)));
    layer.use_text(
        placement.text.as_str(),
        size,
        Mm(0.0),
        Mm(0.0),
        registered.for_role(placement.role),
    );
    layer.restore_graphics_state();
}

/// Translate to `origin`, rotate counter-clockwise, then offset by `local`
/// in the rotated frame.
pub fn text_matrix(origin: (f32, f32), rotation: Rotation, local: (f32, f32)) -> [f32; 6] {
    let (cos, sin) = match rotation {
        Rotation::Deg0 => (1.0, 0.0),
        Rotation::Deg90 => (0.0, 1.0),
        Rotation::Deg180 => (-1.0, 0.0),
        Rotation::Deg270 => (0.0, -1.0),
    };
    let (lx, ly) = local;
    [
        cos,
        sin,
        -sin,
        cos,
        origin.0 + cos * lx - sin * ly,
        origin.1 + sin * lx + cos * ly,
    ]
}
