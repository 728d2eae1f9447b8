//! Page Composer: template + overlay → output document.
//!
//! The template's first page is imported once as a form XObject and reused
//! for every output page. Each page also gets its own overlay XObject and a
//! content stream that applies the display-space shift to both. Nothing is
//! written to disk until the whole document has been assembled.

use crate::error::AppError;
use crate::fonts::{FontRegistry, LoadedFont};
use crate::layout::{FieldMap, Layout};
use crate::overlay::{render_overlay, OverlayFonts};
use crate::record::Record;
use crate::template::{first_page_id, inherited_attribute, PageGeometry, Rect, ResolvedTemplate};
use log::{debug, info};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// Constants
// ============================================================================

/// Points per inch.
const POINTS_PER_INCH: f32 = 72.0;

const TEMPLATE_XOBJECT: &str = "CubTemplate";
const OVERLAY_XOBJECT: &str = "CubOverlay";

/// Page boxes carried over from the template besides the MediaBox.
const PAGE_BOX_KEYS: [&str; 4] = ["CropBox", "BleedBox", "TrimBox", "ArtBox"];

/// Marked-content operators printpdf wraps around each layer.
const MARKED_CONTENT_OPERATORS: [&str; 3] = ["BDC", "BMC", "EMC"];

// ============================================================================
// Data Structures
// ============================================================================

/// Rendering settings for one generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Base font catalog id.
    pub font: String,
    /// Signature font catalog id; `None` or `"None"` draws signatures in the base font.
    pub script_font: Option<String>,
    pub font_size: f32,
    pub script_font_size: Option<f32>,
    /// Inches to move content left on the displayed page.
    pub shift_left: f32,
    /// Inches to move content down on the displayed page.
    pub shift_down: f32,
    /// Overrides the template's `/Rotate` when mapping the shift.
    pub rotation: Option<i64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            font: crate::fonts::DEFAULT_FONT.to_string(),
            script_font: Some(crate::fonts::DEFAULT_SCRIPT_FONT.to_string()),
            font_size: 14.0,
            script_font_size: Some(24.0),
            shift_left: 0.5,
            shift_down: 0.5,
            rotation: None,
        }
    }
}

impl RenderConfig {
    /// The requested shift in display-space points.
    pub fn display_shift(&self) -> (f32, f32) {
        (-POINTS_PER_INCH * self.shift_left, -POINTS_PER_INCH * self.shift_down)
    }
}

/// An assembled output document.
#[derive(Debug, Clone)]
pub struct ComposedDocument {
    pub bytes: Vec<u8>,
    /// Field values drawn on each page, in page order.
    pub field_maps: Vec<FieldMap>,
}

impl ComposedDocument {
    pub fn page_count(&self) -> usize {
        self.field_maps.len()
    }
}

// ============================================================================
// Shift Mapping
// ============================================================================

/// Rotate a display-space displacement into page space for a page shown
/// with `/Rotate` = `rotation`. Angles that are not multiples of 90 pass
/// the displacement through unchanged.
pub fn map_display_shift(rotation: i64, dx: f32, dy: f32) -> (f32, f32) {
    match rotation.rem_euclid(360) {
        90 => (-dy, dx),
        180 => (-dx, -dy),
        270 => (dy, -dx),
        _ => (dx, dy),
    }
}

// ============================================================================
// Composition
// ============================================================================

/// Compose and write the output, creating parent directories as needed.
/// Returns the number of pages written.
pub fn compose(
    template: &ResolvedTemplate,
    records: &[Record],
    config: &RenderConfig,
    fonts: &FontRegistry,
    output: &Path,
) -> Result<usize, AppError> {
    let document = compose_document(template, records, config, fonts)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, &document.bytes)?;
    info!("Wrote {} page(s) to {}", document.page_count(), output.display());
    Ok(document.page_count())
}

/// Build the full output document in memory.
pub fn compose_document(
    template: &ResolvedTemplate,
    records: &[Record],
    config: &RenderConfig,
    fonts: &FontRegistry,
) -> Result<ComposedDocument, AppError> {
    if records.is_empty() {
        return Err(AppError::EmptyInput);
    }
    let path = template.path();
    if !path.is_file() {
        return Err(AppError::TemplateMissing(path.to_path_buf()));
    }
    let source = Document::load(path)
        .map_err(|e| AppError::PdfError(format!("{}: {}", path.display(), e)))?;

    let layout = Layout::for_template(template);
    let overlay_fonts = load_fonts(config, fonts);
    let style = overlay_fonts.text_style(config.font_size, config.script_font_size);

    let chunks: Vec<&[Record]> = records.chunks(layout.capacity()).collect();
    let field_maps: Vec<FieldMap> = chunks.iter().map(|chunk| layout.field_map(chunk)).collect();
    let placements: Vec<_> = chunks
        .iter()
        .map(|chunk| layout.placements(chunk, &style))
        .collect();

    let geometry = *template.page();
    let overlay = render_overlay(&geometry, &placements, &overlay_fonts)?;

    let rotation = config.rotation.unwrap_or(geometry.rotate);
    let (dx, dy) = config.display_shift();
    let shift = map_display_shift(rotation, dx, dy);
    debug!(
        "Composing {} page(s) from {} record(s), rotation {}, shift ({}, {})",
        chunks.len(),
        records.len(),
        rotation,
        shift.0,
        shift.1
    );

    let bytes = assemble(&source, &overlay, &geometry, shift)?;
    Ok(ComposedDocument { bytes, field_maps })
}

fn load_fonts(config: &RenderConfig, fonts: &FontRegistry) -> OverlayFonts {
    let base = LoadedFont::load(&fonts.base_font(&config.font));
    let script = config
        .script_font
        .as_deref()
        .and_then(|choice| fonts.script_font(choice))
        .map(|resolved| LoadedFont::load(&resolved));
    OverlayFonts::new(base, script)
}

/// Write one output page per overlay page on top of the shared template.
fn assemble(
    source: &Document,
    overlay: &Document,
    geometry: &PageGeometry,
    shift: (f32, f32),
) -> Result<Vec<u8>, AppError> {
    let mut out = Document::with_version("1.5");
    let pages_id = out.new_object_id();
    let mut template_importer = ObjectImporter::new(source);
    let mut overlay_importer = ObjectImporter::new(overlay);

    let source_page = first_page_id(source)?;
    let template_xobject = template_importer.page_as_form(&mut out, source_page, geometry, false)?;
    let page_boxes = template_importer.page_boxes(&mut out, source_page)?;

    let mut kids = Vec::new();
    for overlay_page in overlay.get_pages().into_values() {
        let overlay_xobject = overlay_importer.page_as_form(&mut out, overlay_page, geometry, true)?;
        let contents = out.add_object(Stream::new(
            Dictionary::new(),
            page_content(shift)?,
        ));

        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => rect_object(&geometry.media_box),
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    TEMPLATE_XOBJECT => template_xobject,
                    OVERLAY_XOBJECT => overlay_xobject,
                },
            },
            "Contents" => contents,
        };
        if geometry.rotate != 0 {
            page.set("Rotate", geometry.rotate);
        }
        for (key, value) in &page_boxes {
            page.set(key.as_str(), value.clone());
        }
        kids.push(Object::Reference(out.add_object(page)));
    }

    let count = kids.len() as i64;
    out.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = out.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    out.trailer.set("Root", catalog_id);
    out.compress();

    let mut bytes = Vec::new();
    out.save_to(&mut bytes)?;
    Ok(bytes)
}

/// `q [shift cm] /CubTemplate Do /CubOverlay Do Q`
fn page_content(shift: (f32, f32)) -> Result<Vec<u8>, AppError> {
    let mut operations = vec![Operation::new("q", vec![])];
    if shift.0 != 0.0 || shift.1 != 0.0 {
        operations.push(Operation::new(
            "cm",
            vec![
                Object::Integer(1),
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(1),
                Object::Real(shift.0),
                Object::Real(shift.1),
            ],
        ));
    }
    operations.push(Operation::new("Do", vec![Object::Name(TEMPLATE_XOBJECT.into())]));
    operations.push(Operation::new("Do", vec![Object::Name(OVERLAY_XOBJECT.into())]));
    operations.push(Operation::new("Q", vec![]));
    Ok(Content { operations }.encode()?)
}

fn rect_object(rect: &Rect) -> Object {
    Object::Array(vec![
        Object::Real(rect.x1),
        Object::Real(rect.y1),
        Object::Real(rect.x2),
        Object::Real(rect.y2),
    ])
}

/// Concatenated, decompressed content streams of a page.
fn page_content_bytes(doc: &Document, page_id: ObjectId) -> Vec<u8> {
    let mut content = Vec::new();
    for stream_id in doc.get_page_contents(page_id) {
        let Ok(stream) = doc.get_object(stream_id).and_then(Object::as_stream) else {
            continue;
        };
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        content.extend_from_slice(&data);
        content.push(b'\n');
    }
    content
}

// ============================================================================
// Object Import
// ============================================================================

/// Deep-copies objects from one document into another, remapping references.
/// Each source object is copied at most once per importer.
struct ObjectImporter<'a> {
    source: &'a Document,
    id_map: BTreeMap<ObjectId, ObjectId>,
}

impl<'a> ObjectImporter<'a> {
    fn new(source: &'a Document) -> Self {
        ObjectImporter {
            source,
            id_map: BTreeMap::new(),
        }
    }

    fn import_id(&mut self, target: &mut Document, id: ObjectId) -> Result<ObjectId, AppError> {
        if let Some(mapped) = self.id_map.get(&id) {
            return Ok(*mapped);
        }
        // Reserve the id first so reference cycles terminate.
        let new_id = target.add_object(Object::Null);
        self.id_map.insert(id, new_id);
        let object = self.source.get_object(id)?.clone();
        let object = self.import(target, object)?;
        target.objects.insert(new_id, object);
        Ok(new_id)
    }

    fn import(&mut self, target: &mut Document, object: Object) -> Result<Object, AppError> {
        Ok(match object {
            Object::Reference(id) => Object::Reference(self.import_id(target, id)?),
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|item| self.import(target, item))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.import_dict(target, &dict)?),
            Object::Stream(mut stream) => {
                stream.dict = self.import_dict(target, &stream.dict)?;
                Object::Stream(stream)
            }
            other => other,
        })
    }

    /// `/Parent` links are dropped so a page tree is never dragged along.
    fn import_dict(&mut self, target: &mut Document, dict: &Dictionary) -> Result<Dictionary, AppError> {
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            if key.as_slice() == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.import(target, value.clone())?);
        }
        Ok(copy)
    }

    /// Wrap a source page's content and resources as a form XObject.
    fn page_as_form(
        &mut self,
        target: &mut Document,
        page_id: ObjectId,
        geometry: &PageGeometry,
        strip_marked_content: bool,
    ) -> Result<ObjectId, AppError> {
        let mut content = page_content_bytes(self.source, page_id);
        let mut resources = inherited_attribute(self.source, page_id, b"Resources")
            .and_then(|obj| crate::template::dictionary(self.source, obj))
            .cloned()
            .unwrap_or_default();

        if strip_marked_content {
            let mut decoded = Content::decode(&content)?;
            decoded
                .operations
                .retain(|op| !MARKED_CONTENT_OPERATORS.contains(&op.operator.as_str()));
            content = decoded.encode()?;
            resources.remove(b"Properties");
        }

        let resources = self.import_dict(target, &resources)?;
        let form = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => rect_object(&geometry.media_box),
                "Resources" => resources,
            },
            content,
        );
        Ok(target.add_object(form))
    }

    /// Imported CropBox/BleedBox/TrimBox/ArtBox entries of a source page.
    fn page_boxes(
        &mut self,
        target: &mut Document,
        page_id: ObjectId,
    ) -> Result<Vec<(String, Object)>, AppError> {
        let mut boxes = Vec::new();
        for key in PAGE_BOX_KEYS {
            if let Some(value) = inherited_attribute(self.source, page_id, key.as_bytes()) {
                boxes.push((key.to_string(), self.import(target, value.clone())?));
            }
        }
        Ok(boxes)
    }
}
