//! Template Field Resolver.
//!
//! A template is a single-page PDF master. Its fillable regions come from the
//! first page's widget annotations or, failing that, from the document-level
//! AcroForm field directory. Detection results are kept in a [`FieldCache`]
//! keyed by canonical path so each template is parsed once per process.

use crate::error::AppError;
use log::{debug, warn};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ============================================================================
// Constants
// ============================================================================

/// Field names whose joint presence marks the rank-certificate naming convention.
const RANK_PROBE_FIELDS: [&str; 2] = ["Den No 1", "Childs name 1"];

/// Parent chains deeper than this are treated as malformed.
const MAX_INHERITANCE_DEPTH: usize = 32;

/// US Letter, used when a page carries no MediaBox anywhere in its tree.
const DEFAULT_MEDIA_BOX: Rect = Rect {
    x1: 0.0,
    y1: 0.0,
    x2: 612.0,
    y2: 792.0,
};

// ============================================================================
// Data Structures
// ============================================================================

/// Orientation text must be drawn in to read correctly on the printed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Any multiple of 90, negative values included. Other angles are rejected.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }

    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// True when text runs along the page's vertical axis.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Axis-aligned box in PDF points, always with `x2 > x1` and `y2 > y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    /// Normalize two arbitrary corners. Returns `None` for zero-area boxes.
    pub fn from_corners(ax: f32, ay: f32, bx: f32, by: f32) -> Option<Self> {
        let rect = Rect {
            x1: ax.min(bx),
            y1: ay.min(by),
            x2: ax.max(bx),
            y2: ay.max(by),
        };
        if rect.x2 > rect.x1 && rect.y2 > rect.y1 {
            Some(rect)
        } else {
            None
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }
}

/// One placeable text slot on a template page.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRegion {
    pub name: String,
    pub rect: Rect,
    pub rotation: Rotation,
}

pub type FieldPositions = BTreeMap<String, FieldRegion>;

/// Which layout strategy a template calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Indexed certificate fields: `name 1`, `On`, `On_2`, ...
    Certificate,
    /// Indexed rank-certificate fields: `Childs name 1`, `Den No 1`, ...
    RankFields,
    /// No fillable fields; text goes into the fixed 8-slot card grid.
    CardGrid,
}

/// First-page geometry of a template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub media_box: Rect,
    /// Raw `/Rotate` value, normalized to `0..360`.
    pub rotate: i64,
}

impl PageGeometry {
    pub fn width(&self) -> f32 {
        self.media_box.width()
    }

    pub fn height(&self) -> f32 {
        self.media_box.height()
    }
}

/// Everything detected from one template file.
#[derive(Debug, Clone)]
pub struct TemplateInfo {
    pub path: PathBuf,
    pub page: PageGeometry,
    pub fields: FieldPositions,
}

impl TemplateInfo {
    /// Naming convention of the detected fields, or `None` when there are none.
    pub fn field_kind(&self) -> Option<TemplateKind> {
        if self.fields.is_empty() {
            None
        } else if RANK_PROBE_FIELDS
            .iter()
            .all(|name| self.fields.contains_key(*name))
        {
            Some(TemplateKind::RankFields)
        } else {
            Some(TemplateKind::Certificate)
        }
    }
}

/// A template together with the layout strategy chosen for it.
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub info: Arc<TemplateInfo>,
    pub kind: TemplateKind,
}

impl ResolvedTemplate {
    pub fn path(&self) -> &Path {
        &self.info.path
    }

    pub fn page(&self) -> &PageGeometry {
        &self.info.page
    }

    pub fn fields(&self) -> &FieldPositions {
        &self.info.fields
    }
}

// ============================================================================
// Field Cache
// ============================================================================

/// Per-process cache of template detection results.
///
/// Construct one per long-lived process and share it by reference. A template
/// with no fields is cached too, so repeated failures do not re-parse the file.
#[derive(Debug, Default)]
pub struct FieldCache {
    entries: Mutex<HashMap<PathBuf, Arc<TemplateInfo>>>,
}

impl FieldCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse (or fetch from cache) the template at `path`.
    pub fn detect(&self, path: &Path) -> Result<Arc<TemplateInfo>, AppError> {
        if !path.is_file() {
            return Err(AppError::TemplateMissing(path.to_path_buf()));
        }
        let key = path.canonicalize()?;

        if let Some(hit) = self.lock().get(&key) {
            debug!("Template cache hit: {}", key.display());
            return Ok(Arc::clone(hit));
        }

        let info = Arc::new(load_template(&key)?);
        debug!(
            "Detected {} field(s) in {} ({}x{} pt, rotate {})",
            info.fields.len(),
            key.display(),
            info.page.width(),
            info.page.height(),
            info.page.rotate
        );

        // Two threads may race on the first load; whichever lands first is kept.
        let mut entries = self.lock();
        Ok(Arc::clone(entries.entry(key).or_insert(info)))
    }

    /// Resolve a template whose fields must be discoverable.
    pub fn resolve(&self, path: &Path) -> Result<ResolvedTemplate, AppError> {
        let info = self.detect(path)?;
        match info.field_kind() {
            Some(kind) => Ok(ResolvedTemplate { info, kind }),
            None => Err(AppError::LayoutUnresolvable(path.to_path_buf())),
        }
    }

    /// Resolve a rank-card sheet: templates without fields use the card grid.
    pub fn resolve_with_grid(&self, path: &Path) -> Result<ResolvedTemplate, AppError> {
        let info = self.detect(path)?;
        let kind = info.field_kind().unwrap_or_else(|| {
            debug!("No fillable fields in {}; using card grid", path.display());
            TemplateKind::CardGrid
        });
        Ok(ResolvedTemplate { info, kind })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<TemplateInfo>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Detection
// ============================================================================

fn load_template(path: &Path) -> Result<TemplateInfo, AppError> {
    let doc = Document::load(path)
        .map_err(|e| AppError::PdfError(format!("{}: {}", path.display(), e)))?;
    let (page, fields) = extract_field_positions(&doc)?;
    Ok(TemplateInfo {
        path: path.to_path_buf(),
        page,
        fields,
    })
}

/// Read first-page geometry and field regions from a loaded template.
pub fn extract_field_positions(
    doc: &Document,
) -> Result<(PageGeometry, FieldPositions), AppError> {
    let page_id = first_page_id(doc)?;
    let page = page_geometry(doc, page_id);
    let page_dict = doc.get_dictionary(page_id)?;

    let mut fields = FieldPositions::new();
    if let Some(annots) = page_dict.get(b"Annots").ok().and_then(|a| array(doc, a)) {
        collect_regions(doc, annots, &mut fields);
    }
    if fields.is_empty() {
        if let Some(directory) = acroform_fields(doc) {
            collect_regions(doc, directory, &mut fields);
        }
    }
    Ok((page, fields))
}

pub(crate) fn first_page_id(doc: &Document) -> Result<ObjectId, AppError> {
    doc.get_pages()
        .values()
        .next()
        .copied()
        .ok_or_else(|| AppError::PdfError("template has no pages".to_string()))
}

pub(crate) fn page_geometry(doc: &Document, page_id: ObjectId) -> PageGeometry {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|obj| parse_rect(doc, obj))
        .unwrap_or(DEFAULT_MEDIA_BOX);
    let rotate = inherited_attribute(doc, page_id, b"Rotate")
        .and_then(|obj| number(doc, obj))
        .map(|deg| (deg.round() as i64).rem_euclid(360))
        .unwrap_or(0);
    PageGeometry { media_box, rotate }
}

fn acroform_fields(doc: &Document) -> Option<&Vec<Object>> {
    let catalog = doc.catalog().ok()?;
    let acroform = dictionary(doc, catalog.get(b"AcroForm").ok()?)?;
    array(doc, acroform.get(b"Fields").ok()?)
}

fn collect_regions(doc: &Document, entries: &[Object], fields: &mut FieldPositions) {
    for entry in entries {
        let Some(dict) = dictionary(doc, entry) else {
            continue;
        };
        let Some(name) = field_name(doc, dict) else {
            continue;
        };
        let Some(rect) = dict.get(b"Rect").ok().and_then(|r| parse_rect(doc, r)) else {
            if dict.has(b"Rect") {
                warn!("Dropping field '{}': degenerate rectangle", name);
            }
            continue;
        };
        let rotation = field_rotation(doc, dict, &name);
        fields.insert(
            name.clone(),
            FieldRegion {
                name,
                rect,
                rotation,
            },
        );
    }
}

/// `/T` of a widget, or of its parent field when the widget is a bare kid.
fn field_name(doc: &Document, dict: &Dictionary) -> Option<String> {
    let own = dict.get(b"T").ok().and_then(|t| text_string(doc, t));
    let name = own.or_else(|| {
        let parent = dictionary(doc, dict.get(b"Parent").ok()?)?;
        text_string(doc, parent.get(b"T").ok()?)
    })?;
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

fn field_rotation(doc: &Document, dict: &Dictionary, name: &str) -> Rotation {
    let marker = dict
        .get(b"MK")
        .ok()
        .and_then(|mk| dictionary(doc, mk))
        .and_then(|mk| mk.get(b"R").ok())
        .and_then(|r| number(doc, r));
    match marker {
        None => Rotation::Deg0,
        Some(deg) => Rotation::from_degrees(deg.round() as i64).unwrap_or_else(|| {
            warn!("Field '{}' has unsupported rotation {}; using 0", name, deg);
            Rotation::Deg0
        }),
    }
}

// ============================================================================
// Object Helpers
// ============================================================================

/// Follow indirect references until a direct object is reached.
pub(crate) fn deref<'a>(doc: &'a Document, mut obj: &'a Object) -> Option<&'a Object> {
    for _ in 0..MAX_INHERITANCE_DEPTH {
        match obj {
            Object::Reference(id) => obj = doc.get_object(*id).ok()?,
            _ => return Some(obj),
        }
    }
    None
}

pub(crate) fn dictionary<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    deref(doc, obj)?.as_dict().ok()
}

fn array<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Vec<Object>> {
    deref(doc, obj)?.as_array().ok()
}

fn number(doc: &Document, obj: &Object) -> Option<f32> {
    deref(doc, obj)?.as_float().ok()
}

fn parse_rect(doc: &Document, obj: &Object) -> Option<Rect> {
    let values = array(doc, obj)?;
    if values.len() != 4 {
        return None;
    }
    let mut n = [0.0f32; 4];
    for (slot, value) in n.iter_mut().zip(values) {
        *slot = number(doc, value)?;
    }
    Rect::from_corners(n[0], n[1], n[2], n[3])
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise single-byte.
fn text_string(doc: &Document, obj: &Object) -> Option<String> {
    let bytes = deref(doc, obj)?.as_str().ok()?;
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&units));
    }
    Some(bytes.iter().map(|&b| b as char).collect())
}

/// Look up a page attribute, walking `/Parent` for inheritable keys.
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value);
        }
        current = dictionary(doc, current.get(b"Parent").ok()?)?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, StringFormat};

    fn widget(doc: &mut Document, name: &str, rect: [f32; 4], rotation: Option<i64>) -> Object {
        let mut annot = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::String(name.as_bytes().to_vec(), StringFormat::Literal),
            "Rect" => rect.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
        };
        if let Some(r) = rotation {
            annot.set("MK", dictionary! { "R" => r });
        }
        Object::Reference(doc.add_object(annot))
    }

    fn template(
        mut doc: Document,
        annots: Vec<Object>,
        acro_fields: Vec<Object>,
        rotate: i64,
    ) -> Document {
        let pages_id = doc.new_object_id();
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Rotate" => rotate,
        };
        if !annots.is_empty() {
            page.set("Annots", annots);
        }
        let page_id = doc.add_object(page);
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(792), Object::Integer(612)],
            }),
        );
        let mut catalog = dictionary! { "Type" => "Catalog", "Pages" => pages_id };
        if !acro_fields.is_empty() {
            catalog.set("AcroForm", dictionary! { "Fields" => acro_fields });
        }
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert!(Rotation::Deg270.swaps_axes());
        assert!(!Rotation::Deg180.swaps_axes());
    }

    #[test]
    fn test_rect_normalizes_corners() {
        let r = Rect::from_corners(100.0, 50.0, 10.0, 20.0).unwrap();
        assert_eq!((r.x1, r.y1, r.x2, r.y2), (10.0, 20.0, 100.0, 50.0));
        assert_eq!(r.center(), (55.0, 35.0));
        assert!(Rect::from_corners(5.0, 5.0, 5.0, 9.0).is_none());
    }

    #[test]
    fn test_annotations_are_read_with_rotation() {
        let mut doc = Document::with_version("1.5");
        let a = widget(&mut doc, "name 1", [10.0, 20.0, 210.0, 40.0], None);
        let b = widget(&mut doc, "On", [10.0, 60.0, 30.0, 160.0], Some(90));
        let c = widget(&mut doc, "broken", [10.0, 60.0, 10.0, 160.0], None);
        let tpl = template(doc, vec![a, b, c], vec![], 90);

        let (page, fields) = extract_field_positions(&tpl).unwrap();
        assert_eq!(page.rotate, 90);
        assert_eq!(page.width(), 792.0);
        assert_eq!(fields.len(), 2);
        assert_eq!(fields["On"].rotation, Rotation::Deg90);
        assert_eq!(fields["name 1"].rect.width(), 200.0);
    }

    #[test]
    fn test_acroform_fallback_when_page_has_no_annotations() {
        let field = Object::Dictionary(dictionary! {
            "T" => Object::String(b"Den No 1".to_vec(), StringFormat::Literal),
            "Rect" => vec![Object::Integer(1), Object::Integer(2), Object::Integer(51), Object::Integer(22)],
            "MK" => dictionary! { "R" => 33 },
        });
        let doc = template(Document::with_version("1.5"), vec![], vec![field], 0);
        let (_, fields) = extract_field_positions(&doc).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["Den No 1"].rotation, Rotation::Deg0);
    }

    #[test]
    fn test_utf16_field_names() {
        let mut name = vec![0xFE, 0xFF];
        for unit in "Cubmaster".encode_utf16() {
            name.extend_from_slice(&unit.to_be_bytes());
        }
        let field = Object::Dictionary(dictionary! {
            "T" => Object::String(name, StringFormat::Hexadecimal),
            "Rect" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(10), Object::Integer(10)],
        });
        let doc = template(Document::with_version("1.5"), vec![], vec![field], 0);
        let (_, fields) = extract_field_positions(&doc).unwrap();
        assert!(fields.contains_key("Cubmaster"));
    }

    #[test]
    fn test_field_kind_probe() {
        let region = |name: &str| FieldRegion {
            name: name.to_string(),
            rect: Rect::from_corners(0.0, 0.0, 1.0, 1.0).unwrap(),
            rotation: Rotation::Deg0,
        };
        let mut info = TemplateInfo {
            path: PathBuf::from("t.pdf"),
            page: PageGeometry {
                media_box: DEFAULT_MEDIA_BOX,
                rotate: 0,
            },
            fields: FieldPositions::new(),
        };
        assert_eq!(info.field_kind(), None);
        info.fields.insert("Den No 1".into(), region("Den No 1"));
        assert_eq!(info.field_kind(), Some(TemplateKind::Certificate));
        info.fields.insert("Childs name 1".into(), region("Childs name 1"));
        assert_eq!(info.field_kind(), Some(TemplateKind::RankFields));
    }

    #[test]
    fn test_cache_reports_missing_and_unresolvable_templates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FieldCache::new();

        let missing = dir.path().join("missing.pdf");
        assert!(matches!(
            cache.detect(&missing),
            Err(AppError::TemplateMissing(_))
        ));

        let blank = dir.path().join("blank.pdf");
        template(Document::with_version("1.5"), vec![], vec![], 0).save(&blank).unwrap();
        assert!(matches!(
            cache.resolve(&blank),
            Err(AppError::LayoutUnresolvable(_))
        ));
        assert_eq!(cache.len(), 1);

        let grid = cache.resolve_with_grid(&blank).unwrap();
        assert_eq!(grid.kind, TemplateKind::CardGrid);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
