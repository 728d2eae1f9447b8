//! Row → field mapping and the two layout strategies.
//!
//! A [`Layout`] turns one page worth of records into [`Placement`]s: resolved
//! text, anchor point, rotation and sizing rules. The overlay renderer draws
//! placements without knowing which strategy produced them.

use crate::fit::SizeBounds;
use crate::record::Record;
use crate::template::{FieldRegion, ResolvedTemplate, Rotation, TemplateInfo, TemplateKind};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// Constants
// ============================================================================

/// Certificates per template page.
pub const FIELDS_PER_PAGE: usize = 8;

/// Cards per rank-card sheet.
pub const CARDS_PER_SHEET: usize = 8;

/// Card grid: 4 columns, anchors 180pt apart starting at x = 52.6.
pub const CARD_ANCHOR_X: f32 = 52.6;
pub const CARD_X_STEP: f32 = 180.0;
const CARD_COLUMNS: usize = 4;
const CARD_ROW_Y: [f32; 2] = [360.0, 90.0];

/// Horizontal breathing room inside a certificate field, in points.
const FIELD_PADDING: f32 = 2.0;

/// Floor for the rank-card signature size when no script size is given.
const CARD_SIGNATURE_MIN_SIZE: f32 = 7.0;

/// Field-name prefixes drawn in the script font.
const SIGNATURE_PREFIXES: [&str; 2] = ["Den Leader", "Cubmaster"];

// ============================================================================
// Card Grid Catalog
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardRole {
    Detail,
    Name,
    Signature,
}

/// One sub-region of a rank card, relative to its slot anchor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardField {
    /// Field base name; the slot number is appended to form the key.
    pub base: &'static str,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub max_width: f32,
    pub max_size: Option<f32>,
    pub role: CardRole,
}

const fn card_field(
    base: &'static str,
    x: f32,
    y: f32,
    size: f32,
    max_width: f32,
    max_size: Option<f32>,
    role: CardRole,
) -> CardField {
    CardField {
        base,
        x,
        y,
        size,
        max_width,
        max_size,
        role,
    }
}

pub const CARD_FIELDS: [CardField; 6] = [
    card_field("Den No", 58.0, 46.0, 7.5, 46.0, None, CardRole::Detail),
    card_field("Pack No", 66.0, 58.0, 7.5, 50.0, None, CardRole::Detail),
    card_field("DATE", 76.0, 72.0, 7.0, 84.0, None, CardRole::Detail),
    card_field("Childs name", 124.0, -2.0, 10.5, 105.0, Some(16.0), CardRole::Name),
    card_field("Den Leader", 72.0, 24.0, 8.0, 106.0, Some(7.5), CardRole::Signature),
    card_field("Cubmaster", 89.0, 10.0, 8.0, 106.0, Some(7.5), CardRole::Signature),
];

/// Anchor of a 0-based card slot: top row left to right, then bottom row.
pub fn card_anchor(slot: usize) -> (f32, f32) {
    let col = slot % CARD_COLUMNS;
    let row = (slot / CARD_COLUMNS).min(CARD_ROW_Y.len() - 1);
    (CARD_ANCHOR_X + CARD_X_STEP * col as f32, CARD_ROW_Y[row])
}

// ============================================================================
// Field Mapping
// ============================================================================

pub type FieldMap = BTreeMap<String, String>;

/// Certificate field name for a 1-based slot: bare for slot 1, `_n` after.
pub fn field_name(base: &str, index: usize) -> String {
    if index == 1 {
        base.to_string()
    } else {
        format!("{}_{}", base, index)
    }
}

pub fn is_signature_field(name: &str) -> bool {
    SIGNATURE_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Which field-naming convention a field-based template follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldNaming {
    Certificate,
    Rank,
}

fn certificate_field_map(records: &[Record]) -> FieldMap {
    let mut map = FieldMap::new();
    for (i, record) in records.iter().enumerate() {
        let i = i + 1;
        map.insert(format!("name {}", i), record.scout_name.clone());
        map.insert(field_name("On", i), record.date.clone());
        map.insert(field_name("Cub Scout Pack", i), record.pack_number.clone());
        map.insert(field_name("for completing", i), record.award.clone());
        map.insert(field_name("Den Leader", i), record.den_leader.clone());
        map.insert(field_name("Cubmaster", i), record.cubmaster.clone());
    }
    map
}

fn rank_field_map(records: &[Record]) -> FieldMap {
    let mut map = FieldMap::new();
    for (i, record) in records.iter().enumerate() {
        let i = i + 1;
        map.insert(format!("Childs name {}", i), record.scout_name.clone());
        map.insert(format!("Den No {}", i), record.den_number.clone());
        map.insert(format!("Pack No {}", i), record.pack_number.clone());
        map.insert(format!("DATE {}", i), record.date.clone());
        map.insert(format!("Den Leader {}", i), record.den_leader.clone());
        map.insert(format!("Cubmaster {}", i), record.cubmaster.clone());
        map.insert(format!("Rank {}", i), record.award.clone());
    }
    map
}

// ============================================================================
// Placements
// ============================================================================

/// Which of the two configured fonts a placement draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontRole {
    Base,
    /// Script font when one is loaded, else the base font.
    Signature,
}

/// How text sits relative to the placement origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAnchor {
    /// Horizontally and vertically centered on the origin.
    Centered,
    /// Left end of the baseline at the origin.
    BaselineStart,
}

/// Font sizes and availability that placements are computed against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub font_size: f32,
    pub script_font_size: Option<f32>,
    pub has_script_font: bool,
}

/// One string to draw on the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub field: String,
    pub text: String,
    /// Page-space point the local frame is translated to.
    pub origin: (f32, f32),
    pub rotation: Rotation,
    pub anchor: TextAnchor,
    pub max_width: f32,
    pub base_size: f32,
    pub bounds: SizeBounds,
    pub role: FontRole,
}

/// Layout strategy, chosen from the template kind.
#[derive(Debug, Clone)]
pub enum Layout {
    /// Text centered in the template's own field rectangles.
    Fields {
        naming: FieldNaming,
        template: Arc<TemplateInfo>,
    },
    /// Text at fixed offsets inside the 8-slot rank-card grid.
    CardGrid,
}

impl Layout {
    pub fn for_template(template: &ResolvedTemplate) -> Self {
        let naming = match template.kind {
            TemplateKind::Certificate => FieldNaming::Certificate,
            TemplateKind::RankFields => FieldNaming::Rank,
            TemplateKind::CardGrid => return Layout::CardGrid,
        };
        Layout::Fields {
            naming,
            template: Arc::clone(&template.info),
        }
    }

    /// Records per output page.
    pub fn capacity(&self) -> usize {
        match self {
            Layout::Fields { .. } => FIELDS_PER_PAGE,
            Layout::CardGrid => CARDS_PER_SHEET,
        }
    }

    /// Field key → text for one page of records.
    pub fn field_map(&self, records: &[Record]) -> FieldMap {
        match self {
            Layout::Fields {
                naming: FieldNaming::Certificate,
                ..
            } => certificate_field_map(records),
            Layout::Fields {
                naming: FieldNaming::Rank,
                ..
            }
            | Layout::CardGrid => rank_field_map(records),
        }
    }

    /// Everything to draw for one page of records. Blank values and keys
    /// without a region are skipped.
    pub fn placements(&self, records: &[Record], style: &TextStyle) -> Vec<Placement> {
        let values = self.field_map(records);
        match self {
            Layout::Fields { template, .. } => values
                .iter()
                .filter(|(_, text)| !text.is_empty())
                .filter_map(|(name, text)| {
                    let region = template.fields.get(name)?;
                    Some(field_placement(region, text, style))
                })
                .collect(),
            Layout::CardGrid => {
                let mut out = Vec::new();
                for slot in 0..records.len().min(CARDS_PER_SHEET) {
                    let anchor = card_anchor(slot);
                    for field in &CARD_FIELDS {
                        let key = format!("{} {}", field.base, slot + 1);
                        let Some(text) = values.get(&key).filter(|t| !t.is_empty()) else {
                            continue;
                        };
                        out.push(card_placement(field, anchor, key, text, style));
                    }
                }
                out
            }
        }
    }
}

fn field_placement(region: &FieldRegion, text: &str, style: &TextStyle) -> Placement {
    let use_script = style.has_script_font && is_signature_field(&region.name);
    let base_size = if use_script {
        style.script_font_size.unwrap_or(style.font_size)
    } else {
        style.font_size
    };
    let draw_width = if region.rotation.swaps_axes() {
        region.rect.height()
    } else {
        region.rect.width()
    };
    Placement {
        field: region.name.clone(),
        text: text.to_string(),
        origin: region.rect.center(),
        rotation: region.rotation,
        anchor: TextAnchor::Centered,
        max_width: (draw_width - FIELD_PADDING).max(1.0),
        base_size,
        bounds: SizeBounds::CERTIFICATE,
        role: if use_script {
            FontRole::Signature
        } else {
            FontRole::Base
        },
    }
}

fn card_placement(
    field: &CardField,
    anchor: (f32, f32),
    key: String,
    text: &str,
    style: &TextStyle,
) -> Placement {
    let (base_size, role) = match field.role {
        CardRole::Detail => (field.size, FontRole::Base),
        CardRole::Name => (field.size.max(style.font_size), FontRole::Base),
        CardRole::Signature => {
            let signature_size = style
                .script_font_size
                .unwrap_or((style.font_size - 1.0).max(CARD_SIGNATURE_MIN_SIZE));
            (field.size.max(signature_size), FontRole::Signature)
        }
    };
    let max_size = field.max_size.unwrap_or(base_size);
    Placement {
        field: key,
        text: text.to_string(),
        origin: (anchor.0 + (field.x - CARD_ANCHOR_X), anchor.1 + field.y),
        rotation: Rotation::Deg90,
        anchor: TextAnchor::BaselineStart,
        max_width: field.max_width,
        base_size,
        bounds: SizeBounds::rank_card(max_size),
        role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{FieldPositions, PageGeometry, Rect};
    use std::path::PathBuf;

    fn record(name: &str) -> Record {
        Record {
            date_raw: "2024-05-01".into(),
            date: "05/01/2024".into(),
            pack_number: "123".into(),
            den_number: "4".into(),
            scout_name: name.into(),
            award: "Bobcat".into(),
            den_leader: "Jane Leader".into(),
            cubmaster: "John Master".into(),
        }
    }

    fn certificate_layout(names: &[&str], rotation: Rotation) -> Layout {
        let mut fields = FieldPositions::new();
        for (i, name) in names.iter().enumerate() {
            let y = 20.0 + 30.0 * i as f32;
            fields.insert(
                name.to_string(),
                FieldRegion {
                    name: name.to_string(),
                    rect: Rect::from_corners(100.0, y, 300.0, y + 20.0).unwrap(),
                    rotation,
                },
            );
        }
        Layout::Fields {
            naming: FieldNaming::Certificate,
            template: Arc::new(TemplateInfo {
                path: PathBuf::from("cert.pdf"),
                page: PageGeometry {
                    media_box: Rect::from_corners(0.0, 0.0, 612.0, 792.0).unwrap(),
                    rotate: 0,
                },
                fields,
            }),
        }
    }

    const STYLE: TextStyle = TextStyle {
        font_size: 14.0,
        script_font_size: Some(24.0),
        has_script_font: true,
    };

    #[test]
    fn test_field_names() {
        assert_eq!(field_name("On", 1), "On");
        assert_eq!(field_name("On", 2), "On_2");
        assert!(is_signature_field("Den Leader_3"));
        assert!(is_signature_field("Cubmaster 1"));
        assert!(!is_signature_field("name 1"));
    }

    #[test]
    fn test_certificate_map_for_one_record() {
        let layout = certificate_layout(&[], Rotation::Deg0);
        let map = layout.field_map(&[record("Alex Doe")]);
        assert_eq!(map.len(), 6);
        assert_eq!(map["name 1"], "Alex Doe");
        assert_eq!(map["On"], "05/01/2024");
        assert_eq!(map["Cub Scout Pack"], "123");
        assert_eq!(map["for completing"], "Bobcat");
        assert_eq!(map["Den Leader"], "Jane Leader");
        assert_eq!(map["Cubmaster"], "John Master");
    }

    #[test]
    fn test_map_has_no_entries_past_the_chunk() {
        let layout = certificate_layout(&[], Rotation::Deg0);
        let map = layout.field_map(&[record("A"), record("B")]);
        assert!(map.contains_key("On_2"));
        assert!(!map.keys().any(|k| k.ends_with('3')));
    }

    #[test]
    fn test_rank_map_uses_indexed_names() {
        let map = Layout::CardGrid.field_map(&[record("Alex Doe")]);
        assert_eq!(map["Childs name 1"], "Alex Doe");
        assert_eq!(map["Den No 1"], "4");
        assert_eq!(map["Rank 1"], "Bobcat");
        assert_eq!(map.len(), 7);
    }

    #[test]
    fn test_certificate_placements_center_and_pick_script() {
        let layout = certificate_layout(&["name 1", "Cubmaster", "On"], Rotation::Deg0);
        let mut rec = record("Alex Doe");
        rec.date = String::new();
        let placements = layout.placements(&[rec], &STYLE);
        assert_eq!(placements.len(), 2);

        let cub = placements.iter().find(|p| p.field == "Cubmaster").unwrap();
        assert_eq!(cub.role, FontRole::Signature);
        assert_eq!(cub.base_size, 24.0);
        assert_eq!(cub.anchor, TextAnchor::Centered);
        assert_eq!(cub.max_width, 198.0);

        let name = placements.iter().find(|p| p.field == "name 1").unwrap();
        assert_eq!(name.role, FontRole::Base);
        assert_eq!(name.origin, (200.0, 30.0));
    }

    #[test]
    fn test_rotated_fields_measure_along_height() {
        let layout = certificate_layout(&["name 1"], Rotation::Deg90);
        let placements = layout.placements(&[record("Alex")], &STYLE);
        assert_eq!(placements[0].max_width, 18.0);
    }

    #[test]
    fn test_without_script_font_signatures_use_base_size() {
        let layout = certificate_layout(&["Den Leader"], Rotation::Deg0);
        let style = TextStyle {
            has_script_font: false,
            ..STYLE
        };
        let placements = layout.placements(&[record("Alex")], &style);
        assert_eq!(placements[0].role, FontRole::Base);
        assert_eq!(placements[0].base_size, 14.0);
    }

    #[test]
    fn test_card_anchors() {
        assert_eq!(card_anchor(0), (52.6, 360.0));
        assert_eq!(card_anchor(3), (52.6 + 540.0, 360.0));
        assert_eq!(card_anchor(4), (52.6, 90.0));
    }

    #[test]
    fn test_card_grid_placements() {
        let records: Vec<Record> = (0..5).map(|i| record(&format!("Scout {}", i))).collect();
        let placements = Layout::CardGrid.placements(&records, &STYLE);
        assert_eq!(placements.len(), 5 * CARD_FIELDS.len());
        assert!(placements.iter().all(|p| p.rotation == Rotation::Deg90));

        let name = placements.iter().find(|p| p.field == "Childs name 5").unwrap();
        assert!((name.origin.0 - 124.0).abs() < 1e-3);
        assert!((name.origin.1 - 88.0).abs() < 1e-3);
        assert_eq!(name.base_size, 14.0);
        assert_eq!(name.bounds.max, 16.0);
        assert_eq!(name.anchor, TextAnchor::BaselineStart);

        let cub = placements.iter().find(|p| p.field == "Cubmaster 1").unwrap();
        assert_eq!(cub.role, FontRole::Signature);
        assert_eq!(cub.base_size, 24.0);
        assert_eq!(cub.bounds.max, 7.5);

        let den = placements.iter().find(|p| p.field == "Den No 2").unwrap();
        assert_eq!(den.bounds.max, 7.5);
        assert_eq!(den.bounds.step, 0.4);
    }

    #[test]
    fn test_card_signature_size_without_script_size() {
        let style = TextStyle {
            font_size: 7.5,
            script_font_size: None,
            has_script_font: false,
        };
        let placements = Layout::CardGrid.placements(&[record("A")], &style);
        let leader = placements.iter().find(|p| p.field == "Den Leader 1").unwrap();
        assert_eq!(leader.base_size, 8.0);
        let name = placements.iter().find(|p| p.field == "Childs name 1").unwrap();
        assert_eq!(name.base_size, 10.5);
    }
}
