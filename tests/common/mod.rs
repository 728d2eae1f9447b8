//! Template PDFs and rosters synthesised for the integration tests.

#![allow(dead_code)]

use cubscout_certs::layout::field_name;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};

pub const AWARD_HEADER: &str = "Date,Pack Number,Scout Name,Award Name,Den Leader,Cubmaster";
pub const RANK_HEADER: &str = "Date,Pack Number,Den Number,Scout Name,Den Leader,Cubmaster";

const LETTER: (i64, i64) = (612, 792);
const LETTER_LANDSCAPE: (i64, i64) = (792, 612);

/// Certificate field bases, bottom to top inside one slot.
const CERTIFICATE_FIELDS: [&str; 5] = ["Cubmaster", "Den Leader", "On", "Cub Scout Pack", "for completing"];

/// Eight certificate slots (2 columns × 4 rows) with six named widgets each.
pub fn write_certificate_template(dir: &Path, rotate: i64) -> PathBuf {
    let (width, height) = LETTER;
    let mut widgets = Vec::new();
    for slot in 1..=8usize {
        let col = ((slot - 1) % 2) as f32;
        let row = ((slot - 1) / 2) as f32;
        let x0 = col * 306.0 + 20.0;
        let y0 = height as f32 - (row + 1.0) * 198.0 + 12.0;
        for (k, base) in CERTIFICATE_FIELDS.iter().enumerate() {
            let y = y0 + k as f32 * 28.0;
            widgets.push((field_name(base, slot), [x0, y, x0 + 266.0, y + 20.0]));
        }
        let y = y0 + CERTIFICATE_FIELDS.len() as f32 * 28.0;
        widgets.push((format!("name {}", slot), [x0, y, x0 + 266.0, y + 24.0]));
    }
    let path = dir.join("certificate.pdf");
    write_template(&path, (width, height), rotate, &widgets);
    path
}

/// A landscape card sheet with artwork only and no form fields.
pub fn write_card_sheet(dir: &Path) -> PathBuf {
    let path = dir.join("wolf_rank_cards.pdf");
    write_template(&path, LETTER_LANDSCAPE, 0, &[]);
    path
}

/// A roster with `rows` award rows, scouts numbered from 1.
pub fn award_csv(rows: usize) -> String {
    let mut csv = format!("{}\n", AWARD_HEADER);
    for i in 1..=rows {
        csv.push_str(&format!(
            "2024-05-01,123,Scout {},Bobcat,Jane Leader,John Master\n",
            i
        ));
    }
    csv
}

fn write_template(path: &Path, size: (i64, i64), rotate: i64, widgets: &[(String, [f32; 4])]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let artwork = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("re", vec![
                Object::Integer(10),
                Object::Integer(10),
                Object::Integer(size.0 - 20),
                Object::Integer(size.1 - 20),
            ]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(18)]),
            Operation::new("Td", vec![Object::Integer(40), Object::Integer(size.1 - 40)]),
            Operation::new("Tj", vec![Object::string_literal("Cub Scout Pack")]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        artwork.encode().expect("encode artwork"),
    ));

    let annots: Vec<Object> = widgets
        .iter()
        .map(|(name, rect)| {
            let id = doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Widget",
                "FT" => "Tx",
                "T" => Object::string_literal(name.as_str()),
                "Rect" => rect.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
            });
            Object::Reference(id)
        })
        .collect();

    let mut page = dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(size.0),
            Object::Integer(size.1),
        ],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        },
    };
    if rotate != 0 {
        page.set("Rotate", Object::Integer(rotate));
    }
    if !annots.is_empty() {
        page.set("Annots", annots.clone());
    }
    let page_id = doc.add_object(page);

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };
    if !annots.is_empty() {
        catalog.set("AcroForm", dictionary! { "Fields" => annots });
    }
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("write template");
}
