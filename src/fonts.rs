//! Font Registry: catalog lookup, legacy aliases and text metrics.
//!
//! Catalog ids are what users type (`Helvetica`, `PatrickHand`, ...). A
//! resolved choice carries the name used inside the PDF plus the font file,
//! if any. Built-in PDF fonts need no file and are measured from the standard
//! AFM widths; TrueType files are measured with `ttf-parser`.

use crate::fit::TextMeasure;
use log::{debug, warn};
use printpdf::BuiltinFont;
use std::path::{Path, PathBuf};

// ============================================================================
// Constants
// ============================================================================

pub const DEFAULT_FONT: &str = "Helvetica";
pub const DEFAULT_SCRIPT_FONT: &str = "PatrickHand";

/// Script choice meaning "draw signatures in the base font".
pub const NO_SCRIPT_FONT: &str = "None";

/// Helvetica advance widths for ASCII 32..=126, 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0..?
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // @..O
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // P.._
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // `..o
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // p..~
];

/// Times-Roman advance widths for ASCII 32..=126, 1/1000 em.
const TIMES_WIDTHS: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278, // ' '../
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444, // 0..?
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722, // @..O
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500, // P.._
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500, // `..o
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541, // p..~
];

// ============================================================================
// Catalog
// ============================================================================

/// Where a catalog entry's font program comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFiles {
    /// One of the standard PDF fonts; nothing to embed.
    Builtin,
    /// Absolute system paths, first existing one wins.
    System(&'static [&'static str]),
    /// A file shipped in the fonts directory.
    Bundled(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FontChoice {
    pub id: &'static str,
    /// `None` marks a choice that draws nothing of its own.
    pub pdf_name: Option<&'static str>,
    pub files: FontFiles,
}

const fn builtin(id: &'static str, pdf_name: &'static str) -> FontChoice {
    FontChoice {
        id,
        pdf_name: Some(pdf_name),
        files: FontFiles::Builtin,
    }
}

const fn system(id: &'static str, paths: &'static [&'static str]) -> FontChoice {
    FontChoice {
        id,
        pdf_name: Some(id),
        files: FontFiles::System(paths),
    }
}

const fn bundled(id: &'static str, file: &'static str) -> FontChoice {
    FontChoice {
        id,
        pdf_name: Some(id),
        files: FontFiles::Bundled(file),
    }
}

pub static BASE_FONTS: &[FontChoice] = &[
    builtin("Helvetica", "Helvetica"),
    builtin("TimesRoman", "Times-Roman"),
    builtin("Courier", "Courier"),
    system(
        "DejaVuSerif",
        &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSerif.ttf",
            "/System/Library/Fonts/Supplemental/Georgia.ttf",
        ],
    ),
    system(
        "DejaVuSans",
        &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/System/Library/Fonts/Supplemental/Verdana.ttf",
        ],
    ),
    system(
        "DejaVuSansMono",
        &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
            "/System/Library/Fonts/Supplemental/Courier New.ttf",
        ],
    ),
    bundled("Alegreya", "Alegreya-Regular.ttf"),
    bundled("Archivo", "Archivo-Regular.ttf"),
    bundled("FiraSans", "FiraSans-Regular.ttf"),
    bundled("Bangers", "Bangers-Regular.ttf"),
    bundled("CabinSketch", "CabinSketch-Regular.ttf"),
    bundled("LilitaOne", "LilitaOne-Regular.ttf"),
    bundled("Righteous", "Righteous-Regular.ttf"),
    bundled("Oswald", "Oswald-Regular.ttf"),
    bundled("Montserrat", "Montserrat-Regular.ttf"),
    bundled("Kanit", "Kanit-Regular.ttf"),
    bundled("Lora", "Lora-Regular.ttf"),
    bundled("CrimsonPro", "CrimsonPro-Regular.ttf"),
    bundled("IBMPlexSerif", "IBMPlexSerif-Regular.ttf"),
    bundled("Merriweather", "Merriweather-Regular.ttf"),
];

pub static SCRIPT_FONTS: &[FontChoice] = &[
    FontChoice {
        id: NO_SCRIPT_FONT,
        pdf_name: None,
        files: FontFiles::Builtin,
    },
    system(
        "DejaVuSerifItalic",
        &["/usr/share/fonts/truetype/dejavu/DejaVuSerif-Italic.ttf"],
    ),
    system(
        "DejaVuSansOblique",
        &["/usr/share/fonts/truetype/dejavu/DejaVuSans-Oblique.ttf"],
    ),
    bundled("PatrickHand", "PatrickHand-Regular.ttf"),
    bundled("PermanentMarker", "PermanentMarker-Regular.ttf"),
    bundled("DancingScript", "DancingScript-Regular.ttf"),
    bundled("Caveat", "Caveat-Regular.ttf"),
    bundled("KaushanScript", "KaushanScript-Regular.ttf"),
];

/// Map retired font ids onto their current catalog entries.
pub fn canonical_font_id(choice: &str) -> &str {
    match choice {
        "Times-Roman" => "TimesRoman",
        "Georgia" | "TimesNewRoman" => "DejaVuSerif",
        "Verdana" | "Tahoma" | "TrebuchetMS" | "Geneva" | "Chalkduster" => "DejaVuSans",
        "CourierNew" => "DejaVuSansMono",
        "AppleChancery" | "BradleyHand" => "PatrickHand",
        "BrushScript" => "PermanentMarker",
        other => other,
    }
}

/// The standard PDF font behind a built-in catalog name.
pub fn builtin_font(pdf_name: &str) -> Option<BuiltinFont> {
    match pdf_name {
        "Helvetica" => Some(BuiltinFont::Helvetica),
        "Times-Roman" => Some(BuiltinFont::TimesRoman),
        "Courier" => Some(BuiltinFont::Courier),
        _ => None,
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// A catalog choice narrowed to what the renderer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFont {
    pub pdf_name: String,
    /// `None` for built-in fonts.
    pub file: Option<PathBuf>,
}

impl ResolvedFont {
    pub fn helvetica() -> Self {
        ResolvedFont {
            pdf_name: DEFAULT_FONT.to_string(),
            file: None,
        }
    }
}

/// Look a choice up in `catalog`. `None` when the id is unknown, draws
/// nothing, or none of its font files exist.
pub fn resolve_font(choice: &str, catalog: &[FontChoice], fonts_dir: &Path) -> Option<ResolvedFont> {
    let id = canonical_font_id(choice.trim());
    let entry = catalog.iter().find(|c| c.id == id)?;
    let pdf_name = entry.pdf_name?.to_string();
    let file = match entry.files {
        FontFiles::Builtin => None,
        FontFiles::System(paths) => Some(
            paths
                .iter()
                .map(PathBuf::from)
                .find(|p| p.is_file())?,
        ),
        FontFiles::Bundled(name) => {
            let path = fonts_dir.join(name);
            if !path.is_file() {
                return None;
            }
            Some(path)
        }
    };
    Some(ResolvedFont { pdf_name, file })
}

/// Resolves user font choices against the catalogs and a fonts directory.
#[derive(Debug, Clone)]
pub struct FontRegistry {
    fonts_dir: PathBuf,
}

impl FontRegistry {
    pub fn new(fonts_dir: impl Into<PathBuf>) -> Self {
        FontRegistry {
            fonts_dir: fonts_dir.into(),
        }
    }

    /// The base font for a choice, falling back to Helvetica.
    pub fn base_font(&self, choice: &str) -> ResolvedFont {
        resolve_font(choice, BASE_FONTS, &self.fonts_dir).unwrap_or_else(|| {
            warn!("Font '{}' is unavailable; using {}", choice, DEFAULT_FONT);
            ResolvedFont::helvetica()
        })
    }

    /// The signature font for a choice. `None` means use the base font.
    pub fn script_font(&self, choice: &str) -> Option<ResolvedFont> {
        let resolved = resolve_font(choice, SCRIPT_FONTS, &self.fonts_dir);
        if resolved.is_none() && canonical_font_id(choice.trim()) != NO_SCRIPT_FONT {
            warn!("Script font '{}' is unavailable; signatures use the base font", choice);
        }
        resolved
    }
}

// ============================================================================
// Loaded Fonts
// ============================================================================

#[derive(Debug, Clone)]
enum FontProgram {
    Builtin(BuiltinFont),
    Embedded { data: Vec<u8>, units_per_em: f32 },
}

/// A font ready to be registered with the renderer and measured.
#[derive(Debug, Clone)]
pub struct LoadedFont {
    pub name: String,
    program: FontProgram,
}

impl LoadedFont {
    pub fn helvetica() -> Self {
        LoadedFont {
            name: DEFAULT_FONT.to_string(),
            program: FontProgram::Builtin(BuiltinFont::Helvetica),
        }
    }

    /// Load a resolved font. Unreadable or unparsable files degrade to Helvetica.
    pub fn load(resolved: &ResolvedFont) -> Self {
        let Some(path) = &resolved.file else {
            return match builtin_font(&resolved.pdf_name) {
                Some(font) => LoadedFont {
                    name: resolved.pdf_name.clone(),
                    program: FontProgram::Builtin(font),
                },
                None => {
                    warn!("'{}' is not a built-in font; using {}", resolved.pdf_name, DEFAULT_FONT);
                    Self::helvetica()
                }
            };
        };

        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                warn!("Cannot read font file {}: {}; using {}", path.display(), e, DEFAULT_FONT);
                return Self::helvetica();
            }
        };
        let units_per_em = match ttf_parser::Face::parse(&data, 0) {
            Ok(face) => face.units_per_em().max(1) as f32,
            Err(e) => {
                warn!("Cannot parse font file {}: {}; using {}", path.display(), e, DEFAULT_FONT);
                return Self::helvetica();
            }
        };
        debug!("Loaded font {} from {}", resolved.pdf_name, path.display());
        LoadedFont {
            name: resolved.pdf_name.clone(),
            program: FontProgram::Embedded { data, units_per_em },
        }
    }

    pub fn builtin(&self) -> Option<BuiltinFont> {
        match &self.program {
            FontProgram::Builtin(font) => Some(*font),
            FontProgram::Embedded { .. } => None,
        }
    }

    /// Raw TrueType bytes for embedded fonts.
    pub fn font_data(&self) -> Option<&[u8]> {
        match &self.program {
            FontProgram::Builtin(_) => None,
            FontProgram::Embedded { data, .. } => Some(data),
        }
    }
}

impl TextMeasure for LoadedFont {
    fn text_width(&self, text: &str, size: f32) -> f32 {
        let units = match &self.program {
            FontProgram::Builtin(font) => text.chars().map(|c| builtin_width(*font, c)).sum::<f32>(),
            FontProgram::Embedded { data, units_per_em } => match ttf_parser::Face::parse(data, 0) {
                Ok(face) => {
                    let scale = 1000.0 / units_per_em;
                    text.chars()
                        .map(|c| {
                            face.glyph_index(c)
                                .and_then(|gid| face.glyph_hor_advance(gid))
                                .map(|adv| adv as f32 * scale)
                                .unwrap_or(500.0)
                        })
                        .sum::<f32>()
                }
                Err(_) => text.chars().map(|c| builtin_width(BuiltinFont::Helvetica, c)).sum::<f32>(),
            },
        };
        units * size / 1000.0
    }
}

/// Width of one character in a standard font, 1/1000 em.
fn builtin_width(font: BuiltinFont, c: char) -> f32 {
    let table = match font {
        BuiltinFont::Courier => return 600.0,
        BuiltinFont::TimesRoman => &TIMES_WIDTHS,
        _ => &HELVETICA_WIDTHS,
    };
    let code = c as u32;
    if (32..=126).contains(&code) {
        table[(code - 32) as usize] as f32
    } else if matches!(font, BuiltinFont::TimesRoman) {
        500.0
    } else {
        556.0
    }
}
