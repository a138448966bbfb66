use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::{PathBuilder, Rect};
use tracing::{debug, info, warn};
use ttf_parser::{Face, OutlineBuilder, name_id};
use usvg::fontdb;

use super::bitmap;

#[derive(Clone)]
pub struct OutlineFont {
    data: Arc<Vec<u8>>,
    face_index: u32,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    space_advance: u16,
    family: Option<String>,
}

impl fmt::Debug for OutlineFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutlineFont")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl OutlineFont {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, self.face_index).ok()
    }

    fn scale(&self, font_size: f32) -> f32 {
        font_size / self.units_per_em.max(1) as f32
    }
}

/// A font ready for measuring and rasterizing text.
#[derive(Debug, Clone)]
pub enum FontHandle {
    Outline(OutlineFont),
    /// The built-in 5x7 bitmap font.
    Bitmap,
}

impl FontHandle {
    pub fn is_fallback(&self) -> bool {
        matches!(self, FontHandle::Bitmap)
    }

    pub fn name(&self) -> String {
        match self {
            FontHandle::Outline(font) => font.family().unwrap_or("unnamed").to_string(),
            FontHandle::Bitmap => "builtin-bitmap".to_string(),
        }
    }

    /// Distance from the top of a line box to the baseline.
    pub fn ascent(&self, font_size: f32) -> f32 {
        match self {
            FontHandle::Outline(font) => font.ascender as f32 * font.scale(font_size),
            FontHandle::Bitmap => bitmap::GLYPH_ROWS as f32 * bitmap_cell(font_size),
        }
    }

    /// Distance below the baseline, as a positive number.
    pub fn descent(&self, font_size: f32) -> f32 {
        match self {
            FontHandle::Outline(font) => -(font.descender as f32) * font.scale(font_size),
            FontHandle::Bitmap => {
                (bitmap::CELL_EM - bitmap::GLYPH_ROWS as f32) * bitmap_cell(font_size)
            }
        }
    }

    pub fn measure(&self, text: &str, font_size: f32) -> f32 {
        match self {
            FontHandle::Outline(font) => measure_outline(font, text, font_size),
            FontHandle::Bitmap => {
                text.chars().filter(|ch| *ch != '\n').count() as f32
                    * bitmap::CELL_ADVANCE
                    * bitmap_cell(font_size)
            }
        }
    }

    /// Bitmap glyphs are pixel-aligned rectangles and look best without
    /// anti-aliasing.
    pub fn anti_alias(&self) -> bool {
        !self.is_fallback()
    }

    /// Builds the filled outline of `text` with its baseline starting at
    /// `(x, baseline)`. Returns `None` when nothing would be drawn.
    pub fn line_path(
        &self,
        text: &str,
        font_size: f32,
        x: f32,
        baseline: f32,
    ) -> Option<tiny_skia::Path> {
        match self {
            FontHandle::Outline(font) => outline_path(font, text, font_size, x, baseline),
            FontHandle::Bitmap => {
                bitmap_path(text, font_size, x, baseline - self.ascent(font_size))
            }
        }
    }
}

fn bitmap_cell(font_size: f32) -> f32 {
    font_size / bitmap::CELL_EM
}

fn measure_outline(font: &OutlineFont, text: &str, font_size: f32) -> f32 {
    let Some(face) = font.face() else {
        return 0.0;
    };
    let mut advance = 0u32;
    for ch in text.chars() {
        if ch == '\n' {
            continue;
        }
        let glyph_advance = face
            .glyph_index(ch)
            .and_then(|glyph| face.glyph_hor_advance(glyph))
            .unwrap_or(font.space_advance);
        advance = advance.saturating_add(glyph_advance as u32);
    }
    advance as f32 * font.scale(font_size)
}

struct GlyphPen<'a> {
    builder: &'a mut PathBuilder,
    x: f32,
    y: f32,
    scale: f32,
}

impl OutlineBuilder for GlyphPen<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder
            .move_to(self.x + x * self.scale, self.y - y * self.scale);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder
            .line_to(self.x + x * self.scale, self.y - y * self.scale);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.x + x1 * self.scale,
            self.y - y1 * self.scale,
            self.x + x * self.scale,
            self.y - y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.x + x1 * self.scale,
            self.y - y1 * self.scale,
            self.x + x2 * self.scale,
            self.y - y2 * self.scale,
            self.x + x * self.scale,
            self.y - y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

fn outline_path(
    font: &OutlineFont,
    text: &str,
    font_size: f32,
    x: f32,
    baseline: f32,
) -> Option<tiny_skia::Path> {
    let face = font.face()?;
    let scale = font.scale(font_size);
    let mut builder = PathBuilder::new();
    let mut caret = x;
    for ch in text.chars() {
        let glyph = face.glyph_index(ch);
        if let Some(glyph) = glyph {
            let mut pen = GlyphPen {
                builder: &mut builder,
                x: caret,
                y: baseline,
                scale,
            };
            face.outline_glyph(glyph, &mut pen);
        }
        let advance = glyph
            .and_then(|glyph| face.glyph_hor_advance(glyph))
            .unwrap_or(font.space_advance);
        caret += advance as f32 * scale;
    }
    builder.finish()
}

fn bitmap_path(text: &str, font_size: f32, x: f32, top: f32) -> Option<tiny_skia::Path> {
    let cell = bitmap_cell(font_size);
    let mut builder = PathBuilder::new();
    for (index, ch) in text.chars().enumerate() {
        let Some(rows) = bitmap::glyph_rows(ch) else {
            continue;
        };
        let origin_x = x + index as f32 * bitmap::CELL_ADVANCE * cell;
        for (col, row) in bitmap::lit_cells(rows) {
            if let Some(rect) = Rect::from_xywh(
                origin_x + col as f32 * cell,
                top + row as f32 * cell,
                cell,
                cell,
            ) {
                builder.push_rect(rect);
            }
        }
    }
    builder.finish()
}

/// One entry of the ordered font fallback chain.
pub trait FontProvider: Send + Sync {
    fn describe(&self) -> String;
    fn load(&self) -> Result<FontHandle>;
}

/// A font file on disk (`.ttf`, `.otf`, `.ttc`).
#[derive(Debug, Clone)]
pub struct FontFile(pub PathBuf);

impl FontProvider for FontFile {
    fn describe(&self) -> String {
        self.0.display().to_string()
    }

    fn load(&self) -> Result<FontHandle> {
        load_font_file(&self.0)
    }
}

/// A family looked up in the system font database (`sans-serif` is generic).
#[derive(Debug, Clone)]
pub struct SystemFamily(pub String);

impl FontProvider for SystemFamily {
    fn describe(&self) -> String {
        format!("system family '{}'", self.0)
    }

    fn load(&self) -> Result<FontHandle> {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        load_font_from_family(&db, &self.0)
    }
}

impl FontProvider for FontHandle {
    fn describe(&self) -> String {
        self.name()
    }

    fn load(&self) -> Result<FontHandle> {
        Ok(self.clone())
    }
}

pub fn load_font_file(path: &Path) -> Result<FontHandle> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    let font = load_font_from_data(data)
        .with_context(|| format!("failed to parse font: {}", path.display()))?;
    Ok(FontHandle::Outline(font))
}

fn load_font_from_data(data: Vec<u8>) -> Result<OutlineFont> {
    let data = Arc::new(data);
    let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
    (0..count)
        .find_map(|index| load_face(&data, index).ok())
        .ok_or_else(|| anyhow!("no usable face in font data"))
}

fn load_face(data: &Arc<Vec<u8>>, index: u32) -> Result<OutlineFont> {
    let face = Face::parse(data, index)
        .map_err(|err| anyhow!("failed to parse face {}: {}", index, err))?;
    let units_per_em = face.units_per_em().max(1);
    let space_advance = face
        .glyph_index(' ')
        .and_then(|id| face.glyph_hor_advance(id))
        .unwrap_or(units_per_em / 2);
    Ok(OutlineFont {
        data: data.clone(),
        face_index: index,
        units_per_em,
        ascender: face.ascender(),
        descender: face.descender(),
        space_advance,
        family: extract_family_name(&face),
    })
}

fn load_font_from_family(db: &fontdb::Database, family: &str) -> Result<FontHandle> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    Ok(FontHandle::Outline(load_face(&Arc::new(data), index)?))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

/// Picks the font for each render. Resolution never fails: a broken
/// explicit font falls back to the default, and an empty chain falls back
/// to the built-in bitmap font.
#[derive(Debug, Clone)]
pub struct FontResolver {
    default: FontHandle,
}

impl FontResolver {
    pub fn new(providers: Vec<Box<dyn FontProvider>>) -> Self {
        for provider in providers {
            match provider.load() {
                Ok(font) => {
                    info!("default font: {} ({})", font.name(), provider.describe());
                    return Self { default: font };
                }
                Err(err) => debug!("font candidate {} unavailable: {:#}", provider.describe(), err),
            }
        }
        warn!("no font candidates could be loaded; using the built-in bitmap font");
        Self {
            default: FontHandle::Bitmap,
        }
    }

    /// Font files are probed first, then system families.
    pub fn from_candidates(paths: &[String], families: &[String]) -> Self {
        let mut providers: Vec<Box<dyn FontProvider>> = Vec::new();
        for path in paths {
            providers.push(Box::new(FontFile(PathBuf::from(path))));
        }
        for family in families {
            providers.push(Box::new(SystemFamily(family.clone())));
        }
        Self::new(providers)
    }

    pub fn default_font(&self) -> &FontHandle {
        &self.default
    }

    pub fn resolve(&self, explicit_path: Option<&str>) -> FontHandle {
        let Some(path) = explicit_path.map(str::trim).filter(|path| !path.is_empty()) else {
            return self.default.clone();
        };
        match load_font_file(Path::new(path)) {
            Ok(font) => font,
            Err(err) => {
                warn!("failed to load requested font, using default: {:#}", err);
                self.default.clone()
            }
        }
    }
}
