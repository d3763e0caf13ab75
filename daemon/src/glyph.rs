/// Tray glyph rendering: draws the CPU percentage as digits on a 32×32 RGBA
/// canvas with a transparent background.
///
/// Colour tiers and the two layouts (one for "100", one for everything else)
/// are fixed; the only runtime inputs are the percentage and the dark-mode flag.
use ab_glyph::{point, Font, FontArc, GlyphId, PxScale, PxScaleFont, ScaleFont};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

use crate::config::GlyphConfig;

/// Edge length of the square tray icon in pixels.
pub const ICON_SIZE: u32 = 32;

/// Colour bucket chosen for a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    NearBlack,
    Amber,
    NearWhite,
    Yellow,
    Red,
}

impl Tier {
    /// Picks the colour for `percentage`. Dark-mode buckets are checked first;
    /// the red bucket (`>= 75`) is shared by both themes.
    pub fn select(percentage: u8, dark_mode: bool) -> Self {
        if dark_mode && percentage < 50 {
            Tier::NearBlack
        } else if dark_mode && percentage < 75 {
            Tier::Amber
        } else if percentage < 50 {
            Tier::NearWhite
        } else if percentage < 75 {
            Tier::Yellow
        } else {
            Tier::Red
        }
    }

    pub fn rgb(self) -> [u8; 3] {
        match self {
            Tier::NearBlack => [28, 28, 28],
            Tier::Amber => [255, 176, 0],
            Tier::NearWhite => [235, 235, 235],
            Tier::Yellow => [255, 235, 0],
            Tier::Red => [230, 20, 20],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::NearBlack => "near-black",
            Tier::Amber => "amber",
            Tier::NearWhite => "near-white",
            Tier::Yellow => "yellow",
            Tier::Red => "red",
        }
    }
}

/// Font size and text anchor for a reading. Three digits need a smaller font
/// and a shifted anchor to fit the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub font_size: u16,
    pub anchor: (u32, u32),
}

impl Layout {
    pub fn for_percentage(percentage: u8) -> Self {
        if percentage == 100 {
            Layout {
                font_size: 21,
                anchor: (14, 14),
            }
        } else {
            Layout {
                font_size: 24,
                anchor: (18, 14),
            }
        }
    }
}

/// A rendered icon frame: row-major RGBA8, `width * height * 4` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    /// Tier the frame was drawn with, kept for status reporting.
    pub tier: Tier,
    pub percentage: u8,
    pub dark_mode: bool,
}

impl GlyphImage {
    fn transparent(tier: Tier, percentage: u8, dark_mode: bool) -> Self {
        Self {
            width: ICON_SIZE,
            height: ICON_SIZE,
            rgba: vec![0; (ICON_SIZE * ICON_SIZE * 4) as usize],
            tier,
            percentage,
            dark_mode,
        }
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * self.width + x) * 4) as usize;
        [self.rgba[i], self.rgba[i + 1], self.rgba[i + 2], self.rgba[i + 3]]
    }

    /// Writes `rgb` at `(x, y)` with the stronger of the existing and new alpha.
    /// Out-of-canvas coordinates are clipped.
    fn paint(&mut self, x: i32, y: i32, rgb: [u8; 3], coverage: f32) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let i = ((y as u32 * self.width + x as u32) * 4) as usize;
        let alpha = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
        if alpha > self.rgba[i + 3] {
            self.rgba[i..i + 3].copy_from_slice(&rgb);
            self.rgba[i + 3] = alpha;
        }
    }

    #[cfg(test)]
    /// Number of pixels with any opacity.
    pub fn painted_pixels(&self) -> usize {
        self.rgba.chunks_exact(4).filter(|px| px[3] > 0).count()
    }
}

/// Where the font asset comes from.
#[derive(Debug, Clone)]
pub enum FontSource {
    Path(PathBuf),
    /// `$<var>/Fonts/<file>`, read from the environment on first use.
    Env { var: String, file: String },
}

impl FontSource {
    pub fn from_config(config: &GlyphConfig) -> Self {
        match &config.font_path {
            Some(path) => FontSource::Path(path.clone()),
            None => FontSource::Env {
                var: config.font_dir_env.clone(),
                file: config.font_file.clone(),
            },
        }
    }

    fn resolve(&self) -> Result<PathBuf> {
        match self {
            FontSource::Path(path) => Ok(path.clone()),
            FontSource::Env { var, file } => {
                let dir = std::env::var_os(var)
                    .ok_or_else(|| anyhow!("environment variable {var} is not set; cannot locate font {file}"))?;
                Ok(PathBuf::from(dir).join("Fonts").join(file))
            }
        }
    }
}

/// Renders tray glyphs, caching one scaled font per distinct size.
pub struct GlyphRenderer {
    source: FontSource,
    font: Option<FontArc>,
    scaled: HashMap<u16, PxScaleFont<FontArc>>,
}

impl GlyphRenderer {
    pub fn new(source: FontSource) -> Self {
        Self {
            source,
            font: None,
            scaled: HashMap::new(),
        }
    }

    /// Draws `percentage` (clamped to 100) in the tier colour for `dark_mode`.
    ///
    /// Fails only if the font cannot be loaded; there is no fallback glyph.
    pub fn render(&mut self, percentage: u8, dark_mode: bool) -> Result<GlyphImage> {
        let percentage = percentage.min(100);
        let layout = Layout::for_percentage(percentage);
        let tier = Tier::select(percentage, dark_mode);
        let rgb = tier.rgb();
        let font = self.scaled_font(layout.font_size)?;

        let text = percentage.to_string();
        let ids: Vec<GlyphId> = text.chars().map(|c| font.glyph_id(c)).collect();

        // Middle/middle anchoring: centre the advance width horizontally and the
        // ascent..descent span vertically.
        let width = advance_width(font, &ids);
        let mut x = layout.anchor.0 as f32 - width / 2.0;
        let baseline = layout.anchor.1 as f32 + (font.ascent() + font.descent()) / 2.0;

        let mut image = GlyphImage::transparent(tier, percentage, dark_mode);
        let mut prev: Option<GlyphId> = None;
        for id in ids {
            if let Some(p) = prev {
                x += font.kern(p, id);
            }
            let glyph = id.with_scale_and_position(font.scale(), point(x, baseline));
            x += font.h_advance(id);
            prev = Some(id);

            let Some(outlined) = font.font().outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, coverage| {
                image.paint(
                    bounds.min.x as i32 + gx as i32,
                    bounds.min.y as i32 + gy as i32,
                    rgb,
                    coverage,
                );
            });
        }

        Ok(image)
    }

    #[cfg(test)]
    /// Number of distinct font sizes loaded so far.
    pub fn cached_sizes(&self) -> usize {
        self.scaled.len()
    }

    fn scaled_font(&mut self, size: u16) -> Result<&PxScaleFont<FontArc>> {
        if !self.scaled.contains_key(&size) {
            let font = match &self.font {
                Some(font) => font.clone(),
                None => {
                    let font = load_font(&self.source)?;
                    self.font = Some(font.clone());
                    font
                }
            };
            let scale = em_scale(&font, size);
            self.scaled.insert(size, font.into_scaled(scale));
        }
        self.scaled
            .get(&size)
            .ok_or_else(|| anyhow!("font size {size} missing from cache"))
    }
}

fn load_font(source: &FontSource) -> Result<FontArc> {
    let path = source.resolve()?;
    let bytes = std::fs::read(&path)
        .with_context(|| format!("Failed to read font file: {}", path.display()))?;
    let font = FontArc::try_from_vec(bytes)
        .map_err(|_| anyhow!("{} is not a usable font", path.display()))?;
    info!("loaded glyph font {}", path.display());
    Ok(font)
}

/// Scale at which one em spans `size` pixels. `PxScale` itself measures the
/// ascent-to-descent height, which is taller than the em for most fonts.
fn em_scale(font: &FontArc, size: u16) -> PxScale {
    let size = size as f32;
    match font.units_per_em() {
        Some(units_per_em) => PxScale::from(size * font.height_unscaled() / units_per_em),
        None => PxScale::from(size),
    }
}

fn advance_width(font: &PxScaleFont<FontArc>, ids: &[GlyphId]) -> f32 {
    let mut width = 0.0;
    let mut prev: Option<GlyphId> = None;
    for &id in ids {
        if let Some(p) = prev {
            width += font.kern(p, id);
        }
        width += font.h_advance(id);
        prev = Some(id);
    }
    width
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A TrueType font that ships with most Linux and Windows systems, if any.
    fn system_font() -> Option<PathBuf> {
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            r"C:\Windows\Fonts\arial.ttf",
        ]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    }

    // ── layout ────────────────────────────────────────────────────────────────

    #[test]
    fn only_one_hundred_uses_the_small_font() {
        for pct in 0..=100u8 {
            let layout = Layout::for_percentage(pct);
            if pct == 100 {
                assert_eq!(layout.font_size, 21);
                assert_eq!(layout.anchor, (14, 14));
            } else {
                assert_eq!(layout.font_size, 24, "wrong size for {pct}");
                assert_eq!(layout.anchor, (18, 14));
            }
        }
    }

    // ── tiers ─────────────────────────────────────────────────────────────────

    #[test]
    fn light_theme_boundaries() {
        assert_eq!(Tier::select(0, false), Tier::NearWhite);
        assert_eq!(Tier::select(49, false), Tier::NearWhite);
        assert_eq!(Tier::select(50, false), Tier::Yellow);
        assert_eq!(Tier::select(74, false), Tier::Yellow);
        assert_eq!(Tier::select(75, false), Tier::Red);
        assert_eq!(Tier::select(100, false), Tier::Red);
    }

    #[test]
    fn dark_theme_boundaries() {
        assert_eq!(Tier::select(0, true), Tier::NearBlack);
        assert_eq!(Tier::select(49, true), Tier::NearBlack);
        assert_eq!(Tier::select(50, true), Tier::Amber);
        assert_eq!(Tier::select(74, true), Tier::Amber);
        assert_eq!(Tier::select(75, true), Tier::Red);
        assert_eq!(Tier::select(100, true), Tier::Red);
    }

    #[test]
    fn tier_colours_are_distinct() {
        let tiers = [Tier::NearBlack, Tier::Amber, Tier::NearWhite, Tier::Yellow, Tier::Red];
        for (i, a) in tiers.iter().enumerate() {
            for b in &tiers[i + 1..] {
                assert_ne!(a.rgb(), b.rgb(), "{} and {} share a colour", a.name(), b.name());
            }
        }
    }

    // ── font loading ──────────────────────────────────────────────────────────

    #[test]
    fn missing_font_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = GlyphRenderer::new(FontSource::Path(dir.path().join("nope.ttf")));
        assert!(renderer.render(42, false).is_err());
        assert_eq!(renderer.cached_sizes(), 0);
    }

    #[test]
    fn garbage_font_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        let mut renderer = GlyphRenderer::new(FontSource::Path(path));
        assert!(renderer.render(42, false).is_err());
    }

    #[test]
    fn unset_font_dir_variable_is_an_error() {
        let source = FontSource::Env {
            var: "CPUGLYPH_TEST_UNSET_FONT_DIR".to_string(),
            file: "arial.ttf".to_string(),
        };
        assert!(source.resolve().is_err());
    }

    #[test]
    fn font_path_overrides_environment_lookup() {
        let config = GlyphConfig {
            font_path: Some(PathBuf::from("/fonts/x.ttf")),
            ..GlyphConfig::default()
        };
        let resolved = FontSource::from_config(&config).resolve().unwrap();
        assert_eq!(resolved, PathBuf::from("/fonts/x.ttf"));
    }

    // ── rendering (needs a system font) ───────────────────────────────────────

    #[test]
    fn render_draws_tier_colour_on_transparent_canvas() {
        let Some(font) = system_font() else { return };
        let mut renderer = GlyphRenderer::new(FontSource::Path(font));

        let image = renderer.render(42, false).unwrap();
        assert_eq!((image.width, image.height), (ICON_SIZE, ICON_SIZE));
        assert_eq!(image.rgba.len(), (ICON_SIZE * ICON_SIZE * 4) as usize);
        assert_eq!(image.pixel(0, 0)[3], 0, "corner should stay transparent");
        assert!(image.painted_pixels() > 0);

        let rgb = Tier::NearWhite.rgb();
        assert!(image
            .rgba
            .chunks_exact(4)
            .filter(|px| px[3] > 0)
            .all(|px| px[..3] == rgb));
    }

    #[test]
    fn render_caches_one_font_per_size() {
        let Some(font) = system_font() else { return };
        let mut renderer = GlyphRenderer::new(FontSource::Path(font));

        renderer.render(10, true).unwrap();
        renderer.render(55, true).unwrap();
        assert_eq!(renderer.cached_sizes(), 1);

        let full = renderer.render(100, true).unwrap();
        assert_eq!(renderer.cached_sizes(), 2);
        assert_eq!(full.tier, Tier::Red);

        renderer.render(100, false).unwrap();
        assert_eq!(renderer.cached_sizes(), 2);
    }

    #[test]
    fn font_size_is_the_em_size() {
        let Some(font) = system_font() else { return };
        let mut renderer = GlyphRenderer::new(FontSource::Path(font));

        for size in [24u16, 21] {
            let scaled = renderer.scaled_font(size).unwrap();
            let units_per_em = scaled.font().units_per_em().unwrap();
            let em = scaled.h_scale_factor() * units_per_em;
            assert!((em - size as f32).abs() < 0.01, "em {em} for size {size}");
            assert!(scaled.scale().y >= size as f32);
        }
    }

    #[test]
    fn render_is_deterministic() {
        let Some(font) = system_font() else { return };
        let mut renderer = GlyphRenderer::new(FontSource::Path(font));
        let a = renderer.render(73, true).unwrap();
        let b = renderer.render(73, true).unwrap();
        assert_eq!(a, b);
    }
}
