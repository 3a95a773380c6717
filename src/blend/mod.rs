pub mod calculate;

use std::io;
use std::str::FromStr;
use std::borrow::Cow;
use std::thread;

use image::Pixel;
use image::Rgb;
use image::RgbImage;
use image::RgbaImage;
use image::imageops;
use image::imageops::FilterType;
use serde::Deserialize;
use serde::de;
use serde::de::Deserializer;

use calculate::blend_pixel;


pub const MAX_THREAD: usize = 16;

const FILTERS: &'static [&'static str] = &["nearest", "triangle", "gaussian", "catmullrom", "lanczos3"];

pub fn parse_filter(name: &str) -> Option<FilterType> {
    match name {
        "nearest" => Some(FilterType::Nearest),
        "triangle" => Some(FilterType::Triangle),
        "gaussian" => Some(FilterType::Gaussian),
        "catmullrom" => Some(FilterType::CatmullRom),
        "lanczos3" => Some(FilterType::Lanczos3),
        _ => None,
    }
}

fn de_filter<'de, D>(deserializer: D) -> Result<FilterType, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    parse_filter(&name).ok_or_else(|| de::Error::unknown_variant(&name, FILTERS))
}


/// Where the overlay's top-left pixel lands on the background.
/// Either component may be negative or past the background's extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "(i64, i64)")]
pub struct Position {
    pub row: i64,
    pub col: i64,
}

impl Position {

    pub fn new(row: i64, col: i64) -> Self {
        Position {
            row,
            col,
        }
    }
}

impl From<(i64, i64)> for Position {

    fn from(value: (i64, i64)) -> Self {
        Position::new(value.0, value.1)
    }
}

impl FromStr for Position {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sp = s.splitn(2, ',');
        let row = sp.next()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "row"))?;
        let col = sp.next()
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "col"))?;
        Ok(Position::new(row, col))
    }
}

impl std::fmt::Display for Position {

    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("({},{})", self.row, self.col))
    }
}


#[derive(Debug, Clone, Deserialize)]
#[serde(from = "BlendOptionsRaw")]
pub struct BlendOptions {
    pub position: Position,
    pub scale: f32,
    pub opacity: f64,
    pub filter: FilterType,
    pub threads: usize,
}

impl Default for BlendOptions {

    fn default() -> Self {
        BlendOptions {
            position: Position::default(),
            scale: 1.0,
            opacity: 0.35,
            filter: FilterType::Triangle,
            threads: 1,
        }
    }
}

impl BlendOptions {

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn set_scale(&mut self, scale: f32) -> bool {
        if scale > 0.0 && scale.is_finite() {
            self.scale = scale;
            true
        } else {
            false
        }
    }

    pub fn set_opacity(&mut self, opacity: f64) {
        self.opacity = opacity;
    }

    pub fn set_filter(&mut self, filter: &str) -> bool {
        if let Some(filter) = parse_filter(filter) {
            self.filter = filter;
            true
        } else {
            false
        }
    }

    pub fn set_threads(&mut self, threads: usize) -> bool {
        if threads > 0 && threads <= MAX_THREAD {
            self.threads = threads;
            true
        } else {
            false
        }
    }

    /// True when `composite` alone covers these options.
    pub fn is_plain(&self) -> bool {
        self.threads <= 1 && self.filter == BlendOptions::default().filter
    }
}

/// Options file as written; values go through the setters of [`BlendOptions`].
#[derive(Deserialize)]
#[serde(default)]
struct BlendOptionsRaw {
    position: Position,
    scale: f32,
    opacity: f64,
    #[serde(deserialize_with = "de_filter")]
    filter: FilterType,
    threads: usize,
}

impl Default for BlendOptionsRaw {

    fn default() -> Self {
        let options = BlendOptions::default();
        BlendOptionsRaw {
            position: options.position,
            scale: options.scale,
            opacity: options.opacity,
            filter: options.filter,
            threads: options.threads,
        }
    }
}

impl From<BlendOptionsRaw> for BlendOptions {

    fn from(raw: BlendOptionsRaw) -> Self {
        let mut options = BlendOptions::default();
        options.set_position(raw.position);
        options.set_opacity(raw.opacity);
        options.filter = raw.filter;
        if !options.set_scale(raw.scale) {
            log::warn!("ignored scale {} in options", raw.scale);
        }
        if !options.set_threads(raw.threads) {
            log::warn!("ignored threads {} in options, limit is {}", raw.threads, MAX_THREAD);
        }
        options
    }
}


/// Clipped rectangle of the background touched by a positioned overlay,
/// in background coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub row: u32,
    pub col: u32,
    pub height: u32,
    pub width: u32,
}

/// Size of the overlay after scaling, as `(width, height)`.
/// `None` when the scale is unusable or the result is empty.
pub fn scaled_dimensions(dimensions: (u32, u32), scale: f32) -> Option<(u32, u32)> {
    if !(scale > 0.0) || !scale.is_finite() {
        return None;
    }
    let w = (dimensions.0 as f64 * scale as f64).round();
    let h = (dimensions.1 as f64 * scale as f64).round();
    if w < 1.0 || h < 1.0 || w > u32::MAX as f64 || h > u32::MAX as f64 {
        return None;
    }
    Some((w as u32, h as u32))
}

pub fn footprint(overlay: (u32, u32), position: Position, scale: f32, background: (u32, u32)) -> Option<Region> {
    use std::cmp::max;
    use std::cmp::min;

    let (w, h) = scaled_dimensions(overlay, scale)?;
    let row0 = max(position.row, 0);
    let col0 = max(position.col, 0);
    let row1 = min(position.row.saturating_add(h as i64), background.1 as i64);
    let col1 = min(position.col.saturating_add(w as i64), background.0 as i64);
    if row0 >= row1 || col0 >= col1 {
        return None;
    }
    Some(Region {
        row: row0 as u32,
        col: col0 as u32,
        height: (row1 - row0) as u32,
        width: (col1 - col0) as u32,
    })
}

fn scale_overlay(overlay: &RgbaImage, scale: f32, filter: FilterType) -> Option<Cow<'_, RgbaImage>> {
    let (w, h) = scaled_dimensions(overlay.dimensions(), scale)?;
    if (w, h) == overlay.dimensions() {
        Some(Cow::Borrowed(overlay))
    } else {
        Some(Cow::Owned(imageops::resize(overlay, w, h, filter)))
    }
}

/// Blends one band of whole background rows, `first_row` being the
/// background row index of `rows[0..stride]`.
fn blend_rows(rows: &mut [u8], first_row: u32, stride: usize, overlay: &RgbaImage, position: Position, region: Region, opacity: f64) {
    let channels = Rgb::<u8>::CHANNEL_COUNT as usize;
    for (k, line) in rows.chunks_exact_mut(stride).enumerate() {
        let i = (first_row as i64 + k as i64 - position.row) as u32;
        for col in region.col .. region.col + region.width {
            let j = (col as i64 - position.col) as u32;
            let offset = col as usize * channels;
            let bg = Rgb::from_slice_mut(&mut line[offset .. offset + channels]);
            blend_pixel(bg, overlay.get_pixel(j, i), opacity);
        }
    }
}

/// Composites `overlay` onto `background` with the default filter on the
/// calling thread. See [`composite_with`].
pub fn composite<'a>(background: &'a mut RgbImage, overlay: &RgbaImage, position: Position, scale: f32, opacity: f64) -> &'a mut RgbImage {
    let mut options = BlendOptions::default();
    options.position = position;
    options.scale = scale;
    options.opacity = opacity;
    composite_with(background, overlay, &options)
}

/// Alpha-blends the scaled overlay onto the background in place and
/// hands the same buffer back.
///
/// Overlay pixels landing outside the background (on any side) are skipped.
/// A non-positive scale, an empty overlay or an empty background leaves
/// the background untouched. The overlay itself is never modified.
pub fn composite_with<'a>(background: &'a mut RgbImage, overlay: &RgbaImage, options: &BlendOptions) -> &'a mut RgbImage {
    let position = options.position;
    let opacity = options.opacity;

    if !(options.scale > 0.0) || !options.scale.is_finite() {
        log::warn!("invalid scale {}, overlay skipped", options.scale);
        return background;
    }
    let region = match footprint(overlay.dimensions(), position, options.scale, background.dimensions()) {
        Some(region) => region,
        None => {
            log::debug!("overlay at {} misses the background", position);
            return background;
        }
    };
    let overlay = match scale_overlay(overlay, options.scale, options.filter) {
        Some(overlay) => overlay,
        None => return background,
    };
    let overlay: &RgbaImage = &overlay;
    log::debug!("blending {}x{} overlay at {} into {:?}", overlay.width(), overlay.height(), position, region);

    let stride = background.width() as usize * Rgb::<u8>::CHANNEL_COUNT as usize;
    let start = region.row as usize * stride;
    let end = (region.row + region.height) as usize * stride;
    let buf: &mut [u8] = &mut **background;
    let band = &mut buf[start .. end];

    let thread_num = std::cmp::max(std::cmp::min(options.threads, region.height as usize), 1);
    if thread_num == 1 {
        blend_rows(band, region.row, stride, overlay, position, region, opacity);
    } else {
        let divide = (region.height as usize + thread_num - 1) / thread_num;
        thread::scope(|s| {
            for (c, chunk) in band.chunks_mut(divide * stride).enumerate() {
                let first_row = region.row + (c * divide) as u32;
                s.spawn(move || {
                    blend_rows(chunk, first_row, stride, overlay, position, region, opacity)
                });
            }
        });
    }
    background
}
