//! PNG rendering of recorded strokes

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::{write::ZlibEncoder, Compression};
use std::io::Write;
use tracing::warn;

use super::{Point, PEN_WIDTH};

const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Upper bound on pen stamps per render; ink past it is dropped
pub(super) const MAX_STAMPS: u64 = 4_000_000;

/// #1a1a2e, opaque
const PEN_RGBA: [u8; 4] = [0x1a, 0x1a, 0x2e, 0xff];

/// Render strokes (CSS pixels) into an RGBA bitmap of the backing size and
/// return it as a PNG data URL on a transparent background.
pub(super) fn render_png_data_url(
    width: u32,
    height: u32,
    ratio: f32,
    strokes: &[Vec<Point>],
) -> Option<String> {
    let mut canvas = Canvas::new(width, height);
    let radius = (PEN_WIDTH * ratio / 2.0).max(0.5);

    'strokes: for stroke in strokes {
        let scaled: Vec<(f32, f32)> = stroke
            .iter()
            .map(|p| (p.x * ratio, p.y * ratio))
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .collect();
        match scaled.as_slice() {
            [] => {}
            [dot] => {
                if !canvas.segment(*dot, *dot, radius) {
                    break 'strokes;
                }
            }
            points => {
                for pair in points.windows(2) {
                    if !canvas.segment(pair[0], pair[1], radius) {
                        break 'strokes;
                    }
                }
            }
        }
    }
    if canvas.budget == 0 {
        warn!("Signature raster hit the stamp limit; remaining ink dropped");
    }

    match encode_png(&canvas) {
        Ok(bytes) => Some(format!("data:image/png;base64,{}", STANDARD.encode(bytes))),
        Err(e) => {
            warn!("Failed to encode signature PNG: {}", e);
            None
        }
    }
}

struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    budget: u64,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
            budget: MAX_STAMPS,
        }
    }

    /// Filled disc centred at (cx, cy)
    fn stamp(&mut self, cx: f32, cy: f32, radius: f32) {
        let min_x = (cx - radius).floor().max(0.0) as i64;
        let max_x = (cx + radius).ceil().min(self.width as f32 - 1.0) as i64;
        let min_y = (cy - radius).floor().max(0.0) as i64;
        let max_y = (cy + radius).ceil().min(self.height as f32 - 1.0) as i64;
        let r2 = radius * radius;

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                if dx * dx + dy * dy <= r2 {
                    let offset = (y as usize * self.width as usize + x as usize) * 4;
                    self.pixels[offset..offset + 4].copy_from_slice(&PEN_RGBA);
                }
            }
        }
    }

    /// Stamp along a segment, clipped to the canvas grown by the pen radius.
    ///
    /// Returns false once the stamp budget is spent.
    fn segment(&mut self, from: (f32, f32), to: (f32, f32), radius: f32) -> bool {
        let bounds = (
            -radius,
            -radius,
            self.width as f32 + radius,
            self.height as f32 + radius,
        );
        let Some((from, to)) = clip_segment(from, to, bounds) else {
            return true;
        };

        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        let length = (dx * dx + dy * dy).sqrt();
        // Half-pixel steps keep the stamped discs overlapping
        let steps = (length * 2.0).ceil().max(1.0) as u64;
        for i in 0..=steps {
            if self.budget == 0 {
                return false;
            }
            self.budget -= 1;
            let t = i as f32 / steps as f32;
            self.stamp(from.0 + dx * t, from.1 + dy * t, radius);
        }
        true
    }
}

/// Liang-Barsky clip of a segment to `(min_x, min_y, max_x, max_y)`
fn clip_segment(
    from: (f32, f32),
    to: (f32, f32),
    (min_x, min_y, max_x, max_y): (f32, f32, f32, f32),
) -> Option<((f32, f32), (f32, f32))> {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    if !dx.is_finite() || !dy.is_finite() {
        return None;
    }

    let mut t0 = 0.0f32;
    let mut t1 = 1.0f32;
    for (p, q) in [
        (-dx, from.0 - min_x),
        (dx, max_x - from.0),
        (-dy, from.1 - min_y),
        (dy, max_y - from.1),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }

    Some((
        (from.0 + dx * t0, from.1 + dy * t0),
        (from.0 + dx * t1, from.1 + dy * t1),
    ))
}

fn encode_png(canvas: &Canvas) -> std::io::Result<Vec<u8>> {
    let row_len = canvas.width as usize * 4;
    let mut raw = Vec::with_capacity((row_len + 1) * canvas.height as usize);
    for row in canvas.pixels.chunks(row_len) {
        raw.push(0); // filter: none
        raw.extend_from_slice(row);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&canvas.width.to_be_bytes());
    ihdr.extend_from_slice(&canvas.height.to_be_bytes());
    // bit depth 8, colour type 6 (RGBA), deflate, adaptive filtering, no interlace
    ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);

    let mut png = Vec::with_capacity(compressed.len() + 64);
    png.extend_from_slice(&PNG_SIGNATURE);
    write_chunk(&mut png, b"IHDR", &ihdr);
    write_chunk(&mut png, b"IDAT", &compressed);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(kind);
    hasher.update(data);
    out.extend_from_slice(&hasher.finalize().to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(url: &str) -> Vec<u8> {
        let b64 = url.strip_prefix("data:image/png;base64,").unwrap();
        STANDARD.decode(b64).unwrap()
    }

    #[test]
    fn test_png_header_and_dimensions() {
        let strokes = vec![vec![Point { x: 1.0, y: 1.0 }, Point { x: 8.0, y: 4.0 }]];
        let png = decode(&render_png_data_url(20, 10, 1.0, &strokes).unwrap());

        assert_eq!(&png[..8], &PNG_SIGNATURE);
        assert_eq!(&png[12..16], b"IHDR");
        assert_eq!(u32::from_be_bytes(png[16..20].try_into().unwrap()), 20);
        assert_eq!(u32::from_be_bytes(png[20..24].try_into().unwrap()), 10);
        assert_eq!(&png[png.len() - 8..png.len() - 4], b"IEND");
    }

    #[test]
    fn test_ihdr_crc_matches() {
        let strokes = vec![vec![Point { x: 2.0, y: 2.0 }]];
        let png = decode(&render_png_data_url(4, 4, 1.0, &strokes).unwrap());
        let crc = u32::from_be_bytes(png[29..33].try_into().unwrap());
        assert_eq!(crc, crc32fast::hash(&png[12..29]));
    }

    #[test]
    fn test_stroke_paints_pixels() {
        let mut canvas = Canvas::new(10, 10);
        canvas.segment((1.0, 5.0), (9.0, 5.0), 1.0);
        let painted = canvas.pixels.chunks(4).filter(|px| px[3] == 0xff).count();
        assert!(painted >= 8);

        // Points far outside the canvas are clipped, not panicking
        canvas.stamp(-50.0, 500.0, 3.0);
    }

    #[test]
    fn test_far_off_point_is_clipped_to_canvas() {
        let mut canvas = Canvas::new(1200, 600);
        assert!(canvas.segment((0.0, 0.0), (1e8, 0.0), 4.0));
        // Only the on-canvas run is walked: ~2 stamps per pixel of width
        assert!(MAX_STAMPS - canvas.budget <= 2 * 1210);

        let painted = canvas.pixels.chunks(4).filter(|px| px[3] == 0xff).count();
        assert!(painted >= 1200);
    }

    #[test]
    fn test_segment_entirely_off_canvas_costs_nothing() {
        let mut canvas = Canvas::new(100, 100);
        assert!(canvas.segment((-1e9, -50.0), (1e9, -50.0), 2.0));
        assert_eq!(canvas.budget, MAX_STAMPS);
        assert!(canvas.pixels.iter().all(|b| *b == 0));
    }

    #[test]
    fn test_stamp_budget_stops_rendering() {
        let mut canvas = Canvas::new(100, 100);
        canvas.budget = 10;
        assert!(!canvas.segment((0.0, 50.0), (100.0, 50.0), 1.0));
        assert_eq!(canvas.budget, 0);
    }

    #[test]
    fn test_far_off_stroke_renders_promptly() {
        let strokes = vec![vec![Point { x: 0.0, y: 0.0 }, Point { x: 1e8, y: 0.0 }]];
        let started = std::time::Instant::now();
        assert!(render_png_data_url(1200, 600, 4.0, &strokes).is_some());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}
