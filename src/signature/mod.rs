//! Signature capture
//!
//! [`SignaturePad`] is the narrow interface the submission workflow needs
//! from a drawing widget. [`StrokePad`] implements it over recorded strokes,
//! which is what the pledge form posts.
//!
//! Resizing the canvas resets its backing store and clears the drawing, as a
//! browser canvas does. [`ResizeDebouncer`] collapses bursts of resize
//! events into one.

mod debounce;
mod raster;

pub use debounce::{ResizeDebouncer, RESIZE_DEBOUNCE};

use serde::{Deserialize, Serialize};

/// Pen colour used for both exports
pub const PEN_COLOR: &str = "#1a1a2e";

/// Stroke width in CSS pixels
pub const PEN_WIDTH: f32 = 2.0;

/// Drawing-canvas adapter
pub trait SignaturePad: Send + Sync {
    fn is_empty(&self) -> bool;

    /// SVG document, or None when nothing is drawn
    fn to_vector(&self) -> Option<String>;

    /// PNG data URL, or None when nothing is drawn
    fn to_raster(&self) -> Option<String>;

    fn clear(&mut self);
}

/// A point in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Signature pad backed by recorded strokes
#[derive(Debug, Clone)]
pub struct StrokePad {
    css_width: f32,
    css_height: f32,
    ratio: f32,
    backing_width: u32,
    backing_height: u32,
    strokes: Vec<Vec<Point>>,
}

impl StrokePad {
    pub fn new(css_width: f32, css_height: f32, device_pixel_ratio: f32) -> Self {
        let mut pad = Self {
            css_width: 0.0,
            css_height: 0.0,
            ratio: 1.0,
            backing_width: 0,
            backing_height: 0,
            strokes: Vec::new(),
        };
        pad.resize(css_width, css_height, device_pixel_ratio);
        pad
    }

    /// Build a pad from strokes captured client side
    pub fn with_strokes(
        css_width: f32,
        css_height: f32,
        device_pixel_ratio: f32,
        strokes: Vec<Vec<Point>>,
    ) -> Self {
        let mut pad = Self::new(css_width, css_height, device_pixel_ratio);
        for stroke in strokes {
            pad.add_stroke(stroke);
        }
        pad
    }

    /// Resize the canvas to its CSS box at the given pixel ratio.
    ///
    /// The backing store is `css * max(ratio, 1)` and any drawing is lost.
    pub fn resize(&mut self, css_width: f32, css_height: f32, device_pixel_ratio: f32) {
        let ratio = if device_pixel_ratio.is_finite() {
            device_pixel_ratio.max(1.0)
        } else {
            1.0
        };
        self.css_width = css_width.max(0.0);
        self.css_height = css_height.max(0.0);
        self.ratio = ratio;
        self.backing_width = (self.css_width * ratio).round() as u32;
        self.backing_height = (self.css_height * ratio).round() as u32;
        self.strokes.clear();
    }

    /// Record one stroke; points outside the canvas are kept and clipped on export
    pub fn add_stroke(&mut self, stroke: Vec<Point>) {
        let stroke: Vec<Point> = stroke
            .into_iter()
            .filter(|p| p.x.is_finite() && p.y.is_finite())
            .collect();
        if !stroke.is_empty() {
            self.strokes.push(stroke);
        }
    }

    pub fn backing_size(&self) -> (u32, u32) {
        (self.backing_width, self.backing_height)
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    pub fn point_count(&self) -> usize {
        self.strokes.iter().map(Vec::len).sum()
    }

    /// Produce both exports up front.
    ///
    /// Rasterizing is CPU bound; callers on the runtime run this under
    /// `spawn_blocking`.
    pub fn render(&self) -> RenderedSignature {
        RenderedSignature {
            vector: self.to_vector(),
            raster: self.to_raster(),
        }
    }
}

/// A signature whose exports were already produced
#[derive(Debug, Clone, Default)]
pub struct RenderedSignature {
    vector: Option<String>,
    raster: Option<String>,
}

impl SignaturePad for RenderedSignature {
    fn is_empty(&self) -> bool {
        self.vector.is_none()
    }

    fn to_vector(&self) -> Option<String> {
        self.vector.clone()
    }

    fn to_raster(&self) -> Option<String> {
        self.raster.clone()
    }

    fn clear(&mut self) {
        self.vector = None;
        self.raster = None;
    }
}

impl SignaturePad for StrokePad {
    fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    fn to_vector(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {w} {h}" width="{w}" height="{h}">"#,
            w = self.css_width,
            h = self.css_height
        );
        for stroke in &self.strokes {
            if let [dot] = stroke.as_slice() {
                svg.push_str(&format!(
                    r#"<circle cx="{:.2}" cy="{:.2}" r="{:.2}" fill="{}"/>"#,
                    dot.x,
                    dot.y,
                    PEN_WIDTH / 2.0,
                    PEN_COLOR
                ));
                continue;
            }
            let mut d = String::new();
            for (i, p) in stroke.iter().enumerate() {
                let cmd = if i == 0 { 'M' } else { 'L' };
                d.push_str(&format!("{}{:.2},{:.2} ", cmd, p.x, p.y));
            }
            svg.push_str(&format!(
                r#"<path d="{}" fill="none" stroke="{}" stroke-width="{}" stroke-linecap="round" stroke-linejoin="round"/>"#,
                d.trim_end(),
                PEN_COLOR,
                PEN_WIDTH
            ));
        }
        svg.push_str("</svg>");
        Some(svg)
    }

    fn to_raster(&self) -> Option<String> {
        if self.is_empty() || self.backing_width == 0 || self.backing_height == 0 {
            return None;
        }
        raster::render_png_data_url(
            self.backing_width,
            self.backing_height,
            self.ratio,
            &self.strokes,
        )
    }

    fn clear(&mut self) {
        self.strokes.clear();
    }
}
