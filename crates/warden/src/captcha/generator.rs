//! Challenge image rendering.
//!
//! The answer is drawn as connected strokes, threaded together by a trace
//! line, on top of a noisy background littered with decoy glyphs. Stroke
//! widths, decoy count, palette, jitter and slant are re-rolled on every call.

use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use imageproc::noise::gaussian_noise_mut;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::io::Cursor;
use warden_common::WardenError;

use super::glyphs::{ALPHABET, NODES, strokes};
use super::{Challenge, ChallengeSource};
use crate::config::ChallengeConfig;

type Point = (f32, f32);

/// Renders stroke CAPTCHAs as PNG images
#[derive(Debug, Clone)]
pub struct StrokeCaptcha {
    width: u32,
    height: u32,
    answer_length: usize,
}

impl StrokeCaptcha {
    pub fn new(config: &ChallengeConfig) -> Self {
        Self {
            width: config.image_width.max(64),
            height: config.image_height.max(32),
            answer_length: config.answer_length,
        }
    }

    /// Draw a random answer from the stroke alphabet
    pub fn random_answer(&self, rng: &mut impl Rng) -> String {
        (0..self.answer_length)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect()
    }

    /// Render `answer` with freshly rolled parameters
    pub fn render(&self, answer: &str, rng: &mut impl Rng) -> RgbImage {
        let background = Rgb([
            rng.random_range(8..40),
            rng.random_range(8..40),
            rng.random_range(16..48),
        ]);
        let mut img = RgbImage::from_pixel(self.width, self.height, background);
        gaussian_noise_mut(&mut img, 0.0, rng.random_range(6.0..18.0), rng.random());

        let palette: Vec<Rgb<u8>> = (0..3).map(|_| bright_color(rng)).collect();
        let decoy_color = blend(palette[1], background, 0.8);

        let w = self.width as f32;
        let h = self.height as f32;

        // Decoys first so the answer strokes stay on top
        let decoys = rng.random_range(60..80);
        for _ in 0..decoys {
            let c = ALPHABET[rng.random_range(0..ALPHABET.len())] as char;
            let size = rng.random_range(h * 0.12..h * 0.22);
            let origin = (rng.random_range(0.0..w), rng.random_range(0.0..h));
            draw_glyph(&mut img, c, origin, size, 0.0, 0, decoy_color, rng);
        }

        let len = answer.chars().count().max(1) as f32;
        let cell = w / (len + 1.0);
        let glyph_height = h * 0.55;
        let mut centers = Vec::with_capacity(answer.len());

        for (i, c) in answer.chars().enumerate() {
            let cx = cell * (i as f32 + 1.0);
            let cy = h / 2.0 + rng.random_range(-h * 0.08..h * 0.08);
            centers.push((cx, cy));

            let origin = (cx - glyph_height / 4.0, cy - glyph_height / 2.0);
            let slant = rng.random_range(-0.25..0.25);
            let radius = rng.random_range(1..3);
            let color = *palette.choose(rng).unwrap_or(&palette[0]);
            draw_glyph(&mut img, c, origin, glyph_height, slant, radius, color, rng);
        }

        // Trace line threading the answer glyphs together
        let trace_radius = rng.random_range(1..3);
        for pair in centers.windows(2) {
            let from = jitter(pair[0], 4.0, rng);
            let to = jitter(pair[1], 4.0, rng);
            stroke(&mut img, from, to, trace_radius, palette[0]);
        }

        img
    }

    fn encode(img: RgbImage) -> Result<Vec<u8>, WardenError> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| WardenError::Challenge(format!("PNG encoding failed: {e}")))?;
        Ok(bytes)
    }
}

impl ChallengeSource for StrokeCaptcha {
    fn generate(&self) -> Result<Challenge, WardenError> {
        let mut rng = rand::rng();
        let answer = self.random_answer(&mut rng);
        let image = Self::encode(self.render(&answer, &mut rng))?;

        Ok(Challenge {
            answer,
            image,
            generated_at: Utc::now(),
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn draw_glyph(
    img: &mut RgbImage,
    c: char,
    origin: Point,
    height: f32,
    slant: f32,
    radius: i32,
    color: Rgb<u8>,
    rng: &mut impl Rng,
) {
    let Some(lines) = strokes(c) else {
        return;
    };
    let unit = height / 2.0;
    let wobble = (unit * 0.08).max(0.5);

    for line in lines {
        let points: Vec<Point> = line
            .iter()
            .map(|&n| {
                let (nx, ny) = NODES[n as usize];
                let y = origin.1 + ny * unit + rng.random_range(-wobble..wobble);
                let x = origin.0 + nx * unit + slant * (unit - ny * unit) + rng.random_range(-wobble..wobble);
                (x, y)
            })
            .collect();

        for segment in points.windows(2) {
            stroke(img, segment[0], segment[1], radius, color);
        }
    }
}

fn jitter(p: Point, amount: f32, rng: &mut impl Rng) -> Point {
    (
        p.0 + rng.random_range(-amount..amount),
        p.1 + rng.random_range(-amount..amount),
    )
}

/// Thick line: a run of filled discs along the segment
fn stroke(img: &mut RgbImage, from: Point, to: Point, radius: i32, color: Rgb<u8>) {
    if radius <= 0 {
        draw_line_segment_mut(img, from, to, color);
        return;
    }

    let steps = (to.0 - from.0).hypot(to.1 - from.1).ceil().max(1.0) as usize;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let x = from.0 + (to.0 - from.0) * t;
        let y = from.1 + (to.1 - from.1) * t;
        draw_filled_circle_mut(img, (x.round() as i32, y.round() as i32), radius, color);
    }
}

fn bright_color(rng: &mut impl Rng) -> Rgb<u8> {
    Rgb([
        rng.random_range(140..=255),
        rng.random_range(140..=255),
        rng.random_range(140..=255),
    ])
}

/// Mix `fg` over `bg` at `opacity`
fn blend(fg: Rgb<u8>, bg: Rgb<u8>, opacity: f32) -> Rgb<u8> {
    let mix = |f: u8, b: u8| (f as f32 * opacity + b as f32 * (1.0 - opacity)).round() as u8;
    Rgb([mix(fg[0], bg[0]), mix(fg[1], bg[1]), mix(fg[2], bg[2])])
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    fn generator() -> StrokeCaptcha {
        StrokeCaptcha::new(&ChallengeConfig::default())
    }

    #[test]
    fn test_answer_shape() {
        let mut rng = rand::rng();
        let answer = generator().random_answer(&mut rng);
        assert_eq!(answer.len(), 6);
        assert!(answer.bytes().all(|b| ALPHABET.contains(&b)));
        assert!(answer.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_generate_png() {
        let challenge = generator().generate().unwrap();
        assert_eq!(challenge.answer.len(), 6);
        assert!(challenge.image.starts_with(PNG_MAGIC));

        let decoded = image::load_from_memory(&challenge.image).unwrap();
        assert_eq!(decoded.width(), 360);
        assert_eq!(decoded.height(), 120);
    }

    #[test]
    fn test_render_rerolls() {
        let g = generator();
        let mut rng = rand::rng();
        let a = g.render("ABC234", &mut rng);
        let b = g.render("ABC234", &mut rng);
        assert_ne!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn test_blend() {
        let mixed = blend(Rgb([200, 100, 0]), Rgb([0, 0, 0]), 0.5);
        assert_eq!(mixed, Rgb([100, 50, 0]));
    }
}
