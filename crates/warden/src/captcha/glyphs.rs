//! Stroke font for challenge answers.
//!
//! Every glyph is a set of polylines over a 3x3 lattice of nodes:
//!
//! ```text
//! 0 - 1 - 2
//! |   |   |
//! 3 - 4 - 5
//! |   |   |
//! 6 - 7 - 8
//! ```
//!
//! Strokes within a polyline are connected, which is what a reader follows
//! to pick the answer out of the decoys.

/// Characters an answer may contain. `I`, `O`, `0` and `1` are left out
/// because their stroke shapes collide.
pub const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Lattice node positions on a unit cell (x in 0..=1, y in 0..=2)
pub const NODES: [(f32, f32); 9] = [
    (0.0, 0.0),
    (0.5, 0.0),
    (1.0, 0.0),
    (0.0, 1.0),
    (0.5, 1.0),
    (1.0, 1.0),
    (0.0, 2.0),
    (0.5, 2.0),
    (1.0, 2.0),
];

/// Polylines for `c`, or None if `c` is not in [`ALPHABET`]
pub fn strokes(c: char) -> Option<&'static [&'static [u8]]> {
    let glyph: &'static [&'static [u8]] = match c {
        'A' => &[&[6, 3, 0, 2, 5, 8], &[3, 5]],
        'B' => &[&[0, 1, 5, 3], &[3, 5, 7, 6, 0]],
        'C' => &[&[2, 0, 6, 8]],
        'D' => &[&[0, 1, 5, 7, 6, 0]],
        'E' => &[&[2, 0, 6, 8], &[3, 4]],
        'F' => &[&[2, 0, 6], &[3, 4]],
        'G' => &[&[2, 0, 6, 8, 5, 4]],
        'H' => &[&[0, 6], &[2, 8], &[3, 5]],
        'J' => &[&[2, 8, 7, 6, 3]],
        'K' => &[&[0, 6], &[2, 3, 8]],
        'L' => &[&[0, 6, 8]],
        'M' => &[&[6, 0, 4, 2, 8]],
        'N' => &[&[6, 0, 8, 2]],
        'P' => &[&[6, 0, 2, 5, 3]],
        'Q' => &[&[0, 2, 8, 6, 0], &[4, 8]],
        'R' => &[&[6, 0, 2, 5, 3, 8]],
        'S' => &[&[2, 0, 3, 5, 8, 6]],
        'T' => &[&[0, 2], &[1, 7]],
        'U' => &[&[0, 6, 8, 2]],
        'V' => &[&[0, 7, 2]],
        'W' => &[&[0, 6, 4, 8, 2]],
        'X' => &[&[0, 8], &[2, 6]],
        'Y' => &[&[0, 4, 2], &[4, 7]],
        'Z' => &[&[0, 2, 6, 8]],
        '2' => &[&[0, 2, 5, 3, 6, 8]],
        '3' => &[&[0, 2, 8, 6], &[3, 5]],
        '4' => &[&[0, 3, 5], &[2, 8]],
        '5' => &[&[2, 0, 3, 5, 7, 6]],
        '6' => &[&[2, 0, 6, 8, 5, 3]],
        '7' => &[&[0, 2, 7]],
        '8' => &[&[0, 2, 8, 6, 0], &[3, 5]],
        '9' => &[&[5, 3, 0, 2, 8, 6]],
        _ => return None,
    };
    Some(glyph)
}
