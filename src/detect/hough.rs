//! Gradient Hough transform for circles.
//!
//! 1. Sobel gradients of the (already smoothed) intensity image
//! 2. Thin edges: non-maximum suppression along the gradient, then hysteresis
//!    between `edge_threshold / 2` and `edge_threshold`
//! 3. Every edge pixel votes along its gradient line, both directions, for each
//!    radius in range, into an accumulator scaled down by `dp`
//! 4. Local accumulator maxima above `center_threshold` become centers, strongest
//!    first; centers within `min_dist` of an accepted circle are dropped
//! 5. Each center takes the radius with the best edge support per unit radius

use image::GrayImage;

use super::params::DetectorParams;

const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

/// A circle candidate in frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    /// Accumulator votes of the center cell.
    pub votes: u32,
}

#[derive(Clone, Copy, Debug)]
struct EdgePoint {
    x: f32,
    y: f32,
    ux: f32,
    uy: f32,
}

struct Gradients {
    width: usize,
    height: usize,
    gx: Vec<f32>,
    gy: Vec<f32>,
    magnitude: Vec<f32>,
}

fn sobel(gray: &GrayImage) -> Gradients {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    let raw = gray.as_raw();
    let mut grad = Gradients {
        width,
        height,
        gx: vec![0.0; width * height],
        gy: vec![0.0; width * height],
        magnitude: vec![0.0; width * height],
    };
    if width < 3 || height < 3 {
        return grad;
    }

    let p = |x: usize, y: usize| raw[y * width + x] as f32;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let gx = (p(x + 1, y - 1) + 2.0 * p(x + 1, y) + p(x + 1, y + 1))
                - (p(x - 1, y - 1) + 2.0 * p(x - 1, y) + p(x - 1, y + 1));
            let gy = (p(x - 1, y + 1) + 2.0 * p(x, y + 1) + p(x + 1, y + 1))
                - (p(x - 1, y - 1) + 2.0 * p(x, y - 1) + p(x + 1, y - 1));
            let i = y * width + x;
            grad.gx[i] = gx;
            grad.gy[i] = gy;
            grad.magnitude[i] = gx.abs() + gy.abs();
        }
    }
    grad
}

fn edge_points(grad: &Gradients, high: f32) -> Vec<EdgePoint> {
    let (w, h) = (grad.width, grad.height);
    if w < 3 || h < 3 {
        return Vec::new();
    }
    let low = high / 2.0;

    // 0: not an edge, 1: weak, 2: strong
    let mut class = vec![0u8; w * h];
    let mut strong = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let m = grad.magnitude[i];
            if m <= low {
                continue;
            }
            let (ax, ay) = (grad.gx[i].abs(), grad.gy[i].abs());
            let (a, b) = if ay <= ax * TAN_22_5 {
                (i - 1, i + 1)
            } else if ay >= ax * TAN_67_5 {
                (i - w, i + w)
            } else if (grad.gx[i] > 0.0) == (grad.gy[i] > 0.0) {
                (i - w - 1, i + w + 1)
            } else {
                (i - w + 1, i + w - 1)
            };
            if !(m > grad.magnitude[a] && m >= grad.magnitude[b]) {
                continue;
            }
            if m > high {
                class[i] = 2;
                strong.push(i);
            } else {
                class[i] = 1;
            }
        }
    }

    while let Some(i) = strong.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if class[j] == 1 {
                    class[j] = 2;
                    strong.push(j);
                }
            }
        }
    }

    class
        .iter()
        .enumerate()
        .filter(|(_, &c)| c == 2)
        .filter_map(|(i, _)| {
            let (gx, gy) = (grad.gx[i], grad.gy[i]);
            let norm = (gx * gx + gy * gy).sqrt();
            (norm > 0.0).then(|| EdgePoint {
                x: (i % w) as f32,
                y: (i / w) as f32,
                ux: gx / norm,
                uy: gy / norm,
            })
        })
        .collect()
}

struct Accumulator {
    cols: usize,
    rows: usize,
    votes: Vec<u32>,
}

fn accumulate(edges: &[EdgePoint], width: usize, height: usize, params: &DetectorParams) -> Accumulator {
    let dp = params.dp;
    let cols = ((width - 1) as f32 / dp).round() as usize + 1;
    let rows = ((height - 1) as f32 / dp).round() as usize + 1;
    let mut votes = vec![0u32; cols * rows];

    for edge in edges {
        for sign in [1.0f32, -1.0] {
            let (sx, sy) = (edge.ux * sign, edge.uy * sign);
            for r in params.min_radius..=params.max_radius {
                let ax = (edge.x + sx * r as f32) / dp + 0.5;
                let ay = (edge.y + sy * r as f32) / dp + 0.5;
                if ax < 0.0 || ay < 0.0 {
                    break;
                }
                let (ax, ay) = (ax as usize, ay as usize);
                if ax >= cols || ay >= rows {
                    break;
                }
                votes[ay * cols + ax] += 1;
            }
        }
    }

    Accumulator { cols, rows, votes }
}

/// Local maxima above the threshold, strongest first (ties in scan order).
fn centers(acc: &Accumulator, threshold: u32) -> Vec<(usize, u32)> {
    let (cols, rows) = (acc.cols, acc.rows);
    let mut found = Vec::new();
    if cols < 3 || rows < 3 {
        return found;
    }
    for ay in 1..rows - 1 {
        for ax in 1..cols - 1 {
            let i = ay * cols + ax;
            let v = acc.votes[i];
            if v > threshold
                && v > acc.votes[i - 1]
                && v >= acc.votes[i + 1]
                && v > acc.votes[i - cols]
                && v >= acc.votes[i + cols]
            {
                found.push((i, v));
            }
        }
    }
    found.sort_by(|a, b| b.1.cmp(&a.1));
    found
}

/// Radius with the most edge support per unit radius, and its mean edge distance.
fn best_radius(edges: &[EdgePoint], cx: f32, cy: f32, params: &DetectorParams) -> Option<(f32, u32)> {
    let (min_r, max_r) = (params.min_radius as usize, params.max_radius as usize);
    let mut bins = vec![(0u32, 0f32); max_r + 2];
    for edge in edges {
        let d = ((edge.x - cx).powi(2) + (edge.y - cy).powi(2)).sqrt();
        if d < min_r as f32 - 0.5 || d > max_r as f32 + 0.5 {
            continue;
        }
        let bin = &mut bins[(d.round() as usize).min(max_r + 1)];
        bin.0 += 1;
        bin.1 += d;
    }

    let mut best: Option<(f32, u32, f32)> = None;
    for r in min_r..=max_r {
        let (support, sum) = bins[r - 1..=r + 1]
            .iter()
            .fold((0u32, 0f32), |(n, s), (bn, bs)| (n + bn, s + bs));
        if support == 0 {
            continue;
        }
        let score = support as f32 / r as f32;
        if best.map_or(true, |(_, _, top)| score > top) {
            best = Some((sum / support as f32, support, score));
        }
    }
    best.map(|(radius, support, _)| (radius, support))
}

/// Run the full search on a smoothed intensity image.
///
/// Radii beyond the frame diagonal are not searched.
pub(crate) fn find_circles(gray: &GrayImage, params: &DetectorParams) -> Vec<Circle> {
    let diagonal = (gray.width() as f32).hypot(gray.height() as f32).ceil() as u32;
    if params.min_radius > diagonal {
        return Vec::new();
    }
    let params = &DetectorParams {
        max_radius: params.max_radius.min(diagonal),
        ..params.clone()
    };
    let grad = sobel(gray);
    let edges = edge_points(&grad, params.edge_threshold);
    if edges.is_empty() {
        return Vec::new();
    }
    let acc = accumulate(&edges, grad.width, grad.height, params);

    let mut circles: Vec<Circle> = Vec::new();
    for (index, votes) in centers(&acc, params.center_threshold) {
        let cx = (index % acc.cols) as f32 * params.dp;
        let cy = (index / acc.cols) as f32 * params.dp;
        let too_close = circles.iter().any(|c| {
            ((c.x - cx).powi(2) + (c.y - cy).powi(2)).sqrt() < params.min_dist
        });
        if too_close {
            continue;
        }
        let Some((radius, support)) = best_radius(&edges, cx, cy, params) else {
            continue;
        };
        if support > params.center_threshold {
            circles.push(Circle {
                x: cx,
                y: cy,
                radius,
                votes,
            });
        }
    }
    log::trace!(
        "hough: {} edge points, {} circles",
        edges.len(),
        circles.len()
    );
    circles
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn disk(width: u32, height: u32, circles: &[(f32, f32, f32)]) -> GrayImage {
        let img = GrayImage::from_fn(width, height, |x, y| {
            let inside = circles.iter().any(|&(cx, cy, r)| {
                (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2) <= r * r
            });
            Luma([if inside { 255 } else { 0 }])
        });
        image::imageops::blur(&img, 1.5)
    }

    #[test]
    fn finds_single_disk() {
        let img = disk(300, 300, &[(100.0, 100.0, 50.0)]);
        let circles = find_circles(&img, &DetectorParams::default());
        let first = circles.first().expect("circle");
        assert!((first.x - 100.0).abs() <= 3.0, "x={}", first.x);
        assert!((first.y - 100.0).abs() <= 3.0, "y={}", first.y);
        assert!((first.radius - 50.0).abs() <= 3.0, "r={}", first.radius);
    }

    #[test]
    fn finds_two_separated_disks() {
        let img = disk(400, 240, &[(90.0, 120.0, 40.0), (300.0, 120.0, 60.0)]);
        let circles = find_circles(&img, &DetectorParams::default());
        assert!(circles.len() >= 2);
        for (x, r) in [(90.0, 40.0), (300.0, 60.0)] {
            assert!(circles
                .iter()
                .any(|c| (c.x - x).abs() <= 3.0 && (c.radius - r).abs() <= 3.0));
        }
        assert!(circles.windows(2).all(|w| w[0].votes >= w[1].votes));
    }

    #[test]
    fn radius_range_is_bounded_by_the_frame() {
        let img = disk(300, 300, &[(100.0, 100.0, 50.0)]);
        let params = DetectorParams {
            max_radius: 4_000_000_000,
            ..DetectorParams::default()
        };
        let first = *find_circles(&img, &params).first().expect("circle");
        assert!((first.x - 100.0).abs() <= 3.0, "x={}", first.x);
        assert!((first.radius - 50.0).abs() <= 3.0, "r={}", first.radius);

        let params = DetectorParams {
            min_radius: 1_000,
            max_radius: 2_000,
            ..DetectorParams::default()
        };
        assert!(find_circles(&img, &params).is_empty());
    }

    #[test]
    fn blank_image_has_no_edges() {
        let img = GrayImage::from_pixel(120, 80, Luma([128]));
        assert!(find_circles(&img, &DetectorParams::default()).is_empty());
    }

    #[test]
    fn straight_edge_is_not_a_circle() {
        let img = GrayImage::from_fn(300, 300, |x, _| Luma([if x < 150 { 0 } else { 255 }]));
        let img = image::imageops::blur(&img, 1.5);
        assert!(find_circles(&img, &DetectorParams::default()).is_empty());
    }

    #[test]
    fn edges_are_thin() {
        let img = disk(200, 200, &[(100.0, 100.0, 40.0)]);
        let grad = sobel(&img);
        let edges = edge_points(&grad, 80.0);
        // A thinned ring of radius 40 has on the order of 2πr ≈ 250 points.
        assert!(edges.len() > 180 && edges.len() < 500, "{} edges", edges.len());
    }
}
