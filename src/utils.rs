use image::{ GrayImage, Luma };
use imageproc::{ contrast, point::Point };


/// Index and value of the largest element. Ties keep the first index, as the
/// device firmware does.
pub fn argmax(input: &[f32]) -> Option<(usize, f32)> {
    let mut iter = input.iter().enumerate();
    let (mut index, mut max) = iter.next().map(|(i, v)| (i, *v))?;
    iter.for_each(|(i, v)| {
        if *v > max {
            max = *v;
            index = i;
        }
    });
    Some((index, max))
}

/// Otsu level of `gray`, or `None` when every pixel has the same value and
/// there is nothing to separate.
pub fn otsu_split(gray: &GrayImage) -> Option<u8> {
    let (lo, hi) = gray.pixels().fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if lo >= hi {
        return None;
    }
    Some(contrast::otsu_level(gray))
}

/// Resize by averaging every source pixel a destination pixel covers,
/// weighted by the covered fraction. Shrinking this way does not alias.
pub fn resize_area(src: &GrayImage, new_width: u32, new_height: u32) -> GrayImage {
    let (width, height) = src.dimensions();
    if (width, height) == (new_width, new_height) {
        return src.clone();
    }
    let x_weights = area_weights(width, new_width);
    let y_weights = area_weights(height, new_height);

    GrayImage::from_fn(new_width, new_height, |x, y| {
        let mut acc = 0.0;
        for &(sy, wy) in &y_weights[y as usize] {
            let mut row = 0.0;
            for &(sx, wx) in &x_weights[x as usize] {
                row += wx * src.get_pixel(sx, sy).0[0] as f64;
            }
            acc += wy * row;
        }
        Luma([acc.round().max(0.0).min(255.0) as u8])
    })
}

// per destination index: the source indices it covers and their normalised
// coverage
fn area_weights(src_len: u32, dst_len: u32) -> Vec<Vec<(u32, f64)>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len).map(|d| {
        let start = d as f64 * scale;
        let end = start + scale;
        let first = start.floor() as u32;
        let last = (end.ceil() as u32).min(src_len);
        (first..last).filter_map(|s| {
            let overlap = end.min(s as f64 + 1.0) - start.max(s as f64);
            if overlap > 1e-9 {
                Some((s, overlap / scale))
            } else {
                None
            }
        }).collect()
    }).collect()
}

/// Area of the polygon traced by a contour's points (shoelace formula).
pub fn polygon_area(points: &[Point<u32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice = points.iter().zip(points.iter().cycle().skip(1)).fold(0.0, |acc, (a, b)| {
        acc + a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64
    });
    twice.abs() / 2.0
}

/// Smallest rectangle holding all points, as `[x, y, width, height]`.
pub fn point_bounds(points: &[Point<u32>]) -> Option<[u32; 4]> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some([min_x, min_y, max_x - min_x + 1, max_y - min_y + 1])
}
