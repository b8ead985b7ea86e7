use image::{ GrayImage, Luma };
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use glyph_lpr::canonical::{ Canonicalizer, GlyphBitmap };
use glyph_lpr::classifier::{ FnClassifier, Prediction };
use glyph_lpr::config::{ CanonicalizerConfig, LprConfig, SegmenterConfig };
use glyph_lpr::error::LprErrorKind;
use glyph_lpr::segment::{ PlateImage, Segmenter };
use glyph_lpr::Lpr;

fn three_bars() -> PlateImage {
    let mut img = GrayImage::from_pixel(600, 300, Luma([255]));
    for x in &[50, 200, 350] {
        draw_filled_rect_mut(&mut img, Rect::at(*x, 90).of_size(40, 120), Luma([0]));
    }
    PlateImage::from_gray(img)
}

/// Bounds of the pixels that differ from `background`, as (x0, y0, x1, y1).
fn ink_bounds(glyph: &GlyphBitmap, background: u8) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in glyph.as_gray().enumerate_pixels() {
        if p.0[0] != background {
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    bounds
}

#[test]
fn three_bars_end_to_end() {
    let segmenter = Segmenter::new(SegmenterConfig::default()).unwrap();
    let canonicalizer = Canonicalizer::new(CanonicalizerConfig::default()).unwrap();
    let plate = segmenter.prepare(&three_bars());
    let boxes = segmenter.segment(&plate);

    let xs: Vec<u32> = boxes.iter().map(|b| b.x).collect();
    assert_eq!(xs, vec![50, 200, 350]);
    for b in &boxes {
        assert_eq!((b.y, b.width, b.height), (90, 40, 120));
        let glyph = canonicalizer.canonicalize(&plate.crop(b, 0)).unwrap();
        assert_eq!(glyph.as_gray().dimensions(), (64, 64));
        let (x0, y0, x1, y1) = ink_bounds(&glyph, 255).unwrap();
        assert!(((x0 + x1) as i32 - 63).abs() <= 2, "{:?}", (x0, x1));
        assert!(((y0 + y1) as i32 - 63).abs() <= 2, "{:?}", (y0, y1));
        assert_eq!(glyph.as_gray().get_pixel(32, 32).0[0], 0);
    }
}

#[test]
fn three_bars_through_orchestrator() {
    let mut labels = vec![21usize, 15, 7].into_iter();
    let classifier = FnClassifier(move |glyph: &GlyphBitmap| {
        assert_eq!(glyph.size(), 64);
        Ok(Prediction { index: labels.next().unwrap_or(0), score: 0.8, time_ms: None })
    });
    let mut lpr = Lpr::with_classifier(&LprConfig::default(), classifier).unwrap();
    let reading = lpr.recognize_plate(&three_bars()).unwrap();
    assert_eq!(reading.text, "LF7");
    assert_eq!(reading.failures(), 0);
}

#[test]
fn white_plate_reads_nothing() {
    let mut calls = 0;
    let classifier = FnClassifier(|_: &GlyphBitmap| {
        calls += 1;
        Ok(Prediction { index: 0, score: 1.0, time_ms: None })
    });
    let mut lpr = Lpr::with_classifier(&LprConfig::default(), classifier).unwrap();
    let reading = lpr.recognize_plate(&PlateImage::from_gray(GrayImage::from_pixel(600, 300, Luma([255])))).unwrap();
    assert_eq!(reading.text, "");
    assert!(reading.characters.is_empty());
    drop(lpr);
    assert_eq!(calls, 0);
}

#[test]
fn zero_width_glyph_is_rejected() {
    let canonicalizer = Canonicalizer::new(CanonicalizerConfig::default()).unwrap();
    let err = canonicalizer.canonicalize(&GrayImage::new(0, 40)).unwrap_err();
    match err.kind() {
        LprErrorKind::EmptyGlyph { width, height } => assert_eq!((*width, *height), (0, 40)),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn single_pixel_stays_single_pixel() {
    let mut config = CanonicalizerConfig::default();
    config.upscale = false;
    let canonicalizer = Canonicalizer::new(config).unwrap();
    let glyph = canonicalizer.canonicalize(&GrayImage::from_pixel(1, 1, Luma([0]))).unwrap();
    assert_eq!(ink_bounds(&glyph, 255), Some((31, 31, 31, 31)));
}

#[test]
fn glyph_dump_writes_one_file_per_character() {
    let dir = std::env::temp_dir().join(format!("glyph-lpr-dump-{}", std::process::id()));
    let mut config = LprConfig::default();
    config.debug_dir = Some(dir.clone());
    let classifier = FnClassifier(|_: &GlyphBitmap| Ok(Prediction { index: 1, score: 1.0, time_ms: None }));
    let mut lpr = Lpr::with_classifier(&config, classifier).unwrap();
    lpr.recognize_plate(&three_bars()).unwrap();
    for i in 0..3 {
        let dumped = image::open(dir.join(format!("char{}.png", i))).unwrap().to_luma8();
        assert_eq!(dumped.dimensions(), (64, 64));
    }
    std::fs::remove_dir_all(&dir).unwrap();
}
