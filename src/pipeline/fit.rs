//! Fitting a rendered page onto the exact output canvas.
//!
//! Both policies end with an opaque RGB image of exactly the requested size,
//! whatever the aspect ratio of the typeset content:
//!
//! * [`FitPolicy::Extent`] trims the uniform margin, pads with a white border
//!   and centres the result, cropping when the content is larger than the
//!   canvas. Content keeps its rendered scale.
//! * [`FitPolicy::Scale`] shrinks (never enlarges) the page with Lanczos3 to
//!   fit inside the canvas and centres it on white.

use crate::config::FitPolicy;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Fit `page` onto a `width × height` white canvas according to `policy`.
pub fn fit(page: &DynamicImage, policy: FitPolicy, width: u32, height: u32) -> RgbImage {
    let flat = flatten_on_white(page);
    match policy {
        FitPolicy::Extent { border } => extent(&trim(&flat), border, width, height),
        FitPolicy::Scale => scale_to_fit(&flat, width, height),
    }
}

/// Composite any alpha channel over white and drop it.
pub fn flatten_on_white(page: &DynamicImage) -> RgbImage {
    let rgba = page.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Remove the margin whose colour matches the top-left pixel.
///
/// A page with no other colour trims down to a single pixel.
pub fn trim(img: &RgbImage) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let background = *img.get_pixel(0, 0);

    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, px) in img.enumerate_pixels() {
        if *px == background {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    match bounds {
        Some((x0, y0, x1, y1)) => img.view(x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image(),
        None => RgbImage::from_pixel(1, 1, background),
    }
}

/// Pad with `border` white pixels, then centre on a `width × height` canvas.
pub fn extent(img: &RgbImage, border: u32, width: u32, height: u32) -> RgbImage {
    let padded_w = img.width() as i64 + 2 * border as i64;
    let padded_h = img.height() as i64 + 2 * border as i64;
    let x = (width as i64 - padded_w) / 2 + border as i64;
    let y = (height as i64 - padded_h) / 2 + border as i64;

    let mut canvas = RgbImage::from_pixel(width, height, WHITE);
    imageops::overlay(&mut canvas, img, x, y);
    canvas
}

/// Shrink to fit inside the canvas (never enlarge) and centre on white.
pub fn scale_to_fit(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let mut canvas = RgbImage::from_pixel(width, height, WHITE);
    if w == 0 || h == 0 {
        return canvas;
    }

    let scale = (width as f64 / w as f64)
        .min(height as f64 / h as f64)
        .min(1.0);
    let resized;
    let placed = if scale < 1.0 {
        let nw = ((w as f64 * scale).round() as u32).clamp(1, width);
        let nh = ((h as f64 * scale).round() as u32).clamp(1, height);
        resized = imageops::resize(img, nw, nh, FilterType::Lanczos3);
        &resized
    } else {
        img
    };

    let x = (width - placed.width()) / 2;
    let y = (height - placed.height()) / 2;
    imageops::overlay(&mut canvas, placed, x as i64, y as i64);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    /// A white page with a black box at (x, y) of size (bw, bh).
    fn page_with_box(w: u32, h: u32, x: u32, y: u32, bw: u32, bh: u32) -> RgbImage {
        let mut img = RgbImage::from_pixel(w, h, WHITE);
        for yy in y..y + bh {
            for xx in x..x + bw {
                img.put_pixel(xx, yy, BLACK);
            }
        }
        img
    }

    #[test]
    fn trim_finds_content_box() {
        let img = page_with_box(100, 80, 10, 20, 30, 5);
        let trimmed = trim(&img);
        assert_eq!(trimmed.dimensions(), (30, 5));
        assert_eq!(*trimmed.get_pixel(0, 0), BLACK);
    }

    #[test]
    fn trim_blank_page_is_one_pixel() {
        let img = RgbImage::from_pixel(50, 50, WHITE);
        assert_eq!(trim(&img).dimensions(), (1, 1));
    }

    #[test]
    fn extent_centres_small_content() {
        let content = RgbImage::from_pixel(10, 10, BLACK);
        let out = extent(&content, 20, 100, 60);
        assert_eq!(out.dimensions(), (100, 60));
        assert_eq!(*out.get_pixel(45, 25), BLACK);
        assert_eq!(*out.get_pixel(54, 34), BLACK);
        assert_eq!(*out.get_pixel(44, 25), WHITE);
        assert_eq!(*out.get_pixel(0, 0), WHITE);
    }

    #[test]
    fn extent_crops_large_content() {
        let content = RgbImage::from_pixel(500, 500, BLACK);
        let out = extent(&content, 20, 100, 60);
        assert_eq!(out.dimensions(), (100, 60));
        assert_eq!(*out.get_pixel(0, 0), BLACK);
    }

    #[test]
    fn scale_never_enlarges() {
        let content = RgbImage::from_pixel(10, 10, BLACK);
        let out = scale_to_fit(&content, 800, 600);
        assert_eq!(out.dimensions(), (800, 600));
        assert_eq!(*out.get_pixel(395, 295), BLACK);
        assert_eq!(*out.get_pixel(394, 295), WHITE);
    }

    #[test]
    fn scale_shrinks_any_aspect_ratio() {
        for (w, h) in [(4000, 300), (300, 4000), (1600, 1200), (801, 601)] {
            let content = RgbImage::from_pixel(w, h, BLACK);
            let out = scale_to_fit(&content, 800, 600);
            assert_eq!(out.dimensions(), (800, 600), "input {w}x{h}");
        }
    }

    #[test]
    fn fit_produces_exact_size_for_both_policies() {
        let page = DynamicImage::ImageRgb8(page_with_box(1200, 300, 100, 100, 900, 80));
        for policy in [FitPolicy::Extent { border: 20 }, FitPolicy::Scale] {
            let out = fit(&page, policy, 800, 600);
            assert_eq!(out.dimensions(), (800, 600), "policy {policy:?}");
        }
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut rgba = image::RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let flat = flatten_on_white(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(*flat.get_pixel(0, 0), WHITE);
        assert_eq!(*flat.get_pixel(1, 0), BLACK);
    }
}
