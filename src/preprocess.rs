//! Image enhancement ahead of vision/OCR extraction.

use std::path::{Path, PathBuf};

use image::{imageops, ColorType, DynamicImage, GenericImageView, GrayImage, ImageFormat};
use tracing::{debug, info, warn};

use crate::error::DocumentError;

/// Images larger than this on either side are always preprocessed.
const MAX_UNPROCESSED_DIMENSION: u32 = 3000;

const SHARPEN_SIGMA: f32 = 1.0;
const SHARPEN_THRESHOLD: i32 = 1;

/// `dir/preprocessed_<stem>.png` next to the input.
pub fn preprocessed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("preprocessed_{}.png", stem))
}

/// Grayscale, stretch contrast to the full range, sharpen, and write a PNG.
/// Returns the path of the written file.
pub async fn preprocess_image(input: &Path) -> Result<PathBuf, DocumentError> {
    let input = input.to_path_buf();
    let output = preprocessed_path(&input);
    info!("Preprocessing image: {:?}", input);

    let out = output.clone();
    tokio::task::spawn_blocking(move || -> Result<(), DocumentError> {
        let img = image::open(&input).map_err(|e| DocumentError::Image(e.to_string()))?;
        enhance(&img)
            .save_with_format(&out, ImageFormat::Png)
            .map_err(|e| DocumentError::Image(e.to_string()))
    })
    .await
    .map_err(|e| DocumentError::Image(e.to_string()))??;

    info!("Image preprocessed successfully: {:?}", output);
    Ok(output)
}

fn enhance(img: &DynamicImage) -> GrayImage {
    let mut gray = img.to_luma8();
    stretch_contrast(&mut gray);
    imageops::unsharpen(&gray, SHARPEN_SIGMA, SHARPEN_THRESHOLD)
}

/// Linear min/max stretch to 0..=255. Flat images are left unchanged.
fn stretch_contrast(gray: &mut GrayImage) {
    let (min, max) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
    if max <= min {
        return;
    }

    let range = (max - min) as u32;
    for p in gray.pixels_mut() {
        p.0[0] = ((p.0[0] - min) as u32 * 255 / range) as u8;
    }
}

/// True when the image is colour or oversized, or cannot be inspected.
pub async fn should_preprocess(path: &Path) -> bool {
    let path = path.to_path_buf();
    let checked = tokio::task::spawn_blocking(move || image::open(&path)).await;

    match checked {
        Ok(Ok(img)) => {
            let (width, height) = img.dimensions();
            let grayscale = matches!(img.color(), ColorType::L8 | ColorType::L16);
            let needed = !grayscale || width > MAX_UNPROCESSED_DIMENSION || height > MAX_UNPROCESSED_DIMENSION;
            debug!("Image preprocessing needed: {}", needed);
            needed
        }
        Ok(Err(e)) => {
            warn!("Could not analyze image metadata: {}", e);
            true
        }
        Err(e) => {
            warn!("Image inspection task failed: {}", e);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn test_preprocessed_path() {
        assert_eq!(
            preprocessed_path(Path::new("/tmp/uploads/upload-1-abc.jpg")),
            PathBuf::from("/tmp/uploads/preprocessed_upload-1-abc.png")
        );
    }

    #[test]
    fn test_stretch_contrast() {
        let mut gray = GrayImage::from_fn(3, 1, |x, _| Luma([100 + x as u8 * 25]));
        stretch_contrast(&mut gray);
        let values: Vec<u8> = gray.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 127, 255]);

        let mut flat = GrayImage::from_pixel(2, 2, Luma([42]));
        stretch_contrast(&mut flat);
        assert!(flat.pixels().all(|p| p.0[0] == 42));
    }

    #[tokio::test]
    async fn test_preprocess_writes_grayscale_png() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("scan.png");
        RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 90]))
            .save(&input)
            .unwrap();

        let output = preprocess_image(&input).await.unwrap();
        assert_eq!(output, tmp.path().join("preprocessed_scan.png"));

        let written = image::open(&output).unwrap();
        assert_eq!(written.color(), ColorType::L8);
        assert_eq!(written.dimensions(), (16, 16));
    }

    #[tokio::test]
    async fn test_preprocess_rejects_non_image() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("fake.png");
        std::fs::write(&input, b"definitely not a png").unwrap();
        assert!(matches!(preprocess_image(&input).await, Err(DocumentError::Image(_))));
    }

    #[tokio::test]
    async fn test_should_preprocess() {
        let tmp = tempfile::tempdir().unwrap();

        let colour = tmp.path().join("colour.png");
        RgbImage::from_pixel(4, 4, Rgb([1, 2, 3])).save(&colour).unwrap();
        assert!(should_preprocess(&colour).await);

        let gray = tmp.path().join("gray.png");
        GrayImage::from_pixel(4, 4, Luma([9])).save(&gray).unwrap();
        assert!(!should_preprocess(&gray).await);

        let wide = tmp.path().join("wide.png");
        GrayImage::from_pixel(3001, 1, Luma([9])).save(&wide).unwrap();
        assert!(should_preprocess(&wide).await);

        assert!(should_preprocess(&tmp.path().join("missing.png")).await);
    }
}
