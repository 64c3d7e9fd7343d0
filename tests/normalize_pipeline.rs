//! End-to-end normalization with real encoded images.
//!
//! Source images are generated in memory with the `image` crate, pushed
//! through the public API, and the output is decoded again to check what
//! actually landed on disk or in memory.
//!
//! Run with: cargo test --test normalize_pipeline

use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};
use pinstar_media::imaging::{Limits, NormalizeSettings, SourceImage};
use pinstar_media::media::TargetEncoding;
use pinstar_media::process::{self, EntryOutcome};
use pinstar_media::upload::{self, SignatureAlgorithm, UploadCredentials, UploadPolicy};
use pinstar_media::{NormalizeError, Normalizer};
use std::io::Cursor;
use tempfile::TempDir;

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    // GIF encoding wants RGBA input
    let img = match format {
        ImageFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => img,
    };
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, format).unwrap();
    cursor.into_inner()
}

fn gradient(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 96])
    });
    encode(DynamicImage::ImageRgb8(img), format)
}

/// High-entropy pixels that JPEG cannot compress well.
fn noise(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let h = x
            .wrapping_mul(2_654_435_761)
            .wrapping_add(y.wrapping_mul(2_246_822_519))
            .rotate_left(13);
        image::Rgb([h as u8, (h >> 8) as u8, (h >> 16) as u8])
    });
    encode(DynamicImage::ImageRgb8(img), ImageFormat::Png)
}

fn decoded_dimensions(bytes: &[u8], format: ImageFormat) -> (u32, u32) {
    let img = ImageReader::with_format(Cursor::new(bytes), format)
        .decode()
        .unwrap();
    (img.width(), img.height())
}

#[test]
fn large_png_is_downscaled_to_jpeg_within_budget() {
    let normalizer = Normalizer::default();
    let image = normalizer
        .normalize(&SourceImage::new(
            gradient(2400, 1200, ImageFormat::Png),
            "image/png",
        ))
        .unwrap();

    assert_eq!((image.width, image.height), (1920, 960));
    assert!(image.within_budget);
    assert!(image.len() <= 1024 * 1024);
    assert_eq!(image.quality.percent(), 90);
    assert_eq!(
        decoded_dimensions(&image.bytes, ImageFormat::Jpeg),
        (1920, 960)
    );
    assert_eq!(
        normalizer.previews().mime_of(image.preview.url()),
        Some("image/jpeg")
    );
}

#[test]
fn small_gif_keeps_its_dimensions() {
    let normalizer = Normalizer::default();
    let image = normalizer
        .normalize(&SourceImage::new(
            gradient(120, 80, ImageFormat::Gif),
            "image/gif",
        ))
        .unwrap();

    assert_eq!((image.width, image.height), (120, 80));
    assert_eq!(decoded_dimensions(&image.bytes, ImageFormat::Jpeg), (120, 80));
}

#[test]
fn portrait_webp_fits_the_height_bound() {
    let normalizer = Normalizer::default();
    let image = normalizer
        .normalize(&SourceImage::new(
            gradient(1500, 2000, ImageFormat::WebP),
            "image/webp",
        ))
        .unwrap();

    assert_eq!((image.width, image.height), (1440, 1920));
}

#[test]
fn noise_under_tiny_budget_ends_at_floor() {
    let settings = NormalizeSettings {
        limits: Limits {
            max_bytes: 1000,
            ..Limits::default()
        },
        ..NormalizeSettings::default()
    };
    let normalizer = Normalizer::new(settings);
    let image = normalizer
        .normalize(&SourceImage::new(noise(256, 256), "image/png"))
        .unwrap();

    assert!(!image.within_budget);
    assert_eq!(image.quality.percent(), 50);
    let qualities: Vec<u8> = image.attempts.iter().map(|a| a.quality.percent()).collect();
    assert_eq!(qualities, vec![90, 80, 70, 60, 50]);
    // Lower quality never produces a larger noise JPEG
    assert!(image.attempts[4].size <= image.attempts[0].size);
}

#[test]
fn unsupported_and_corrupt_inputs_are_rejected() {
    let normalizer = Normalizer::default();

    let err = normalizer
        .normalize(&SourceImage::new(b"%PDF-1.7".to_vec(), "application/pdf"))
        .unwrap_err();
    assert!(matches!(err, NormalizeError::UnsupportedType(_)));

    let mut truncated = gradient(64, 64, ImageFormat::Png);
    truncated.truncate(40);
    let err = normalizer
        .normalize(&SourceImage::new(truncated, "image/png"))
        .unwrap_err();
    assert!(matches!(err, NormalizeError::Decode(_)));
    assert!(normalizer.previews().is_empty());
}

#[test]
fn avif_target_produces_avif() {
    let settings = NormalizeSettings {
        target: TargetEncoding::Avif,
        ..NormalizeSettings::default()
    };
    let image = Normalizer::new(settings)
        .normalize(&SourceImage::new(
            gradient(64, 48, ImageFormat::Png),
            "image/png",
        ))
        .unwrap();

    assert_eq!(image.encoding, TargetEncoding::Avif);
    assert_eq!(&image.bytes[4..8], b"ftyp");
    assert!(image.data_url().starts_with("data:image/avif;base64,"));
}

#[test]
fn renormalizing_output_keeps_dimensions_for_every_target() {
    for target in [TargetEncoding::Jpeg, TargetEncoding::Avif] {
        let settings = NormalizeSettings {
            limits: Limits {
                max_width: 96,
                max_height: 96,
                ..Limits::default()
            },
            target,
            ..NormalizeSettings::default()
        };
        let normalizer = Normalizer::new(settings);
        let first = normalizer
            .normalize(&SourceImage::new(
                gradient(160, 100, ImageFormat::Png),
                "image/png",
            ))
            .unwrap();
        assert_eq!((first.width, first.height), (96, 60));

        let second = normalizer
            .normalize(&SourceImage::new(first.bytes.to_vec(), first.encoding.mime()))
            .unwrap();
        assert_eq!(second.source_type, target.media_type());
        assert_eq!((second.width, second.height), (first.width, first.height));
    }
}

#[tokio::test]
async fn async_normalization_from_runtime() {
    let normalizer = Normalizer::default();
    let image = normalizer
        .normalize_async(SourceImage::new(
            gradient(300, 200, ImageFormat::Jpeg),
            "image/jpg",
        ))
        .await
        .unwrap();
    assert_eq!((image.width, image.height), (300, 200));
}

#[test]
fn batch_process_writes_decodable_files() {
    let tmp = TempDir::new().unwrap();
    let input_dir = tmp.path().join("in");
    let out_dir = tmp.path().join("out");
    std::fs::create_dir_all(&input_dir).unwrap();

    let wide = input_dir.join("wide.png");
    std::fs::write(&wide, gradient(2400, 600, ImageFormat::Png)).unwrap();
    let notes = input_dir.join("notes.txt");
    std::fs::write(&notes, "not an image").unwrap();

    let manifest = process::process(
        &[wide, notes],
        &out_dir,
        &NormalizeSettings::default(),
        None,
    )
    .unwrap();

    assert_eq!(manifest.normalized_count(), 1);
    assert_eq!(manifest.failed_count(), 1);
    assert!(matches!(
        manifest.entries[1].outcome,
        EntryOutcome::Failed { .. }
    ));

    let written = std::fs::read(out_dir.join("wide.jpg")).unwrap();
    assert_eq!(decoded_dimensions(&written, ImageFormat::Jpeg), (1920, 480));
    assert!(out_dir.join(process::MANIFEST_FILE).exists());
}

#[test]
fn normalized_image_flows_into_upload_form() {
    let normalizer = Normalizer::default();
    let image = normalizer
        .normalize(&SourceImage::new(
            gradient(200, 100, ImageFormat::Png),
            "image/png",
        ))
        .unwrap();

    let credentials = UploadCredentials {
        cloud_name: "demo".into(),
        api_key: "1234".into(),
        api_secret: "abcd".into(),
        signature_algorithm: SignatureAlgorithm::Sha1,
    };
    let signature = upload::create_signature(&credentials, "pins", 1_700_000_000);
    let form =
        upload::prepare_upload(&image, &signature, "photo.png", UploadPolicy::default()).unwrap();

    assert_eq!(form.file_name, "photo.jpg");
    assert_eq!(form.file.len(), image.len());
    assert_eq!(form.field("folder"), Some("pins"));
    assert_eq!(
        form.field("signature"),
        Some("1bbc31d8350e3b0fa61f32b94048381253ab3fff")
    );
}
