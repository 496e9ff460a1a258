//! ファイル変換のテスト
//!
//! 入力フォーマットはバッファのヘッダーから判別されるため、
//! メモリ上で生成した PNG を HEIC として送られてきたファイルに見立てて使う。

use std::io::Cursor;

use heic_converter::{
    CodecError, ConversionOptions, ConvertError, OutputFormat, UploadedFile, convert_heic_buffer,
    convert_heic_file,
};
use image::{ImageFormat, Rgb, RgbImage};

fn sample_image_bytes() -> Vec<u8> {
    png_bytes(&RgbImage::from_fn(96, 64, |x, y| {
        Rgb([(x * 2) as u8, (y * 3) as u8, 128])
    }))
}

fn png_bytes(img: &RgbImage) -> Vec<u8> {
    let mut data = Vec::new();
    img.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .expect("Failed to encode PNG");
    data
}

fn sample_upload() -> UploadedFile {
    UploadedFile {
        field_name: Some("photo".to_string()),
        encoding: Some("7bit".to_string()),
        ..UploadedFile::new(sample_image_bytes())
            .with_original_name("IMG_0001.HEIC")
            .with_mime_type("image/heic")
    }
}

#[test]
fn test_convert_file_to_jpeg() {
    let upload = sample_upload();
    let before = upload.clone();

    let converted = convert_heic_file(&upload, &ConversionOptions::default())
        .expect("Failed to convert sample upload");

    let file = &converted.file;
    assert_eq!(file.mime_type.as_deref(), Some("image/jpeg"));
    assert_eq!(file.original_name.as_deref(), Some("IMG_0001.jpg"));
    assert_eq!(file.size, Some(file.buffer.len()));
    assert!(file.size.unwrap() > 0);

    // JPEG マジックバイト (FF D8 FF) を確認
    assert_eq!(&file.buffer[0..3], &[0xFF, 0xD8, 0xFF]);

    // 変換に関係しない項目は引き継がれる
    assert_eq!(file.field_name.as_deref(), Some("photo"));
    assert_eq!(file.encoding.as_deref(), Some("7bit"));

    // 元のファイルは変更されない
    assert_eq!(upload, before);

    assert_eq!(converted.metrics.original_size, upload.buffer.len());
    assert_eq!(converted.metrics.converted_size, file.buffer.len());
    assert_eq!(converted.metrics.format, OutputFormat::Jpeg);
}

#[test]
fn test_convert_buffer_to_png_and_webp() {
    let data = sample_image_bytes();

    let png = convert_heic_buffer(
        &data,
        &ConversionOptions {
            format: OutputFormat::Png,
            ..Default::default()
        },
    )
    .expect("Failed to convert to PNG");
    assert_eq!(&png.buffer[0..4], &[0x89, 0x50, 0x4E, 0x47]);
    assert_eq!(png.metrics.format, OutputFormat::Png);

    let webp = convert_heic_buffer(
        &data,
        &ConversionOptions {
            format: OutputFormat::Webp,
            quality: 60,
            ..Default::default()
        },
    )
    .expect("Failed to convert to WebP");
    assert_eq!(&webp.buffer[0..4], b"RIFF");
    assert_eq!(&webp.buffer[8..12], b"WEBP");
}

#[test]
fn test_out_of_range_quality_is_accepted() {
    let data = sample_image_bytes();

    for quality in [150, -5, 0, 100] {
        let result = convert_heic_buffer(
            &data,
            &ConversionOptions {
                quality,
                ..Default::default()
            },
        );
        assert!(result.is_ok(), "quality {quality}: {:?}", result.err());
    }
}

#[test]
fn test_corrupt_heic_fails() {
    let upload = UploadedFile::new(b"ftypheic but not really".to_vec())
        .with_original_name("broken.heic")
        .with_mime_type("image/heic");

    let err = convert_heic_file(&upload, &ConversionOptions::default()).unwrap_err();
    assert!(matches!(err, ConvertError::Conversion(_)), "{err:?}");
}

#[test]
fn test_panorama_too_wide_for_webp_fails() {
    // iPhone のパノラマ写真は WebP の上限 (16383px) を超えることがある
    let data = png_bytes(&RgbImage::new(17_000, 2));
    let options = ConversionOptions {
        format: OutputFormat::Webp,
        ..Default::default()
    };

    let err = convert_heic_buffer(&data, &options).unwrap_err();
    assert!(
        matches!(err, ConvertError::Conversion(CodecError::WebP(_))),
        "{err:?}"
    );

    let jpeg = convert_heic_buffer(&data, &ConversionOptions::default());
    assert!(jpeg.is_ok(), "{:?}", jpeg.err());
}
