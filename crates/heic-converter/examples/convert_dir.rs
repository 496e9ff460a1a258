//! ディレクトリ内の HEIC/HEIF ファイルを一括変換する。
//!
//! ## Usage
//!
//! ```sh
//! cargo run --example convert_dir -- <input_dir> <output_dir> [jpeg|png|webp] [quality]
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use heic_converter::{
    ConversionOptions, ConversionStats, UploadedFile, convert_heic_file, is_heic_file,
};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if !(3..=5).contains(&args.len()) {
        eprintln!(
            "Usage: {} <input_dir> <output_dir> [jpeg|png|webp] [quality]",
            args[0]
        );
        return ExitCode::FAILURE;
    }

    let input_dir = PathBuf::from(&args[1]);
    let output_dir = PathBuf::from(&args[2]);

    let options = match ConversionOptions::from_request(
        args.get(3).map(String::as_str),
        args.get(4).and_then(|q| q.parse().ok()),
    ) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if !input_dir.is_dir() {
        eprintln!(
            "Error: input directory does not exist: {}",
            input_dir.display()
        );
        return ExitCode::FAILURE;
    }

    if !output_dir.exists()
        && let Err(e) = std::fs::create_dir_all(&output_dir)
    {
        eprintln!("Error: failed to create output directory: {}", e);
        return ExitCode::FAILURE;
    }

    let entries = match std::fs::read_dir(&input_dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error: failed to read input directory: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let stats = ConversionStats::new();

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let candidate = UploadedFile::default().with_original_name(filename);
        if !is_heic_file(&candidate) {
            continue;
        }

        let upload = match std::fs::read(&path) {
            Ok(data) => UploadedFile::new(data).with_original_name(filename),
            Err(e) => {
                eprintln!("FAIL: {} - failed to read: {}", filename, e);
                stats.add_conversion(0, 0, Duration::ZERO, false);
                continue;
            }
        };

        match convert_heic_file(&upload, &options) {
            Ok(converted) => {
                let output_filename = converted.file.display_name().to_string();
                let output_path = output_dir.join(&output_filename);
                match std::fs::write(&output_path, &converted.file.buffer) {
                    Ok(()) => {
                        let m = converted.metrics;
                        println!(
                            "OK: {} -> {} ({} -> {} bytes, {:.1}% smaller, {} ms)",
                            filename,
                            output_filename,
                            m.original_size,
                            m.converted_size,
                            m.compression_ratio(),
                            m.conversion_time_ms()
                        );
                        stats.add_conversion(
                            m.original_size,
                            m.converted_size,
                            m.conversion_time,
                            true,
                        );
                    }
                    Err(e) => {
                        eprintln!("FAIL: {} - failed to write output: {}", filename, e);
                        stats.add_conversion(upload.len(), 0, Duration::ZERO, false);
                    }
                }
            }
            Err(e) => {
                eprintln!("FAIL: {} - conversion error: {}", filename, e);
                stats.add_conversion(upload.len(), 0, Duration::ZERO, false);
            }
        }
    }

    let summary = stats.snapshot();
    println!();
    println!(
        "Total: {}, Success: {}, Failed: {}, Average time: {:.0} ms",
        summary.conversions,
        summary.conversions - summary.errors,
        summary.errors,
        summary.average_time
    );

    if summary.conversions == 0 {
        eprintln!("Error: no HEIC/HEIF files found in {}", input_dir.display());
        return ExitCode::FAILURE;
    }

    if summary.errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
