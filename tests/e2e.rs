//! End-to-end integration tests for edgequake-pdf2scan.
//!
//! These tests render real PDF files in `./test_cases/` through pdfium.
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested (a pdfium library must be
//! available, see `PDFIUM_LIB_PATH`).
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_inspect -- --nocapture

use edgequake_pdf2scan::{
    convert, convert_from_bytes, convert_to_file, inspect, ConversionConfig, EmbedEncoding,
    Pdf2ScanError,
};
use lopdf::{Document, Object};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn fast_config(seed: u64) -> ConversionConfig {
    ConversionConfig::builder()
        .dpi(100)
        .seed(seed)
        .build()
        .unwrap()
}

fn media_boxes(pdf: &[u8]) -> Vec<(f32, f32)> {
    let doc = Document::load_mem(pdf).expect("output must parse as PDF");
    let num = |o: &Object| match o {
        Object::Integer(i) => *i as f32,
        Object::Real(r) => *r,
        other => panic!("not a number: {other:?}"),
    };
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_object(*id).unwrap().as_dict().unwrap();
            let mb = page.get(b"MediaBox").unwrap().as_array().unwrap();
            (num(&mb[2]) - num(&mb[0]), num(&mb[3]) - num(&mb[1]))
        })
        .collect()
}

// ── Inspect tests (no rendering) ─────────────────────────────────────────────

#[tokio::test]
async fn test_inspect_sample() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));

    let info = inspect(path.to_str().unwrap(), None)
        .await
        .expect("inspect() should succeed");

    assert!(info.page_count > 0);
    assert_eq!(info.page_sizes.len(), info.page_count);
    assert!(!info.pdf_version.is_empty());
    println!("Info: {:?}", info);
}

#[tokio::test]
async fn test_inspect_nonexistent() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let err = inspect("/definitely/not/a/real/file.pdf", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2ScanError::FileNotFound { .. }), "got {err:?}");
}

// ── Conversion tests ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_convert_preserves_pages_and_sizes() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let input = path.to_str().unwrap();

    let info = inspect(input, None).await.unwrap();
    let output = convert(input, &fast_config(42))
        .await
        .expect("convert() should succeed");

    assert_eq!(output.stats.total_pages, info.page_count);
    assert_eq!(output.stats.fallback_pages, 0);

    let boxes = media_boxes(&output.pdf);
    assert_eq!(boxes.len(), info.page_count);
    for (i, ((w, h), size)) in boxes.iter().zip(&info.page_sizes).enumerate() {
        assert!((w - size.width_pt).abs() < 0.5, "page {i}: {w} vs {}", size.width_pt);
        assert!((h - size.height_pt).abs() < 0.5, "page {i}: {h} vs {}", size.height_pt);
    }

    std::fs::write(output_dir().join("sample_scanned.pdf"), &output.pdf).unwrap();
    println!("{}", serde_json::to_string_pretty(&output.stats).unwrap());
}

#[tokio::test]
async fn test_convert_is_reproducible_with_seed() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let input = path.to_str().unwrap();

    let a = convert(input, &fast_config(2024)).await.unwrap();
    let bytes = std::fs::read(&path).unwrap();
    let b = convert_from_bytes(bytes, &fast_config(2024)).await.unwrap();
    assert_eq!(a.pdf, b.pdf, "same seed must give byte-identical output");

    let c = convert(input, &fast_config(2025)).await.unwrap();
    assert_ne!(a.pdf, c.pdf);
}

#[tokio::test]
async fn test_convert_to_file_jpeg() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.pdf"));
    let out_path = output_dir().join("sample_scanned_jpeg.pdf");
    let _ = std::fs::remove_file(&out_path);

    let config = ConversionConfig::builder()
        .dpi(150)
        .seed(7)
        .embed_encoding(EmbedEncoding::Jpeg { quality: 85 })
        .build()
        .unwrap();
    let stats = convert_to_file(path.to_str().unwrap(), &out_path, &config)
        .await
        .expect("convert_to_file() should succeed");

    let written = std::fs::read(&out_path).unwrap();
    assert_eq!(written.len(), stats.output_bytes);
    assert!(written.starts_with(b"%PDF-"));
    assert_eq!(media_boxes(&written).len(), stats.total_pages);
}

#[tokio::test]
async fn test_convert_rejects_non_pdf() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }

    let err = convert_from_bytes(b"GIF89a not a pdf".to_vec(), &fast_config(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Pdf2ScanError::NotAPdf { .. }), "got {err:?}");
}
