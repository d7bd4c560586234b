//! Performance benchmarks for the operation engine
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pdf_tools_mcp::engine::output::InputFile;
use pdf_tools_mcp::engine::params::{PageNumberOptions, WatermarkOptions};
use pdf_tools_mcp::engine::{Engine, Operation};
use pdf_tools_mcp::pdf::document::document_with_pages;
use pdf_tools_mcp::pdf::geometry::{compute_fit_scale, tiled_watermark_anchors};
use pdf_tools_mcp::pdf::{PageSpec, SaveOptions};

fn sample_pdf(pages: usize) -> InputFile {
    let sizes = vec![(595.0, 842.0); pages];
    let data = document_with_pages(&sizes)
        .and_then(|doc| doc.serialize(SaveOptions::default()))
        .expect("Failed to build sample PDF");
    InputFile::new("sample.pdf", data)
}

/// Page tree edits on documents of growing size
fn bench_structure(c: &mut Criterion) {
    let engine = Engine::default();
    let mut group = c.benchmark_group("structure");

    for pages in [10usize, 50, 200] {
        let input = sample_pdf(pages);
        group.throughput(Throughput::Bytes(input.data.len() as u64));

        group.bench_with_input(BenchmarkId::new("split", pages), &input, |b, input| {
            b.iter(|| engine.execute(&Operation::Split, black_box(std::slice::from_ref(input))).unwrap());
        });

        let reversed = Operation::OrganizePages {
            order: PageSpec::from("z-1"),
        };
        group.bench_with_input(BenchmarkId::new("organize_reverse", pages), &input, |b, input| {
            b.iter(|| engine.execute(&reversed, black_box(std::slice::from_ref(input))).unwrap());
        });
    }

    let inputs: Vec<InputFile> = (0..10).map(|_| sample_pdf(10)).collect();
    group.bench_function("merge_10x10", |b| {
        b.iter(|| engine.execute(&Operation::Merge, black_box(&inputs)).unwrap());
    });

    group.finish();
}

/// Overlay generation and content stream appends
fn bench_stamps(c: &mut Criterion) {
    let engine = Engine::default();
    let input = sample_pdf(50);
    let mut group = c.benchmark_group("stamps");

    let numbers = Operation::AddPageNumbers(PageNumberOptions::default());
    group.bench_function("page_numbers_50", |b| {
        b.iter(|| engine.execute(&numbers, black_box(std::slice::from_ref(&input))).unwrap());
    });

    let watermark = Operation::AddWatermark(WatermarkOptions::text("CONFIDENTIAL"));
    group.bench_function("text_watermark_50", |b| {
        b.iter(|| engine.execute(&watermark, black_box(std::slice::from_ref(&input))).unwrap());
    });

    group.bench_function("compress_50", |b| {
        b.iter(|| engine.execute(&Operation::Compress, black_box(std::slice::from_ref(&input))).unwrap());
    });

    group.finish();
}

/// Pure geometry helpers
fn bench_geometry(c: &mut Criterion) {
    let mut group = c.benchmark_group("geometry");

    group.bench_function("fit_scale", |b| {
        b.iter(|| compute_fit_scale(black_box(612.0), black_box(792.0), 800.0, 1000.0, 2.0));
    });

    group.bench_function("tiled_anchors_a4", |b| {
        b.iter(|| tiled_watermark_anchors(black_box(595.0), black_box(842.0), 200.0, 150.0).count());
    });

    group.finish();
}

criterion_group!(benches, bench_structure, bench_stamps, bench_geometry);
criterion_main!(benches);
