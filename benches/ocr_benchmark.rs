use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cutlist_ocr::{detect, parse, rectify, DetectConfig, ParseConfig, RectifyConfig};
use image::{GrayImage, Luma};

/// A synthetic cut-list sheet with a handful of text-like bars.
fn synthetic_sheet() -> GrayImage {
    let mut img = GrayImage::from_pixel(1200, 900, Luma([255]));
    for row in 0..6u32 {
        let y = 80 + row * 130;
        for yy in y..y + 18 {
            for xx in 100..500 {
                img.put_pixel(xx, yy, Luma([0]));
            }
        }
    }
    img
}

fn benchmark_parse(c: &mut Criterion) {
    let cfg = ParseConfig::default();
    let text = "2=700x400 3 500x300 40000x500 1 1200x600";
    c.bench_function("parse_measurements", |b| {
        b.iter(|| parse(black_box(text), &cfg))
    });
}

fn benchmark_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("detection");
    group.sample_size(20);

    let img = synthetic_sheet();
    let cfg = DetectConfig::default();
    group.bench_function("synthetic_sheet", |b| {
        b.iter(|| detect(black_box(&img), &cfg))
    });

    group.finish();
}

fn benchmark_rectify(c: &mut Criterion) {
    let mut group = c.benchmark_group("rectify");
    group.sample_size(10);

    let img = synthetic_sheet();
    let cfg = RectifyConfig::default();
    group.bench_function("synthetic_sheet", |b| {
        b.iter(|| rectify(black_box(&img), &cfg))
    });

    group.finish();
}

criterion_group!(benches, benchmark_parse, benchmark_detection, benchmark_rectify);
criterion_main!(benches);
