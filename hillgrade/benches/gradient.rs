use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geo::{line_string, LineString, MultiLineString};
use hillgrade::coverage::write_coverage;
use hillgrade::{
    compute_network, compute_segment_stats, ElevationService, GradientOptions, RasterGeometry,
    RoadGeometry, RoadProperties, RoadSegment,
};
use tempfile::TempDir;

const SIZE: u32 = 2000;
const PIXEL: f64 = 1.0;
const ORIGIN_X: f64 = 520000.0;
const ORIGIN_Y: f64 = 6172000.0;

/// Create a synthetic 2 km x 2 km coverage of rolling terrain at 1 m resolution.
fn create_coverage(dir: &Path) -> ElevationService {
    let geometry = RasterGeometry {
        width: SIZE,
        height: SIZE,
        origin_x: ORIGIN_X,
        origin_y: ORIGIN_Y,
        pixel_width: PIXEL,
        pixel_height: PIXEL,
        nodata: -9999.0,
        epsg: 25832,
    };
    let mut data = Vec::with_capacity((SIZE * SIZE) as usize);
    for row in 0..SIZE {
        for col in 0..SIZE {
            let (x, y) = (col as f64 / 150.0, row as f64 / 200.0);
            data.push((60.0 + 25.0 * x.sin() + 15.0 * y.cos()) as f32);
        }
    }

    let path = dir.join("merged_dtm.cov");
    write_coverage(&path, &geometry, &data).unwrap();
    ElevationService::new(path)
}

/// A zig-zag road of about 1.8 km.
fn long_road() -> LineString<f64> {
    line_string![
        (x: ORIGIN_X + 100.0, y: ORIGIN_Y - 100.0),
        (x: ORIGIN_X + 700.0, y: ORIGIN_Y - 500.0),
        (x: ORIGIN_X + 200.0, y: ORIGIN_Y - 900.0),
        (x: ORIGIN_X + 900.0, y: ORIGIN_Y - 1300.0),
    ]
}

fn bench_sample_elevation(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let service = create_coverage(tmp.path());

    // Open the coverage
    let _ = service.sample_elevation(ORIGIN_X + 1.0, ORIGIN_Y - 1.0);

    c.bench_function("sample_elevation", |b| {
        b.iter(|| {
            black_box(
                service
                    .sample_elevation(black_box(ORIGIN_X + 1234.5), black_box(ORIGIN_Y - 987.6))
                    .unwrap(),
            );
        });
    });
}

fn bench_sample_along_line(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let service = create_coverage(tmp.path());
    let line = long_road();

    c.bench_function("sample_along_line_10m", |b| {
        b.iter(|| {
            black_box(service.sample_along_line(black_box(&line), 10.0).unwrap());
        });
    });
}

fn bench_segment_stats(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let service = create_coverage(tmp.path());
    let coverage = service.coverage().unwrap();

    let single = RoadGeometry::Line(long_road());
    let multi = RoadGeometry::MultiLine(MultiLineString::new(vec![
        long_road(),
        line_string![(x: ORIGIN_X + 1500.0, y: ORIGIN_Y - 100.0), (x: ORIGIN_X + 1500.0, y: ORIGIN_Y - 1900.0)],
    ]));

    let mut group = c.benchmark_group("segment_stats");
    for (name, options) in [
        ("smoothed", GradientOptions::default()),
        ("raw", GradientOptions::default().smoothing(false)),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                black_box(compute_segment_stats(coverage.as_ref(), &single, &options).unwrap());
            });
        });
    }
    group.bench_function("multi_part", |b| {
        b.iter(|| {
            black_box(
                compute_segment_stats(coverage.as_ref(), &multi, &GradientOptions::default())
                    .unwrap(),
            );
        });
    });
    group.finish();
}

fn bench_network(c: &mut Criterion) {
    let tmp = TempDir::new().unwrap();
    let service = create_coverage(tmp.path());
    let options = GradientOptions::default();

    // 500 short roads spread over the coverage
    let roads: Vec<RoadSegment> = (0..500)
        .map(|i| {
            let x = ORIGIN_X + 50.0 + (i % 25) as f64 * 75.0;
            let y = ORIGIN_Y - 50.0 - (i / 25) as f64 * 95.0;
            RoadSegment::new(
                RoadProperties::with_id(i.to_string()),
                RoadGeometry::Line(line_string![(x: x, y: y), (x: x + 60.0, y: y - 80.0)]),
            )
        })
        .collect();

    c.bench_function("network_500_roads", |b| {
        b.iter(|| {
            let mut batch = roads.clone();
            black_box(compute_network(&service, &mut batch, &options, None).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_sample_elevation,
    bench_sample_along_line,
    bench_segment_stats,
    bench_network,
);
criterion_main!(benches);
