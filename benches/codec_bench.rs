//! Criterion throughput benchmarks for the four pipelines.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use mic16::{
    delta_rle_fse_compress, delta_rle_fse_decompress, delta_rle_huff_compress,
    delta_rle_huff_decompress, delta_zz_rle_fse_compress, delta_zz_rle_fse_decompress,
    predictive_compress, predictive_decompress, tiled_compress, tiled_decompress,
};

/// Synthetic CT-like slice: smooth ramps with mild deterministic jitter.
fn generate_smooth_image(width: usize, height: usize) -> Vec<u16> {
    let mut state = 0x1234_5678_9ABC_DEF0u64;
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            let jitter = (state >> 60) as usize;
            let base = 900 + x / 2 + y / 3 + ((x * y) % 7) * 3;
            data.push((base + jitter) as u16);
        }
    }
    data
}

/// Deterministic 12-bit noise; the incompressible end of the spectrum.
fn generate_noise_image(width: usize, height: usize) -> Vec<u16> {
    let mut state = 0xDEAD_BEEF_CAFE_F00Du64;
    (0..width * height)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state & 0xFFF) as u16
        })
        .collect()
}

fn bench_compress(c: &mut Criterion) {
    let width = 512;
    let height = 512;
    let smooth = generate_smooth_image(width, height);
    let max = smooth.iter().copied().max().unwrap();

    let mut group = c.benchmark_group("compress_smooth_512");
    group.throughput(Throughput::Bytes((width * height * 2) as u64));
    group.bench_function(BenchmarkId::new("pipeline", "delta_rle_huff"), |b| {
        b.iter(|| delta_rle_huff_compress(black_box(&smooth), width, height, max).unwrap())
    });
    group.bench_function(BenchmarkId::new("pipeline", "delta_rle_fse"), |b| {
        b.iter(|| delta_rle_fse_compress(black_box(&smooth), width, height, max).unwrap())
    });
    group.bench_function(BenchmarkId::new("pipeline", "delta_zz_rle_fse"), |b| {
        b.iter(|| delta_zz_rle_fse_compress(black_box(&smooth), width, height, max).unwrap())
    });
    group.bench_function(BenchmarkId::new("pipeline", "predictive"), |b| {
        b.iter(|| predictive_compress(black_box(&smooth), width, height, max).unwrap())
    });
    group.bench_function(BenchmarkId::new("pipeline", "tiled"), |b| {
        b.iter(|| tiled_compress(black_box(&smooth), width, height).unwrap())
    });
    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let width = 512;
    let height = 512;
    let smooth = generate_smooth_image(width, height);
    let max = smooth.iter().copied().max().unwrap();

    let huff = delta_rle_huff_compress(&smooth, width, height, max).unwrap();
    let fse = delta_rle_fse_compress(&smooth, width, height, max).unwrap();
    let zz = delta_zz_rle_fse_compress(&smooth, width, height, max).unwrap();
    let pred = predictive_compress(&smooth, width, height, max).unwrap();
    let tiled = tiled_compress(&smooth, width, height).unwrap();

    let mut group = c.benchmark_group("decompress_smooth_512");
    group.throughput(Throughput::Bytes((width * height * 2) as u64));
    group.bench_function(BenchmarkId::new("pipeline", "delta_rle_huff"), |b| {
        b.iter(|| delta_rle_huff_decompress(black_box(&huff), width, height).unwrap())
    });
    group.bench_function(BenchmarkId::new("pipeline", "delta_rle_fse"), |b| {
        b.iter(|| delta_rle_fse_decompress(black_box(&fse), width, height).unwrap())
    });
    group.bench_function(BenchmarkId::new("pipeline", "delta_zz_rle_fse"), |b| {
        b.iter(|| delta_zz_rle_fse_decompress(black_box(&zz), width, height).unwrap())
    });
    group.bench_function(BenchmarkId::new("pipeline", "predictive"), |b| {
        b.iter(|| predictive_decompress(black_box(&pred), width, height).unwrap())
    });
    group.bench_function(BenchmarkId::new("pipeline", "tiled"), |b| {
        b.iter(|| tiled_decompress(black_box(&tiled), width, height).unwrap())
    });
    group.finish();
}

fn bench_noise(c: &mut Criterion) {
    let width = 256;
    let height = 256;
    let noise = generate_noise_image(width, height);
    let max = noise.iter().copied().max().unwrap();

    let mut group = c.benchmark_group("compress_noise_256");
    group.throughput(Throughput::Bytes((width * height * 2) as u64));
    group.bench_function("predictive", |b| {
        b.iter(|| predictive_compress(black_box(&noise), width, height, max).unwrap())
    });
    group.bench_function("delta_rle_huff", |b| {
        b.iter(|| delta_rle_huff_compress(black_box(&noise), width, height, max).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress, bench_noise);
criterion_main!(benches);
