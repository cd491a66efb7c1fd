use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use songloader::registry::FileRegistry;
use songloader::sources::models::sanitize_component;
use std::path::PathBuf;
use tempfile::TempDir;

fn populated(files: usize) -> (TempDir, FileRegistry) {
    let temp = TempDir::new().expect("temp dir");
    let out = temp.path().join("downloads");
    let conv = temp.path().join("converted");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::create_dir_all(&conv).unwrap();
    for i in 0..files {
        let dir = if i % 3 == 0 { &conv } else { &out };
        std::fs::write(dir.join(format!("Artist {} - Track {}.mp3", i % 17, i)), b"x").unwrap();
    }
    let registry = FileRegistry::new(out, conv);
    (temp, registry)
}

fn benchmark_refresh(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("Registry Refresh");

    for files in [10, 100, 1000] {
        let (_temp, registry) = populated(files);
        rt.block_on(registry.refresh()).unwrap();
        registry.select_indices(&(0..files).step_by(2).collect::<Vec<_>>());

        group.bench_with_input(BenchmarkId::from_parameter(files), &files, |b, _| {
            b.iter(|| rt.block_on(registry.refresh()).unwrap())
        });
    }

    group.finish();
}

fn benchmark_selection(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (_temp, registry) = populated(1000);
    rt.block_on(registry.refresh()).unwrap();
    let paths: Vec<PathBuf> = registry.files().into_iter().map(|f| f.path).step_by(3).collect();

    let mut group = c.benchmark_group("Registry Selection");
    group.bench_function("select_paths", |b| {
        b.iter(|| registry.select(black_box(&paths[..])))
    });
    group.bench_function("selected", |b| b.iter(|| registry.selected()));
    group.bench_function("rows", |b| b.iter(|| registry.rows()));
    group.finish();
}

fn benchmark_sanitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Track File Names");
    group.bench_function("plain", |b| {
        b.iter(|| sanitize_component(black_box("Artist - Title")))
    });
    group.bench_function("separators", |b| {
        b.iter(|| sanitize_component(black_box("AC/DC - Back in Black: Live?")))
    });
    group.finish();
}

criterion_group!(benches, benchmark_refresh, benchmark_selection, benchmark_sanitize);
criterion_main!(benches);
