use std::fs;
use std::path::Path;

use criterion::{criterion_group, criterion_main, Criterion};
use tempfile::tempdir;
use visc_core::ParameterCombination;
use visc_dsr::{export_store_file, ingest_tree, ExportOptions, IngestOptions};

fn synthetic_tree(root: &Path, runs: usize, points: usize) {
    let relaxation: String = (0..points)
        .map(|i| format!("{:e} {:e}\n", 1e-4 * 1.1f64.powi(i as i32), 1e6 / (1.0 + i as f64)))
        .collect();
    let dynamic: String = (0..points)
        .map(|i| {
            let w = 1e-3 * 1.1f64.powi(i as i32);
            format!("{w:e} {:e} {:e}\n", w * w * 1e5, w * 1e5)
        })
        .collect();
    for run in 0..runs {
        let combo = ParameterCombination::new(1e4 * (run + 1) as f64, Some(1), Some(2.0));
        let dir = root.join(combo.dir_name());
        fs::create_dir_all(&dir).expect("run dir");
        fs::write(dir.join("gt.dat"), &relaxation).expect("gt");
        fs::write(dir.join("gtp.dat"), &dynamic).expect("gtp");
    }
}

fn bench_ingest(c: &mut Criterion) {
    let tree = tempdir().expect("tree");
    synthetic_tree(tree.path(), 24, 200);
    let db = tree.path().join("simulations.db");
    let opts = IngestOptions {
        sort_by_molecular_weight: true,
        ..IngestOptions::default()
    };
    c.bench_function("ingest_tree_24_runs", |b| {
        b.iter(|| {
            let _ = ingest_tree(tree.path(), &db, &opts).expect("ingest");
        });
    });

    let out = tempdir().expect("out");
    let export = ExportOptions {
        per_run: true,
        distribution_summary: true,
    };
    c.bench_function("export_store_24_runs", |b| {
        b.iter(|| {
            let _ = export_store_file(&db, out.path(), &export).expect("export");
        });
    });
}

criterion_group!(benches, bench_ingest);
criterion_main!(benches);
