#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

pub const RELAXATION: &str = "1e-3 4.5e5\n1e-2 3.0e5\n1e-1 1.2e5\n";
pub const DYNAMIC: &str = "0.1 10.0 20.0\n1.0 100.0 150.0\n10.0 900.0 400.0\n";

/// Creates `root/name` holding the given files.
pub fn write_run(root: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("run dir");
    for (file, body) in files {
        fs::write(dir.join(file), body).expect("run file");
    }
    dir
}

/// A run with both outputs and nothing else.
pub fn complete_run(root: &Path, name: &str) -> PathBuf {
    write_run(root, name, &[("gt.dat", RELAXATION), ("gtp.dat", DYNAMIC)])
}

pub fn summary(mw: &str, zero: &str, complex: &str) -> String {
    format!(
        "BoB summary\n[M]_w = {mw}\nzero-shear viscosity = {zero} Pa s\ncomplex-viscosity = {complex}\n"
    )
}
