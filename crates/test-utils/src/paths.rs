//! Temporary directories and file helpers for tests.

use std::fs;
use std::path::{Path, PathBuf};

/// Creates a temporary directory for test output.
///
/// The directory is automatically cleaned up when the returned TempDir is dropped.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temporary test directory")
}

/// Creates empty files with the given names under `dir` and returns their paths.
pub fn touch_files(dir: &Path, names: &[String]) -> Vec<PathBuf> {
    fs::create_dir_all(dir).expect("Failed to create fixture directory");
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            fs::write(&path, b"").expect("Failed to create fixture file");
            path
        })
        .collect()
}

/// Writes `contents` to `dir/name` and returns the path.
pub fn write_text_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    fs::create_dir_all(dir).expect("Failed to create fixture directory");
    let path = dir.join(name);
    fs::write(&path, contents).expect("Failed to write fixture file");
    path
}

/// Renders an ASCII grid with a tab-separated header.
pub fn ascii_grid_text(
    ncols: usize,
    nrows: usize,
    xll: f64,
    yll: f64,
    cellsize: f64,
    nodata: f32,
    values: &[f32],
) -> String {
    let mut text = format!(
        "ncols\t{}\nnrows\t{}\nxllcorner\t{}\nyllcorner\t{}\ncellsize\t{}\nNODATA_value\t{}\n",
        ncols, nrows, xll, yll, cellsize, nodata
    );
    for row in values.chunks(ncols) {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        text.push_str(&line.join("\t"));
        text.push('\n');
    }
    text
}
