#![allow(clippy::module_name_repetitions)]
//! Canonical file paths under the project's `data/` directory.

use std::path::{Path, PathBuf};

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`.
///
/// # Panics
///
/// Panics if the project root cannot be resolved.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .expect("Failed to find project root from CARGO_MANIFEST_DIR")
        .to_path_buf()
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    project_root().join("data")
}

/// Returns the `data/shared/` directory for databases reused across runs.
#[must_use]
pub fn shared_dir() -> PathBuf {
    data_dir().join("shared")
}

/// Returns the `data/reference/` directory for static input tables.
#[must_use]
pub fn reference_dir() -> PathBuf {
    data_dir().join("reference")
}

/// Returns the `data/generated/` directory for output artifacts.
#[must_use]
pub fn generated_dir() -> PathBuf {
    data_dir().join("generated")
}

/// Returns the path for the boundary cache `DuckDB` file.
#[must_use]
pub fn boundary_cache_db_path() -> PathBuf {
    shared_dir().join("boundary_cache.duckdb")
}

/// Returns the path of the conservation status reference CSV.
#[must_use]
pub fn reference_table_path() -> PathBuf {
    reference_dir().join("nynhp-status-list.csv")
}

/// Returns the path of the enriched occurrence Parquet output.
#[must_use]
pub fn output_path() -> PathBuf {
    generated_dir().join("occurrences.parquet")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_live_under_data_dir() {
        let data = data_dir();
        for path in [
            boundary_cache_db_path(),
            reference_table_path(),
            output_path(),
        ] {
            assert!(path.starts_with(&data), "{}", path.display());
        }
        assert_eq!(output_path().extension().unwrap(), "parquet");
    }

    #[test]
    fn ensure_dir_is_idempotent() {
        let dir = std::env::temp_dir().join("species_map_paths_ensure_dir/nested");
        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
        let _ = std::fs::remove_dir_all(dir.parent().unwrap());
    }
}
