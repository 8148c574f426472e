//! Input bundle preparation
//!
//! Accepts either a zipped results export or an already extracted directory
//! and returns the directory the resolver should read from.

use crate::error::{ExtractError, Result};
use crate::resolver::{RAW_DATA_DIR, SUMMARY_FILE};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const ARCHIVE_EXTENSION: &str = "zip";

/// Resolve the input path to an extracted results directory.
///
/// Zip archives are extracted into `extract_to`, or next to the archive with
/// the `.zip` extension removed when no target is given.
pub fn prepare_input(input: &Path, extract_to: Option<&Path>) -> Result<PathBuf> {
    let root = if input.is_dir() {
        input.to_path_buf()
    } else if is_zip(input) {
        let target = match extract_to {
            Some(dir) => dir.to_path_buf(),
            None => input.with_extension(""),
        };
        unzip(input, &target)?;
        target
    } else {
        return Err(ExtractError::MalformedInput(format!(
            "{} is neither a zip archive nor a directory",
            input.display()
        )));
    };

    validate_layout(&root)?;
    Ok(root)
}

fn is_zip(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

/// Extract a zip archive into `target`, creating it if needed
pub fn unzip(archive_path: &Path, target: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    fs::create_dir_all(target)?;
    archive.extract(target)?;
    info!(
        archive = %archive_path.display(),
        target = %target.display(),
        files = archive.len(),
        "Extracted results archive"
    );
    Ok(())
}

/// Check that a directory has the summary table and the raw data directory
pub fn validate_layout(root: &Path) -> Result<()> {
    let summary = root.join(SUMMARY_FILE);
    if !summary.is_file() {
        return Err(ExtractError::MalformedInput(format!(
            "missing {} in {}",
            SUMMARY_FILE,
            root.display()
        )));
    }
    let raw_dir = root.join(RAW_DATA_DIR);
    if !raw_dir.is_dir() {
        return Err(ExtractError::MalformedInput(format!(
            "missing {}/ in {}",
            RAW_DATA_DIR,
            root.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, files: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, contents) in files {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_prepare_zip_extracts_next_to_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("results.zip");
        write_zip(
            &archive,
            &[
                ("data.csv", "versuchspersonenkennung_1\n"),
                ("experiment_data/flanker_arrows.a.txt", "s 1 1 300\n"),
            ],
        );

        let root = prepare_input(&archive, None).unwrap();
        assert_eq!(root, dir.path().join("results"));
        assert!(root.join("experiment_data/flanker_arrows.a.txt").is_file());
    }

    #[test]
    fn test_prepare_zip_into_explicit_target() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("results.zip");
        write_zip(
            &archive,
            &[("data.csv", "x\n"), ("experiment_data/nback2.a.txt", "")],
        );
        let target = dir.path().join("elsewhere");

        let root = prepare_input(&archive, Some(&target)).unwrap();
        assert_eq!(root, target);
        assert!(target.join(SUMMARY_FILE).is_file());
    }

    #[test]
    fn test_prepare_directory_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(SUMMARY_FILE), "x\n").unwrap();
        fs::create_dir(dir.path().join(RAW_DATA_DIR)).unwrap();

        assert_eq!(prepare_input(dir.path(), None).unwrap(), dir.path());
    }

    #[test]
    fn test_non_archive_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.tar");
        fs::write(&path, "not a zip").unwrap();

        let err = prepare_input(&path, None).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedInput(_)));
    }

    #[test]
    fn test_archive_without_raw_data_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("results.zip");
        write_zip(&archive, &[("data.csv", "x\n")]);

        let err = prepare_input(&archive, None).unwrap_err();
        assert!(matches!(err, ExtractError::MalformedInput(ref m) if m.contains(RAW_DATA_DIR)));
    }
}
