use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::FileOptions;

/// Files a finished run leaves behind.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub last_file: Option<PathBuf>,
    pub archive: Option<PathBuf>,
}

/// Every regular file under `dir`, sorted by path.
pub fn produced_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// The most recently modified file among `files`.
pub fn newest(files: &[PathBuf]) -> Option<PathBuf> {
    files
        .iter()
        .filter_map(|p| {
            let mtime = p.metadata().and_then(|m| m.modified()).ok()?;
            Some((mtime, p))
        })
        .max_by_key(|(mtime, _)| *mtime)
        .map(|(_, p)| p.clone())
}

/// Zip `files` (all under `root`) into `dest`, naming entries by their
/// path relative to `root`.
pub fn zip_dir(root: &Path, files: &[PathBuf], dest: &Path) -> Result<()> {
    let file = File::create(dest)
        .with_context(|| format!("Failed to create archive {}", dest.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in files {
        let name = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        zip.start_file(name, options)
            .with_context(|| format!("Failed to add {} to archive", path.display()))?;
        let mut src = File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        io::copy(&mut src, &mut zip)
            .with_context(|| format!("Failed to archive {}", path.display()))?;
    }

    let mut file = zip.finish().context("Failed to finish archive")?;
    file.flush()?;
    Ok(())
}

/// Scan the run's output directory: record the newest file and, when the
/// directory is not empty, archive it to `archive_path`.
pub fn collect(outdir: &Path, archive_path: &Path) -> Result<Artifacts> {
    let files = produced_files(outdir);
    if files.is_empty() {
        return Ok(Artifacts::default());
    }
    let last_file = newest(&files);
    zip_dir(outdir, &files, archive_path)?;
    Ok(Artifacts {
        last_file,
        archive: Some(archive_path.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn test_empty_dir_has_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run");
        std::fs::create_dir_all(&out).unwrap();
        let zip_path = dir.path().join("run.zip");
        let artifacts = collect(&out, &zip_path).unwrap();
        assert_eq!(artifacts, Artifacts::default());
        assert!(!zip_path.exists());
    }

    #[test]
    fn test_missing_dir_has_no_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = collect(&dir.path().join("absent"), &dir.path().join("x.zip")).unwrap();
        assert!(artifacts.last_file.is_none());
    }

    #[test]
    fn test_collect_archives_and_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("run");
        std::fs::create_dir_all(out.join("sub")).unwrap();
        std::fs::write(out.join("messages.csv"), "row_id\n").unwrap();
        std::fs::write(out.join("sub/notes.txt"), "hi").unwrap();
        let old = SystemTime::now() - std::time::Duration::from_secs(60);
        File::options()
            .write(true)
            .open(out.join("sub/notes.txt"))
            .unwrap()
            .set_modified(old)
            .unwrap();

        let zip_path = dir.path().join("run.zip");
        let artifacts = collect(&out, &zip_path).unwrap();
        assert_eq!(artifacts.last_file, Some(out.join("messages.csv")));
        assert_eq!(artifacts.archive, Some(zip_path.clone()));

        let mut archive = zip::ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        assert_eq!(names, vec!["messages.csv", "sub/notes.txt"]);
        let mut body = String::new();
        archive
            .by_name("sub/notes.txt")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        assert_eq!(body, "hi");
    }
}
