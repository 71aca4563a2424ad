//! File discovery and the shared per-file directory loop.

use log::{debug, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::errors::{DirScanErr, LoadOutcome};
use super::output::AllResourceConfigs;
use crate::error::IacError;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &[".git", ".terraform", "node_modules"];

fn walker(root: &Path, non_recursive: bool) -> WalkDir {
    let walker = WalkDir::new(root).follow_links(true).sort_by_file_name();
    if non_recursive { walker.max_depth(1) } else { walker }
}

/// Collect every file under `root` accepted by `accept`, in a stable order.
pub fn find_files<F>(root: &Path, non_recursive: bool, accept: F) -> Result<Vec<PathBuf>, IacError>
where
    F: Fn(&Path) -> bool,
{
    let mut files = Vec::new();
    let entries = walker(root, non_recursive).into_iter().filter_entry(|e| {
        e.depth() == 0
            || !e.file_type().is_dir()
            || !SKIPPED_DIRS.contains(&e.file_name().to_string_lossy().as_ref())
    });

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            // only an unreadable root fails the walk
            Err(e) if e.depth() == 0 => return Err(IacError::Io(std::io::Error::other(e.to_string()))),
            Err(e) => {
                warn!("skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if entry.file_type().is_file() && accept(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

/// Collect files whose extension is one of `extensions` (without the dot).
pub fn find_files_by_extension(
    root: &Path,
    extensions: &[&str],
    non_recursive: bool,
) -> Result<Vec<PathBuf>, IacError> {
    find_files(root, non_recursive, |path| has_extension(path, extensions))
}

/// True when `path` ends in one of `extensions` (case-insensitive).
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Path of `path` relative to `root`, falling back to the path itself.
pub fn relative_source(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy().into_owned(),
        _ => path.to_string_lossy().into_owned(),
    }
}

/// File name of `path`, used as source for single-file scans.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Load every file with `load`, recording one [`DirScanErr`] per failing file.
///
/// `label` names the format in the "no files found" error. Files are processed
/// in parallel; results are merged in discovery order.
pub fn load_each<F>(
    iac_type: &'static str,
    label: &'static str,
    root: &Path,
    files: &[PathBuf],
    load: F,
) -> LoadOutcome
where
    F: Fn(&Path) -> Result<AllResourceConfigs, IacError> + Sync,
{
    let mut outcome = LoadOutcome::default();

    if files.is_empty() {
        let err = IacError::NoFilesFound(label, root.display().to_string());
        debug!("{}", err);
        outcome
            .errors
            .push(DirScanErr::new(iac_type, root.display().to_string(), err));
        return outcome;
    }

    let results: Vec<(&PathBuf, Result<AllResourceConfigs, IacError>)> =
        files.par_iter().map(|file| (file, load(file))).collect();

    for (file, result) in results {
        match result {
            Ok(resources) => outcome.resources.merge(resources),
            Err(e) => {
                debug!("error while loading iac file {}: {}", file.display(), e);
                let dir = file.parent().unwrap_or(root).display().to_string();
                outcome.errors.push(DirScanErr::new(
                    iac_type,
                    dir,
                    format!("error while loading iac file '{}', err: {}", file.display(), e),
                ));
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_files_by_extension_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join("b.yaml"), "").unwrap();
        fs::write(dir.path().join("a.yml"), "").unwrap();
        fs::write(dir.path().join("c.txt"), "").unwrap();
        fs::write(dir.path().join("nested/d.YAML"), "").unwrap();
        fs::write(dir.path().join(".git/e.yaml"), "").unwrap();

        let files = find_files_by_extension(dir.path(), &["yaml", "yml"], false).unwrap();
        let names: Vec<_> = files.iter().map(|f| relative_source(dir.path(), f)).collect();
        assert_eq!(names, vec!["a.yml", "b.yaml", "nested/d.YAML"]);

        let shallow = find_files_by_extension(dir.path(), &["yaml", "yml"], true).unwrap();
        assert_eq!(shallow.len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entry_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), "").unwrap();
        fs::write(dir.path().join("z.yaml"), "").unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("m.yaml")).unwrap();

        let files = find_files_by_extension(dir.path(), &["yaml"], false).unwrap();
        let names: Vec<_> = files.iter().map(|f| relative_source(dir.path(), f)).collect();
        assert_eq!(names, vec!["a.yaml", "z.yaml"]);

        assert!(find_files_by_extension(&dir.path().join("nope"), &["yaml"], false).is_err());
    }

    #[test]
    fn test_load_each_partial_failure() {
        let dir = TempDir::new().unwrap();
        let files: Vec<PathBuf> = ["ok1", "bad", "ok2"]
            .iter()
            .map(|n| dir.path().join(n))
            .collect();

        let outcome = load_each("k8s", "kubernetes", dir.path(), &files, |path| {
            if path.ends_with("bad") {
                return Err(IacError::parse(path.display().to_string(), "boom"));
            }
            let mut all = AllResourceConfigs::new();
            all.push(crate::iac::ResourceConfig {
                id: format!("t.{}", base_name(path)),
                resource_type: "t".to_string(),
                ..Default::default()
            });
            Ok(all)
        });

        assert_eq!(outcome.resources.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        let ids: Vec<_> = outcome.resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["t.ok1", "t.ok2"]);
    }

    #[test]
    fn test_load_each_no_files() {
        let dir = TempDir::new().unwrap();
        let outcome = load_each("k8s", "kubernetes", dir.path(), &[], |_| Ok(AllResourceConfigs::new()));
        assert!(outcome.resources.is_empty());
        let msg = &outcome.errors.iter().next().unwrap().err_message;
        assert!(msg.starts_with("kubernetes files not found in the directory"));
    }
}
