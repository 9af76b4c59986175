//! Filesystem helpers shared by the source providers and post-build copy
//!
//! The tree copy is interruptible at per-file granularity: the
//! cancellation flag is checked before every file, so a stop request lands
//! within one file's worth of work. Copies merge into an existing
//! destination (existing files are overwritten, never duplicated), which
//! makes repeating a copy against the same destination idempotent.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::cancel::CancelFlag;
use crate::error::Result;

/// Prefix for working-copy directories, recognizable by the leftover
/// sweep in case a previous run never got to clean up.
pub const TEMP_PREFIX: &str = "parbuild-";

/// Directories Unity regenerates on demand; copying them would drag
/// gigabytes of disposable cache data into every working copy.
pub const UNITY_IGNORE_DIRS: &[&str] = &["Temp", "Logs"];

/// Recursively copy `src` into `dst`, skipping the named top-level
/// directories, checking `cancel` before each file and invoking `on_file`
/// after each one copied. Returns the number of files copied.
///
/// A cancelled copy returns [`crate::Error::Interrupted`] and leaves the
/// partial destination in place for the caller to discard.
pub fn copy_tree(
    src: &Path,
    dst: &Path,
    ignore_top_level: &[&str],
    cancel: &CancelFlag,
    on_file: &mut dyn FnMut(&Path),
) -> Result<u64> {
    if !src.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source directory {} does not exist", src.display()),
        )
        .into());
    }

    fs::create_dir_all(dst)?;
    let mut copied = 0u64;

    let walker = WalkDir::new(src).into_iter().filter_entry(|entry| {
        !(entry.depth() == 1
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| ignore_top_level.contains(&name)))
    });

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields paths under its root");
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            cancel.check()?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &target)?;
            copied += 1;
            on_file(entry.path());
        }
    }

    Ok(copied)
}

/// Delete a directory tree without raising: an already-gone path is fine,
/// and on Windows a failed removal is retried through a verbatim path to
/// get past the legacy path-length limit.
pub fn remove_tree_best_effort(path: &Path) {
    match fs::remove_dir_all(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(_) => {
            #[cfg(windows)]
            {
                let verbatim = std::path::PathBuf::from(format!(r"\\?\{}", path.display()));
                let _ = fs::remove_dir_all(verbatim);
            }
        }
    }
}

/// Remove leftover working-copy directories under `dir` from runs that
/// never cleaned up. Returns how many were swept.
pub fn sweep_leftovers(dir: &Path) -> io::Result<usize> {
    let mut swept = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(TEMP_PREFIX) && entry.file_type()?.is_dir() {
            remove_tree_best_effort(&entry.path());
            swept += 1;
        }
    }
    Ok(swept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;

    fn write_file(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| {
                e.path()
                    .strip_prefix(dir)
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_copy_skips_ignored_top_level_dirs_only() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write_file(&src.path().join("Assets/scene.unity"), "scene");
        write_file(&src.path().join("Temp/cache.bin"), "cache");
        write_file(&src.path().join("Logs/editor.log"), "log");
        write_file(&src.path().join("Assets/Temp/keep.txt"), "nested Temp kept");

        let copied = copy_tree(
            src.path(),
            dst.path(),
            UNITY_IGNORE_DIRS,
            &CancelFlag::new(),
            &mut |_| {},
        )
        .unwrap();

        assert_eq!(copied, 2);
        assert!(dst.path().join("Assets/scene.unity").exists());
        assert!(dst.path().join("Assets/Temp/keep.txt").exists());
        assert!(!dst.path().join("Temp").exists());
        assert!(!dst.path().join("Logs").exists());
    }

    #[test]
    fn test_copy_twice_is_idempotent_merge() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write_file(&src.path().join("a.txt"), "one");
        write_file(&src.path().join("sub/b.txt"), "two");

        copy_tree(src.path(), dst.path(), &[], &CancelFlag::new(), &mut |_| {}).unwrap();
        let first = file_names(dst.path());
        copy_tree(src.path(), dst.path(), &[], &CancelFlag::new(), &mut |_| {}).unwrap();
        let second = file_names(dst.path());

        assert_eq!(first, second);
        assert_eq!(
            fs::read_to_string(dst.path().join("a.txt")).unwrap(),
            "one"
        );
    }

    #[test]
    fn test_copy_missing_source_fails() {
        let dst = tempfile::tempdir().unwrap();
        let err = copy_tree(
            Path::new("/definitely/not/here"),
            dst.path(),
            &[],
            &CancelFlag::new(),
            &mut |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_cancelled_before_start_copies_nothing() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        write_file(&src.path().join("a.txt"), "one");

        let cancel = CancelFlag::new();
        cancel.set();
        let err = copy_tree(src.path(), dst.path(), &[], &cancel, &mut |_| {}).unwrap_err();

        assert!(err.is_interrupt());
        assert!(!dst.path().join("a.txt").exists());
    }

    #[test]
    fn test_cancel_mid_copy_stops_within_one_file() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        for i in 0..1000 {
            write_file(&src.path().join(format!("f{i:04}.txt")), "x");
        }

        let cancel = CancelFlag::new();
        let mut seen = 0u32;
        let flag = cancel.clone();
        let err = copy_tree(src.path(), dst.path(), &[], &cancel, &mut |_| {
            std::thread::sleep(Duration::from_millis(10));
            seen += 1;
            if seen == 5 {
                flag.set();
            }
        })
        .unwrap_err();

        assert!(err.is_interrupt());
        // The flag is checked before every file: nothing past the file in
        // flight when the flag went up may be copied.
        assert_eq!(seen, 5);
        assert!(file_names(dst.path()).len() < 1000);
    }

    #[test]
    fn test_remove_tree_tolerates_missing_path() {
        remove_tree_best_effort(Path::new("/definitely/not/here"));
    }

    #[test]
    fn test_sweep_removes_only_prefixed_dirs() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("parbuild-abc")).unwrap();
        fs::create_dir(root.path().join("other")).unwrap();
        write_file(&root.path().join("parbuild-abc/file.txt"), "x");

        let swept = sweep_leftovers(root.path()).unwrap();

        assert_eq!(swept, 1);
        assert!(!root.path().join("parbuild-abc").exists());
        assert!(root.path().join("other").exists());
    }
}
