use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Returns `true` if `path` has one of `extensions` (compared case-insensitively, without the dot).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(ext))
}

/// Recursively collect files under `root` whose extension is in `extensions`.
///
/// Missing directories are treated as empty. The result is sorted.
pub fn collect_files_with_extensions(
    root: &Path,
    extensions: &[String],
) -> io::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };

        for entry in entries {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();

            if file_type.is_dir() {
                pending.push(path);
                continue;
            }

            if file_type.is_file() && has_extension(&path, extensions) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}
