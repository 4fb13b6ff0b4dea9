use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Creates `dir` if needed and proves it is writable by creating and removing a probe file.
pub fn ensure_writable_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let probe = dir.join(format!(".write-probe-{}", std::process::id()));
    let mut file = fs::File::create(&probe)
        .with_context(|| format!("Output directory is not writable: {}", dir.display()))?;
    file.write_all(b"ok")
        .with_context(|| format!("Output directory is not writable: {}", dir.display()))?;
    drop(file);
    fs::remove_file(&probe)
        .with_context(|| format!("Failed to remove probe file: {}", probe.display()))?;
    Ok(())
}

/// Files in `dir` with one of `extensions`, sorted by name.
#[cfg(test)]
pub fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<std::path::PathBuf>> {
    let mut files: Vec<std::path::PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map_or(false, |ext| extensions.contains(&ext))
        })
        .collect();

    files.sort();
    Ok(files)
}
