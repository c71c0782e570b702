use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;
    }
    Ok(())
}

pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))
}

/// Writes `bytes` to a temporary sibling and renames it into place, so a
/// failed or interrupted write never leaves a partial file at `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .with_context(|| format!("Output path has no file name: {:?}", path))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, bytes)
        .with_context(|| format!("Failed to write file: {:?}", tmp_path))?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e).with_context(|| format!("Failed to move {:?} into place", path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_leaves_no_temp() {
        let dir = std::env::temp_dir().join("xef2mat_test_file_utils");
        ensure_dir(&dir).unwrap();
        let path = dir.join("out.bin");

        write_atomic(&path, b"hello").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(!dir.join("out.bin.tmp").exists());

        // Overwrite goes through the same rename path
        write_atomic(&path, b"world").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"world");
    }
}
