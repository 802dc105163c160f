use std::path::{Path, PathBuf};

use crate::error::UpdateError;

/// Copies `dirs` into `backup_root/backup_<version>_<ts>/<dir-name>`
/// (spec.md §3: `update_manager/backups/backup_<version>_<ts>/`).
pub fn create_backup(
    dirs: &[PathBuf],
    backup_root: &Path,
    version: &str,
    timestamp: i64,
) -> Result<PathBuf, UpdateError> {
    let backup_dir = backup_root.join(format!("backup_{version}_{timestamp}"));
    std::fs::create_dir_all(&backup_dir)?;
    for dir in dirs {
        if !dir.exists() {
            continue;
        }
        let name = dir.file_name().ok_or_else(|| {
            UpdateError::Malformed(format!("backup source has no file name: {}", dir.display()))
        })?;
        copy_dir_recursive(dir, &backup_dir.join(name))?;
    }
    Ok(backup_dir)
}

/// Restores every entry of `backup_dir` atop `live_root`, overwriting
/// whatever is there (spec.md §4.7 "Failure rollback").
pub fn restore_backup(backup_dir: &Path, live_root: &Path) -> Result<(), UpdateError> {
    for entry in std::fs::read_dir(backup_dir)? {
        let entry = entry?;
        let target = live_root.join(entry.file_name());
        if target.exists() {
            if target.is_dir() {
                std::fs::remove_dir_all(&target)?;
            } else {
                std::fs::remove_file(&target)?;
            }
        }
        copy_dir_recursive(&entry.path(), &target)?;
    }
    Ok(())
}

/// Deletes the oldest `backup_*` directories under `backup_root`, keeping
/// only `retention` (spec.md §4.7 "Only the most recent backup directories
/// are kept").
pub fn prune_backups(backup_root: &Path, retention: usize) -> Result<(), UpdateError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(backup_root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with("backup_"))
        .map(|e| e.path())
        .collect();
    // Backup directory names end in the creation timestamp, so a plain
    // lexical sort on the full name orders them oldest-first as long as
    // the timestamp component has consistent width.
    entries.sort();
    let excess = entries.len().saturating_sub(retention);
    for path in entries.into_iter().take(excess) {
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<(), UpdateError> {
    if src.is_dir() {
        std::fs::create_dir_all(dst)?;
        for entry in std::fs::read_dir(src)? {
            let entry = entry?;
            copy_dir_recursive(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dst)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_then_restore_roundtrips_contents() {
        let live = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        let service_dir = live.path().join("services");
        std::fs::create_dir_all(&service_dir).unwrap();
        std::fs::write(service_dir.join("file.txt"), b"v1").unwrap();

        let backup_dir =
            create_backup(&[service_dir.clone()], backups.path(), "1.0.0", 1000).unwrap();
        std::fs::write(service_dir.join("file.txt"), b"v2-broken").unwrap();

        restore_backup(&backup_dir, live.path()).unwrap();
        let restored = std::fs::read(service_dir.join("file.txt")).unwrap();
        assert_eq!(restored, b"v1");
    }

    #[test]
    fn prune_keeps_only_the_configured_retention() {
        let backups = tempfile::tempdir().unwrap();
        for ts in 0..5 {
            std::fs::create_dir_all(backups.path().join(format!("backup_1.0.0_{ts}"))).unwrap();
        }
        prune_backups(backups.path(), 2).unwrap();
        let remaining = std::fs::read_dir(backups.path()).unwrap().count();
        assert_eq!(remaining, 2);
    }
}
