use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

fn make_writable(path: &Path) {
    if let Ok(metadata) = fs::symlink_metadata(path) {
        let mut permissions = metadata.permissions();
        if permissions.readonly() {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
            let _ = fs::set_permissions(path, permissions);
        }
    }
}

fn remove_tree_entrywise(path: &Path) -> io::Result<()> {
    make_writable(path);
    for entry in fs::read_dir(path)? {
        let entry_path = entry?.path();
        make_writable(&entry_path);
        let is_dir = fs::symlink_metadata(&entry_path).map(|m| m.is_dir()).unwrap_or(false);
        let removed = if is_dir {
            remove_tree_entrywise(&entry_path)
        } else {
            fs::remove_file(&entry_path)
        };
        if let Err(e) = removed {
            debug!(path = %entry_path.display(), error = %e, "Entry could not be removed");
        }
    }
    fs::remove_dir(path)
}

/// Recursively deletes `path`, clearing read-only flags and retrying entry by
/// entry when the plain recursive removal fails. A missing path is success.
pub fn force_remove_dir(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Recursive removal failed, deleting entry by entry");
            remove_tree_entrywise(path)
        }
    }
}

/// Renames `path` to `<path>.old`, replacing an earlier leftover.
pub fn move_aside(path: &Path) -> io::Result<PathBuf> {
    let mut target = path.as_os_str().to_owned();
    target.push(".old");
    let target = PathBuf::from(target);
    if target.exists() {
        let _ = force_remove_dir(&target);
    }
    fs::rename(path, &target)?;
    Ok(target)
}

/// Copies `source` to `<archive_dir>/<prefix>_<YYYYmmdd_HHMMSS>.<ext>`.
pub fn archive_copy(source: &Path, archive_dir: &Path, prefix: &str) -> io::Result<Option<PathBuf>> {
    if !source.exists() {
        warn!(path = %source.display(), "Nothing to archive");
        return Ok(None);
    }
    fs::create_dir_all(archive_dir)?;
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let name = match source.extension() {
        Some(ext) => format!("{}_{}.{}", prefix, stamp, ext.to_string_lossy()),
        None => format!("{}_{}", prefix, stamp),
    };
    let target = archive_dir.join(name);
    fs::copy(source, &target)?;
    info!(from = %source.display(), to = %target.display(), "Archived copy written");
    Ok(Some(target))
}

/// Moves `source` to `<archive_dir>/<prefix>_<YYYYmmdd>_<file name>`.
pub fn move_to_archive(source: &Path, archive_dir: &Path, prefix: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(archive_dir)?;
    let file_name = source
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let target = archive_dir.join(format!(
        "{}_{}_{}",
        prefix,
        Local::now().format("%Y%m%d"),
        file_name.to_string_lossy()
    ));
    if fs::rename(source, &target).is_err() {
        // Rename fails across filesystems.
        fs::copy(source, &target)?;
        fs::remove_file(source)?;
    }
    info!(from = %source.display(), to = %target.display(), "Moved into archive");
    Ok(target)
}
