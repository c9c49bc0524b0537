//! Secure file reading and atomic writes.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Component, Path};

use tracing::debug;

use crate::domain::errors::ConfigError;
use crate::domain::options::SecurityOptions;
use crate::domain::value::Value;
use crate::infrastructure::format::{self, FileFormat};

/// Reads and parses a configuration file, applying the configured
/// security checks first. A missing file maps to the distinguishable
/// [`ConfigError::FileNotFound`].
pub(crate) fn read_config_table(
    path: &Path,
    file_format: FileFormat,
    security: &SecurityOptions,
) -> Result<BTreeMap<String, Value>, ConfigError> {
    if security.prevent_path_traversal
        && path.components().any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ConfigError::PathTraversal(path.display().to_string()));
    }

    let metadata = match std::fs::metadata(path) {
        Ok(md) => md,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    if security.max_file_size > 0 && metadata.len() > security.max_file_size {
        return Err(ConfigError::FileTooLarge {
            path: path.display().to_string(),
            size: metadata.len(),
            limit: security.max_file_size,
        });
    }

    #[cfg(unix)]
    if security.enforce_file_ownership {
        use std::os::unix::fs::MetadataExt;
        let process_uid = unsafe { libc::geteuid() };
        if metadata.uid() != process_uid {
            return Err(ConfigError::OwnershipMismatch {
                path: path.display().to_string(),
                file_uid: metadata.uid(),
                process_uid,
            });
        }
    }

    let contents = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = contents.len(), "read config file");
    format::parse(path, &contents, file_format)
}

/// Writes `data` to `path` atomically: temp file in the same directory,
/// write, fsync, chmod 0644, rename over the target. The temp file is
/// removed on any failure.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ConfigError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = match dir {
        Some(d) => {
            std::fs::create_dir_all(d)?;
            d
        }
        None => Path::new("."),
    };

    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("config");
    let mut temp = tempfile::Builder::new()
        .prefix(&format!("{base}."))
        .suffix(".tmp")
        .tempfile_in(dir)?;

    temp.write_all(data)?;
    temp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o644))?;
    }

    // Dropping a NamedTempFile removes it, so a failed rename leaves the
    // original target untouched and no stray temp behind.
    temp.persist(path).map_err(|e| ConfigError::Io(e.error))?;
    debug!(path = %path.display(), bytes = data.len(), "atomic write complete");
    Ok(())
}
