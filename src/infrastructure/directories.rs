use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::config::DirectoryConfig;

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub logs_dir: PathBuf,
    pub data_dir: PathBuf,
    pub storage_path: PathBuf,
}

/// Creates the log and data directories, checks that the data directory is
/// writable and resolves where the storage file lives.
pub fn ensure_directories(cfg: &DirectoryConfig) -> Result<ResolvedPaths> {
    let logs_dir = ensure_dir(Path::new(&cfg.logs_dir))?;
    let data_dir = ensure_dir(Path::new(&cfg.data_dir))?;
    probe_writable(&data_dir)?;

    Ok(ResolvedPaths {
        storage_path: data_dir.join(&cfg.storage_filename),
        logs_dir,
        data_dir,
    })
}

fn ensure_dir(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;
    Ok(dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf()))
}

fn probe_writable(dir: &Path) -> Result<()> {
    let probe = dir.join(".write-test");
    fs::write(&probe, b"ok")
        .with_context(|| format!("data directory {} is not writable", dir.display()))?;
    fs::remove_file(&probe).ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_nested_directories() {
        let root = tempfile::tempdir().unwrap();
        let cfg = DirectoryConfig {
            logs_dir: root.path().join("a/logs").display().to_string(),
            data_dir: root.path().join("b/data").display().to_string(),
            storage_filename: "store.json".to_string(),
        };

        let paths = ensure_directories(&cfg).unwrap();
        assert!(paths.logs_dir.is_dir());
        assert!(paths.data_dir.is_dir());
        assert_eq!(paths.storage_path.file_name().unwrap(), "store.json");
        assert!(paths.storage_path.starts_with(&paths.data_dir));
        assert!(!paths.data_dir.join(".write-test").exists());
    }
}
