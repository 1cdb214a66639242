use anyhow::Context;
use protocol::config::LivecodeConfig;
use protocol::endpoint::livecode_ws_url;
use protocol::FileEntry;
use std::path::{Path, PathBuf};

fn validate_config(config: &LivecodeConfig) -> anyhow::Result<()> {
    if config.livecode_url.trim().is_empty() {
        anyhow::bail!("config must set livecode_url");
    }
    livecode_ws_url(&config.livecode_url)
        .with_context(|| format!("livecode_url {} is not a valid URL", config.livecode_url))?;
    if config.timeout_ms() == 0 {
        anyhow::bail!("timeout_ms must be greater than zero");
    }
    for (index, entry) in config.files.iter().enumerate() {
        if entry.path.trim().is_empty() {
            anyhow::bail!("files[{}] must set path", index);
        }
        if entry.source.as_os_str().is_empty() {
            anyhow::bail!("files[{}] ({}) must set source", index, entry.path);
        }
    }
    Ok(())
}

pub(crate) fn load_config(path: &PathBuf) -> anyhow::Result<LivecodeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: LivecodeConfig = toml::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Reads manifest sources relative to the config file's directory.
pub(crate) fn load_manifest(
    config: &LivecodeConfig,
    config_path: &Path,
) -> anyhow::Result<Vec<FileEntry>> {
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    config
        .files
        .iter()
        .map(|entry| {
            let source = base.join(&entry.source);
            let content = std::fs::read_to_string(&source)
                .with_context(|| format!("failed to read manifest file {}", source.display()))?;
            Ok(FileEntry::new(entry.path.clone(), content))
        })
        .collect()
}

/// Resolves a config-relative directory setting.
pub(crate) fn resolve_dir(config_path: &Path, dir: PathBuf) -> PathBuf {
    if dir.is_absolute() {
        return dir;
    }
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(dir)
}
