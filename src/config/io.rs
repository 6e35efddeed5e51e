use anyhow::{bail, Context, Result};
use std::fs::Metadata;
use std::path::Path;

/// Config files above this size are refused (1 MB).
pub const MAX_CONFIG_FILE_BYTES: u64 = 1024 * 1024;

/// On-disk config syntax, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// JSON5, which also accepts plain JSON. The fallback for unknown
    /// extensions.
    Json5,
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::Yaml,
            Some("toml") => Self::Toml,
            _ => Self::Json5,
        }
    }

    pub fn parse(self, content: &str) -> Result<serde_json::Value> {
        let value = match self {
            Self::Json5 => json5::from_str(content)?,
            Self::Yaml => serde_yaml::from_str(content)?,
            Self::Toml => toml::from_str(content)?,
        };
        Ok(value)
    }

    pub fn render(self, value: &serde_json::Value) -> Result<String> {
        let content = match self {
            Self::Json5 => serde_json::to_string_pretty(value)?,
            Self::Yaml => serde_yaml::to_string(value)?,
            Self::Toml => toml::to_string_pretty(value)?,
        };
        Ok(content)
    }
}

/// Read a config file into a JSON value.
///
/// The file must be a regular, singly-linked file no larger than
/// [`MAX_CONFIG_FILE_BYTES`].
pub fn read_config_file(path: &Path) -> Result<serde_json::Value> {
    let metadata = std::fs::symlink_metadata(path)
        .with_context(|| format!("Cannot stat config file '{}'", path.display()))?;
    check_config_file(path, &metadata)?;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    ConfigFormat::from_path(path)
        .parse(&content)
        .with_context(|| format!("Invalid config file '{}'", path.display()))
}

/// Write a config value in the format matching `path`'s extension.
pub fn write_config_file(path: &Path, value: &serde_json::Value) -> Result<()> {
    let content = ConfigFormat::from_path(path).render(value)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file '{}'", path.display()))
}

fn check_config_file(path: &Path, metadata: &Metadata) -> Result<()> {
    if metadata.file_type().is_symlink() {
        bail!("Config file '{}' is a symlink, refusing to follow", path.display());
    }
    if !metadata.is_file() {
        bail!("Config path '{}' is not a regular file", path.display());
    }
    if metadata.len() > MAX_CONFIG_FILE_BYTES {
        bail!(
            "Config file '{}' is {} bytes, exceeds limit of {} bytes",
            path.display(),
            metadata.len(),
            MAX_CONFIG_FILE_BYTES,
        );
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if metadata.nlink() > 1 {
            bail!(
                "Config file '{}' has {} hard links, refusing to read",
                path.display(),
                metadata.nlink(),
            );
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn format_follows_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")), ConfigFormat::Json5);
        assert_eq!(ConfigFormat::from_path(Path::new("config")), ConfigFormat::Json5);
    }

    #[test]
    fn json5_comments_and_trailing_commas() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("apivault.json");
        fs::write(&file, "{ external: { port: 8010, }, // local override\n}").unwrap();

        let value = read_config_file(&file).unwrap();
        assert_eq!(value["external"]["port"], 8010);
    }

    #[test]
    fn yaml_config() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("apivault.yaml");
        fs::write(&file, "external:\n  maxPort: 8200\n").unwrap();

        let value = read_config_file(&file).unwrap();
        assert_eq!(value["external"]["maxPort"], 8200);
    }

    #[test]
    fn written_file_reads_back_in_each_format() {
        let dir = TempDir::new().unwrap();
        let value = json!({"external": {"port": 8001, "reclaimPort": false}});

        for name in ["c.json", "c.yaml", "c.toml"] {
            let file = dir.path().join(name);
            write_config_file(&file, &value).unwrap();
            assert_eq!(read_config_file(&file).unwrap(), value, "{name}");
        }
    }

    #[test]
    fn syntax_error_names_the_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("broken.toml");
        fs::write(&file, "[external\nport = 1").unwrap();

        let err = read_config_file(&file).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }

    #[test]
    fn oversized_config_refused() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("huge.json");
        fs::write(&file, "x".repeat((MAX_CONFIG_FILE_BYTES + 1) as usize)).unwrap();

        let err = read_config_file(&file).unwrap_err();
        assert!(err.to_string().contains("exceeds limit"));
    }

    #[test]
    fn directory_refused() {
        let dir = TempDir::new().unwrap();
        let err = read_config_file(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[cfg(unix)]
    #[test]
    fn links_refused() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real.json");
        fs::write(&real, "{}").unwrap();

        let symlink = dir.path().join("sym.json");
        std::os::unix::fs::symlink(&real, &symlink).unwrap();
        assert!(read_config_file(&symlink)
            .unwrap_err()
            .to_string()
            .contains("symlink"));

        let hardlink = dir.path().join("hard.json");
        fs::hard_link(&real, &hardlink).unwrap();
        assert!(read_config_file(&real)
            .unwrap_err()
            .to_string()
            .contains("hard links"));
    }
}
