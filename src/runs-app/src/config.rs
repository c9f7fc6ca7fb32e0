// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "runs-rs.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config file {0}: {1}")]
    ParseError(PathBuf, String),
}

/// Default search paths for `runs-rs.toml`
/// (current directory, then XDG config, then /etc).
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("runs-rs").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from("/etc/runs-rs").join(CONFIG_FILE_NAME));
    paths
}

/// Extract and deserialize a named section from a TOML file.
///
/// `Ok(None)` means the file parsed but has no such section.
fn load_section_from_file<T: DeserializeOwned>(
    path: &Path,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

    let table: toml::Table = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

    let Some(section) = table.get(key) else {
        return Ok(None);
    };

    // Round-trip through a string so serde defaults apply to missing keys.
    let section_toml = toml::to_string(section)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    let cfg = toml::from_str::<T>(&section_toml)
        .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
    Ok(Some(cfg))
}

/// A configuration type stored as one `[section]` of `runs-rs.toml`.
pub trait ConfigFile: Sized + Default + DeserializeOwned {
    /// Section key in `runs-rs.toml` (e.g. `"runs-server"`).
    fn section_key() -> &'static str;

    /// Load the section from a specific file path.
    ///
    /// A readable file without the `[<section_key>]` header is an error.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        load_section_from_file::<Self>(path, Self::section_key())?.ok_or_else(|| {
            ConfigError::ParseError(
                path.to_path_buf(),
                format!("missing [{}] section", Self::section_key()),
            )
        })
    }

    /// Load the first of `paths` that exists and contains the section.
    fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Option<PathBuf>), ConfigError> {
        for path in paths {
            if path.exists() {
                if let Some(cfg) = load_section_from_file::<Self>(path, Self::section_key())? {
                    return Ok((cfg, Some(path.clone())));
                }
            }
        }
        Ok((Self::default(), None))
    }

    /// Search [`config_search_paths`] and load the first file that contains
    /// the section, or fall back to defaults when there is none.
    fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        Self::load_from_paths(&config_search_paths())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        count: u32,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "default".to_string(),
                count: 7,
            }
        }
    }

    impl ConfigFile for Sample {
        fn section_key() -> &'static str {
            "sample"
        }
    }

    fn write(dir: &TempDir, file: &str, body: &str) -> PathBuf {
        let path = dir.path().join(file);
        std::fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn test_section_defaults_fill_missing_keys() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "a.toml", "[sample]\nname = \"x\"\n");
        let cfg = Sample::load_from_file(&path).expect("load");
        assert_eq!(
            cfg,
            Sample {
                name: "x".to_string(),
                count: 7
            }
        );
    }

    #[test]
    fn test_missing_section_is_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = write(&dir, "a.toml", "[other]\nname = \"x\"\n");
        assert!(matches!(
            Sample::load_from_file(&path),
            Err(ConfigError::ParseError(_, msg)) if msg.contains("[sample]")
        ));
    }

    #[test]
    fn test_unreadable_and_invalid_files() {
        let dir = TempDir::new().expect("tempdir");
        assert!(matches!(
            Sample::load_from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::ReadError(..))
        ));
        let bad = write(&dir, "bad.toml", "[sample\n");
        assert!(matches!(
            Sample::load_from_file(&bad),
            Err(ConfigError::ParseError(..))
        ));
    }

    #[test]
    fn test_search_uses_first_file_with_section() {
        let dir = TempDir::new().expect("tempdir");
        let without = write(&dir, "first.toml", "[other]\n");
        let with = write(&dir, "second.toml", "[sample]\ncount = 2\n");
        let paths = vec![dir.path().join("absent.toml"), without, with.clone()];

        let (cfg, found) = Sample::load_from_paths(&paths).expect("load");
        assert_eq!(cfg.count, 2);
        assert_eq!(found, Some(with));
    }

    #[test]
    fn test_search_without_files_gives_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let (cfg, found) =
            Sample::load_from_paths(&[dir.path().join("nothing.toml")]).expect("load");
        assert_eq!(cfg, Sample::default());
        assert!(found.is_none());
    }

    #[test]
    fn test_default_search_paths_end_in_etc() {
        let paths = config_search_paths();
        assert_eq!(paths.first(), Some(&PathBuf::from("runs-rs.toml")));
        assert_eq!(
            paths.last(),
            Some(&PathBuf::from("/etc/runs-rs/runs-rs.toml"))
        );
    }
}
