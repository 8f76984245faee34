//! # Export configuration.
//!
//! [`ExportConfig`] decides where assets are written and how pixmaps are
//! converted. Values come from an optional JSON file, then environment
//! overrides.
//!
//! # Example
//! ```
//! use std::path::PathBuf;
//! use spool_core::config::ExportConfig;
//!
//! let mut cfg = ExportConfig::default();
//! cfg.asset_dir = Some(PathBuf::from("/tmp/assets"));
//! cfg.scale = 0.5;
//!
//! assert_eq!(cfg.resolve_asset_dir().unwrap(), PathBuf::from("/tmp/assets"));
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::impls::ImageMagick;

/// Environment variable overriding [`ExportConfig::asset_dir`].
pub const ENV_ASSET_DIR: &str = "SPOOL_ASSET_DIR";

/// Environment variable overriding [`ExportConfig::converter`].
pub const ENV_CONVERTER: &str = "SPOOL_CONVERTER";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Where assets are written. `None` means `<home>/Desktop/generator-assets`.
    pub asset_dir: Option<PathBuf>,
    /// ImageMagick program.
    pub converter: PathBuf,
    /// Arguments placed before the conversion arguments.
    pub converter_args: Vec<String>,
    /// Factor applied to layer bounds before rendering.
    pub scale: f64,
    /// RGBA fill used for rendered layers.
    pub fill: [u8; 4],
}

impl Default for ExportConfig {
    /// - `asset_dir = None` (home directory based)
    /// - `converter = "convert"`
    /// - `converter_args = []`
    /// - `scale = 1.0`
    /// - `fill = [128, 128, 128, 255]`
    fn default() -> Self {
        Self {
            asset_dir: None,
            converter: PathBuf::from("convert"),
            converter_args: Vec::new(),
            scale: 1.0,
            fill: [128, 128, 128, 255],
        }
    }
}

impl ExportConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `SPOOL_ASSET_DIR` / `SPOOL_CONVERTER` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var_os(key).map(PathBuf::from))
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        if let Some(dir) = lookup(ENV_ASSET_DIR) {
            self.asset_dir = Some(dir);
        }
        if let Some(converter) = lookup(ENV_CONVERTER) {
            self.converter = converter;
        }
        self
    }

    /// The configured asset directory, or the default one under the home directory.
    pub fn resolve_asset_dir(&self) -> Result<PathBuf, ConfigError> {
        self.resolve_asset_dir_with(|key| std::env::var_os(key).map(PathBuf::from))
    }

    fn resolve_asset_dir_with(&self, lookup: impl Fn(&str) -> Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.asset_dir {
            return Ok(dir.clone());
        }
        let home = lookup(home_var()).ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join("Desktop").join("generator-assets"))
    }

    /// Resolve the asset directory and create it if needed.
    pub async fn prepare(&self) -> Result<PathBuf, ConfigError> {
        let dir = self.resolve_asset_dir()?;
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ConfigError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        debug!(dir = %dir.display(), "asset directory ready");
        Ok(dir)
    }

    pub fn converter(&self) -> ImageMagick {
        ImageMagick::new(&self.converter).with_leading_args(&self.converter_args)
    }
}

fn home_var() -> &'static str {
    if cfg!(windows) { "USERPROFILE" } else { "HOME" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<PathBuf> {
        let map: HashMap<String, PathBuf> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), PathBuf::from(v)))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_values() {
        let cfg = ExportConfig::default();
        assert_eq!(cfg.asset_dir, None);
        assert_eq!(cfg.converter, PathBuf::from("convert"));
        assert_eq!(cfg.scale, 1.0);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: ExportConfig = serde_json::from_str(r#"{"scale": 2.0, "converter_args": ["convert"]}"#).unwrap();
        assert_eq!(cfg.scale, 2.0);
        assert_eq!(cfg.converter_args, vec!["convert".to_string()]);
        assert_eq!(cfg.converter, PathBuf::from("convert"));
        assert_eq!(cfg.fill, [128, 128, 128, 255]);
    }

    #[rstest]
    #[case::none(&[], None, "convert")]
    #[case::dir(&[(ENV_ASSET_DIR, "/srv/assets")], Some("/srv/assets"), "convert")]
    #[case::both(&[(ENV_ASSET_DIR, "/a"), (ENV_CONVERTER, "/opt/im/magick")], Some("/a"), "/opt/im/magick")]
    fn env_overrides(
        #[case] pairs: &[(&str, &str)],
        #[case] asset_dir: Option<&str>,
        #[case] converter: &str,
    ) {
        let cfg = ExportConfig::default().with_overrides(env(pairs));
        assert_eq!(cfg.asset_dir, asset_dir.map(PathBuf::from));
        assert_eq!(cfg.converter, PathBuf::from(converter));
    }

    #[test]
    fn default_asset_dir_is_under_home_desktop() {
        let cfg = ExportConfig::default();
        let dir = cfg.resolve_asset_dir_with(env(&[(home_var(), "/home/me")])).unwrap();
        assert_eq!(dir, PathBuf::from("/home/me/Desktop/generator-assets"));
    }

    #[test]
    fn missing_home_is_an_error() {
        let cfg = ExportConfig::default();
        let err = cfg.resolve_asset_dir_with(env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::HomeNotFound));
    }

    #[tokio::test]
    async fn load_and_prepare_create_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let assets = dir.path().join("nested").join("assets");
        let file = dir.path().join("spool.json");
        let body = serde_json::json!({ "asset_dir": assets, "scale": 0.25 });
        tokio::fs::write(&file, body.to_string()).await.unwrap();

        let cfg = ExportConfig::load(&file).await.unwrap();
        assert_eq!(cfg.scale, 0.25);

        let prepared = cfg.prepare().await.unwrap();
        assert_eq!(prepared, assets);
        assert!(tokio::fs::metadata(&assets).await.unwrap().is_dir());
    }

    #[tokio::test]
    async fn invalid_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("spool.json");
        tokio::fs::write(&file, "{ not json").await.unwrap();

        let err = ExportConfig::load(&file).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
