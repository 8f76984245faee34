//! AssetExporter - レイヤーの pixmap を PNG として書き出す
//!
//! # 流れ
//! 1. 出力先 `<asset_dir>/<document>-<layer>.png` ごとに request id を払い出す
//! 2. 空の pixmap なら出力先を削除して終わり
//! 3. asset_dir 内の一時ファイルに変換する
//! 4. その間に同じ出力先へ新しい request が来ていなければ rename で置き換える
//!
//! 一時ファイルを asset_dir 内に作るので、rename は同一ファイルシステム内で完結する。

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};
use ulid::Ulid;

use crate::domain::Pixmap;
use crate::error::ExportError;
use crate::ports::Converter;

/// What happened to one export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The asset was (re)written.
    Written(PathBuf),

    /// The pixmap was empty, so the asset was deleted.
    Removed(PathBuf),

    /// A newer request for the same asset started while this one was
    /// converting; its result was discarded.
    Superseded(PathBuf),
}

impl ExportOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ExportOutcome::Written(p) | ExportOutcome::Removed(p) | ExportOutcome::Superseded(p) => p,
        }
    }
}

/// Writes layer assets into one directory.
///
/// Owns the per-asset request counters, so two exporters never interfere
/// with each other.
pub struct AssetExporter {
    asset_dir: PathBuf,
    converter: Arc<dyn Converter>,
    latest_requests: Mutex<HashMap<PathBuf, u64>>,
}

impl AssetExporter {
    pub fn new(asset_dir: impl Into<PathBuf>, converter: Arc<dyn Converter>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            converter,
            latest_requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    pub fn asset_path(&self, document_id: u64, layer_id: u64) -> PathBuf {
        self.asset_dir.join(format!("{document_id}-{layer_id}.png"))
    }

    fn begin_request(&self, path: &Path) -> u64 {
        let mut latest = self
            .latest_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let counter = latest.entry(path.to_path_buf()).or_insert(0);
        *counter += 1;
        *counter
    }

    fn is_latest(&self, path: &Path, request: u64) -> bool {
        let latest = self
            .latest_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        latest.get(path).copied() == Some(request)
    }

    /// Export one layer's pixmap.
    pub async fn export_layer(
        &self,
        document_id: u64,
        layer_id: u64,
        pixmap: &Pixmap,
    ) -> Result<ExportOutcome, ExportError> {
        let path = self.asset_path(document_id, layer_id);
        let request = self.begin_request(&path);

        if pixmap.is_empty() {
            // レイヤーの中身が消された: 0x0 pixmap
            remove_if_exists(&path).await?;
            info!(path = %path.display(), "empty layer, asset removed");
            return Ok(ExportOutcome::Removed(path));
        }

        let tmp = self.asset_dir.join(format!(".{}.png.tmp", Ulid::new()));
        debug!(path = %path.display(), request, tmp = %tmp.display(), "converting layer");
        if let Err(err) = self.converter.convert(pixmap, &tmp).await {
            // 変換失敗時の一時ファイル削除は best effort
            let _ = remove_if_exists(&tmp).await;
            return Err(err);
        }

        if !self.is_latest(&path, request) {
            remove_if_exists(&tmp).await?;
            debug!(path = %path.display(), request, "newer request started, result discarded");
            return Ok(ExportOutcome::Superseded(path));
        }

        if let Err(source) = tokio::fs::rename(&tmp, &path).await {
            let _ = remove_if_exists(&tmp).await;
            return Err(ExportError::Io { path, source });
        }
        info!(path = %path.display(), "asset written");
        Ok(ExportOutcome::Written(path))
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), ExportError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ExportError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
