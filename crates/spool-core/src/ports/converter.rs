//! Converter port - pixmap を PNG ファイルに変換する

use std::path::Path;

use async_trait::async_trait;

use crate::domain::Pixmap;
use crate::error::ExportError;

/// Converts a pixmap into a PNG file at `dest`.
///
/// `dest` may be left behind partially written on error; the caller owns
/// cleanup.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, pixmap: &Pixmap, dest: &Path) -> Result<(), ExportError>;
}
