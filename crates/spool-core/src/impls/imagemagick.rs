//! ImageMagick - `convert` を子プロセスとして起動する Converter
//!
//! # 流れ
//! 1. `convert -size WxH -depth 8 rgba:- png:-` を起動
//! 2. stdin に raw pixel を書き込み、閉じる
//! 3. stdout を dest ファイルへ流す
//! 4. stderr に何か出ていたら失敗扱い
//!
//! 2〜4 は pipe が詰まらないように同時に進める。

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use crate::domain::Pixmap;
use crate::error::ExportError;
use crate::ports::Converter;

/// Converter backed by the ImageMagick command line.
#[derive(Debug, Clone)]
pub struct ImageMagick {
    program: PathBuf,
    /// Arguments placed before the conversion arguments
    /// (e.g. `["convert"]` for ImageMagick 7's `magick`).
    leading_args: Vec<OsString>,
}

impl ImageMagick {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, pixmap: &Pixmap) -> Result<Command, ExportError> {
        let format = pixmap.pixel_format()?;
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .arg("-size")
            .arg(format!("{}x{}", pixmap.width, pixmap.height))
            .arg("-depth")
            .arg("8")
            .arg(format!("{format}:-"))
            .arg("png:-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

impl Default for ImageMagick {
    fn default() -> Self {
        Self::new("convert")
    }
}

#[async_trait]
impl Converter for ImageMagick {
    async fn convert(&self, pixmap: &Pixmap, dest: &Path) -> Result<(), ExportError> {
        let mut child = self
            .command(pixmap)?
            .spawn()
            .map_err(|source| ExportError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or(ExportError::MissingPipe("stdin"))?;
        let mut stdout = child.stdout.take().ok_or(ExportError::MissingPipe("stdout"))?;
        let mut stderr = child.stderr.take().ok_or(ExportError::MissingPipe("stderr"))?;

        let mut file = File::create(dest).await.map_err(|source| ExportError::Io {
            path: dest.to_path_buf(),
            source,
        })?;

        let feed = async move {
            let written = stdin.write_all(&pixmap.pixels).await;
            // drop で stdin を閉じて EOF を伝える
            drop(stdin);
            written
        };
        let pump = async {
            let copied = tokio::io::copy(&mut stdout, &mut file).await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(copied)
        };
        let collect_stderr = async {
            let mut buf = Vec::new();
            stderr.read_to_end(&mut buf).await.map(|_| buf)
        };

        let (fed, pumped, stderr_output) = tokio::join!(feed, pump, collect_stderr);
        let status = child.wait().await.map_err(ExportError::ConverterIo)?;

        let stderr_output = stderr_output.map_err(ExportError::ConverterIo)?;
        let message = String::from_utf8_lossy(&stderr_output);
        if !message.trim().is_empty() {
            return Err(ExportError::Converter(message.trim().to_string()));
        }
        if !status.success() {
            return Err(ExportError::ConverterExit(status));
        }
        fed.map_err(ExportError::ConverterIo)?;
        let bytes = pumped.map_err(ExportError::ConverterIo)?;

        debug!(dest = %dest.display(), bytes, "pixmap converted");
        Ok(())
    }
}
