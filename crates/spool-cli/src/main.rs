//! spool-cli: reads `imageChanged` messages (one JSON object per line) on
//! stdin and writes a PNG asset per changed layer.
//!
//! ```text
//! spool-cli [--config FILE]
//! ```
//!
//! Exports run one at a time through a `SerialQueue`. Ctrl-C stops after the
//! export in flight and drops the rest.

mod signals;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, bail};
use spool_core::SerialQueue;
use spool_core::app::{AssetExporter, LayerTracker, LayerUpdate};
use spool_core::config::ExportConfig;
use spool_core::domain::{ImageChanged, Pixmap};
use spool_core::error::ExportError;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: spool-cli [--config FILE]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    help: bool,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--help" | "-h" => parsed.help = true,
            other => bail!("unexpected argument: {other}\n{USAGE}"),
        }
    }
    Ok(parsed)
}

/// Everything one input line needs to schedule its exports.
struct Pipeline {
    config: ExportConfig,
    exporter: Arc<AssetExporter>,
    queue: SerialQueue<ExportError>,
    tracker: LayerTracker,
    failures: Arc<AtomicUsize>,
}

impl Pipeline {
    async fn start(config: ExportConfig) -> anyhow::Result<Self> {
        let asset_dir = config.prepare().await?;
        info!(dir = %asset_dir.display(), converter = %config.converter.display(), "writing assets");

        let exporter = Arc::new(AssetExporter::new(asset_dir, Arc::new(config.converter())));
        let queue = SerialQueue::new();
        let failures = Arc::new(AtomicUsize::new(0));
        queue.on_error({
            let failures = Arc::clone(&failures);
            move |failure| {
                failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %failure, "export failed");
            }
        });

        Ok(Self {
            config,
            exporter,
            queue,
            tracker: LayerTracker::new(),
            failures,
        })
    }

    /// Parse one line and enqueue an export per layer event.
    fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let message: ImageChanged = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "ignoring malformed message");
                return;
            }
        };
        debug!(document_id = message.document_id, layers = message.layer_events.len(), "image changed");

        for update in self.tracker.apply_message(&message) {
            match update {
                Ok(update) => self.schedule(update),
                Err(err) => warn!(%err, document_id = message.document_id, "ignoring layer event"),
            }
        }
    }

    fn schedule(&self, update: LayerUpdate) {
        let LayerUpdate {
            document_id,
            layer_id,
            bounds,
            ..
        } = update;
        let pixmap = match Pixmap::from_bounds(&bounds.scale(self.config.scale), self.config.fill) {
            Ok(pixmap) => pixmap,
            Err(err) => {
                warn!(%err, document_id, layer_id, "skipping layer");
                return;
            }
        };
        let exporter = Arc::clone(&self.exporter);

        self.queue.enqueue(move || async move {
            let outcome = exporter.export_layer(document_id, layer_id, &pixmap).await?;
            debug!(?outcome, "export finished");
            Ok::<_, ExportError>(())
        });
    }

    /// Finish the export in flight and drop everything else.
    async fn stop(&self) {
        info!(pending = self.queue.pending_len(), "shutdown requested, finishing current export");
        self.queue.pause().await;
        self.queue.clear();
    }

    fn exit_code(&self) -> ExitCode {
        let snapshot = self.queue.snapshot();
        info!(?snapshot, "done");
        if self.failures.load(Ordering::Relaxed) > 0 {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let config = match &args.config {
        Some(path) => ExportConfig::load(path)
            .await
            .with_context(|| format!("loading {}", path.display()))?,
        None => ExportConfig::default(),
    }
    .with_env_overrides();

    let mut pipeline = Pipeline::start(config).await?;

    let shutdown = signals::wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line.context("reading stdin")? {
                Some(line) => pipeline.handle_line(&line),
                None => break,
            },
            signal = &mut shutdown => {
                signal.context("waiting for shutdown signal")?;
                pipeline.stop().await;
                return Ok(pipeline.exit_code());
            }
        }
    }

    info!(pending = pipeline.queue.pending_len(), "input closed, waiting for exports");
    tokio::select! {
        _ = pipeline.queue.drained() => {}
        signal = &mut shutdown => {
            signal.context("waiting for shutdown signal")?;
            pipeline.stop().await;
        }
    }
    Ok(pipeline.exit_code())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_config_flag() {
        assert_eq!(args(&[]).unwrap(), Args::default());
        assert_eq!(
            args(&["--config", "spool.json"]).unwrap().config,
            Some(PathBuf::from("spool.json"))
        );
        assert!(args(&["-h"]).unwrap().help);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--verbose"]).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn lines_become_serialized_exports() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig {
            asset_dir: Some(dir.path().to_path_buf()),
            converter: PathBuf::from("sh"),
            converter_args: vec!["-c".into(), "cat".into(), "sh".into()],
            scale: 0.5,
            fill: [1, 2, 3, 4],
        };
        let mut pipeline = Pipeline::start(config).await.unwrap();

        pipeline.handle_line(r#"{"documentID": 1, "layerEvents": [{"layerID": 2, "bounds": {"bottom": 4, "right": "4px"}}]}"#);
        pipeline.handle_line("not json");
        pipeline.handle_line(r#"{"documentID": 1, "layerEvents": [{"layerID": 3}]}"#);
        pipeline.queue.drained().await;

        // 4x4 を 0.5 倍 -> 2x2 RGBA
        let written = tokio::fs::read(dir.path().join("1-2.png")).await.unwrap();
        assert_eq!(written.len(), 2 * 2 * 4);
        assert_eq!(&written[..4], &[1, 2, 3, 4]);
        // bounds のないレイヤーは空扱い: ファイルは作られない
        assert!(!dir.path().join("1-3.png").exists());

        // 巨大な座標: panic せず、その layer だけ飛ばす
        pipeline.handle_line(
            r#"{"documentID": 1, "layerEvents": [{"layerID": 4, "bounds": {"left": -1, "right": 9223372036854775807, "bottom": 9223372036854775807}}]}"#,
        );
        assert_eq!(pipeline.queue.pending_len(), 0);
        assert_eq!(pipeline.queue.state(), spool_core::QueueState::Idle);
        assert!(!dir.path().join("1-4.png").exists());

        let snapshot = pipeline.queue.snapshot();
        assert_eq!(snapshot.dispatched, 2);
        assert_eq!(snapshot.succeeded, 2);
        assert_eq!(snapshot.failed, 0);
        assert_eq!(pipeline.exit_code(), ExitCode::SUCCESS);
    }
}
