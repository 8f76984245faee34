use std::any::Any;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;
use tokio::task::JoinError;

/// Failure reported by the serial queue's error listeners.
///
/// This is the only error a queued task can surface. The queue itself never
/// fails; it swallows the failure for control flow and hands it to listeners.
#[derive(Debug, Error)]
pub enum TaskFailure<E> {
    #[error("task failed: {0}")]
    Failed(E),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl<E> TaskFailure<E> {
    /// The reason produced by the task, if it returned one (not a panic).
    pub fn reason(&self) -> Option<&E> {
        match self {
            TaskFailure::Failed(reason) => Some(reason),
            TaskFailure::Panicked(_) => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskFailure::Panicked(_))
    }

    pub(crate) fn from_join_error(err: JoinError) -> Self {
        if !err.is_panic() {
            return TaskFailure::Panicked(format!("task was cancelled: {err}"));
        }
        TaskFailure::Panicked(panic_message(err.into_panic().as_ref()))
    }
}

/// Text of a panic payload (`panic!` with a literal or a formatted message).
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[derive(Debug, Error)]
pub enum BoundsError {
    #[error("invalid coordinate for {side}: {raw:?}")]
    InvalidCoordinate { side: &'static str, raw: String },
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("pixmap {width}x{height}x{channels} needs {expected} bytes, got {actual}")]
    InvalidPixmap {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        actual: usize,
    },

    #[error("pixmap {width}x{height}x{channels} exceeds {limit} bytes")]
    PixmapTooLarge {
        width: u32,
        height: u32,
        channels: u8,
        limit: usize,
    },

    #[error("unsupported channel count: {0}")]
    UnsupportedChannels(u8),

    #[error("failed to start converter {program:?}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("converter pipe unavailable: {0}")]
    MissingPipe(&'static str),

    #[error("error from ImageMagick: {0}")]
    Converter(String),

    #[error("converter exited with {0}")]
    ConverterExit(ExitStatus),

    #[error("converter io failed")]
    ConverterIo(#[source] std::io::Error),

    #[error("io error at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not locate home directory in env vars, no assets will be written")]
    HomeNotFound,

    #[error("could not create asset directory {path:?}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
