//! spool-core
//!
//! Core building blocks for the spool asset generator.
//!
//! # モジュール構成
//! - **queue**: SerialQueue（1 件ずつ FIFO で非同期タスクを実行する。pause / unpause 可能）
//! - **domain**: ドメインモデル（bounds, pixmap, host message）
//! - **ports**: 抽象化レイヤー（Converter）
//! - **impls**: 実装（ImageMagick）
//! - **app**: アプリケーションロジック（LayerTracker, AssetExporter）
//! - **config**: 書き出し設定
//! - **observability**: queue の状態ビュー
//! - **error**: エラー型

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

pub use queue::{QueueState, SerialQueue};
