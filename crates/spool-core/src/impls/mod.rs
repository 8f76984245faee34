//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **ImageMagick**: `convert` コマンドを子プロセスとして起動する Converter

pub mod imagemagick;

pub use self::imagemagick::ImageMagick;
