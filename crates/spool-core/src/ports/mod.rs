//! Ports - 外部ツールへの抽象化レイヤー
//!
//! 実装は `impls` に置く。テストでは fake を差し込む。

pub mod converter;

pub use self::converter::Converter;
