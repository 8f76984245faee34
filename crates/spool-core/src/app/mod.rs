//! App - アプリケーション層
//!
//! domain と ports を組み合わせて、レイヤー変更から asset を書き出す。
//!
//! # 主要コンポーネント
//! - **LayerTracker**: host から届く部分的な bounds 変更を積み上げる
//! - **AssetExporter**: pixmap を PNG として書き出す（古い変換結果は捨てる）

pub mod exporter;
pub mod layers;

pub use self::exporter::{AssetExporter, ExportOutcome};
pub use self::layers::{LayerTracker, LayerUpdate};
