//! Domain model: layer bounds, pixmaps and host messages.

pub mod bounds;
pub mod message;
pub mod pixmap;

pub use bounds::{Bounds, BoundsChange, BoundsDiff, RawCoordinate, SideChange};
pub use message::{ImageChanged, LayerEvent};
pub use pixmap::Pixmap;
