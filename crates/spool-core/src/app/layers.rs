//! LayerTracker - レイヤーごとの bounds を保持する
//!
//! host は変化した辺だけを送ってくるので、最新の bounds を組み立てて持っておく。

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{Bounds, BoundsDiff, ImageChanged, LayerEvent};
use crate::error::BoundsError;

/// Current bounds of one layer, after applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerUpdate {
    pub document_id: u64,
    pub layer_id: u64,
    pub bounds: Bounds,
    /// `None` when the event did not move any side.
    pub diff: Option<BoundsDiff>,
}

/// Bounds of every layer seen so far, keyed by `(document, layer)`.
#[derive(Debug, Default)]
pub struct LayerTracker {
    layers: HashMap<(u64, u64), Bounds>,
}

impl LayerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounds(&self, document_id: u64, layer_id: u64) -> Option<Bounds> {
        self.layers.get(&(document_id, layer_id)).copied()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Apply one layer event. Unknown layers start from empty bounds.
    pub fn apply(&mut self, document_id: u64, event: &LayerEvent) -> Result<LayerUpdate, BoundsError> {
        let bounds = self.layers.entry((document_id, event.layer_id)).or_default();
        let diff = match &event.bounds {
            Some(change) => bounds.apply_change(change)?,
            None => None,
        };
        if let Some(diff) = &diff {
            debug!(document_id, layer_id = event.layer_id, ?diff, "layer bounds changed");
        }
        Ok(LayerUpdate {
            document_id,
            layer_id: event.layer_id,
            bounds: *bounds,
            diff,
        })
    }

    /// Apply every layer event of a message, in order.
    ///
    /// An invalid event is returned as an error in its slot; the other
    /// layers are still updated.
    pub fn apply_message(&mut self, message: &ImageChanged) -> Vec<Result<LayerUpdate, BoundsError>> {
        message
            .layer_events
            .iter()
            .map(|event| self.apply(message.document_id, event))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(json: &str) -> ImageChanged {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn accumulates_partial_bounds_changes() {
        let mut tracker = LayerTracker::new();

        let first = tracker.apply_message(&message(
            r#"{"documentID": 1, "layerEvents": [{"layerID": 2, "bounds": {"top": 0, "left": 0, "bottom": 10, "right": 20}}]}"#,
        ));
        let first = first[0].as_ref().unwrap();
        assert_eq!(first.bounds, Bounds::new(0, 20, 10, 0));

        let second = tracker.apply_message(&message(
            r#"{"documentID": 1, "layerEvents": [{"layerID": 2, "bounds": {"right": "30"}}]}"#,
        ));
        let second = second[0].as_ref().unwrap();
        assert_eq!(second.bounds, Bounds::new(0, 30, 10, 0));
        assert_eq!(second.diff.as_ref().unwrap().right.unwrap().previous, 20);
        assert_eq!(tracker.bounds(1, 2), Some(Bounds::new(0, 30, 10, 0)));
    }

    #[test]
    fn event_without_bounds_keeps_previous_bounds() {
        let mut tracker = LayerTracker::new();
        tracker.apply_message(&message(
            r#"{"documentID": 1, "layerEvents": [{"layerID": 2, "bounds": {"bottom": 5, "right": 5}}]}"#,
        ));

        let updates = tracker.apply_message(&message(r#"{"documentID": 1, "layerEvents": [{"layerID": 2}]}"#));
        let update = updates[0].as_ref().unwrap();
        assert_eq!(update.bounds, Bounds::new(0, 5, 5, 0));
        assert_eq!(update.diff, None);
    }

    #[test]
    fn unknown_layer_without_bounds_is_empty() {
        let mut tracker = LayerTracker::new();
        let updates = tracker.apply_message(&message(r#"{"documentID": 4, "layerEvents": [{"layerID": 8}]}"#));
        assert!(updates[0].as_ref().unwrap().bounds.is_empty());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn invalid_event_does_not_block_other_layers() {
        let mut tracker = LayerTracker::new();
        let updates = tracker.apply_message(&message(
            r#"{"documentID": 1, "layerEvents": [{"layerID": 1, "bounds": {"top": "x"}}, {"layerID": 2, "bounds": {"right": 3}}]}"#,
        ));

        assert!(updates[0].is_err());
        assert_eq!(updates[1].as_ref().unwrap().bounds.right, 3);
    }
}
