//! Host notifications about changed layers.

use serde::{Deserialize, Serialize};

use super::BoundsChange;

/// `imageChanged` notification sent by the host application.
///
/// ```json
/// {"documentID": 12, "layerEvents": [{"layerID": 3, "bounds": {"right": "40"}}]}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageChanged {
    #[serde(rename = "documentID")]
    pub document_id: u64,

    #[serde(default)]
    pub layer_events: Vec<LayerEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerEvent {
    #[serde(rename = "layerID")]
    pub layer_id: u64,

    /// Sides of the layer bounds that changed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundsChange>,
}

impl ImageChanged {
    pub fn layer_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.layer_events.iter().map(|e| e.layer_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawCoordinate;

    #[test]
    fn parses_host_message() {
        let msg: ImageChanged = serde_json::from_str(
            r#"{"documentID": 12, "layerEvents": [{"layerID": 3, "bounds": {"right": "40"}}, {"layerID": 4}]}"#,
        )
        .unwrap();

        assert_eq!(msg.document_id, 12);
        assert_eq!(msg.layer_ids().collect::<Vec<_>>(), vec![3, 4]);
        let bounds = msg.layer_events[0].bounds.as_ref().unwrap();
        assert_eq!(bounds.right, Some(RawCoordinate::Text("40".into())));
        assert!(msg.layer_events[1].bounds.is_none());
    }

    #[test]
    fn missing_layer_events_means_no_layers() {
        let msg: ImageChanged = serde_json::from_str(r#"{"documentID": 1}"#).unwrap();
        assert_eq!(msg.layer_ids().count(), 0);
    }

    #[test]
    fn missing_document_id_is_rejected() {
        let res = serde_json::from_str::<ImageChanged>(r#"{"layerEvents": []}"#);
        assert!(res.is_err());
    }
}
