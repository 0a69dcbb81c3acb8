//! Subscription request sent to the feed after connecting

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::{
    errors::AisTrackerError,
    models::{BoundingBox, Mmsi},
};

/// First outbound frame of every session
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "APIKey")]
    pub api_key: String,
    #[serde(rename = "BoundingBoxes")]
    pub bounding_boxes: Vec<BoundingBox>,
    /// Allow-listed vessels; empty means no MMSI filtering
    #[serde_as(as = "BTreeSet<DisplayFromStr>")]
    #[serde(
        rename = "FiltersShipMMSI",
        default,
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub filters_ship_mmsi: BTreeSet<Mmsi>,
    /// Message types to deliver; empty means all
    #[serde(
        rename = "FilterMessageTypes",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub filter_message_types: Vec<String>,
}

impl SubscriptionRequest {
    pub fn new(
        api_key: impl Into<String>,
        bounding_boxes: Vec<BoundingBox>,
        mmsi: impl IntoIterator<Item = Mmsi>,
    ) -> Result<Self, AisTrackerError> {
        let request = Self {
            api_key: api_key.into(),
            bounding_boxes,
            filters_ship_mmsi: mmsi.into_iter().collect(),
            filter_message_types: Vec::new(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn with_message_types(mut self, types: impl IntoIterator<Item = String>) -> Self {
        self.filter_message_types = types.into_iter().collect();
        self
    }

    fn validate(&self) -> Result<(), AisTrackerError> {
        if self.api_key.trim().is_empty() {
            return Err(AisTrackerError::ConfigurationError {
                message: "API key cannot be empty".to_string(),
            });
        }
        if self.bounding_boxes.is_empty() {
            return Err(AisTrackerError::ConfigurationError {
                message: "At least one bounding box is required".to_string(),
            });
        }
        if let Some(bbox) = self.bounding_boxes.iter().find(|b| !b.is_valid()) {
            return Err(AisTrackerError::ConfigurationError {
                message: format!("Bounding box out of range: {:?}", bbox),
            });
        }
        Ok(())
    }

    /// Wire form of the request
    pub fn to_json(&self) -> Result<String, AisTrackerError> {
        Ok(serde_json::to_string(self)?)
    }
}
