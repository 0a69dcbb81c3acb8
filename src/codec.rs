//! Decoding of inbound feed frames

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    errors::DecodeError,
    models::{Coordinate, Mmsi, PositionReport, VesselMetadata},
};

/// Message type tag of an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MessageKind {
    PositionReport,
    UnknownMessage,
    AddressedSafetyMessage,
    AddressedBinaryMessage,
    AidsToNavigationReport,
    AssignedModeCommand,
    BaseStationReport,
    BinaryAcknowledge,
    BinaryBroadcastMessage,
    ChannelManagement,
    CoordinatedUTCInquiry,
    DataLinkManagementMessage,
    DataLinkManagementMessageData,
    ExtendedClassBPositionReport,
    GroupAssignmentCommand,
    GnssBroadcastBinaryMessage,
    Interrogation,
    LongRangeAisBroadcastMessage,
    MultiSlotBinaryMessage,
    SafetyBroadcastMessage,
    ShipStaticData,
    SingleSlotBinaryMessage,
    StandardClassBPositionReport,
    StandardSearchAndRescueAircraftReport,
    StaticDataReport,
    /// Tag not known to this version of the decoder
    #[serde(other)]
    Unrecognized,
}

/// Decoded message body
#[derive(Debug, Clone, PartialEq)]
pub enum AisStreamMessage {
    PositionReport(PositionReport),
    /// Any other kind; carried through but not acted upon
    Ignored(MessageKind),
}

/// Decoded frame: message body plus optional vessel metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub metadata: VesselMetadata,
    pub message: AisStreamMessage,
}

#[derive(Deserialize)]
struct RawEnvelope {
    /// Set instead of a message when the feed rejects the session
    #[serde(default)]
    error: Option<String>,
    #[serde(rename = "MessageType", default)]
    message_type: Option<MessageKind>,
    #[serde(rename = "MetaData", default)]
    metadata: Option<Value>,
    #[serde(rename = "Message", default)]
    message: Option<Map<String, Value>>,
}

/// Required subset of the feed's position report payload
#[derive(Deserialize)]
struct RawPositionReport {
    #[serde(rename = "UserID")]
    user_id: u32,
    #[serde(rename = "Latitude")]
    latitude: f64,
    #[serde(rename = "Longitude")]
    longitude: f64,
}

/// Decode one frame received at `received_at`.
pub fn decode(payload: &[u8], received_at: DateTime<Utc>) -> Result<Envelope, DecodeError> {
    let raw: RawEnvelope = serde_json::from_slice(payload)?;
    if let Some(error) = raw.error {
        return Err(DecodeError::Feed(error));
    }
    let message_type = raw.message_type.ok_or(DecodeError::MissingMessageType)?;

    let metadata = raw
        .metadata
        .as_ref()
        .and_then(Value::as_object)
        .map(VesselMetadata::from_map)
        .unwrap_or_default();

    let message = match message_type {
        MessageKind::PositionReport => {
            let body = raw
                .message
                .and_then(|mut m| m.remove("PositionReport"))
                .filter(|v| !v.is_null())
                .ok_or(DecodeError::MissingPayload("PositionReport"))?;
            let report: RawPositionReport =
                serde_json::from_value(body).map_err(|source| DecodeError::InvalidPayload {
                    kind: "PositionReport",
                    source,
                })?;
            let mmsi = Mmsi::try_from(report.user_id)
                .map_err(|_| DecodeError::InvalidMmsi(report.user_id))?;
            // AIS encodes "not available" as lat 91 / lon 181
            if !Coordinate::new(report.latitude, report.longitude).is_valid() {
                return Err(DecodeError::InvalidPosition {
                    mmsi,
                    lat: report.latitude,
                    lon: report.longitude,
                });
            }

            AisStreamMessage::PositionReport(PositionReport {
                mmsi,
                lat: report.latitude,
                lon: report.longitude,
                observed_at: received_at,
            })
        }
        other => AisStreamMessage::Ignored(other),
    };

    Ok(Envelope { metadata, message })
}
