//! Realtime message taxonomy
//!
//! Every frame on the WebSocket channel is a JSON object with a `type`
//! field. Client frames deserialize into [`ClientMessage`], server frames
//! serialize from [`ServerMessage`]. Field names on the wire are camelCase.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::types::{FusedCaption, RawCaption, SessionMode};

/// Role a connection identifies as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    Admin,
    Subtitler,
    Spectator,
}

/// Frames received from clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "identify", rename_all = "camelCase")]
    Identify {
        client_type: ClientRole,
        #[serde(default)]
        name: Option<String>,
    },

    #[serde(rename = "fragment:join")]
    FragmentJoin {
        #[serde(default)]
        name: Option<String>,
    },

    #[serde(rename = "fragment:leave")]
    FragmentLeave {},

    #[serde(rename = "caption", rename_all = "camelCase")]
    Caption {
        text: String,
        #[serde(default)]
        subtitler_name: Option<String>,
        #[serde(default)]
        auto_sent: bool,
    },
}

/// Live-run lifecycle phases announced to everyone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LiveStatus {
    Starting,
    Started,
    Stopped,
}

/// Roster entry in status broadcasts
#[derive(Debug, Clone, Serialize)]
pub struct SubtitlerInfo {
    pub id: Uuid,
    pub name: String,
}

/// Fields common to subtitler and admin status frames
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCommon {
    pub active: bool,
    pub slot_duration: u64,
    pub grace_period_percent: u64,
    pub required_subtitlers: usize,
    pub overlap_duration: u64,
    pub current_slot_index: Option<u64>,
    pub current_subtitler_id: Option<Uuid>,
    pub current_subtitler_name: Option<String>,
    pub subtitler_count: usize,
    pub subtitlers: Vec<SubtitlerInfo>,
}

/// Individualized status frame body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentStatusPayload {
    #[serde(flatten)]
    pub common: StatusCommon,
    /// Countdown to this recipient's deadline, or to their next assigned
    /// slot start when they have no open slot
    pub seconds_remaining: Option<u64>,
    pub is_my_turn: bool,
    pub in_grace_period: bool,
}

/// Aggregate status frame body for admins; doubles as the REST
/// `/fragment/status` response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatusPayload {
    #[serde(flatten)]
    pub common: StatusCommon,
    pub raw_captions_count: usize,
    pub fused_captions_count: usize,
    pub slots_count: usize,
}

/// Caption payload echoed to other subtitlers (and to spectators in
/// direct mode)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptionEcho {
    pub text: String,
    pub subtitler_name: Option<String>,
    pub auto_sent: bool,
}

/// Frames sent to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "init", rename_all = "camelCase")]
    Init {
        conn_id: Uuid,
        running: bool,
        delay_sec: u64,
        mode: SessionMode,
        fragment_mode: bool,
    },

    #[serde(rename = "live", rename_all = "camelCase")]
    Live {
        status: LiveStatus,
        delay_sec: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        live_started_at: Option<u64>,
    },

    #[serde(rename = "config", rename_all = "camelCase")]
    Config { delay_sec: u64 },

    #[serde(rename = "fragment:started")]
    FragmentStarted {},

    #[serde(rename = "fragment:stopped")]
    FragmentStopped {},

    #[serde(rename = "fragment:status")]
    FragmentStatus(FragmentStatusPayload),

    #[serde(rename = "fragment:admin-status")]
    FragmentAdminStatus(AdminStatusPayload),

    #[serde(rename = "fragment:joined", rename_all = "camelCase")]
    FragmentJoined { conn_id: Uuid, active: bool },

    #[serde(rename = "fragment:prepare", rename_all = "camelCase")]
    FragmentPrepare { seconds_left: u64 },

    #[serde(rename = "fragment:ending", rename_all = "camelCase")]
    FragmentEnding { seconds_left: u64 },

    #[serde(rename = "fragment:grace-start", rename_all = "camelCase")]
    FragmentGraceStart { grace_period_percent: u64 },

    #[serde(rename = "fragment:auto-send")]
    FragmentAutoSend {},

    #[serde(rename = "fragment:raw-caption", rename_all = "camelCase")]
    FragmentRawCaption { caption: RawCaption, slot_index: u64 },

    #[serde(rename = "fragment:fused-caption", rename_all = "camelCase")]
    FragmentFusedCaption {
        caption: FusedCaption,
        overlap_count: usize,
    },

    #[serde(rename = "caption", rename_all = "camelCase")]
    Caption {
        caption: CaptionEcho,
        #[serde(skip_serializing_if = "Option::is_none")]
        display_at: Option<u64>,
    },

    #[serde(rename = "caption:word", rename_all = "camelCase")]
    CaptionWord {
        id: Uuid,
        word: String,
        word_index: usize,
        total_words: usize,
        is_last: bool,
        video_timestamp: u64,
        slot_index: u64,
        subtitler_name: String,
        slot_duration_ms: u64,
    },
}

impl ServerMessage {
    /// Serialize to the wire representation
    pub fn to_json(&self) -> String {
        // ServerMessage contains no map keys or non-string-keyed types
        // that could fail serialization.
        serde_json::to_string(self).expect("server message serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_deserializes() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"identify","clientType":"subtitler","name":"Ana"}"#)
                .unwrap();
        match msg {
            ClientMessage::Identify { client_type, name } => {
                assert_eq!(client_type, ClientRole::Subtitler);
                assert_eq!(name.as_deref(), Some("Ana"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_caption_defaults() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"caption","text":"Bonjour."}"#).unwrap();
        match msg {
            ClientMessage::Caption {
                text,
                subtitler_name,
                auto_sent,
            } => {
                assert_eq!(text, "Bonjour.");
                assert!(subtitler_name.is_none());
                assert!(!auto_sent);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"fragment:nonsense"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_type_tags() {
        let json = ServerMessage::FragmentGraceStart {
            grace_period_percent: 20,
        }
        .to_json();
        assert!(json.contains(r#""type":"fragment:grace-start""#));
        assert!(json.contains(r#""gracePeriodPercent":20"#));

        let json = ServerMessage::Live {
            status: LiveStatus::Started,
            delay_sec: 30,
            live_started_at: Some(1000),
        }
        .to_json();
        assert!(json.contains(r#""status":"started""#));
        assert!(json.contains(r#""liveStartedAt":1000"#));
    }

    #[test]
    fn test_caption_word_field_names() {
        let json = ServerMessage::CaptionWord {
            id: Uuid::nil(),
            word: "a".to_string(),
            word_index: 0,
            total_words: 4,
            is_last: false,
            video_timestamp: 1500,
            slot_index: 2,
            subtitler_name: "S1".to_string(),
            slot_duration_ms: 8000,
        }
        .to_json();
        for field in [
            "wordIndex",
            "totalWords",
            "isLast",
            "videoTimestamp",
            "slotIndex",
            "subtitlerName",
            "slotDurationMs",
        ] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
    }

    #[test]
    fn test_status_frame_flattens_common_fields() {
        let json = ServerMessage::FragmentStatus(FragmentStatusPayload {
            common: StatusCommon {
                active: true,
                slot_duration: 10,
                grace_period_percent: 20,
                required_subtitlers: 2,
                overlap_duration: 4,
                current_slot_index: Some(3),
                current_subtitler_id: None,
                current_subtitler_name: None,
                subtitler_count: 2,
                subtitlers: vec![],
            },
            seconds_remaining: Some(7),
            is_my_turn: true,
            in_grace_period: false,
        })
        .to_json();
        assert!(json.contains(r#""type":"fragment:status""#));
        assert!(json.contains(r#""slotDuration":10"#));
        assert!(json.contains(r#""currentSlotIndex":3"#));
        assert!(json.contains(r#""secondsRemaining":7"#));
        assert!(json.contains(r#""isMyTurn":true"#));
    }

    #[test]
    fn test_init_omits_nothing() {
        let json = ServerMessage::Init {
            conn_id: Uuid::nil(),
            running: false,
            delay_sec: 30,
            mode: SessionMode::Fragmentation,
            fragment_mode: false,
        }
        .to_json();
        assert!(json.contains(r#""mode":"fragmentation""#));
        assert!(json.contains(r#""fragmentMode":false"#));
    }
}
