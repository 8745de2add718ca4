//! Wire types for the filesystem mailbox shared with agent containers.
//!
//! Agents write JSON files into `/workspace/ipc/{messages,tasks,media-requests}/`
//! and read downloaded media (or `.error` markers) from `/workspace/ipc/media/`.
//! Field names are camelCase on the wire to match the agent-side producers.

use serde::{Deserialize, Serialize};

/// Request for the host to fetch platform media into the mailbox.
/// Written to `media-requests/<requestId>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRequest {
    /// Unique within a mailbox's lifetime; names the result file.
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// Platform message the media belongs to.
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
    #[serde(rename = "imageKey", default)]
    pub image_key: Option<String>,
    #[serde(rename = "fileKey", default)]
    pub file_key: Option<String>,
    /// Chat the media lives in. Absence is an agent bug the host reports
    /// back through an `.error` marker.
    #[serde(rename = "chatJid", default)]
    pub chat_jid: Option<String>,
}

impl MediaRequest {
    /// The platform media key, preferring the file key over the image key.
    pub fn media_key(&self) -> Option<&str> {
        self.file_key
            .as_deref()
            .or(self.image_key.as_deref())
            .filter(|k| !k.is_empty())
    }
}

/// Structured failure written to `media/<requestId>.error` when a media
/// request cannot be satisfied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFailure {
    pub error: String,
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

impl MediaFailure {
    pub fn missing_chat_jid(message_id: Option<String>) -> Self {
        Self {
            error: "Missing chatJid in request".to_string(),
            message_id,
        }
    }

    pub fn download_failed(message_id: Option<String>) -> Self {
        Self {
            error: "Download failed".to_string(),
            message_id,
        }
    }
}

/// Outbound delivery request from an agent, written to `messages/*.json`.
///
/// `filePath` in the image/file variants is agent-relative
/// (`/workspace/ipc/media/<name>`); the host maps it back under the group's
/// own media directory before touching it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Message {
        #[serde(rename = "chatJid")]
        chat_jid: String,
        text: String,
        #[serde(default)]
        sender: Option<String>,
        #[serde(rename = "groupFolder", default)]
        group_folder: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    ImageMessage {
        #[serde(rename = "chatJid")]
        chat_jid: String,
        #[serde(rename = "filePath")]
        file_path: String,
        #[serde(default)]
        caption: Option<String>,
        #[serde(rename = "groupFolder", default)]
        group_folder: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    FileMessage {
        #[serde(rename = "chatJid")]
        chat_jid: String,
        #[serde(rename = "filePath")]
        file_path: String,
        #[serde(rename = "fileName", default)]
        file_name: Option<String>,
        #[serde(rename = "groupFolder", default)]
        group_folder: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
}

/// Task-store command from an agent, written to `tasks/*.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskRequest {
    CreateTask {
        prompt: String,
        schedule_type: String,
        schedule_value: String,
        #[serde(default = "default_context_mode")]
        context_mode: String,
        #[serde(rename = "targetJid", default)]
        target_jid: Option<String>,
        #[serde(rename = "createdBy", default)]
        created_by: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    UpdateTask {
        #[serde(rename = "taskId")]
        task_id: String,
        #[serde(default)]
        prompt: Option<String>,
        #[serde(default)]
        schedule_type: Option<String>,
        #[serde(default)]
        schedule_value: Option<String>,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    DeleteTask {
        #[serde(rename = "taskId")]
        task_id: String,
        #[serde(default)]
        timestamp: Option<String>,
    },
}

fn default_context_mode() -> String {
    "isolated".to_string()
}

/// Context for authorization decisions, derived from the mailbox folder.
#[derive(Debug, Clone)]
pub struct GroupContext {
    pub group_folder: String,
    /// The main group may target any chat; everyone else only their own.
    pub is_main: bool,
}

impl GroupContext {
    pub fn new(group_folder: impl Into<String>, main_group_folder: &str) -> Self {
        let group_folder = group_folder.into();
        let is_main = group_folder == main_group_folder;
        Self {
            group_folder,
            is_main,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_context_detects_main() {
        let ctx = GroupContext::new("main", "main");
        assert!(ctx.is_main);

        let ctx = GroupContext::new("team-eng", "main");
        assert!(!ctx.is_main);
    }

    #[test]
    fn parse_media_request() {
        let json = r#"{
            "type": "media_request",
            "requestId": "r1",
            "messageId": "m1",
            "imageKey": "k1",
            "chatJid": "t1"
        }"#;
        let req: MediaRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.request_id, "r1");
        assert_eq!(req.message_id.as_deref(), Some("m1"));
        assert_eq!(req.media_key(), Some("k1"));
        assert_eq!(req.chat_jid.as_deref(), Some("t1"));
    }

    #[test]
    fn media_key_prefers_file_key() {
        let req: MediaRequest = serde_json::from_str(
            r#"{"requestId":"r2","imageKey":"img","fileKey":"doc"}"#,
        )
        .unwrap();
        assert_eq!(req.media_key(), Some("doc"));
    }

    #[test]
    fn media_request_without_chat_jid_parses() {
        let req: MediaRequest =
            serde_json::from_str(r#"{"requestId":"r3","messageId":"m3"}"#).unwrap();
        assert!(req.chat_jid.is_none());
        assert!(req.media_key().is_none());
    }

    #[test]
    fn media_failure_serializes_error_and_message_id() {
        let failure = MediaFailure::download_failed(Some("m1".to_string()));
        let json = serde_json::to_string(&failure).unwrap();
        assert!(json.contains("\"error\":\"Download failed\""));
        assert!(json.contains("\"messageId\":\"m1\""));

        let failure = MediaFailure::missing_chat_jid(None);
        let json = serde_json::to_string(&failure).unwrap();
        assert!(json.contains("Missing chatJid in request"));
        assert!(!json.contains("messageId"));
    }

    #[test]
    fn parse_plain_message() {
        let json = r#"{
            "type": "message",
            "chatJid": "wa:120363",
            "text": "Build finished",
            "sender": "Courier",
            "groupFolder": "main",
            "timestamp": "2026-08-01T12:00:00Z"
        }"#;
        match serde_json::from_str::<OutboundMessage>(json).unwrap() {
            OutboundMessage::Message {
                chat_jid,
                text,
                sender,
                ..
            } => {
                assert_eq!(chat_jid, "wa:120363");
                assert_eq!(text, "Build finished");
                assert_eq!(sender.as_deref(), Some("Courier"));
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[test]
    fn parse_image_message() {
        let json = r#"{
            "type": "image_message",
            "chatJid": "wa:120363",
            "filePath": "/workspace/ipc/media/chart.png",
            "caption": "Weekly numbers",
            "groupFolder": "team-eng",
            "timestamp": "2026-08-01T12:00:00Z"
        }"#;
        match serde_json::from_str::<OutboundMessage>(json).unwrap() {
            OutboundMessage::ImageMessage {
                chat_jid,
                file_path,
                caption,
                ..
            } => {
                assert_eq!(chat_jid, "wa:120363");
                assert_eq!(file_path, "/workspace/ipc/media/chart.png");
                assert_eq!(caption.as_deref(), Some("Weekly numbers"));
            }
            other => panic!("expected ImageMessage, got {other:?}"),
        }
    }

    #[test]
    fn parse_create_task_defaults_context_mode() {
        let json = r#"{
            "type": "create_task",
            "prompt": "Check build status",
            "schedule_type": "cron",
            "schedule_value": "0 9 * * *",
            "targetJid": "wa:123"
        }"#;
        match serde_json::from_str::<TaskRequest>(json).unwrap() {
            TaskRequest::CreateTask {
                prompt,
                schedule_type,
                context_mode,
                target_jid,
                ..
            } => {
                assert_eq!(prompt, "Check build status");
                assert_eq!(schedule_type, "cron");
                assert_eq!(context_mode, "isolated");
                assert_eq!(target_jid.as_deref(), Some("wa:123"));
            }
            other => panic!("expected CreateTask, got {other:?}"),
        }
    }

    #[test]
    fn parse_delete_task() {
        let json = r#"{"type": "delete_task", "taskId": "task-12345"}"#;
        match serde_json::from_str::<TaskRequest>(json).unwrap() {
            TaskRequest::DeleteTask { task_id, .. } => assert_eq!(task_id, "task-12345"),
            other => panic!("expected DeleteTask, got {other:?}"),
        }
    }

    #[test]
    fn unknown_message_type_fails_to_parse() {
        let json = r#"{"type": "video_message", "chatJid": "wa:1"}"#;
        assert!(serde_json::from_str::<OutboundMessage>(json).is_err());
    }
}
