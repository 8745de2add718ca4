//! Snapshot types shared with the external persistence collaborator.
//!
//! The mailbox watcher reads these, never writes them: group registration
//! and the task store are owned elsewhere, and the watcher sees a fresh
//! snapshot each poll tick.

use serde::{Deserialize, Serialize};

/// A registered chat destination the system may act on behalf of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredGroup {
    /// Stable chat identifier (e.g. "wa:120363041234").
    pub jid: String,
    pub name: String,
    /// Filesystem-safe mailbox folder, unique per group.
    pub folder: String,
    /// Trigger pattern that wakes the agent for this group.
    pub trigger: String,
    pub added_at: String,
}

/// A scheduled task as stored by the external task store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub group_folder: String,
    /// Chat that receives the task's output.
    pub chat_jid: String,
    pub prompt: String,
    pub schedule_type: String,
    pub schedule_value: String,
    #[serde(default = "default_context_mode")]
    pub context_mode: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub created_at: String,
}

/// Partial update applied to a stored task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

fn default_context_mode() -> String {
    "isolated".to_string()
}

fn default_status() -> String {
    "active".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_task_defaults_on_deserialize() {
        let json = r#"{
            "id": "task-1",
            "group_folder": "main",
            "chat_jid": "wa:1",
            "prompt": "ping",
            "schedule_type": "interval",
            "schedule_value": "3600",
            "created_at": "2026-08-01T00:00:00Z"
        }"#;
        let task: ScheduledTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.context_mode, "isolated");
        assert_eq!(task.status, "active");
    }

    #[test]
    fn task_update_skips_absent_fields() {
        let update = TaskUpdate {
            status: Some("paused".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"status":"paused"}"#);
    }
}
