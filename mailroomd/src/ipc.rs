//! Filesystem mailbox watcher for mailroomd.
//!
//! Polls `{ipc_base}/{group}/` mailboxes for media requests, outbound
//! messages, and task commands written by sandboxed agent containers.
//! Files are processed read -> act -> unlink; deletion is the completion
//! signal, so a request is handled at most once and a fault in one file
//! never blocks the rest of the tick.
//!
//! Authorization model:
//! - The main group can target any chat and schedule tasks for any chat.
//! - Non-main groups can only target their own registered chat JID.
//! - Media paths named by agents must resolve inside the group's own
//!   `media/` directory; escapes are dropped and logged.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mailroom_core::mailbox::{AGENT_MEDIA_ROOT, DirQueue, Mailbox, WorkQueue};
use mailroom_core::{
    GroupContext, MediaFailure, MediaRequest, OutboundMessage, RegisteredGroup, ScheduledTask,
    TaskRequest, TaskUpdate,
};
use tracing::{debug, error, info, warn};

/// Configuration for the mailbox watcher.
#[derive(Debug, Clone)]
pub struct IpcWatcherConfig {
    /// Base directory for mailboxes (e.g. `data/ipc`).
    pub ipc_base_dir: PathBuf,
    /// Poll interval.
    pub poll_interval: Duration,
    /// Folder name of the privileged main group.
    pub main_group_folder: String,
}

impl Default for IpcWatcherConfig {
    fn default() -> Self {
        Self {
            ipc_base_dir: PathBuf::from("data/ipc"),
            poll_interval: Duration::from_secs(1),
            main_group_folder: "main".to_string(),
        }
    }
}

/// Host-side capabilities the watcher needs but does not own: chat delivery,
/// media download, group registration, and the task store.
///
/// Delivery calls are best-effort; implementations log their own failures
/// and never panic into the watcher. `download_media` returns the written
/// filename, or `None` on any failure (expired reference, permission error,
/// network fault).
pub trait HostDelegate: Send + Sync {
    fn send_message(&self, chat_jid: &str, text: &str, sender: Option<&str>);

    fn send_image(&self, chat_jid: &str, file_path: &Path, caption: Option<&str>);

    fn send_file(&self, chat_jid: &str, file_path: &Path, file_name: &str);

    fn download_media(
        &self,
        chat_jid: &str,
        message_id: Option<&str>,
        media_key: &str,
        dest_dir: &Path,
        request_id: &str,
    ) -> Option<String>;

    /// Snapshot of registered groups, keyed by chat JID. Read fresh each tick.
    fn registered_groups(&self) -> HashMap<String, RegisteredGroup>;

    fn create_task(&self, task: ScheduledTask) -> anyhow::Result<()>;

    fn update_task(&self, task_id: &str, update: &TaskUpdate) -> anyhow::Result<()>;

    fn delete_task(&self, task_id: &str) -> anyhow::Result<()>;

    fn task_by_id(&self, task_id: &str) -> Option<ScheduledTask>;
}

/// No-op delegate that logs actions. Used when mailroomd runs standalone,
/// without a chat host wired in.
pub struct LogOnlyDelegate;

impl HostDelegate for LogOnlyDelegate {
    fn send_message(&self, chat_jid: &str, text: &str, _sender: Option<&str>) {
        info!(chat_jid, text_len = text.len(), "outbound message (no delegate wired, logged only)");
    }

    fn send_image(&self, chat_jid: &str, file_path: &Path, _caption: Option<&str>) {
        info!(chat_jid, path = %file_path.display(), "outbound image (no delegate wired, logged only)");
    }

    fn send_file(&self, chat_jid: &str, file_path: &Path, file_name: &str) {
        info!(chat_jid, path = %file_path.display(), file_name, "outbound file (no delegate wired, logged only)");
    }

    fn download_media(
        &self,
        chat_jid: &str,
        _message_id: Option<&str>,
        _media_key: &str,
        _dest_dir: &Path,
        request_id: &str,
    ) -> Option<String> {
        info!(chat_jid, request_id, "media request (no delegate wired, logged only)");
        None
    }

    fn registered_groups(&self) -> HashMap<String, RegisteredGroup> {
        HashMap::new()
    }

    fn create_task(&self, task: ScheduledTask) -> anyhow::Result<()> {
        info!(task_id = %task.id, group = %task.group_folder, "task create (no delegate wired, logged only)");
        Ok(())
    }

    fn update_task(&self, task_id: &str, _update: &TaskUpdate) -> anyhow::Result<()> {
        info!(task_id, "task update (no delegate wired, logged only)");
        Ok(())
    }

    fn delete_task(&self, task_id: &str) -> anyhow::Result<()> {
        info!(task_id, "task delete (no delegate wired, logged only)");
        Ok(())
    }

    fn task_by_id(&self, _task_id: &str) -> Option<ScheduledTask> {
        None
    }
}

/// The mailbox watcher. One instance per process, shared across all groups.
pub struct IpcWatcher {
    config: IpcWatcherConfig,
    delegate: Arc<dyn HostDelegate>,
}

impl IpcWatcher {
    pub fn new(config: IpcWatcherConfig, delegate: Arc<dyn HostDelegate>) -> Self {
        Self { config, delegate }
    }

    /// Run the polling loop. Call from a tokio::spawn; the spawn returns
    /// immediately and the first tick happens one interval later.
    ///
    /// Shutdown is observed between ticks, so an in-flight tick always
    /// drains fully and no half-handled request files are left behind.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        fs::create_dir_all(&self.config.ipc_base_dir).ok();
        info!(dir = %self.config.ipc_base_dir.display(), "mailbox watcher started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    self.poll_once();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mailbox watcher shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Process one tick across all registered groups.
    fn poll_once(&self) {
        let groups = self.delegate.registered_groups();
        let mut registered: Vec<&RegisteredGroup> = groups.values().collect();
        registered.sort_by(|a, b| a.folder.cmp(&b.folder));

        for group in registered {
            let ctx = GroupContext::new(&group.folder, &self.config.main_group_folder);
            let mailbox = Mailbox::new(&self.config.ipc_base_dir, &group.folder);
            if let Err(err) = mailbox.ensure_layout() {
                warn!(group = %group.folder, err = %err, "failed to ensure mailbox layout");
                continue;
            }

            let requests = DirQueue::new(mailbox.media_requests_dir());
            let media = DirQueue::new(mailbox.media_dir());
            let messages = DirQueue::new(mailbox.messages_dir());
            let tasks = DirQueue::new(mailbox.tasks_dir());

            self.process_media_requests(&requests, &media, &mailbox.media_dir(), &groups, &ctx);
            self.process_messages(&messages, &mailbox.media_dir(), group, &ctx);
            self.process_tasks(&tasks, group, &ctx);
        }
    }

    /// Media-request phase: fetch platform media into `media/`, or record a
    /// structured failure there. The request file is retired exactly once,
    /// after the result (file or `.error` marker) is on disk.
    fn process_media_requests(
        &self,
        requests: &dyn WorkQueue,
        media: &dyn WorkQueue,
        media_dir: &Path,
        groups: &HashMap<String, RegisteredGroup>,
        ctx: &GroupContext,
    ) {
        for name in requests.pending() {
            let content = match requests.read(&name) {
                Ok(content) => content,
                Err(err) => {
                    debug!(name = %name, err = %err, "media request vanished before read");
                    continue;
                }
            };

            let request: MediaRequest = match serde_json::from_str(&content) {
                Ok(request) => request,
                Err(err) => {
                    error!(group = %ctx.group_folder, name = %name, err = %err, "failed to parse media request");
                    requests.retire(&name);
                    continue;
                }
            };

            let chat_jid = request
                .chat_jid
                .as_deref()
                .map(str::trim)
                .filter(|jid| !jid.is_empty());
            let Some(chat_jid) = chat_jid else {
                warn!(
                    group = %ctx.group_folder,
                    request_id = %request.request_id,
                    "media request missing chatJid"
                );
                self.publish_media_failure(
                    media,
                    &request.request_id,
                    MediaFailure::missing_chat_jid(request.message_id.clone()),
                );
                requests.retire(&name);
                continue;
            };

            if let Some(owner) = groups.get(chat_jid) {
                debug!(chat_jid, owner = %owner.folder, "media request target resolved");
            }

            let downloaded = self.delegate.download_media(
                chat_jid,
                request.message_id.as_deref(),
                request.media_key().unwrap_or(""),
                media_dir,
                &request.request_id,
            );

            match downloaded {
                Some(filename) => {
                    debug!(
                        group = %ctx.group_folder,
                        request_id = %request.request_id,
                        filename = %filename,
                        "media downloaded"
                    );
                }
                None => {
                    warn!(
                        group = %ctx.group_folder,
                        request_id = %request.request_id,
                        chat_jid,
                        "media download failed"
                    );
                    self.publish_media_failure(
                        media,
                        &request.request_id,
                        MediaFailure::download_failed(request.message_id.clone()),
                    );
                }
            }

            requests.retire(&name);
        }
    }

    fn publish_media_failure(&self, media: &dyn WorkQueue, request_id: &str, failure: MediaFailure) {
        let marker = format!("{request_id}.error");
        let content = match serde_json::to_string(&failure) {
            Ok(content) => content,
            Err(err) => {
                error!(request_id, err = %err, "failed to encode media failure");
                return;
            }
        };
        if let Err(err) = media.publish(&marker, &content) {
            error!(request_id, err = %err, "failed to write media failure marker");
        }
    }

    /// Outbound-message phase: deliver agent-produced messages to their chat
    /// destination. Every file is retired after processing regardless of
    /// delivery outcome; the contract is at most one delivery attempt.
    fn process_messages(
        &self,
        messages: &dyn WorkQueue,
        media_dir: &Path,
        group: &RegisteredGroup,
        ctx: &GroupContext,
    ) {
        for name in messages.pending() {
            let content = match messages.read(&name) {
                Ok(content) => content,
                Err(err) => {
                    debug!(name = %name, err = %err, "message file vanished before read");
                    continue;
                }
            };

            let parsed: OutboundMessage = match serde_json::from_str(&content) {
                Ok(parsed) => parsed,
                Err(err) => {
                    error!(group = %ctx.group_folder, name = %name, err = %err, "failed to parse outbound message");
                    messages.retire(&name);
                    continue;
                }
            };

            match parsed {
                OutboundMessage::Message {
                    chat_jid,
                    text,
                    sender,
                    ..
                } => {
                    if chat_jid.is_empty() || text.is_empty() {
                        warn!(group = %ctx.group_folder, name = %name, "outbound message missing fields");
                    } else if self.authorized(&chat_jid, group, ctx) {
                        self.delegate.send_message(&chat_jid, &text, sender.as_deref());
                        debug!(chat_jid = %chat_jid, group = %ctx.group_folder, "outbound message dispatched");
                    }
                }
                OutboundMessage::ImageMessage {
                    chat_jid,
                    file_path,
                    caption,
                    ..
                } => match resolve_media_path(media_dir, &file_path) {
                    None => {
                        warn!(
                            group = %ctx.group_folder,
                            path = %file_path,
                            "image path escapes media directory, dropping"
                        );
                    }
                    Some(host_path) => {
                        if self.authorized(&chat_jid, group, ctx) {
                            self.delegate.send_image(&chat_jid, &host_path, caption.as_deref());
                            debug!(chat_jid = %chat_jid, path = %host_path.display(), "outbound image dispatched");
                        }
                    }
                },
                OutboundMessage::FileMessage {
                    chat_jid,
                    file_path,
                    file_name,
                    ..
                } => match resolve_media_path(media_dir, &file_path) {
                    None => {
                        warn!(
                            group = %ctx.group_folder,
                            path = %file_path,
                            "file path escapes media directory, dropping"
                        );
                    }
                    Some(host_path) => {
                        if self.authorized(&chat_jid, group, ctx) {
                            let file_name = file_name
                                .filter(|n| !n.is_empty())
                                .or_else(|| {
                                    host_path
                                        .file_name()
                                        .map(|n| n.to_string_lossy().into_owned())
                                })
                                .unwrap_or_else(|| "file".to_string());
                            self.delegate.send_file(&chat_jid, &host_path, &file_name);
                            debug!(chat_jid = %chat_jid, path = %host_path.display(), "outbound file dispatched");
                        }
                    }
                },
            }

            messages.retire(&name);
        }
    }

    /// Destination authorization: main targets anything, everyone else only
    /// their own registered chat.
    fn authorized(&self, chat_jid: &str, group: &RegisteredGroup, ctx: &GroupContext) -> bool {
        if ctx.is_main || chat_jid == group.jid {
            true
        } else {
            warn!(
                chat_jid,
                group = %ctx.group_folder,
                "unauthorized destination blocked"
            );
            false
        }
    }

    /// Task phase: apply create/update/delete commands to the external task
    /// store. Failures are logged and the file is retired either way; a
    /// malformed task must not jam the mailbox.
    fn process_tasks(&self, tasks: &dyn WorkQueue, group: &RegisteredGroup, ctx: &GroupContext) {
        for name in tasks.pending() {
            let content = match tasks.read(&name) {
                Ok(content) => content,
                Err(err) => {
                    debug!(name = %name, err = %err, "task file vanished before read");
                    continue;
                }
            };

            let request: TaskRequest = match serde_json::from_str(&content) {
                Ok(request) => request,
                Err(err) => {
                    error!(group = %ctx.group_folder, name = %name, err = %err, "failed to parse task request");
                    tasks.retire(&name);
                    continue;
                }
            };

            match request {
                TaskRequest::CreateTask {
                    prompt,
                    schedule_type,
                    schedule_value,
                    context_mode,
                    target_jid,
                    created_by,
                    ..
                } => {
                    if prompt.is_empty() || schedule_value.is_empty() {
                        warn!(group = %ctx.group_folder, name = %name, "task create missing prompt or schedule");
                    } else {
                        let chat_jid = match target_jid.filter(|jid| !jid.is_empty()) {
                            Some(jid) if ctx.is_main || jid == group.jid => jid,
                            Some(jid) => {
                                warn!(
                                    target = %jid,
                                    group = %ctx.group_folder,
                                    "task target not authorized, using the group's own chat"
                                );
                                group.jid.clone()
                            }
                            None => group.jid.clone(),
                        };

                        let task = ScheduledTask {
                            id: generate_task_id(),
                            group_folder: ctx.group_folder.clone(),
                            chat_jid,
                            prompt,
                            schedule_type,
                            schedule_value,
                            context_mode,
                            status: "active".to_string(),
                            created_at: chrono::Utc::now().to_rfc3339(),
                        };
                        let task_id = task.id.clone();
                        match self.delegate.create_task(task) {
                            Ok(()) => info!(
                                task_id = %task_id,
                                group = %ctx.group_folder,
                                created_by = created_by.as_deref().unwrap_or("agent"),
                                "scheduled task created"
                            ),
                            Err(err) => {
                                error!(task_id = %task_id, err = %err, "failed to create scheduled task");
                            }
                        }
                    }
                }
                TaskRequest::UpdateTask {
                    task_id,
                    prompt,
                    schedule_type,
                    schedule_value,
                    status,
                    ..
                } => {
                    if self.delegate.task_by_id(&task_id).is_none() {
                        warn!(task_id = %task_id, group = %ctx.group_folder, "update for unknown task");
                    } else {
                        let update = TaskUpdate {
                            prompt,
                            schedule_type,
                            schedule_value,
                            status,
                        };
                        if let Err(err) = self.delegate.update_task(&task_id, &update) {
                            error!(task_id = %task_id, err = %err, "failed to update scheduled task");
                        }
                    }
                }
                TaskRequest::DeleteTask { task_id, .. } => {
                    if let Err(err) = self.delegate.delete_task(&task_id) {
                        error!(task_id = %task_id, err = %err, "failed to delete scheduled task");
                    }
                }
            }

            tasks.retire(&name);
        }
    }
}

fn generate_task_id() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("task-{now}")
}

/// Map an agent-relative media path to a host path under the group's media
/// directory. Returns `None` when the path would resolve outside it.
///
/// Accepts either the full agent-side form (`/workspace/ipc/media/<name>`)
/// or a path relative to the media directory. The check is purely lexical:
/// `.` and `..` components are folded without touching the filesystem, and
/// the result must stay inside `media_dir`.
fn resolve_media_path(media_dir: &Path, raw: &str) -> Option<PathBuf> {
    let relative = match raw.strip_prefix(AGENT_MEDIA_ROOT) {
        Some(rest) if rest.is_empty() => "",
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => raw,
    };

    let candidate = media_dir.join(relative);
    let normalized = normalize_lexically(&candidate);
    let base = normalize_lexically(media_dir);

    if normalized.starts_with(&base) {
        Some(normalized)
    } else {
        None
    }
}

/// Fold `.` and `..` components without resolving symlinks.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
