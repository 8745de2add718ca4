//! Per-group mailbox layout and the work-queue abstraction over it.
//!
//! A mailbox is the only communication channel between the host and an agent
//! container: a bind-mounted directory with four fixed subdirectories.
//! The agent writes into `messages/` and `media-requests/` and reads from
//! `media/`; the host writes into `media/` and consumes everything else.
//!
//! Every producer follows the same protocol: write `<name>.tmp`, then rename
//! to the final name, so a consumer never observes a half-written file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::container::VolumeMount;

/// Mailbox root as seen from inside the agent container.
pub const AGENT_IPC_ROOT: &str = "/workspace/ipc";
/// Media directory as seen from inside the agent container.
pub const AGENT_MEDIA_ROOT: &str = "/workspace/ipc/media";

const SUBDIRS: &[&str] = &["messages", "tasks", "media", "media-requests"];

/// Per-group mailbox directory tree under `<ipc base>/<folder>/`.
#[derive(Debug, Clone)]
pub struct Mailbox {
    root: PathBuf,
}

impl Mailbox {
    pub fn new(ipc_base_dir: &Path, group_folder: &str) -> Self {
        Self {
            root: ipc_base_dir.join(group_folder),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn messages_dir(&self) -> PathBuf {
        self.root.join("messages")
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    pub fn media_requests_dir(&self) -> PathBuf {
        self.root.join("media-requests")
    }

    /// Create the fixed subdirectories. Idempotent.
    pub fn ensure_layout(&self) -> io::Result<()> {
        for sub in SUBDIRS {
            fs::create_dir_all(self.root.join(sub))?;
        }
        Ok(())
    }

    /// The bind mount that exposes this mailbox to the agent container.
    pub fn mount(&self) -> VolumeMount {
        VolumeMount::read_write(self.root.to_string_lossy().to_string(), AGENT_IPC_ROOT)
    }
}

/// A mailbox subdirectory viewed as a work queue.
///
/// Three operations: enumerate pending entries, retire (delete) a processed
/// entry, and publish a new file atomically. Kept behind a trait so queue
/// consumers can be exercised against an in-memory stand-in.
pub trait WorkQueue {
    /// Names of pending `.json` entries, sorted.
    fn pending(&self) -> Vec<String>;

    /// Read one entry's content.
    fn read(&self, name: &str) -> io::Result<String>;

    /// Delete a processed entry. Idempotent: retiring an absent entry is a
    /// no-op, which is what makes reprocessing impossible.
    fn retire(&self, name: &str);

    /// Write a file under the queue directory using tmp-then-rename.
    /// `name` is the final file name, extension included.
    fn publish(&self, name: &str, content: &str) -> io::Result<()>;
}

/// Filesystem-backed queue over one directory.
pub struct DirQueue {
    dir: PathBuf,
}

impl DirQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl WorkQueue for DirQueue {
    fn pending(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %self.dir.display(), err = %err, "queue directory not readable");
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }

    fn read(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.dir.join(name))
    }

    fn retire(&self, name: &str) {
        if let Err(err) = fs::remove_file(self.dir.join(name)) {
            debug!(dir = %self.dir.display(), name, err = %err, "failed to remove queue entry");
        }
    }

    fn publish(&self, name: &str, content: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let temp_path = self.dir.join(format!("{name}.tmp"));
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, self.dir.join(name))?;
        Ok(())
    }
}
