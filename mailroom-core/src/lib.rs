pub mod config;
pub mod container;
pub mod ipc;
pub mod mailbox;
pub mod persistence;
pub mod runtime;

pub use config::{MailroomConfig, load_config};
pub use container::{CONTAINER_NAME_PREFIX, VolumeMount, container_name, mount_args};
pub use ipc::{GroupContext, MediaFailure, MediaRequest, OutboundMessage, TaskRequest};
pub use mailbox::{AGENT_IPC_ROOT, AGENT_MEDIA_ROOT, DirQueue, Mailbox, WorkQueue};
pub use persistence::{RegisteredGroup, ScheduledTask, TaskUpdate};
pub use runtime::{ContainerSummary, Engine, EngineError};
