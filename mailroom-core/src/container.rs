//! Container invocation helpers: volume mounts and container naming.

use crate::runtime::Engine;

/// Name prefix for every container mailroomd starts. Lifecycle operations
/// (orphan cleanup, listing) match on this prefix.
pub const CONTAINER_NAME_PREFIX: &str = "mailroom-";

/// Volume mount specification, engine-agnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host_path: String,
    pub container_path: String,
    pub readonly: bool,
}

impl VolumeMount {
    pub fn read_only(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            readonly: true,
        }
    }

    pub fn read_write(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            readonly: false,
        }
    }
}

/// Translate a mount spec into the engine's CLI argv fragment.
///
/// Pure function: no I/O, no failure modes. Docker takes the short
/// `-v host:container[:ro]` form. The Apple CLI's `--volume` has no
/// read-only suffix; read-only binds need the long-form `--mount` grammar.
pub fn mount_args(engine: Engine, mount: &VolumeMount) -> Vec<String> {
    match engine {
        Engine::Docker => {
            let spec = if mount.readonly {
                format!("{}:{}:ro", mount.host_path, mount.container_path)
            } else {
                format!("{}:{}", mount.host_path, mount.container_path)
            };
            vec!["-v".to_string(), spec]
        }
        Engine::AppleContainer => {
            if mount.readonly {
                vec![
                    "--mount".to_string(),
                    format!(
                        "type=bind,source={},target={},readonly",
                        mount.host_path, mount.container_path
                    ),
                ]
            } else {
                vec![
                    "--volume".to_string(),
                    format!("{}:{}", mount.host_path, mount.container_path),
                ]
            }
        }
    }
}

/// Generate a unique, engine-safe container name for a group.
pub fn container_name(group_folder: &str) -> String {
    let safe_name: String = group_folder
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{CONTAINER_NAME_PREFIX}{safe_name}-{now}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_mount_args_read_only() {
        let mount = VolumeMount::read_only("/srv/data/ipc/main", "/workspace/ipc");
        assert_eq!(
            mount_args(Engine::Docker, &mount),
            vec!["-v".to_string(), "/srv/data/ipc/main:/workspace/ipc:ro".to_string()]
        );
    }

    #[test]
    fn docker_mount_args_read_write() {
        let mount = VolumeMount::read_write("/srv/data/ipc/main", "/workspace/ipc");
        assert_eq!(
            mount_args(Engine::Docker, &mount),
            vec!["-v".to_string(), "/srv/data/ipc/main:/workspace/ipc".to_string()]
        );
    }

    #[test]
    fn apple_mount_args_read_only_uses_long_form() {
        let mount = VolumeMount::read_only("/srv/data/ipc/main", "/workspace/ipc");
        assert_eq!(
            mount_args(Engine::AppleContainer, &mount),
            vec![
                "--mount".to_string(),
                "type=bind,source=/srv/data/ipc/main,target=/workspace/ipc,readonly".to_string(),
            ]
        );
    }

    #[test]
    fn apple_mount_args_read_write() {
        let mount = VolumeMount::read_write("/srv/data/ipc/main", "/workspace/ipc");
        assert_eq!(
            mount_args(Engine::AppleContainer, &mount),
            vec![
                "--volume".to_string(),
                "/srv/data/ipc/main:/workspace/ipc".to_string(),
            ]
        );
    }

    #[test]
    fn container_name_sanitizes_folder() {
        let name = container_name("team.eng/special");
        assert!(name.starts_with("mailroom-team-eng-special-"));
        assert!(!name.contains('.'));
        assert!(!name.contains('/'));
    }
}
