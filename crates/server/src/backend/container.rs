//! Container backend: disposable, resource-bounded shell containers.
//!
//! Each container session runs the allow-listed image with a TTY, the
//! workspace bind-mounted read-write, and hard memory/CPU caps. The
//! container is created with auto-remove and is killed unconditionally on
//! teardown, so the engine never accumulates stopped containers from us.

use std::path::Path;

use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config as CreateConfig,
    CreateContainerOptions, KillContainerOptions, RemoveContainerOptions,
    ResizeContainerTtyOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;

use crate::backend::image::ImageSpec;
use crate::backend::BackendError;
use crate::config::Config;

/// Shell command run inside every container.
const CONTAINER_SHELL: &[&str] = &["/bin/bash"];

/// Mount point of the workspace inside the container.
const WORKSPACE_MOUNT: &str = "/workspace";

/// Best-effort provisioning command run after container start.
const PROVISION_CMD: &str = "apt-get update -qq && apt-get install -y python3 python3-pip -qq";

/// Handle to a running container, owned by exactly one session.
#[derive(Clone)]
pub struct ContainerHandle {
    docker: Docker,
    id: String,
}

impl ContainerHandle {
    /// Wrap an existing container id.
    pub fn new(docker: Docker, id: String) -> Self {
        Self { docker, id }
    }

    /// Returns the engine-side container id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Propagate a terminal geometry change to the container's TTY.
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), BackendError> {
        self.docker
            .resize_container_tty(
                &self.id,
                ResizeContainerTtyOptions {
                    width: cols,
                    height: rows,
                },
            )
            .await
            .map_err(|e| BackendError::Resize(e.to_string()))
    }

    /// Kill and remove the container, best-effort.
    ///
    /// Errors are discarded: during teardown the container may already be
    /// gone (auto-remove raced us, the engine restarted, an operator
    /// removed it by hand).
    pub async fn kill_and_remove(&self) {
        if let Err(e) = self
            .docker
            .kill_container(&self.id, Some(KillContainerOptions { signal: "SIGKILL" }))
            .await
        {
            tracing::debug!(container_id = %self.id, error = %e, "Kill container failed");
        }

        if let Err(e) = self
            .docker
            .remove_container(
                &self.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            tracing::debug!(container_id = %self.id, error = %e, "Remove container failed");
        }
    }
}

/// Create, start, provision, and attach to a container for one session.
///
/// Returns the handle and the duplex attach streams. Any failure here is
/// reported to the client as a single diagnostic line by the caller.
pub async fn launch(
    docker: &Docker,
    image: &ImageSpec,
    session_id: &str,
    config: &Config,
) -> Result<(ContainerHandle, AttachContainerResults), BackendError> {
    ensure_image_present(docker, image.reference).await?;

    let binds = vec![bind_spec(&config.session.workspace_dir)];

    let create = docker
        .create_container(
            Some(CreateContainerOptions {
                name: container_name(session_id),
                platform: None,
            }),
            CreateConfig {
                image: Some(image.reference.to_string()),
                cmd: Some(CONTAINER_SHELL.iter().map(|s| s.to_string()).collect()),
                env: Some(vec!["TERM=xterm-256color".to_string()]),
                user: image.user.map(str::to_string),
                working_dir: Some(WORKSPACE_MOUNT.to_string()),
                tty: Some(true),
                open_stdin: Some(true),
                host_config: Some(HostConfig {
                    auto_remove: Some(true),
                    binds: Some(binds),
                    memory: Some(config.container.memory_bytes),
                    nano_cpus: Some(config.container.nano_cpus),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await?;

    let handle = ContainerHandle::new(docker.clone(), create.id);

    docker
        .start_container(handle.id(), None::<StartContainerOptions<String>>)
        .await?;

    tracing::info!(
        session_id = %session_id,
        container_id = %handle.id(),
        image = %image.reference,
        "Container started"
    );

    // Best-effort tooling setup; runs concurrently with the session and
    // never aborts it.
    tokio::spawn(provision_python(docker.clone(), handle.id().to_string()));

    let attach = docker
        .attach_container(
            handle.id(),
            Some(AttachContainerOptions::<String> {
                stdin: Some(true),
                stdout: Some(true),
                stderr: Some(true),
                stream: Some(true),
                logs: Some(false),
                detach_keys: None,
            }),
        )
        .await?;

    Ok((handle, attach))
}

/// Pull the image if the engine does not have it locally.
async fn ensure_image_present(docker: &Docker, reference: &str) -> Result<(), BackendError> {
    if docker.inspect_image(reference).await.is_ok() {
        return Ok(());
    }

    tracing::info!(image = %reference, "Pulling image");

    let (from_image, tag) = split_image_reference(reference);
    let mut pull = docker.create_image(
        Some(CreateImageOptions {
            from_image: from_image.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        }),
        None,
        None,
    );

    // Progress is not forwarded to clients; the stream is drained so pull
    // errors surface before container creation.
    while let Some(progress) = pull.next().await {
        progress?;
    }

    tracing::info!(image = %reference, "Image pulled");
    Ok(())
}

/// Install python tooling inside a freshly started container.
///
/// Failures are logged and swallowed; missing pip must not cost anyone
/// their shell.
async fn provision_python(docker: Docker, container_id: String) {
    let exec = match docker
        .create_exec(
            &container_id,
            CreateExecOptions {
                cmd: Some(vec!["bash", "-lc", PROVISION_CMD]),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            },
        )
        .await
    {
        Ok(exec) => exec,
        Err(e) => {
            tracing::warn!(container_id = %container_id, error = %e, "Could not start provisioning exec");
            return;
        }
    };

    match docker.start_exec(&exec.id, None::<StartExecOptions>).await {
        Ok(StartExecResults::Attached { mut output, .. }) => {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(out) => tracing::trace!(container_id = %container_id, "provision: {}", out),
                    Err(e) => {
                        tracing::warn!(container_id = %container_id, error = %e, "Provisioning stream error");
                        break;
                    }
                }
            }
            tracing::debug!(container_id = %container_id, "Provisioning exec finished");
        }
        Ok(StartExecResults::Detached) => {}
        Err(e) => {
            tracing::warn!(container_id = %container_id, error = %e, "Could not run provisioning exec");
        }
    }
}

/// Run a command in the container and capture its combined output.
///
/// Used for tool probes; output is capped so a chatty command cannot
/// balloon a reply frame.
pub async fn exec_capture(
    docker: &Docker,
    container_id: &str,
    cmd: Vec<String>,
) -> Result<String, BackendError> {
    const MAX_CAPTURE: usize = 16 * 1024;

    let exec = docker
        .create_exec(
            container_id,
            CreateExecOptions {
                cmd: Some(cmd),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                ..Default::default()
            },
        )
        .await?;

    let mut captured = String::new();
    if let StartExecResults::Attached { mut output, .. } =
        docker.start_exec(&exec.id, None::<StartExecOptions>).await?
    {
        while let Some(chunk) = output.next().await {
            let chunk = chunk?;
            captured.push_str(&String::from_utf8_lossy(&chunk.into_bytes()));
            if captured.len() >= MAX_CAPTURE {
                captured.truncate(MAX_CAPTURE);
                break;
            }
        }
    }

    Ok(captured)
}

/// Engine-side name for a session's container.
fn container_name(session_id: &str) -> String {
    format!("termbridge-{}", session_id)
}

/// Bind-mount spec for the shared workspace.
fn bind_spec(workspace: &Path) -> String {
    format!("{}:{}", workspace.display(), WORKSPACE_MOUNT)
}

/// Split an image reference into repository and tag.
fn split_image_reference(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((image, tag)) if !tag.contains('/') => (image, tag),
        _ => (reference, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name() {
        assert_eq!(container_name("s-abc-def123"), "termbridge-s-abc-def123");
    }

    #[test]
    fn test_bind_spec() {
        assert_eq!(
            bind_spec(Path::new("/home/user/project")),
            "/home/user/project:/workspace"
        );
    }

    #[test]
    fn test_split_image_reference_with_tag() {
        assert_eq!(
            split_image_reference("node:18-bullseye"),
            ("node", "18-bullseye")
        );
        assert_eq!(split_image_reference("ubuntu:22.04"), ("ubuntu", "22.04"));
    }

    #[test]
    fn test_split_image_reference_without_tag() {
        assert_eq!(split_image_reference("ubuntu"), ("ubuntu", "latest"));
    }

    #[test]
    fn test_split_image_reference_with_registry_port() {
        // The colon belongs to the registry, not a tag.
        assert_eq!(
            split_image_reference("registry.local:5000/node"),
            ("registry.local:5000/node", "latest")
        );
    }

    #[tokio::test]
    async fn test_kill_and_remove_is_best_effort() {
        // No engine behind this handle; both calls fail and are discarded.
        let docker = Docker::connect_with_local_defaults()
            .expect("constructing a docker client requires no daemon");
        let handle = ContainerHandle::new(docker, "nonexistent".to_string());
        handle.kill_and_remove().await;
    }
}
