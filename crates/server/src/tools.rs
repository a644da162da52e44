//! Developer-tool availability probes.
//!
//! Clients send a `check_tools` control frame to ask which language
//! runtimes and package managers their session can use; the server
//! answers with one `tool` frame per probed binary. Container sessions
//! are probed inside the container, local sessions on the host.

use bollard::Docker;
use protocol::ServerFrame;

use crate::backend::container;

/// Tools every `check_tools` probe reports on.
pub const PROBED_TOOLS: &[&str] = &["node", "npm", "python3", "pip3"];

/// Probe one tool on the host.
pub async fn probe_local(tool: &str) -> ServerFrame {
    if let Err(e) = which::which(tool) {
        return ServerFrame::tool_missing(tool, e.to_string());
    }

    match tokio::process::Command::new(tool)
        .arg("--version")
        .output()
        .await
    {
        Ok(output) if output.status.success() => {
            match version_line(&output.stdout, &output.stderr) {
                Some(version) => ServerFrame::tool_found(tool, version),
                None => ServerFrame::tool_missing(tool, "no version output"),
            }
        }
        Ok(output) => ServerFrame::tool_missing(
            tool,
            format!("exited with {}", output.status.code().unwrap_or(-1)),
        ),
        Err(e) => ServerFrame::tool_missing(tool, e.to_string()),
    }
}

/// Probe one tool inside a running container.
pub async fn probe_container(docker: &Docker, container_id: &str, tool: &str) -> ServerFrame {
    let cmd = vec![tool.to_string(), "--version".to_string()];
    match container::exec_capture(docker, container_id, cmd).await {
        Ok(output) => match version_line(output.as_bytes(), &[]) {
            Some(version) => ServerFrame::tool_found(tool, version),
            None => ServerFrame::tool_missing(tool, "no version output"),
        },
        Err(e) => ServerFrame::tool_missing(tool, e.to_string()),
    }
}

/// First non-empty line of the probe output, preferring stdout.
fn version_line(stdout: &[u8], stderr: &[u8]) -> Option<String> {
    for source in [stdout, stderr] {
        let text = String::from_utf8_lossy(source);
        if let Some(line) = text.lines().map(str::trim).find(|l| !l.is_empty()) {
            return Some(line.to_string());
        }
    }
    None
}
