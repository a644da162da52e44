//! Per-connection terminal handling.
//!
//! One task per WebSocket connection: select a backend, then relay until
//! either side goes away. Every failure in here is contained to the
//! connection; the worst a broken session can do is close its own socket
//! with a diagnostic line.

use axum::extract::ws::{Message, WebSocket};
use bollard::container::AttachContainerResults;
use bollard::Docker;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{classify, ControlFrame, Inbound, ServerFrame};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::backend::container;
use crate::backend::image::{resolve_image, ImageSpec};
use crate::backend::process::ProcessShell;
use crate::backend::pty::PtySession;
use crate::backend::{probe_container_engine, BackendKind, ContainerProbe};
use crate::http::AppState;
use crate::session::{generate_session_id, Session};
use crate::tools;

/// Query parameters accepted on the terminal upgrade path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TerminalQuery {
    /// Requested runtime flavor; resolved against the image allow-list.
    pub image: Option<String>,
}

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

/// Send a plain-text line to the client, discarding send errors (the
/// socket may already be closing, which teardown handles).
async fn send_text(sender: &mut WsSender, text: impl Into<String>) {
    let _ = sender.send(Message::Text(text.into().into())).await;
}

/// Send a structured server frame to the client, best-effort.
async fn send_frame(sender: &mut WsSender, frame: &ServerFrame) {
    if let Ok(json) = frame.to_json() {
        let _ = sender.send(Message::Text(json.into())).await;
    }
}

/// Entry point for a new terminal connection: pick a backend and serve
/// the connection to completion.
pub async fn handle_socket(socket: WebSocket, query: TerminalQuery, state: AppState) {
    let image = resolve_image(query.image.as_deref());
    tracing::info!(image = %image.reference, "Terminal client connected");

    match probe_container_engine(&state.config).await {
        ContainerProbe::Available(docker) => {
            tracing::info!(backend = %BackendKind::Container, "Backend selected");
            serve_container(socket, docker, image, state).await;
        }
        ContainerProbe::Unavailable(reason) => {
            tracing::warn!(
                reason = %reason,
                "Container engine unavailable, falling back to local shell"
            );
            let (mut sender, receiver) = socket.split();
            send_text(
                &mut sender,
                "Docker not available on server; using local shell fallback.",
            )
            .await;
            serve_local(sender, receiver, state).await;
        }
    }
}

/// Local fallback tiers: native PTY first, plain subprocess if the
/// platform cannot allocate one.
async fn serve_local(mut sender: WsSender, receiver: WsReceiver, state: AppState) {
    let shell = state.config.session.default_shell.clone();
    let cwd = state.config.session.workspace_dir.clone();

    match PtySession::spawn(&shell, &cwd) {
        Ok((session, output_rx)) => {
            tracing::info!(backend = %BackendKind::Pty, shell = %shell, "Backend selected");
            serve_pty(sender, receiver, session, output_rx).await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "PTY unavailable, falling back to plain subprocess");
            match ProcessShell::spawn(&shell, &cwd) {
                Ok(shell_proc) => {
                    tracing::info!(backend = %BackendKind::Process, shell = %shell, "Backend selected");
                    serve_process(sender, receiver, shell_proc).await;
                }
                Err(e) => {
                    send_text(&mut sender, format!("\nError starting shell: {}\n", e)).await;
                    let _ = sender.close().await;
                }
            }
        }
    }
}

/// Container relay loop.
async fn serve_container(
    socket: WebSocket,
    docker: Docker,
    image: &'static ImageSpec,
    state: AppState,
) {
    let session_id = generate_session_id();
    let (mut sender, mut receiver) = socket.split();

    let (handle, attach) =
        match container::launch(&docker, image, &session_id, &state.config).await {
            Ok(launched) => launched,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Container backend failed");
                send_text(&mut sender, format!("Docker error: {}", e)).await;
                let _ = sender.close().await;
                return;
            }
        };

    // The relay keeps a clone for resizes and tool probes; teardown goes
    // exclusively through the registry.
    let container = handle.clone();
    let session = state
        .registry
        .register(Session::new(session_id.clone(), image, handle));
    let cancelled = session.cancellation();

    send_text(
        &mut sender,
        format!(
            "Connected to Docker container shell (image={}, session={}).",
            image.reference, session_id
        ),
    )
    .await;

    let AttachContainerResults {
        mut output,
        mut input,
    } = attach;

    loop {
        tokio::select! {
            // Idle eviction or operator kill.
            _ = cancelled.cancelled() => {
                send_frame(
                    &mut sender,
                    &ServerFrame::Info {
                        message: "Session terminated by server.".to_string(),
                    },
                )
                .await;
                break;
            }

            chunk = output.next() => match chunk {
                Some(Ok(log)) => {
                    let text = String::from_utf8_lossy(&log.into_bytes()).into_owned();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(session_id = %session_id, error = %e, "Attach stream error");
                    break;
                }
                // Container exited (shell quit, OOM kill, auto-remove).
                None => break,
            },

            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(payload))) => {
                    state.registry.touch(&session_id);
                    match classify(payload.as_str()) {
                        Inbound::Data(data) => {
                            if let Err(e) = input.write_all(data.as_bytes()).await {
                                tracing::debug!(session_id = %session_id, error = %e, "Container stdin write failed");
                            }
                        }
                        Inbound::Control(ControlFrame::Resize { cols, rows }) => {
                            if let Err(e) = container.resize(cols, rows).await {
                                tracing::debug!(session_id = %session_id, error = %e, "Container resize failed");
                            }
                        }
                        // The container path does not deliver signals; the
                        // shell interprets ^C and friends itself via the TTY.
                        Inbound::Control(ControlFrame::Signal { .. }) => {}
                        Inbound::Control(ControlFrame::CheckTools) => {
                            for tool in tools::PROBED_TOOLS {
                                let frame = tools::probe_container(&docker, container.id(), tool).await;
                                send_frame(&mut sender, &frame).await;
                            }
                        }
                        Inbound::Ignored => {}
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    state.registry.touch(&session_id);
                    if let Err(e) = input.write_all(&data).await {
                        tracing::debug!(session_id = %session_id, error = %e, "Container stdin write failed");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    // No-op if eviction or an operator already removed the session.
    state.registry.kill_and_remove(&session_id).await;
    let _ = sender.close().await;
    tracing::info!(session_id = %session_id, "Container session closed");
}

/// PTY relay loop.
async fn serve_pty(
    mut sender: WsSender,
    mut receiver: WsReceiver,
    session: PtySession,
    mut output_rx: mpsc::Receiver<Vec<u8>>,
) {
    loop {
        tokio::select! {
            maybe = output_rx.recv() => match maybe {
                Some(data) => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                // Channel closed: the shell reached EOF.
                None => {
                    let code = session.exit_code().await;
                    send_text(&mut sender, format!("\nShell process exited with code {}\n", code)).await;
                    break;
                }
            },

            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(payload))) => {
                    match classify(payload.as_str()) {
                        Inbound::Data(data) => {
                            // Clients without a PTY-aware input path send bare
                            // lines; a CR stands in for the enter key.
                            let mut bytes = data.as_bytes().to_vec();
                            if !data.ends_with('\n') {
                                bytes.push(b'\r');
                            }
                            if let Err(e) = session.write(&bytes).await {
                                tracing::debug!(error = %e, "PTY write failed");
                            }
                        }
                        Inbound::Control(ControlFrame::Resize { cols, rows }) => {
                            if let Err(e) = session.resize(cols, rows).await {
                                tracing::debug!(error = %e, "PTY resize failed");
                            }
                        }
                        Inbound::Control(ControlFrame::Signal { signal }) => {
                            if let Err(e) = session.signal(&signal) {
                                tracing::debug!(error = %e, "Signal delivery failed");
                            }
                        }
                        Inbound::Control(ControlFrame::CheckTools) => {
                            for tool in tools::PROBED_TOOLS {
                                let frame = tools::probe_local(tool).await;
                                send_frame(&mut sender, &frame).await;
                            }
                        }
                        Inbound::Ignored => {}
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Err(e) = session.write(&data).await {
                        tracing::debug!(error = %e, "PTY write failed");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    session.kill().await;
    let _ = sender.close().await;
    tracing::info!("PTY session closed");
}

/// Plain-process relay loop.
async fn serve_process(mut sender: WsSender, mut receiver: WsReceiver, mut shell: ProcessShell) {
    let mut stdout_buf = vec![0u8; 4096];
    let mut stderr_buf = vec![0u8; 4096];
    let mut stdout_open = true;
    let mut stderr_open = true;

    loop {
        tokio::select! {
            read = shell.stdout.read(&mut stdout_buf), if stdout_open => match read {
                Ok(n) if n > 0 => {
                    let text = String::from_utf8_lossy(&stdout_buf[..n]).into_owned();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ => stdout_open = false,
            },

            read = shell.stderr.read(&mut stderr_buf), if stderr_open => match read {
                Ok(n) if n > 0 => {
                    let text = String::from_utf8_lossy(&stderr_buf[..n]).into_owned();
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ => stderr_open = false,
            },

            status = shell.child.wait() => {
                let code = status.map(|s| s.code().unwrap_or(-1)).unwrap_or(-1);
                tracing::info!(code = code, "Shell process exited");
                send_text(&mut sender, format!("\nShell process exited with code {}\n", code)).await;
                let _ = sender.close().await;
                return;
            }

            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(payload))) => {
                    match classify(payload.as_str()) {
                        Inbound::Data(data) => {
                            if let Err(e) = shell.write_line(data).await {
                                tracing::debug!(error = %e, "Shell stdin write failed");
                            }
                        }
                        Inbound::Control(ControlFrame::Signal { signal }) => {
                            if let Err(e) = shell.signal(&signal) {
                                tracing::debug!(error = %e, "Signal delivery failed");
                            }
                        }
                        // No PTY, no geometry.
                        Inbound::Control(ControlFrame::Resize { .. }) => {}
                        Inbound::Control(ControlFrame::CheckTools) => {
                            for tool in tools::PROBED_TOOLS {
                                let frame = tools::probe_local(tool).await;
                                send_frame(&mut sender, &frame).await;
                            }
                        }
                        Inbound::Ignored => {}
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    if let Err(e) = shell.write_line(&text).await {
                        tracing::debug!(error = %e, "Shell stdin write failed");
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    shell.kill().await;
    let _ = sender.close().await;
    tracing::info!("Process session closed");
}
