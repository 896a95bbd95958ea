use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::{
    io::{AsyncBufReadExt as _, AsyncWriteExt as _},
    net::{UnixListener, UnixStream},
};
use tokio_util::sync::CancellationToken;

use crate::{
    commands::{Command, CommandService},
    scheduler::RefreshScheduler,
};

/// Frames sent to a running instance over its control socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlRequest {
    /// Broadcast a refresh to every surface.
    Refresh,
    Command(Command),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlResponse {
    Refreshed { delivered: u64 },
    /// The JSON encoded [`crate::commands::Response`].
    Command(String),
    Error(String),
}

async fn write_frame<T: Serialize>(
    write: &mut (impl tokio::io::AsyncWrite + Unpin),
    val: &T,
) -> anyhow::Result<()> {
    let buf = postcard::to_stdvec_cobs(val).context("Failed to serialize frame")?;
    write.write_all(&buf).await?;
    write.flush().await?;
    Ok(())
}

/// Reads one zero terminated frame. `None` on a clean end of stream.
async fn read_frame<T: DeserializeOwned>(
    read: &mut (impl tokio::io::AsyncBufRead + Unpin),
) -> anyhow::Result<Option<T>> {
    let mut buf = Vec::new();
    if read.read_until(0, &mut buf).await? == 0 {
        return Ok(None);
    }
    let val = postcard::from_bytes_cobs(&mut buf).context("Failed to deserialize frame")?;
    Ok(Some(val))
}

/// Removes the socket file when dropped.
pub struct SocketGuard(PathBuf);
impl Drop for SocketGuard {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.0) {
            log::debug!("Failed to remove {}: {err}", self.0.display());
        }
    }
}

/// Binds the control socket, replacing a stale one left by a crashed instance.
pub async fn bind(path: &Path) -> anyhow::Result<(UnixListener, SocketGuard)> {
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            anyhow::bail!("Another instance is listening on {}", path.display());
        }
        log::info!("Removing stale socket {}", path.display());
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
    }
    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind control socket {}", path.display()))?;
    Ok((listener, SocketGuard(path.to_owned())))
}

#[derive(Clone)]
pub struct ControlServer {
    pub scheduler: RefreshScheduler,
    pub commands: CommandService,
}
impl ControlServer {
    pub async fn handle(&self, req: ControlRequest) -> ControlResponse {
        match req {
            ControlRequest::Refresh => {
                let delivery = self.scheduler.refresh_now();
                ControlResponse::Refreshed {
                    delivered: delivery.delivered as u64,
                }
            }
            ControlRequest::Command(cmd) => {
                match serde_json::to_string(&self.commands.handle(cmd).await) {
                    Ok(json) => ControlResponse::Command(json),
                    Err(err) => ControlResponse::Error(err.to_string()),
                }
            }
        }
    }

    pub async fn serve(self, listener: UnixListener, cancel: CancellationToken) {
        let mut conns = tokio::task::JoinSet::new();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                res = listener.accept() => match res {
                    Ok((stream, _)) => {
                        let this = self.clone();
                        conns.spawn(async move {
                            if let Err(err) = this.connection(stream).await {
                                log::warn!("Control connection failed: {err:#}");
                            }
                        });
                    }
                    Err(err) => {
                        log::error!("Failed to accept control connection: {err}");
                        break;
                    }
                },
                Some(_) = conns.join_next() => {}
            }
        }
        conns.abort_all();
        log::debug!("Control socket closed");
    }

    async fn connection(&self, stream: UnixStream) -> anyhow::Result<()> {
        let (read, mut write) = stream.into_split();
        let mut read = tokio::io::BufReader::new(read);
        while let Some(req) = read_frame::<ControlRequest>(&mut read).await? {
            log::debug!("Control request: {req:?}");
            let resp = self.handle(req).await;
            write_frame(&mut write, &resp).await?;
        }
        Ok(())
    }
}

/// Sends one request to the instance listening on `path`.
pub async fn request(path: &Path, req: &ControlRequest) -> anyhow::Result<ControlResponse> {
    let stream = UnixStream::connect(path)
        .await
        .with_context(|| format!("No running instance at {}", path.display()))?;
    let (read, mut write) = stream.into_split();
    write_frame(&mut write, req).await?;
    read_frame(&mut tokio::io::BufReader::new(read))
        .await?
        .context("Instance closed the connection without answering")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        commands::testing::{WORKSPACES, service},
        exec::testing::{Reply, ScriptedRunner},
        fanout::{SurfaceRegistry, SurfaceSignal},
    };

    fn server(registry: SurfaceRegistry) -> ControlServer {
        let runner =
            Arc::new(ScriptedRunner::new().on("sh list-workspaces --all --json", Reply::ok(WORKSPACES)));
        let commands = service(runner, registry.clone());
        ControlServer {
            scheduler: RefreshScheduler::new(
                registry,
                std::time::Duration::from_millis(150),
                std::time::Duration::from_secs(1),
            ),
            commands,
        }
    }

    #[tokio::test]
    async fn refresh_and_command_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctl.sock");
        let registry = SurfaceRegistry::new();
        let (_, mut rx) = registry.register("main".into());

        let (listener, _guard) = bind(&path).await.unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(server(registry).serve(listener, cancel.clone()));

        assert_eq!(
            request(&path, &ControlRequest::Refresh).await.unwrap(),
            ControlResponse::Refreshed { delivered: 1 }
        );
        assert!(matches!(rx.try_recv(), Ok(SurfaceSignal::Refresh(_))));

        let resp = request(&path, &ControlRequest::Command(Command::GetSpaces))
            .await
            .unwrap();
        let ControlResponse::Command(json) = resp else {
            panic!("unexpected {resp:?}");
        };
        assert_eq!(json, WORKSPACES);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctl.sock");
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let (_listener, guard) = bind(&path).await.unwrap();
        assert!(bind(&path).await.is_err());
        drop(guard);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn no_instance() {
        let dir = tempfile::tempdir().unwrap();
        assert!(request(&dir.path().join("none.sock"), &ControlRequest::Refresh).await.is_err());
    }
}
