//! Client configuration and the host child process.

use crate::error::ClientError;
use std::ffi::OsStr;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tether_rpc::{PeerId, RpcConfig, StreamLink, RENDERER_CALL_TIMEOUT};
use tokio::process::{Child, Command};

/// Default time a host gets to exit after its link closes.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-call timeout for calls into the host.
    pub call_timeout: Duration,
    /// How long [`HostProcess::shutdown`] waits before killing the host.
    pub shutdown_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: RENDERER_CALL_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub(crate) fn rpc(&self) -> RpcConfig {
        RpcConfig::renderer().with_call_timeout(self.call_timeout)
    }
}

/// A host running as a child process, linked over its stdin and stdout.
///
/// The host's stderr is inherited so its logs stay visible.
pub struct HostProcess {
    child: Child,
    link: Arc<StreamLink>,
}

impl HostProcess {
    /// Starts `program` and links to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        tracing::debug!("Starting host {:?}...", program);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(ClientError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "host stdio was not captured",
            )));
        };

        let link = Arc::new(StreamLink::new(stdout, stdin, PeerId::HOST));
        tracing::info!("Host started (pid {:?})", child.id());

        Ok(Self { child, link })
    }

    /// The link to the host.
    pub fn link(&self) -> Arc<StreamLink> {
        self.link.clone()
    }

    /// OS process id, while the host runs.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Closes the link and waits for the host to exit, killing it after `timeout`.
    pub async fn shutdown(mut self, timeout: Duration) -> Result<ExitStatus, ClientError> {
        self.link.close();
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                tracing::warn!("host did not exit within {:?}, killing it", timeout);
                self.child.kill().await?;
                Ok(self.child.wait().await?)
            }
        }
    }
}
