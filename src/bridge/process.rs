use std::process::Stdio;
use std::time::Duration;
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::spawn;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::types::BridgeCommandConfig;
use crate::error::BridgeError;

const LOG_TARGET: &str = "bridge";

/// The local bridge that owns the device link. Killed when dropped.
pub struct BridgeProcess {
    child: Child,
    output_tasks: Vec<JoinHandle<()>>,
}

impl BridgeProcess {
    /// Spawns the bridge command and waits until it prints its readiness marker on stderr.
    pub async fn start(config: &BridgeCommandConfig) -> Result<Self, BridgeError> {
        info!("Starting bridge: {} {:?}", config.program, config.args);

        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| BridgeError::Spawn {
            program: config.program.clone(),
            source,
        })?;

        let mut output_tasks = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            output_tasks.push(spawn(forward_output_task(stdout, None)));
        }

        let (ready_sender, ready_receiver) = oneshot::channel();
        if let Some(stderr) = child.stderr.take() {
            let marker = config.ready_marker.clone();
            output_tasks.push(spawn(forward_output_task(stderr, Some((marker, ready_sender)))));
        }

        let ready_timeout = Duration::from_millis(config.ready_timeout_ms);
        let bridge = BridgeProcess { child, output_tasks };

        // on error `bridge` is dropped here, which kills the child
        match timeout(ready_timeout, ready_receiver).await {
            Ok(Ok(())) => {
                info!("Bridge is ready (pid {:?})", bridge.child.id());
                Ok(bridge)
            },
            Ok(Err(_)) => Err(BridgeError::ExitedBeforeReady),
            Err(_) => Err(BridgeError::ReadyTimeout { timeout: ready_timeout }),
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub async fn shutdown(mut self) -> Result<(), BridgeError> {
        if let Some(status) = self.child.try_wait()? {
            warn!("Bridge already exited: {}", status);
        } else {
            info!("Stopping bridge");
            self.child.kill().await?;
        }

        // grandchildren of the bridge may keep the pipes open
        for task in self.output_tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }
}

// Logs every line of output. Signals `ready` once the marker shows up.
async fn forward_output_task<R>(output: R, mut ready: Option<(String, oneshot::Sender<()>)>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(output).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                warn!(target: LOG_TARGET, "Failed to read output: {}", err);
                break;
            },
        };

        info!(target: LOG_TARGET, "{}", line);

        let is_ready = matches!(&ready, Some((marker, _)) if line.contains(marker.as_str()));
        if is_ready {
            if let Some((_, sender)) = ready.take() {
                let _ = sender.send(());
            }
        }
    }

    debug!(target: LOG_TARGET, "Output closed");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str, ready_timeout_ms: u64) -> BridgeCommandConfig {
        BridgeCommandConfig {
            program: String::from("sh"),
            args: vec![String::from("-c"), String::from(script)],
            cwd: None,
            ready_marker: String::from("server listening on 127.0.0.1:8765"),
            ready_timeout_ms,
        }
    }

    #[tokio::test]
    async fn start_waits_for_the_ready_marker() {
        let config = shell("echo starting >&2; echo 'server listening on 127.0.0.1:8765' >&2; exec sleep 30", 5_000);

        let bridge = BridgeProcess::start(&config).await.unwrap();
        assert!(bridge.id().is_some());
        bridge.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn marker_on_stdout_does_not_count() {
        let config = shell("echo 'server listening on 127.0.0.1:8765'; exec sleep 30", 300);

        let result = BridgeProcess::start(&config).await;
        assert!(matches!(result, Err(BridgeError::ReadyTimeout { .. })));
    }

    #[tokio::test]
    async fn exiting_before_ready_is_an_error() {
        let config = shell("echo 'bind failed' >&2; exit 1", 5_000);

        let result = BridgeProcess::start(&config).await;
        assert!(matches!(result, Err(BridgeError::ExitedBeforeReady)));
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let config = BridgeCommandConfig {
            program: String::from("./does-not-exist-treadmill-bridge"),
            ..shell("", 1_000)
        };

        let result = BridgeProcess::start(&config).await;
        assert!(matches!(result, Err(BridgeError::Spawn { .. })));
    }
}
