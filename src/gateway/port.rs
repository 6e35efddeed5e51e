//! Port selection for the external access listener.

use crate::error::{Result, VaultError};

use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Upper bound on how long `lsof` may take to answer.
const LSOF_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after killing a holder so the kernel can release the socket.
const RECLAIM_SETTLE: Duration = Duration::from_millis(200);

/// Bind the first free port in `start..=end` on `host`.
///
/// A port held by another socket moves the search on; any other bind error
/// aborts it. `start == 0` binds a single ephemeral port. With `reclaim`
/// set, stale listeners on each candidate are killed before the attempt.
pub async fn bind_first_available(
    host: &str,
    start: u16,
    end: u16,
    reclaim: bool,
) -> Result<(TcpListener, u16)> {
    if start == 0 {
        let listener = TcpListener::bind((host, 0)).await?;
        let port = listener.local_addr()?.port();
        return Ok((listener, port));
    }

    let mut port = start;
    loop {
        if reclaim {
            reclaim_port(port).await;
        }

        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                if port != start {
                    info!("Port {} was busy, using {} instead", start, port);
                }
                return Ok((listener, port));
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!("Port {} is in use, trying next", port);
            }
            Err(e) => return Err(e.into()),
        }

        if port >= end {
            return Err(VaultError::PortExhaustion { start, end });
        }
        port += 1;
    }
}

/// Best-effort kill of whatever process is listening on `port`.
///
/// Never targets the current process. Failures are logged and swallowed;
/// the caller falls through to the next port anyway.
#[cfg(unix)]
pub async fn reclaim_port(port: u16) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let own_pid = std::process::id() as i32;
    let pids = match listener_pids(port).await {
        Ok(pids) => pids,
        Err(e) => {
            debug!("Could not inspect port {}: {}", port, e);
            return;
        }
    };

    let mut killed = 0usize;
    for pid in pids.into_iter().filter(|pid| *pid != own_pid) {
        match kill(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) => {
                warn!("Killed process {} holding port {}", pid, port);
                killed += 1;
            }
            Err(e) => debug!("Failed to kill process {} on port {}: {}", pid, port, e),
        }
    }

    if killed > 0 {
        tokio::time::sleep(RECLAIM_SETTLE).await;
    }
}

#[cfg(not(unix))]
pub async fn reclaim_port(port: u16) {
    debug!("Port reclaim is not supported on this platform (port {})", port);
}

/// PIDs with a listening TCP socket on `port`, as reported by `lsof`.
#[cfg(unix)]
async fn listener_pids(port: u16) -> std::io::Result<Vec<i32>> {
    use std::process::Stdio;
    use tokio::process::Command;

    let output = Command::new("lsof")
        .arg("-t")
        .arg(format!("-iTCP:{port}"))
        .arg("-sTCP:LISTEN")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(LSOF_TIMEOUT, output)
        .await
        .map_err(|_| std::io::Error::new(ErrorKind::TimedOut, "lsof timed out"))??;

    // lsof exits 1 when nothing matches.
    Ok(parse_pids(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_pids(stdout: &str) -> Vec<i32> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}
