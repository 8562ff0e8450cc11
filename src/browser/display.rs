use std::{
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};

use log::{info, warn};
use tokio::process::{Child, Command};

use crate::error::Result;

const SCREEN: &str = "1920x1080x24";
const STARTUP_WAIT: Duration = Duration::from_secs(5);

/// An Xvfb framebuffer for running a headed browser without a screen.
/// The server is killed when this is dropped.
pub struct VirtualDisplay {
    display: String,
    _server: Child,
}

impl VirtualDisplay {
    pub async fn start(display: &str) -> Result<Self> {
        info!("starting virtual display {display}");
        let server = Command::new("Xvfb")
            .arg(display)
            .args(["-screen", "0", SCREEN, "-nolisten", "tcp"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        // Xvfb creates its socket asynchronously
        if let Some(socket) = socket_path(display) {
            let started = Instant::now();
            while !socket.exists() && started.elapsed() < STARTUP_WAIT {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            if !socket.exists() {
                warn!("{} did not appear, continuing anyway", socket.display());
            }
        }

        Ok(Self {
            display: display.to_string(),
            _server: server,
        })
    }

    /// Value for the `DISPLAY` variable of processes using this display.
    pub fn display(&self) -> &str {
        &self.display
    }
}

fn socket_path(display: &str) -> Option<PathBuf> {
    let number = display.strip_prefix(':')?.split('.').next()?;
    number.parse::<u32>().ok()?;
    Some(PathBuf::from(format!("/tmp/.X11-unix/X{number}")))
}
