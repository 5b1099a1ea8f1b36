//! Live file following via a tail subprocess
//!
//! The subprocess prints the file's trailing lines first and then blocks
//! on growth, which is exactly the semantics the streaming loop wants.
//! A missing target file is a fatal error surfaced before spawning, so
//! the follower never silently waits on a path that will not appear.

use super::ForwarderError;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

pub struct LogTail {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl LogTail {
    /// Spawn `tail -f` on the target file
    pub fn follow(path: &Path) -> Result<Self, ForwarderError> {
        if !path.exists() {
            return Err(ForwarderError::LogFileMissing(path.to_path_buf()));
        }

        let mut child = Command::new("tail")
            .arg("-f")
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(ForwarderError::TailSpawn)?;
        let stdout = child
            .stdout
            .take()
            .ok_or(ForwarderError::MissingStdout)?;

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
        })
    }

    /// Next line from the follower, None once the subprocess closes its pipe
    pub async fn next_line(&mut self) -> Option<String> {
        match self.lines.next_line().await {
            Ok(maybe_line) => maybe_line,
            Err(_) => None,
        }
    }

    /// Terminate the subprocess and release its pipe
    pub async fn stop(&mut self) {
        let _ = self.child.kill().await;
    }
}
