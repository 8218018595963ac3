// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::io::{Read, Write};
use std::path::Path;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::debug;

use crate::error::TermError;

/// One PTY pair plus the child attached to its slave side.
///
/// The master fd is switched to non-blocking so `read_available` always
/// returns promptly; callers decide how long to keep polling.
pub struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    reader: Box<dyn Read + Send>,
}

impl PtyProcess {
    pub fn spawn(
        program: &str,
        cwd: &Path,
        env: &[(String, String)],
        rows: u16,
        cols: u16,
    ) -> Result<Self, TermError> {
        debug!(%program, cwd = %cwd.display(), rows, cols, "spawning pty child");

        let size = PtySize { rows, cols, pixel_width: 0, pixel_height: 0 };
        let pair = native_pty_system()
            .openpty(size)
            .map_err(|e| TermError::Pty(format!("openpty: {e}")))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.cwd(cwd);
        for (k, v) in env {
            cmd.env(k, v);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| TermError::Pty(format!("spawn {program}: {e}")))?;
        // The slave side belongs to the child now; holding our copy open
        // would stop reads from reporting EOF after the child exits.
        drop(pair.slave);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| TermError::Pty(format!("take writer: {e}")))?;
        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| TermError::Pty(format!("clone reader: {e}")))?;

        #[cfg(unix)]
        if let Some(fd) = pair.master.as_raw_fd() {
            // Reads on the master must never block the polling loop.
            unsafe {
                let flags = libc::fcntl(fd, libc::F_GETFL, 0);
                if flags != -1 {
                    libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                }
            }
        }

        Ok(Self { master: pair.master, child, writer, reader })
    }

    /// Read whatever bytes are available right now.  Empty result means no
    /// data; a closed PTY surfaces as `ShellDead`.
    pub fn read_available(&mut self) -> Result<Vec<u8>, TermError> {
        let mut buf = vec![0u8; 8192];
        match self.reader.read(&mut buf) {
            Ok(0) => {
                // EOF: the child side is gone.
                Err(TermError::ShellDead)
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Vec::new()),
            // Linux reports EIO on the master once the child exits.
            Err(e) if e.raw_os_error() == Some(libc::EIO) => Err(TermError::ShellDead),
            Err(e) => Err(TermError::Io(e)),
        }
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), TermError> {
        self.writer.write_all(bytes)?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<(), TermError> {
        self.master
            .resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 })
            .map_err(|e| TermError::Pty(format!("resize: {e}")))
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Best-effort teardown of the child.
    pub fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.try_wait();
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn spawn_sh() -> PtyProcess {
        PtyProcess::spawn(
            "/bin/sh",
            Path::new("/tmp"),
            &[("TERM".into(), "xterm-256color".into())],
            24,
            80,
        )
        .unwrap()
    }

    fn read_until(pty: &mut PtyProcess, needle: &str, budget: Duration) -> String {
        let deadline = Instant::now() + budget;
        let mut acc = String::new();
        while Instant::now() < deadline {
            match pty.read_available() {
                Ok(bytes) if !bytes.is_empty() => {
                    acc.push_str(&String::from_utf8_lossy(&bytes));
                    if acc.contains(needle) {
                        break;
                    }
                }
                _ => std::thread::sleep(Duration::from_millis(20)),
            }
        }
        acc
    }

    #[test]
    fn spawn_and_echo_round_trip() {
        let mut pty = spawn_sh();
        assert!(pty.is_alive());
        pty.write_all(b"echo pty_ok_$((40+2))\n").unwrap();
        let out = read_until(&mut pty, "pty_ok_42", Duration::from_secs(5));
        assert!(out.contains("pty_ok_42"), "missing echo output: {out}");
    }

    #[test]
    fn read_available_is_nonblocking() {
        let mut pty = spawn_sh();
        // Drain the startup prompt, then an immediate read must not hang.
        let _ = read_until(&mut pty, "$", Duration::from_millis(500));
        let start = Instant::now();
        let _ = pty.read_available();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn kill_terminates_child() {
        let mut pty = spawn_sh();
        assert!(pty.is_alive());
        pty.kill();
        std::thread::sleep(Duration::from_millis(200));
        assert!(!pty.is_alive());
    }

    #[test]
    fn exited_child_reports_shell_dead() {
        let mut pty = spawn_sh();
        pty.write_all(b"exit 0\n").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut saw_dead = false;
        while Instant::now() < deadline {
            match pty.read_available() {
                Err(TermError::ShellDead) => {
                    saw_dead = true;
                    break;
                }
                _ => std::thread::sleep(Duration::from_millis(20)),
            }
        }
        assert!(saw_dead, "expected ShellDead after exit");
    }
}
