// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::time::Duration;

use anyhow::{bail, Context};
use bytes::Bytes;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, Pid};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tracing::debug;

use super::{Backend, ExitStatus};

/// Polling cadence for non-blocking child reaps.
const REAP_POLL: Duration = Duration::from_millis(20);

/// Newtype wrapper around the master fd for use with `AsyncFd`.
#[derive(Debug)]
struct MasterFd(OwnedFd);

impl AsRawFd for MasterFd {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0.as_raw_fd()
    }
}

/// Native PTY backend that spawns a child process via `forkpty`.
pub struct NativePty {
    master: AsyncFd<MasterFd>,
    child_pid: Pid,
    /// How long a hung-up child may linger before it is killed.
    shutdown_grace: Duration,
    /// The exit status was already collected by `run`; `Drop` must not
    /// signal the pid again (it may have been recycled).
    reaped: bool,
}

impl NativePty {
    /// Spawn `command` on a new PTY, optionally changing into
    /// `working_directory` first.
    ///
    /// `command` must have at least one element (the program to run).
    // forkpty requires unsafe: post-fork child is partially initialized
    #[allow(unsafe_code)]
    pub fn spawn(
        command: &[String],
        cols: u16,
        rows: u16,
        working_directory: Option<&str>,
        shutdown_grace: Duration,
    ) -> anyhow::Result<Self> {
        if command.is_empty() {
            bail!("empty command");
        }
        let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: forkpty is unsafe because the child is in a
        // partially-initialized state after fork. We immediately exec.
        let result = unsafe { forkpty(&winsize, None) }.context("forkpty failed")?;

        match result {
            ForkptyResult::Child => {
                // Child process: cwd, env, exec.
                if let Some(dir) = working_directory {
                    std::env::set_current_dir(dir).context("chdir failed")?;
                }
                std::env::set_var("TERM", "xterm-256color");
                std::env::set_var("PROMPTER", "1");

                let c_args: Vec<CString> = command
                    .iter()
                    .map(|s| CString::new(s.as_bytes()))
                    .collect::<Result<_, _>>()
                    .context("invalid command argument")?;

                execvp(&c_args[0], &c_args).context("execvp failed")?;
                unreachable!();
            }
            ForkptyResult::Parent { child, master } => {
                set_nonblocking(&master)?;
                let afd = AsyncFd::new(MasterFd(master)).context("AsyncFd::new failed")?;
                Ok(Self { master: afd, child_pid: child, shutdown_grace, reaped: false })
            }
        }
    }

    /// Collect the child's exit status without blocking the runtime.
    ///
    /// The child has usually exited by the time its PTY reports EOF, so
    /// the first WNOHANG poll normally succeeds; otherwise back off on
    /// [`REAP_POLL`] until it does.
    async fn collect_exit(&mut self) -> ExitStatus {
        let status = loop {
            match waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(_, code)) => {
                    break ExitStatus { code: Some(code), signal: None }
                }
                Ok(WaitStatus::Signaled(_, sig, _)) => {
                    break ExitStatus { code: None, signal: Some(sig as i32) }
                }
                Ok(_) => tokio::time::sleep(REAP_POLL).await,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    // ECHILD and friends: nothing left to collect. The
                    // engine still reports the terminal as exited.
                    debug!("terminal child {} wait failed: {e}", self.child_pid);
                    break ExitStatus { code: None, signal: None };
                }
            }
        };
        self.reaped = true;
        status
    }

    /// Read one chunk of child output into `buf`.
    async fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut guard = self.master.readable().await?;
            match guard.try_io(|inner| {
                nix::unistd::read(inner, buf).map_err(io_err)
            }) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }

    /// Write all of `data` to the child, retrying partial writes.
    async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let mut guard = self.master.writable().await?;
            match guard.try_io(|inner| nix::unistd::write(inner, &data[offset..]).map_err(io_err)) {
                Ok(Ok(n)) => offset += n,
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }

    // TIOCSWINSZ ioctl requires unsafe for the libc::ioctl call
    #[allow(unsafe_code)]
    fn apply_winsize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        let ws = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };
        // SAFETY: TIOCSWINSZ is a well-defined ioctl that sets the window
        // size on the PTY master fd. The Winsize struct is properly
        // initialized.
        let ret = unsafe { libc::ioctl(self.master.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if ret < 0 {
            bail!("TIOCSWINSZ ioctl failed: {}", std::io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Backend for NativePty {
    fn run(
        &mut self,
        output_tx: mpsc::Sender<Bytes>,
        mut input_rx: mpsc::Receiver<Bytes>,
        mut resize_rx: mpsc::Receiver<(u16, u16)>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ExitStatus>> + Send + '_>>
    {
        Box::pin(async move {
            let mut buf = vec![0u8; 8192];
            let mut input_closed = false;
            let mut resize_closed = false;

            loop {
                tokio::select! {
                    result = self.read_chunk(&mut buf) => {
                        match result {
                            Ok(0) => break,
                            Ok(n) => {
                                let data = Bytes::copy_from_slice(&buf[..n]);
                                if output_tx.send(data).await.is_err() {
                                    break;
                                }
                            }
                            // EIO: child side of the PTY is gone.
                            Err(e) if e.raw_os_error() == Some(libc::EIO) => break,
                            Err(e) => return Err(e.into()),
                        }
                    }
                    input = input_rx.recv(), if !input_closed => {
                        match input {
                            Some(data) => self.write_all(&data).await?,
                            None => input_closed = true,
                        }
                    }
                    size = resize_rx.recv(), if !resize_closed => {
                        match size {
                            Some((cols, rows)) => { let _ = self.apply_winsize(cols, rows); }
                            None => resize_closed = true,
                        }
                    }
                }
            }

            Ok(self.collect_exit().await)
        })
    }

    fn resize(&self, cols: u16, rows: u16) -> anyhow::Result<()> {
        self.apply_winsize(cols, rows)
    }

    fn child_pid(&self) -> Option<u32> {
        Some(self.child_pid.as_raw() as u32)
    }
}

impl Drop for NativePty {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        // Hang up and give the child the configured grace period to exit
        // on its own; escalate to SIGKILL only if it lingers.
        let _ = kill(self.child_pid, Signal::SIGHUP);
        let deadline = std::time::Instant::now() + self.shutdown_grace;
        loop {
            match waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {}
                // Exited, signaled, or already gone: reaped, done.
                Ok(_) | Err(_) => return,
            }
            if std::time::Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(REAP_POLL);
        }
        debug!("terminal child {} ignored hangup; killing", self.child_pid);
        let _ = kill(self.child_pid, Signal::SIGKILL);
        let _ = waitpid(self.child_pid, Some(WaitPidFlag::WNOHANG));
    }
}

fn set_nonblocking(fd: &impl std::os::fd::AsFd) -> io::Result<()> {
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io_err)?;
    let flags = OFlag::from_bits_truncate(flags);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK)).map_err(io_err)?;
    Ok(())
}

fn io_err(e: nix::errno::Errno) -> io::Error {
    io::Error::from_raw_os_error(e as i32)
}
