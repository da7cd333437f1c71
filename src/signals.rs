//! Signal handling for the daemon entry layer.
//!
//! Handlers restrict themselves to async-signal-safe work: store an atomic
//! flag and `write(2)` a fixed byte string. The main thread polls the
//! flags and drives the actual shutdown or restart.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction, signal};

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);
static RESTART_REQUESTED: AtomicBool = AtomicBool::new(false);

const STOP_MESSAGE: &[u8] = b"[SGN] Received terminate signal, stopping\n";
const RESTART_MESSAGE: &[u8] = b"[SGN] Received restart signal, restarting\n";

extern "C" fn handle_stop(_signal: libc::c_int) {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
    // Intentionally raw write(2): tracing and println are not
    // async-signal-safe.
    unsafe {
        let _ = libc::write(
            libc::STDOUT_FILENO,
            STOP_MESSAGE.as_ptr().cast(),
            STOP_MESSAGE.len(),
        );
    }
}

extern "C" fn handle_restart(_signal: libc::c_int) {
    RESTART_REQUESTED.store(true, Ordering::SeqCst);
    STOP_REQUESTED.store(true, Ordering::SeqCst);
    unsafe {
        let _ = libc::write(
            libc::STDOUT_FILENO,
            RESTART_MESSAGE.as_ptr().cast(),
            RESTART_MESSAGE.len(),
        );
    }
}

/// Installs the daemon's signal dispositions.
///
/// `SIGTERM` and `SIGINT` request a graceful stop. `SIGHUP` requests a
/// restart cycle in daemon mode (service managers send it expecting a
/// reload) and a graceful stop in the foreground.
pub fn install(daemon_mode: bool) -> Result<(), nix::Error> {
    ignore_child_signals()?;

    let stop = SigAction::new(
        SigHandler::Handler(handle_stop),
        SaFlags::empty(),
        SigSet::empty(),
    );
    let restart = SigAction::new(
        SigHandler::Handler(handle_restart),
        SaFlags::empty(),
        SigSet::empty(),
    );

    unsafe {
        sigaction(Signal::SIGTERM, &stop)?;
        sigaction(Signal::SIGINT, &stop)?;
        sigaction(Signal::SIGHUP, if daemon_mode { &restart } else { &stop })?;
    }

    Ok(())
}

/// Ignores `SIGCHLD` and `SIGPIPE`: the OS reaps exited children without
/// our involvement, and a broken-pipe write fails with an error instead of
/// killing the daemon.
pub fn ignore_child_signals() -> Result<(), nix::Error> {
    unsafe {
        signal(Signal::SIGCHLD, SigHandler::SigIgn)?;
        signal(Signal::SIGPIPE, SigHandler::SigIgn)?;
    }
    Ok(())
}

/// True once a stop (or restart) signal has arrived.
pub fn stop_requested() -> bool {
    STOP_REQUESTED.load(Ordering::SeqCst)
}

/// Clears the stop flag before re-entering the run cycle.
pub fn clear_stop() {
    STOP_REQUESTED.store(false, Ordering::SeqCst);
}

/// Consumes a pending restart request.
pub fn take_restart() -> bool {
    RESTART_REQUESTED.swap(false, Ordering::SeqCst)
}
