//! Child-process plumbing: detached command spawning, zombie reaping and
//! the startup autostart sweep.

use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, warn};
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

const SYSTEM_AUTOSTART: &str = concat!("/etc/", env!("CARGO_PKG_NAME"), "/autostart.sh");

extern "C" fn reap_children(_signal: libc::c_int) {
    // async-signal-safe: only waitpid in here
    unsafe {
        while libc::waitpid(-1, std::ptr::null_mut(), libc::WNOHANG) > 0 {}
    }
}

/// Install the SIGCHLD reaper and immediately collect any zombies inherited
/// from a previous process image.
pub fn install_sigchld_handler() {
    let action = SigAction::new(
        SigHandler::Handler(reap_children),
        SaFlags::SA_NOCLDSTOP | SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe {
        if let Err(errno) = sigaction(Signal::SIGCHLD, &action) {
            warn!("cannot install SIGCHLD handler: {errno}");
        }
    }
    reap_children(0);
}

/// Run a command in its own session, detached from the manager. Failures
/// are logged, never propagated; a broken binding must not take the window
/// manager down with it.
pub fn spawn(command: &[&str]) {
    let Some((program, arguments)) = command.split_first() else {
        return;
    };

    let mut child = Command::new(program);
    child
        .args(arguments)
        .stdin(Stdio::null())
        .stdout(Stdio::null());
    unsafe {
        child.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    match child.spawn() {
        Ok(child) => debug!("spawned {program} (pid {})", child.id()),
        Err(error) => warn!("spawn {program}: {error}"),
    }
}

fn spawn_shell(script: &Path) {
    let mut child = Command::new("/bin/sh");
    child.arg("-c").arg(script).stdin(Stdio::null());
    unsafe {
        child.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    match child.spawn() {
        Ok(_) => debug!("autostart: {}", script.display()),
        Err(error) => warn!("autostart {}: {error}", script.display()),
    }
}

/// Run the system-wide autostart script, then every regular file in the
/// user autostart directory. Neither is required to exist.
pub fn run_autostart() {
    let system = Path::new(SYSTEM_AUTOSTART);
    if system.exists() {
        spawn_shell(system);
    }

    let Ok(home) = std::env::var("HOME") else {
        return;
    };
    let user_dir = Path::new(&home)
        .join(".config")
        .join(env!("CARGO_PKG_NAME"));

    let Ok(entries) = std::fs::read_dir(user_dir) else {
        return;
    };
    for entry in entries.flatten() {
        if entry.file_type().is_ok_and(|kind| kind.is_file()) {
            spawn_shell(&entry.path());
        }
    }
}
