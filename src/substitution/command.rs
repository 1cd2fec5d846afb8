//! `$(command ...)` execution

use crate::{error::SubstitutionError, substitution::environment::RuntimeEnvironment};
use std::{
    cell::RefCell,
    collections::HashMap,
    process::{Command, ExitStatus, Output, Stdio},
    sync::mpsc,
    thread,
};

/// Memoizes command output per resolved command line for one composition,
/// so the same command line always yields the same value within a launch.
#[derive(Debug, Default)]
pub struct CommandCache {
    outputs: RefCell<HashMap<String, String>>,
}

impl CommandCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get_or_run(
        &self,
        command_line: &str,
        env: &RuntimeEnvironment,
    ) -> Result<String, SubstitutionError> {
        if let Some(output) = self.outputs.borrow().get(command_line) {
            log::trace!("Command cache hit: {}", command_line);
            return Ok(output.clone());
        }
        let output = run_command(command_line, env)?;
        self.outputs
            .borrow_mut()
            .insert(command_line.to_string(), output.clone());
        Ok(output)
    }

    pub fn len(&self) -> usize {
        self.outputs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.borrow().is_empty()
    }
}

/// Run a command line synchronously and return its stdout with trailing
/// whitespace removed.
///
/// The command line is split shell-style but never handed to a shell. The
/// child sees exactly the variables of `env`.
pub fn run_command(
    command_line: &str,
    env: &RuntimeEnvironment,
) -> Result<String, SubstitutionError> {
    let argv = split_command_line(command_line)?;
    let (program, args) = argv.split_first().ok_or_else(|| {
        SubstitutionError::InvalidSubstitution("command substitution is empty".to_string())
    })?;

    log::debug!("Running command substitution: {}", command_line);

    let mut command = Command::new(program);
    // own group so a timeout can take down grandchildren holding the pipes
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let child = command
        .args(args)
        .env_clear()
        .envs(env.vars())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SubstitutionError::CommandNotFound {
            command: command_line.to_string(),
            source,
        })?;

    let pid = child.id();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(child.wait_with_output());
    });

    let timeout = env.command_timeout();
    let output: Output = match rx.recv_timeout(timeout) {
        Ok(result) => result.map_err(|e| SubstitutionError::CommandFailed {
            command: command_line.to_string(),
            status: "wait error".to_string(),
            stderr: e.to_string(),
        })?,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            kill_hung_command(pid);
            return Err(SubstitutionError::CommandTimeout {
                command: command_line.to_string(),
                timeout,
            });
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            return Err(SubstitutionError::CommandFailed {
                command: command_line.to_string(),
                status: "unknown status".to_string(),
                stderr: String::new(),
            })
        }
    };

    if !output.status.success() {
        return Err(SubstitutionError::CommandFailed {
            command: command_line.to_string(),
            status: describe_status(&output.status),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

#[cfg(unix)]
fn kill_hung_command(pid: u32) {
    use nix::{sys::signal, unistd::Pid};

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = signal::killpg(Pid::from_raw(raw), signal::Signal::SIGKILL) {
        log::warn!("Failed to kill timed out command (process group {}): {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_hung_command(pid: u32) {
    log::warn!("Timed out command (pid {}) left running", pid);
}

/// Human readable exit status, e.g. `exit code 2` or `signal 15`.
pub fn describe_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {}", signal);
        }
    }
    "unknown status".to_string()
}

/// Split a command line into argv following POSIX shell quoting rules.
pub fn split_command_line(input: &str) -> Result<Vec<String>, SubstitutionError> {
    shell_words::split(input).map_err(|e| {
        SubstitutionError::InvalidSubstitution(format!("{} in command: {}", e, input))
    })
}
