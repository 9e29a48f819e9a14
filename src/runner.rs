use anyhow::{Context, Result};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;

/// A command that ran but exited unsuccessfully
#[derive(Debug, Error)]
#[error("command {program:?} failed with exit code {}: {}", code.map_or_else(|| "none".to_string(), |c| c.to_string()), stderr.trim())]
pub struct CommandError {
    pub program: String,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Options for [`run_with`]
#[derive(Debug, Default, Clone, Copy)]
pub struct RunOptions<'a> {
    /// Extra environment variables, added to the inherited environment
    pub env: &'a [(String, String)],
    /// Working directory
    pub cwd: Option<&'a Path>,
    /// Log a non-zero exit at debug level instead of error
    pub quiet: bool,
}

/// Run a command and capture its stdout
pub fn run(cmd: &str, args: &[&str]) -> Result<String> {
    run_with(cmd, args, RunOptions::default())
}

/// Run a command with environment and working directory, capturing stdout
///
/// A non-zero exit is logged (exit code, stdout, stderr) and returned as a
/// [`CommandError`].
pub fn run_with(cmd: &str, args: &[&str], opts: RunOptions<'_>) -> Result<String> {
    let mut command = Command::new(cmd);
    command.args(args).stdin(Stdio::null());
    for (key, value) in opts.env {
        command.env(key, value);
    }
    if let Some(cwd) = opts.cwd {
        command.current_dir(cwd);
    }

    let output = command
        .output()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let level = if opts.quiet {
            log::Level::Debug
        } else {
            log::Level::Error
        };
        log::log!(
            level,
            "Command {:?} failed with exit code {:?}",
            cmd,
            output.status.code()
        );
        log::log!(level, "Command {:?} stdout: {}", cmd, stdout);
        log::log!(level, "Command {:?} stderr: {}", cmd, stderr);
        return Err(CommandError {
            program: cmd.to_string(),
            code: output.status.code(),
            stdout,
            stderr,
        }
        .into());
    }

    log::debug!(
        "Command {:?} stdout: {}, stderr: {}",
        format!("{} {}", cmd, args.join(" ")),
        stdout,
        stderr
    );
    Ok(stdout)
}

/// Run a command whose failure is an expected answer, not an error
pub fn probe(cmd: &str, args: &[&str]) -> Result<String> {
    run_with(
        cmd,
        args,
        RunOptions {
            quiet: true,
            ..RunOptions::default()
        },
    )
}

/// Run a command as root (or as `user`) through sudo
pub fn sudo(cmd: &str, args: &[&str], user: Option<&str>) -> Result<String> {
    let mut sudo_args = Vec::with_capacity(args.len() + 3);
    if let Some(user) = user {
        sudo_args.extend(["--user", user]);
    }
    sudo_args.push(cmd);
    sudo_args.extend_from_slice(args);
    run("sudo", &sudo_args)
}

/// Restart a systemd unit
pub fn restart_service(service: &str) -> Result<()> {
    run("systemctl", &["restart", service])?;
    Ok(())
}

/// Run a command and inherit stdio (shows output in real-time)
pub fn run_streaming(cmd: &str, args: &[&str]) -> Result<ExitStatus> {
    Command::new(cmd)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to execute: {} {}", cmd, args.join(" ")))
}

/// Exit code of a failed command, if `err` came from one
pub fn exit_code(err: &anyhow::Error) -> Option<i32> {
    err.downcast_ref::<CommandError>().and_then(|e| e.code)
}

/// Stderr of a failed command, if `err` came from one
pub fn stderr_of(err: &anyhow::Error) -> Option<&str> {
    err.downcast_ref::<CommandError>().map(|e| e.stderr.as_str())
}

// ============================================================================
// Tests
// ============================================================================
