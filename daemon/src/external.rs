/// Thin wrapper around `tokio::process` for the read-only tools the daemon
/// shells out to (package managers, the power-profile tool).
use anyhow::{bail, Context, Result};
use std::process::Stdio;
use tokio::process::Command;

/// Hides the console window a console program would otherwise flash on Windows.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Captured result of one tool invocation.
#[derive(Debug)]
pub struct Captured {
    pub success: bool,
    pub stdout: String,
}

/// Runs `argv[0]` with the remaining arguments and captures stdout.
///
/// Errors when `argv` is empty or the program cannot be started (for example,
/// it is not installed). A non-zero exit is reported through
/// [`Captured::success`], not as an error.
pub async fn capture(argv: &[String]) -> Result<Captured> {
    let Some((program, args)) = argv.split_first() else {
        bail!("empty command line");
    };
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    let output = cmd
        .output()
        .await
        .with_context(|| format!("failed to run {program}"))?;
    Ok(Captured {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
    })
}

/// Starts `argv` without waiting for it or reading its output.
pub fn spawn_detached(argv: &[String]) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        bail!("empty command line");
    };
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;
    // Reap the child in the background so it does not linger as a zombie.
    tokio::spawn(async move {
        let _ = child.wait().await;
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_command_is_an_error() {
        assert!(capture(&[]).await.is_err());
        assert!(spawn_detached(&[]).is_err());
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let argv = vec!["cpuglyph-no-such-tool-4f1c".to_string()];
        assert!(capture(&argv).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_exit_status() {
        let argv: Vec<String> = ["sh", "-c", "echo hello; exit 3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = capture(&argv).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.stdout.trim(), "hello");
    }
}
