use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Output, Stdio};

use crate::ui::prelude::*;

/// Runs mutating commands, or only prints them when `dry_run` is set.
///
/// Read-only probes (sfdisk -J, lsblk, blockdev) go through [`capture`] instead and
/// always execute, so a dry run still sees the real devices.
#[derive(Debug, Clone, Copy)]
pub struct CommandExecutor {
    pub dry_run: bool,
}

impl CommandExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn run(&self, command: &mut Command) -> Result<()> {
        if self.dry_run {
            self.print_dry_run(command, None);
            return Ok(());
        }

        log_command(command, None);
        let status = command
            .status()
            .with_context(|| format!("Failed to start {}", render(command)))?;
        if !status.success() {
            anyhow::bail!("Command failed ({}): {}", status, render(command));
        }
        Ok(())
    }

    pub fn run_with_input(&self, command: &mut Command, input: &str) -> Result<()> {
        if self.dry_run {
            self.print_dry_run(command, Some(input));
            return Ok(());
        }

        log_command(command, Some(input));
        command.stdin(Stdio::piped());
        // Capture output to avoid clutter; surfaced on failure
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to start {}", render(command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            anyhow::bail!(
                "Command failed ({}): {}: {}",
                output.status,
                render(command),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    pub fn run_with_output(&self, command: &mut Command) -> Result<Option<Output>> {
        if self.dry_run {
            self.print_dry_run(command, None);
            return Ok(None);
        }

        log_command(command, None);
        command.stdout(Stdio::piped());
        let output = command
            .output()
            .with_context(|| format!("Failed to start {}", render(command)))?;
        if !output.status.success() {
            anyhow::bail!(
                "Command failed ({}): {}: {}",
                output.status,
                render(command),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(Some(output))
    }

    fn print_dry_run(&self, command: &Command, input: Option<&str>) {
        let cmd_str = render(command);

        match input {
            Some(input_str) if input_str.trim_end().contains('\n') => {
                let mut lines = vec!["[DRY RUN] --- BEGIN COMMAND ---".to_string()];
                lines.push(format!("> {}", cmd_str));
                lines.push(input_str.trim().to_string());
                lines.push("[DRY RUN] --- END COMMAND ---".to_string());
                emit(Level::Info, "exec.dry_run", &lines.join("\n"), None);
            }
            Some(input_str) => emit(
                Level::Info,
                "exec.dry_run",
                &format!("[DRY RUN] echo '{}' | {}", input_str.trim(), cmd_str),
                None,
            ),
            None => emit(
                Level::Info,
                "exec.dry_run",
                &format!("[DRY RUN] {}", cmd_str),
                None,
            ),
        }
    }
}

/// Run a read-only command and return its stdout, failing on a non-zero exit.
pub fn capture(command: &mut Command) -> Result<String> {
    log_command(command, None);
    let output = command
        .output()
        .with_context(|| format!("Failed to run {}", render(command)))?;
    if !output.status.success() {
        anyhow::bail!(
            "{} exited with {}: {}",
            render(command),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a read-only command and return stdout and stderr together, whatever the exit status.
///
/// Diagnostic tools print their findings on either stream and use exit codes loosely.
pub fn capture_combined(command: &mut Command) -> Result<(bool, String)> {
    log_command(command, None);
    let output = command
        .output()
        .with_context(|| format!("Failed to run {}", render(command)))?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        text.push('\n');
        text.push_str(&stderr);
    }
    Ok((output.status.success(), text))
}

pub fn render(command: &Command) -> String {
    let mut words = vec![command.get_program().to_string_lossy().into_owned()];
    words.extend(command.get_args().map(|a| a.to_string_lossy().into_owned()));
    shell_words::join(words)
}

fn log_command(command: &Command, input: Option<&str>) {
    let message = match input {
        Some(input) => format!("$ {} <<< {:?}", render(command), input),
        None => format!("$ {}", render(command)),
    };
    emit(Level::Debug, "exec.command", &message, None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_quotes_arguments() {
        let mut cmd = Command::new("sfdisk");
        cmd.args(["--part-label", "/dev/sdb", "3", "Basic data partition"]);
        assert_eq!(
            render(&cmd),
            "sfdisk --part-label /dev/sdb 3 'Basic data partition'"
        );
    }

    #[test]
    fn test_dry_run_never_executes() {
        let executor = CommandExecutor::new(true);
        // A program that cannot exist would fail if it were spawned
        let mut cmd = Command::new("/nonexistent/growclone-test-binary");
        assert!(executor.run(&mut cmd).is_ok());
        assert!(executor.run_with_input(&mut cmd, "label: gpt\n").is_ok());
        assert!(executor.run_with_output(&mut cmd).unwrap().is_none());
    }

    #[test]
    fn test_capture_reports_failure() {
        let err = capture(&mut Command::new("false")).unwrap_err();
        assert!(err.to_string().contains("false"));
    }

    #[test]
    fn test_capture_returns_stdout() {
        let out = capture(Command::new("echo").arg("hello")).unwrap();
        assert_eq!(out.trim(), "hello");
    }
}
