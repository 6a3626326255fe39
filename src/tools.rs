//! Thin wrapper around the external command-line tools (yt-dlp, ffmpeg, whisper).

use std::ffi::OsStr;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::PipelineError;

/// Run a tool to completion.
///
/// A tool that cannot be launched at all is a stage-level error. A non-zero
/// exit is returned as `Ok(Err(reason))` so callers can treat it per item.
pub async fn run_tool<I, S>(program: &OsStr, args: I) -> Result<Result<(), String>, PipelineError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    debug!("Running {:?}", command.as_std());

    let output = command.output().await.map_err(|source| PipelineError::Tool {
        tool: program.to_string_lossy().into_owned(),
        source,
    })?;

    if output.status.success() {
        Ok(Ok(()))
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(Err(failure_reason(&stderr, output.status.code())))
    }
}

/// Last non-empty stderr line, which is where these tools put the actual error
fn failure_reason(stderr: &str, code: Option<i32>) -> String {
    let exit = code.map_or_else(|| "signal".to_string(), |c| format!("exit code {}", c));
    match stderr.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => format!("{} ({})", line, exit),
        None => exit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reason_uses_last_stderr_line() {
        let stderr = "[youtube] abc: Downloading webpage\nERROR: Video unavailable\n\n";
        assert_eq!(
            failure_reason(stderr, Some(1)),
            "ERROR: Video unavailable (exit code 1)"
        );
        assert_eq!(failure_reason("", Some(2)), "exit code 2");
        assert_eq!(failure_reason("", None), "signal");
    }

    #[tokio::test]
    async fn test_missing_tool_is_a_launch_error() {
        let result = run_tool(OsStr::new("/nonexistent/brand-sentiment-tool"), ["--version"]).await;
        assert!(matches!(result, Err(PipelineError::Tool { .. })));
    }
}
