//! Convenience wrapper around shell command execution.
//!
//! Unrelated to the injection engine and sharing no state with it: this is
//! plain I/O plumbing. A [Shell] carries a digested environment and a
//! working directory; derived shells are cheap copies with a merged
//! environment or a new directory. Commands run through `sh -c` with
//! `{name}` placeholders interpolated from parameters and environment,
//! and stdout/stderr are multiplexed line by line into caller-supplied
//! sinks until both streams close.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use indexmap::IndexMap;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::Command;
use tracing::debug;

/// An environment or parameter value before digestion.
#[derive(Clone, Debug)]
pub enum EnvValue {
    Text(String),
    List(Vec<String>),
}

impl From<&str> for EnvValue {
    fn from(value: &str) -> Self {
        EnvValue::Text(value.to_owned())
    }
}

impl From<String> for EnvValue {
    fn from(value: String) -> Self {
        EnvValue::Text(value)
    }
}

impl From<&Path> for EnvValue {
    fn from(value: &Path) -> Self {
        EnvValue::Text(value.display().to_string())
    }
}

impl From<PathBuf> for EnvValue {
    fn from(value: PathBuf) -> Self {
        EnvValue::Text(value.display().to_string())
    }
}

impl From<Vec<String>> for EnvValue {
    fn from(value: Vec<String>) -> Self {
        EnvValue::List(value)
    }
}

impl From<Vec<&str>> for EnvValue {
    fn from(value: Vec<&str>) -> Self {
        EnvValue::List(value.into_iter().map(str::to_owned).collect())
    }
}

/// Undigested name → value map.
pub type EnvMap = IndexMap<String, EnvValue>;

/// Flatten an environment map to plain strings; list values are
/// shell-quoted and space-joined.
pub fn digest_env(env: &EnvMap) -> IndexMap<String, String> {
    env.iter()
        .map(|(key, value)| (key.clone(), digest_value(value, true)))
        .collect()
}

/// Flatten a parameter map to plain strings; list values are space-joined
/// without quoting.
pub fn digest_params(params: &EnvMap) -> IndexMap<String, String> {
    params
        .iter()
        .map(|(key, value)| (key.clone(), digest_value(value, false)))
        .collect()
}

fn digest_value(value: &EnvValue, quote_lists: bool) -> String {
    match value {
        EnvValue::Text(text) => text.clone(),
        EnvValue::List(items) => {
            if quote_lists {
                items.iter().map(|item| quote(item)).collect::<Vec<_>>().join(" ")
            } else {
                items.join(" ")
            }
        }
    }
}

/// Minimal POSIX single-quoting.
fn quote(text: &str) -> String {
    if text.is_empty() {
        return "''".to_owned();
    }
    let safe = text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%_-+=:,./".contains(c));
    if safe {
        text.to_owned()
    } else {
        format!("'{}'", text.replace('\'', "'\"'\"'"))
    }
}

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("command exited with {status}")]
    Failed { status: ExitStatus },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Per-line output callback.
pub type LineSink = Box<dyn FnMut(&str) + Send>;

/// A digested environment and working directory to run commands under.
#[derive(Clone, Debug)]
pub struct Shell {
    env: IndexMap<String, String>,
    cwd: PathBuf,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    /// A shell over the current process environment and directory.
    pub fn new() -> Self {
        Self {
            env: std::env::vars().collect(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// A shell over the given environment only.
    pub fn with_env(env: &EnvMap) -> Self {
        Self {
            env: digest_env(env),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Derive a shell with the extra environment merged in.
    pub fn env(&self, extra: &EnvMap) -> Self {
        let mut env = self.env.clone();
        env.extend(digest_env(extra));
        Self {
            env,
            cwd: self.cwd.clone(),
        }
    }

    /// Derive a shell in another working directory.
    pub fn cd(&self, dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a directory: {}", dir.display()),
            ));
        }
        Ok(Self {
            env: self.env.clone(),
            cwd: dir,
        })
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Start building a command. `{name}` placeholders in `cmd` are
    /// interpolated from parameters first, then the environment.
    pub fn command(&self, cmd: &str) -> ShellCommand<'_> {
        ShellCommand {
            shell: self,
            cmd: cmd.to_owned(),
            params: IndexMap::new(),
            stdin: None,
            stdout: None,
            stderr: None,
            check: false,
        }
    }

    /// Run a command with inherited stdio, blocking until it exits. For
    /// interactive commands; no sinks, no interpolation of parameters.
    pub fn interact(&self, cmd: &str) -> Result<ExitStatus, ShellError> {
        debug!(cmd, "interactive command");
        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .env_clear()
            .envs(&self.env)
            .current_dir(&self.cwd)
            .status()?;
        Ok(status)
    }

    fn interpolate(&self, cmd: &str, params: &IndexMap<String, String>) -> String {
        let mut out = String::with_capacity(cmd.len());
        let mut chars = cmd.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    out.push('}');
                }
                '{' => {
                    let mut key = String::new();
                    let mut closed = false;
                    for k in chars.by_ref() {
                        if k == '}' {
                            closed = true;
                            break;
                        }
                        key.push(k);
                    }
                    match params.get(&key).or_else(|| self.env.get(&key)) {
                        Some(value) if closed => out.push_str(value),
                        _ => {
                            // unknown or unterminated placeholder stays verbatim
                            out.push('{');
                            out.push_str(&key);
                            if closed {
                                out.push('}');
                            }
                        }
                    }
                }
                _ => out.push(c),
            }
        }
        out
    }
}

/// Builder for one command invocation.
pub struct ShellCommand<'a> {
    shell: &'a Shell,
    cmd: String,
    params: IndexMap<String, String>,
    stdin: Option<String>,
    stdout: Option<LineSink>,
    stderr: Option<LineSink>,
    check: bool,
}

impl ShellCommand<'_> {
    /// Set an interpolation parameter; list values are space-joined.
    pub fn param(mut self, key: &str, value: impl Into<EnvValue>) -> Self {
        self.params
            .insert(key.to_owned(), digest_value(&value.into(), false));
        self
    }

    /// Feed the given text to the process on stdin, then close the pipe.
    pub fn stdin_text(mut self, text: impl Into<String>) -> Self {
        self.stdin = Some(text.into());
        self
    }

    /// Receive each stdout line, without the trailing newline.
    pub fn on_stdout<F: FnMut(&str) + Send + 'static>(mut self, sink: F) -> Self {
        self.stdout = Some(Box::new(sink));
        self
    }

    /// Receive each stderr line, without the trailing newline.
    pub fn on_stderr<F: FnMut(&str) + Send + 'static>(mut self, sink: F) -> Self {
        self.stderr = Some(Box::new(sink));
        self
    }

    /// Treat a nonzero exit as [ShellError::Failed].
    pub fn check(mut self) -> Self {
        self.check = true;
        self
    }

    /// Spawn the command and drain its output streams into the sinks,
    /// line by line, until both close; then wait for the exit status.
    pub async fn run(mut self) -> Result<ExitStatus, ShellError> {
        let cmd = self.shell.interpolate(&self.cmd, &self.params);
        debug!(cmd = %cmd, cwd = %self.shell.cwd.display(), "spawning command");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .env_clear()
            .envs(&self.shell.env)
            .current_dir(&self.shell.cwd)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(if self.stdout.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stderr(if self.stderr.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .spawn()?;

        if let Some(text) = self.stdin.take() {
            // scope closes the pipe once the text is written
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(text.as_bytes()).await?;
            }
        }

        let mut out_lines = child.stdout.take().map(|s| BufReader::new(s).lines());
        let mut err_lines = child.stderr.take().map(|s| BufReader::new(s).lines());
        let mut on_out = self.stdout.take();
        let mut on_err = self.stderr.take();

        enum Event {
            Out(Option<String>),
            Err(Option<String>),
        }

        while out_lines.is_some() || err_lines.is_some() {
            let event = tokio::select! {
                line = next_line_of(&mut out_lines) => Event::Out(line?),
                line = next_line_of(&mut err_lines) => Event::Err(line?),
            };
            match event {
                Event::Out(Some(line)) => {
                    if let Some(sink) = on_out.as_mut() {
                        sink(&line);
                    }
                }
                Event::Out(None) => out_lines = None,
                Event::Err(Some(line)) => {
                    if let Some(sink) = on_err.as_mut() {
                        sink(&line);
                    }
                }
                Event::Err(None) => err_lines = None,
            }
        }

        let status = child.wait().await?;
        if self.check && !status.success() {
            return Err(ShellError::Failed { status });
        }
        Ok(status)
    }
}

/// Next line of an open stream; pends forever on a closed one so the
/// select loop only ever observes live streams.
async fn next_line_of<R>(lines: &mut Option<Lines<R>>) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

/// Run a command, requiring success, and return its trimmed stdout.
pub fn check_output(cmd: &str) -> Result<String, ShellError> {
    let output = std::process::Command::new("sh").arg("-c").arg(cmd).output()?;
    if !output.status.success() {
        return Err(ShellError::Failed {
            status: output.status,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&str) + Send + 'static) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = lines.clone();
        let sink = move |line: &str| sink_lines.lock().unwrap().push(line.to_owned());
        (lines, sink)
    }

    #[test]
    fn quotes_unsafe_values() {
        assert_eq!(quote("simple-value_1.txt"), "simple-value_1.txt");
        assert_eq!(quote("two words"), "'two words'");
        assert_eq!(quote("it's"), "'it'\"'\"'s'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn digests_list_env_values() {
        let mut env = EnvMap::new();
        env.insert("FLAGS".to_owned(), vec!["-a", "-b c"].into());
        let flat = digest_env(&env);
        assert_eq!(flat["FLAGS"], "-a '-b c'");
        let flat = digest_params(&env);
        assert_eq!(flat["FLAGS"], "-a -b c");
    }

    #[test]
    fn interpolates_params_then_env() {
        let mut env = EnvMap::new();
        env.insert("WHO".to_owned(), "env".into());
        let shell = Shell::with_env(&env);
        let mut params = IndexMap::new();
        params.insert("WHAT".to_owned(), "param".to_owned());
        assert_eq!(
            shell.interpolate("echo {WHAT} {WHO} {{literal}}", &params),
            "echo param env {literal}"
        );
        assert_eq!(shell.interpolate("echo {missing}", &params), "echo {missing}");
    }

    #[test]
    fn cd_rejects_missing_directory() {
        assert!(Shell::new().cd("/definitely/not/a/real/dir").is_err());
    }

    #[test]
    fn derived_env_does_not_touch_parent() {
        let parent = Shell::with_env(&EnvMap::new());
        let mut extra = EnvMap::new();
        extra.insert("X".to_owned(), "1".into());
        let child = parent.env(&extra);
        assert_eq!(child.env.get("X").map(String::as_str), Some("1"));
        assert!(parent.env.get("X").is_none());
    }

    #[tokio::test]
    async fn streams_stdout_lines() {
        let (lines, sink) = collector();
        let status = Shell::new()
            .command("printf 'one\\ntwo\\n'")
            .on_stdout(sink)
            .run()
            .await
            .unwrap();
        assert!(status.success());
        assert_eq!(*lines.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn multiplexes_stdout_and_stderr() {
        let (out, out_sink) = collector();
        let (err, err_sink) = collector();
        Shell::new()
            .command("echo visible; echo hidden 1>&2")
            .on_stdout(out_sink)
            .on_stderr(err_sink)
            .run()
            .await
            .unwrap();
        assert_eq!(*out.lock().unwrap(), vec!["visible"]);
        assert_eq!(*err.lock().unwrap(), vec!["hidden"]);
    }

    #[tokio::test]
    async fn params_interpolate_into_command() {
        let (lines, sink) = collector();
        Shell::new()
            .command("echo {word}")
            .param("word", "bees")
            .on_stdout(sink)
            .run()
            .await
            .unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["bees"]);
    }

    #[tokio::test]
    async fn stdin_text_feeds_process() {
        let (lines, sink) = collector();
        Shell::new()
            .command("cat")
            .stdin_text("ping")
            .on_stdout(sink)
            .run()
            .await
            .unwrap();
        assert_eq!(*lines.lock().unwrap(), vec!["ping"]);
    }

    #[tokio::test]
    async fn check_surfaces_nonzero_exit() {
        let result = Shell::new().command("exit 3").check().run().await;
        match result {
            Err(ShellError::Failed { status }) => assert_eq!(status.code(), Some(3)),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unchecked_nonzero_exit_is_returned() {
        let status = Shell::new().command("exit 3").run().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[test]
    fn check_output_captures_trimmed_stdout() {
        assert_eq!(check_output("echo hello").unwrap(), "hello");
        assert!(check_output("exit 1").is_err());
    }
}
