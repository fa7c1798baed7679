//! External embedding process execution.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error, info, instrument};

use graphfeat_shared::{AlgorithmSettings, GraphFeatError, Hyperparameters, Result};

use crate::{EmbeddingMethod, RESOURCES_FILE, VECTORS_FILE};

/// Keep at most this many trailing bytes of stderr in errors.
const STDERR_TAIL: usize = 2_000;

/// What a finished embedding process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub stderr: String,
    /// Where the resource list is expected.
    pub resources_path: PathBuf,
    /// Where the vectors are expected.
    pub vectors_path: PathBuf,
}

/// Runs embedding methods as external processes.
pub struct Dispatcher<'a> {
    settings: &'a AlgorithmSettings,
}

impl<'a> Dispatcher<'a> {
    pub fn new(settings: &'a AlgorithmSettings) -> Self {
        Self { settings }
    }

    /// Run `method` on `input`, writing outputs to `output_dir`.
    ///
    /// Blocks (asynchronously) until the process exits or the configured
    /// timeout elapses, in which case the child is killed. A non-zero exit
    /// is an error; output files are not inspected here.
    #[instrument(skip_all, fields(method = %method, input = %input.display()))]
    pub async fn run(
        &self,
        method: EmbeddingMethod,
        input: &Path,
        output_dir: &Path,
        hyperparameters: &Hyperparameters,
    ) -> Result<ProcessOutcome> {
        let args = method.arguments(&self.settings.scripts_dir, input, output_dir, hyperparameters)?;

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| GraphFeatError::io(output_dir, e))?;

        info!(
            interpreter = %self.settings.interpreter,
            args = ?args,
            "executing embedding process"
        );

        let child = Command::new(&self.settings.interpreter)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GraphFeatError::AlgorithmFailed {
                exit_code: None,
                stderr: format!(
                    "failed to spawn `{}`: {e}",
                    self.settings.interpreter
                ),
            })?;

        let output = match tokio::time::timeout(self.settings.timeout, child.wait_with_output())
            .await
        {
            Ok(result) => result.map_err(|e| GraphFeatError::AlgorithmFailed {
                exit_code: None,
                stderr: format!("failed to wait for embedding process: {e}"),
            })?,
            Err(_) => {
                error!(timeout_secs = self.settings.timeout.as_secs(), "embedding process timed out");
                return Err(GraphFeatError::AlgorithmTimeout {
                    timeout_secs: self.settings.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(stdout = %stdout.trim_end(), "embedding process stdout");
        }

        let outcome = ProcessOutcome {
            exit_code: output.status.code(),
            stderr: tail(&String::from_utf8_lossy(&output.stderr)),
            resources_path: output_dir.join(RESOURCES_FILE),
            vectors_path: output_dir.join(VECTORS_FILE),
        };

        if !output.status.success() {
            error!(
                exit_code = ?outcome.exit_code,
                stderr = %outcome.stderr,
                "embedding process failed"
            );
            return Err(GraphFeatError::AlgorithmFailed {
                exit_code: outcome.exit_code,
                stderr: outcome.stderr,
            });
        }

        info!(exit_code = ?outcome.exit_code, "embedding process finished");
        Ok(outcome)
    }
}

/// Last [`STDERR_TAIL`] bytes of `text`, cut on a char boundary.
fn tail(text: &str) -> String {
    let text = text.trim_end();
    if text.len() <= STDERR_TAIL {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gf-dispatch-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Settings that run `rdf_rescal.py` from `scripts_dir` with `sh`.
    fn sh_settings(scripts_dir: &Path, timeout: Duration) -> AlgorithmSettings {
        AlgorithmSettings {
            interpreter: "sh".into(),
            scripts_dir: scripts_dir.to_path_buf(),
            timeout,
        }
    }

    fn write_script(dir: &Path, body: &str) {
        std::fs::write(dir.join("rdf_rescal.py"), body).unwrap();
    }

    #[tokio::test]
    async fn runs_script_with_positional_arguments() {
        let tmp = temp_dir();
        write_script(
            &tmp,
            "printf '%s\\n' \"$1\" > \"$2args.txt\"\nprintf '%s\\n' \"$3\" >> \"$2args.txt\"\n",
        );
        let settings = sh_settings(&tmp, Duration::from_secs(10));
        let out = tmp.join("out");

        let outcome = Dispatcher::new(&settings)
            .run(
                EmbeddingMethod::Rescal,
                Path::new("/data/source.ttl"),
                &out,
                &Hyperparameters::parse("rank=7"),
            )
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.resources_path, out.join(RESOURCES_FILE));
        let args = std::fs::read_to_string(out.join("args.txt")).unwrap();
        assert_eq!(args, "/data/source.ttl\n7\n");

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn non_zero_exit_is_fatal() {
        let tmp = temp_dir();
        write_script(&tmp, "echo 'bad RDF syntax' >&2\nexit 3\n");
        let settings = sh_settings(&tmp, Duration::from_secs(10));

        let err = Dispatcher::new(&settings)
            .run(
                EmbeddingMethod::Rescal,
                &tmp.join("in.ttl"),
                &tmp.join("out"),
                &Hyperparameters::parse("rank=2"),
            )
            .await
            .unwrap_err();

        match err {
            GraphFeatError::AlgorithmFailed { exit_code, stderr } => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr.contains("bad RDF syntax"));
            }
            other => panic!("expected AlgorithmFailed, got {other:?}"),
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let tmp = temp_dir();
        write_script(&tmp, "sleep 5\n");
        let settings = sh_settings(&tmp, Duration::from_millis(200));

        let err = Dispatcher::new(&settings)
            .run(
                EmbeddingMethod::Rescal,
                &tmp.join("in.ttl"),
                &tmp.join("out"),
                &Hyperparameters::parse("rank=2"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GraphFeatError::AlgorithmTimeout { .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn missing_interpreter_is_reported() {
        let tmp = temp_dir();
        let settings = AlgorithmSettings {
            interpreter: "/nonexistent/interpreter".into(),
            scripts_dir: tmp.clone(),
            timeout: Duration::from_secs(1),
        };

        let err = Dispatcher::new(&settings)
            .run(
                EmbeddingMethod::Rescal,
                &tmp.join("in.ttl"),
                &tmp.join("out"),
                &Hyperparameters::parse("rank=2"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GraphFeatError::AlgorithmFailed { exit_code: None, .. }));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn tail_keeps_end_of_long_output() {
        let long = format!("{}END", "x".repeat(5_000));
        let cut = tail(&long);
        assert_eq!(cut.len(), STDERR_TAIL);
        assert!(cut.ends_with("END"));
        assert_eq!(tail("short\n"), "short");
    }
}
