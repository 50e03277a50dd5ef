//! Pluggable code execution keyed by language.
//!
//! Executors are resolved from the registry once per session and language;
//! a missing executor only disables running code, never editing.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use pairpad_core::error::{PairpadError, Result};
use pairpad_core::model::Language;

use crate::config::ExecutorConfig;

/// What a run printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub output: String,
    pub is_error: bool,
}

#[async_trait]
pub trait CodeExecutor: Send + Sync {
    fn language(&self) -> Language;
    async fn run(&self, code: &str) -> Result<ExecOutput>;
}

/// Runs code by piping it into an external interpreter's stdin.
pub struct ProcessExecutor {
    cfg: ExecutorConfig,
}

impl ProcessExecutor {
    pub fn new(cfg: ExecutorConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl CodeExecutor for ProcessExecutor {
    fn language(&self) -> Language {
        self.cfg.language
    }

    async fn run(&self, code: &str) -> Result<ExecOutput> {
        let mut child = Command::new(&self.cfg.program)
            .args(&self.cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PairpadError::Unavailable(format!("spawn {} failed: {e}", self.cfg.program)))?;

        // feed stdin while collecting output; both count against the timeout
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(code.as_bytes()).await {
                    debug!(error = %e, "interpreter closed stdin early");
                }
            }
        };
        let run = async move {
            let (_, out) = tokio::join!(feed, child.wait_with_output());
            out
        };

        let limit = Duration::from_millis(self.cfg.timeout_ms);
        let out = match tokio::time::timeout(limit, run).await {
            Ok(res) => res.map_err(|e| PairpadError::Internal(format!("wait failed: {e}")))?,
            Err(_) => {
                return Ok(ExecOutput {
                    output: format!("Execution timed out after {}ms.", self.cfg.timeout_ms),
                    is_error: true,
                })
            }
        };

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Ok(ExecOutput {
            output: output.trim_end().to_string(),
            is_error: !out.status.success(),
        })
    }
}

/// `language -> executor`.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    by_language: HashMap<Language, Arc<dyn CodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn from_config(cfgs: &[ExecutorConfig]) -> Self {
        let mut reg = Self::default();
        for cfg in cfgs {
            reg.register(Arc::new(ProcessExecutor::new(cfg.clone())));
        }
        reg
    }

    /// Later registrations replace earlier ones for the same language.
    pub fn register(&mut self, exec: Arc<dyn CodeExecutor>) {
        self.by_language.insert(exec.language(), exec);
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn CodeExecutor>> {
        self.by_language.get(&language).cloned()
    }
}

pub fn unavailable_message(language: Language) -> String {
    format!("Execution is not available for {language}.")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Language);

    #[async_trait]
    impl CodeExecutor for Fixed {
        fn language(&self) -> Language {
            self.0
        }
        async fn run(&self, code: &str) -> Result<ExecOutput> {
            Ok(ExecOutput { output: code.len().to_string(), is_error: false })
        }
    }

    #[tokio::test]
    async fn registry_resolves_by_language() {
        let mut reg = ExecutorRegistry::default();
        reg.register(Arc::new(Fixed(Language::Python)));
        let exec = reg.get(Language::Python).unwrap();
        assert_eq!(exec.run("abc").await.unwrap().output, "3");
        assert!(reg.get(Language::Java).is_none());
        assert_eq!(unavailable_message(Language::Java), "Execution is not available for java.");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_executor_pipes_stdin() {
        let exec = ProcessExecutor::new(ExecutorConfig {
            language: Language::Python,
            program: "cat".into(),
            args: vec![],
            timeout_ms: 2000,
        });
        let out = exec.run("hello\n").await.unwrap();
        assert_eq!(out, ExecOutput { output: "hello".into(), is_error: false });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_covers_unread_stdin() {
        let exec = ProcessExecutor::new(ExecutorConfig {
            language: Language::Python,
            program: "sleep".into(),
            args: vec!["5".into()],
            timeout_ms: 200,
        });
        let big = "x".repeat(1 << 20);
        let out = exec.run(&big).await.unwrap();
        assert!(out.is_error);
        assert_eq!(out.output, "Execution timed out after 200ms.");
    }
}
