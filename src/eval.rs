//! Evaluator (C6): runs one snippet of code inside an already-running
//! container's own unique scratch directory, honoring a per-language
//! timeout and preferring stderr in the result.

use std::sync::Arc;

use tracing::debug;

use crate::config::LanguageConfig;
use crate::engine::{EngineClient, ExecOptions};
use crate::error::{Error, Kind, Result};
use crate::id::IdGenerator;

static EVAL_IDS: IdGenerator = IdGenerator::new();

pub struct Evaluator {
    engine: Arc<dyn EngineClient>,
}

impl Evaluator {
    pub fn new(engine: Arc<dyn EngineClient>) -> Self {
        Evaluator { engine }
    }

    /// Run `code` inside `container`, scoped to a fresh per-request
    /// subdirectory of its `eval/` directory, with a deadline of
    /// `limits.timeout`.
    pub async fn run(&self, container: &str, code: &str, limits: LanguageConfig) -> Result<String> {
        let dir = format!("eval/{}", EVAL_IDS.next());

        debug!(container, dir = dir.as_str(), "creating unique eval dir");
        self.mkdir(container, &dir).await?;

        debug!(container, dir = dir.as_str(), "chmoding unique eval dir");
        self.chmod(container, &dir).await?;

        debug!(container, dir = dir.as_str(), "evaluating code");
        let result = tokio::time::timeout(limits.timeout, self.run_exec(container, &dir, code))
            .await
            .map_err(|_| {
                Error::new("eval.run", Kind::EvalTimeout, "evaluation timeout")
            })
            .and_then(|inner| inner);

        debug!(container, dir = dir.as_str(), "removing unique eval dir");
        if let Err(e) = self.rm(container, &dir).await {
            tracing::error!(container, dir = dir.as_str(), "failed to remove unique eval dir: {e}");
        }

        result
    }

    async fn mkdir(&self, container: &str, dir: &str) -> Result<()> {
        self.engine
            .exec(
                container,
                vec!["mkdir".to_string(), dir.to_string()],
                ExecOptions::default(),
            )
            .await
            .map_err(|e| Error::wrap("eval.mkdir", Kind::Internal, e))?;
        Ok(())
    }

    async fn chmod(&self, container: &str, dir: &str) -> Result<()> {
        self.engine
            .exec(
                container,
                vec!["chmod".to_string(), "777".to_string(), dir.to_string()],
                ExecOptions::default(),
            )
            .await
            .map_err(|e| Error::wrap("eval.chmod", Kind::Internal, e))?;
        Ok(())
    }

    async fn run_exec(&self, container: &str, dir: &str, code: &str) -> Result<String> {
        let opts = ExecOptions {
            user: Some("1001:1001".to_string()),
            workdir: Some(format!("/tmp/{dir}")),
            attach_output: true,
        };

        let output = self
            .engine
            .exec(
                container,
                vec![
                    "/bin/sh".to_string(),
                    "/var/run/run.sh".to_string(),
                    code.to_string(),
                ],
                opts,
            )
            .await
            .map_err(|e| Error::wrap("eval.run_exec", Kind::Internal, e))?;

        if !output.stderr.is_empty() {
            Ok(String::from_utf8_lossy(&output.stderr).into_owned())
        } else {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
    }

    async fn rm(&self, container: &str, dir: &str) -> Result<()> {
        self.engine
            .exec(
                container,
                vec!["rm".to_string(), "-rf".to_string(), dir.to_string()],
                ExecOptions::default(),
            )
            .await
            .map_err(|e| Error::wrap("eval.rm", Kind::Internal, e))?;
        Ok(())
    }
}
