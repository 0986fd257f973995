//! Request handlers for the four JSON endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Kind, Result};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct EvalRequest {
    #[serde(default)]
    language: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Serialize)]
pub struct EvalResponse {
    result: String,
}

pub async fn languages(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.settings.language_names())
}

pub async fn containers(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    let prefix = format!("{}_", crate::pool::SERVICE_PREFIX);
    let names = state.engine.list_containers(&prefix).await?;
    Ok(Json(names))
}

pub async fn eval(
    State(state): State<AppState>,
    Json(payload): Json<EvalRequest>,
) -> Result<Json<EvalResponse>> {
    if payload.language.is_empty() || payload.code.is_empty() {
        return Err(Error::new(
            "router.eval",
            Kind::Invalid,
            "language and code are both required",
        ));
    }

    let limits = state.settings.resolve(&payload.language)?;
    let mut attempt = 0u32;

    loop {
        let outcome = run_once(&state, &payload.language, &payload.code).await;

        match outcome {
            Ok(result) => {
                let truncated = truncate(&result, limits.output_limit_bytes);
                return Ok(Json(EvalResponse { result: truncated }));
            }
            Err(e) if e.is_timeout() => {
                return Err(e);
            }
            Err(e) if attempt < limits.retries => {
                attempt += 1;
                warn!(
                    language = payload.language.as_str(),
                    attempt, "eval attempt failed, retrying: {e}"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

async fn run_once(state: &AppState, language: &str, code: &str) -> Result<String> {
    let limits = state.settings.resolve(language)?;
    let container = state.pool.select_or_create(language).await?;
    let _permit = state.admission.acquire(&container, limits.concurrent).await;
    info!(container = container.as_str(), language, "evaluating");
    state.evaluator.run(&container, code, limits).await
}

pub async fn cleanup(State(state): State<AppState>) -> Json<Vec<String>> {
    let cleaned = state.pool.reap().await;
    Json(cleaned)
}

/// Conservative output truncation (§4.4/P10): if `len(result) * 4 > limit`,
/// truncate to `limit / 4` bytes. Deliberately not "fixed" to treat bytes and
/// characters consistently — this preserves the wire contract of the system
/// this one replaces, which made the same conflation.
fn truncate(result: &str, limit: u64) -> String {
    let len = result.len() as u64;
    if len * 4 > limit {
        let cutoff = (limit / 4) as usize;
        let mut end = cutoff.min(result.len());
        while end > 0 && !result.is_char_boundary(end) {
            end -= 1;
        }
        result[..end].to_string()
    } else {
        result.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionGate;
    use crate::config::Settings;
    use crate::engine::{ExecOutput, MockEngineClient};
    use crate::eval::Evaluator;
    use crate::pool::ContainerPool;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn state_with(mock: MockEngineClient, settings: Settings) -> AppState {
        let engine: Arc<dyn crate::engine::EngineClient> = Arc::new(mock);
        let settings = Arc::new(settings);
        AppState {
            settings: settings.clone(),
            engine: engine.clone(),
            pool: Arc::new(ContainerPool::new(engine.clone(), settings)),
            admission: Arc::new(AdmissionGate::new()),
            evaluator: Arc::new(Evaluator::new(engine)),
        }
    }

    fn settings_with_echo(retries: u32) -> Settings {
        let mut languages = HashMap::new();
        languages.insert(
            "echo".to_string(),
            crate::config::LanguageOverride {
                retries: Some(retries),
                ..Default::default()
            },
        );
        Settings {
            languages,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_fields_are_rejected_before_touching_the_pool() {
        let mock = MockEngineClient::new();
        let state = state_with(mock, settings_with_echo(0));

        let err = eval(
            State(state),
            Json(EvalRequest {
                language: String::new(),
                code: String::new(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind(), Kind::Invalid);
    }

    #[tokio::test]
    async fn a_non_timeout_failure_is_retried_up_to_the_configured_bound() {
        let mut mock = MockEngineClient::new();
        mock.expect_list_containers()
            .returning(|_| Box::pin(async { Ok(vec!["myriag_echo_1".to_string()]) }));

        let call_count = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = call_count.clone();
        mock.expect_exec().returning(move |_, cmd, _| {
            let counter = counter.clone();
            let is_run = cmd.first().map(String::as_str) == Some("/bin/sh");
            Box::pin(async move {
                if is_run {
                    let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    if n == 0 {
                        return Err(Error::new("engine.exec", Kind::Internal, "transient"));
                    }
                }
                Ok(ExecOutput {
                    stdout: b"ok".to_vec(),
                    stderr: Vec::new(),
                })
            })
        });

        let state = state_with(mock, settings_with_echo(2));
        let response = eval(
            State(state),
            Json(EvalRequest {
                language: "echo".to_string(),
                code: "1".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.0.result, "ok");
        assert_eq!(call_count.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn short_output_is_returned_unchanged() {
        assert_eq!(truncate("hello", 4096), "hello");
    }

    #[test]
    fn oversized_output_is_cut_to_a_quarter_of_the_limit() {
        let big = "x".repeat(1000);
        let result = truncate(&big, 100);
        assert_eq!(result.len(), 25);
    }

    #[test]
    fn truncation_never_splits_a_multibyte_character() {
        let big = "é".repeat(100); // each 'é' is 2 bytes
        let result = truncate(&big, 10);
        assert!(result.len() <= 2);
        assert!(std::str::from_utf8(result.as_bytes()).is_ok());
    }
}
