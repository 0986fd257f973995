//! Container Pool & Lifecycle (C5): lazily creates per-language worker
//! containers, discovers existing ones, selects one per request, and
//! periodically reaps all service-owned containers.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::config::{LanguageConfig, Settings};
use crate::engine::{EngineClient, ExecOptions};
use crate::error::{Error, Kind, Result};
use crate::id::IdGenerator;
use crate::image;

pub const SERVICE_PREFIX: &str = "myriag";

/// Upper bound for engine setup operations (create/start/exec/list/kill) —
/// distinct from the per-language evaluation deadline.
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ContainerPool {
    engine: Arc<dyn EngineClient>,
    settings: Arc<Settings>,
    ids: IdGenerator,
}

impl ContainerPool {
    pub fn new(engine: Arc<dyn EngineClient>, settings: Arc<Settings>) -> Self {
        ContainerPool {
            engine,
            settings,
            ids: IdGenerator::new(),
        }
    }

    /// The name prefix under which every container of language `lang` is
    /// listed (`<prefix>_<lang>_`).
    fn container_prefix(lang: &str) -> String {
        format!("{SERVICE_PREFIX}_{lang}_")
    }

    /// Select an existing running container for `lang`, or create one.
    /// Multiple concurrent callers for the same language may race and each
    /// create a container; this is an accepted cost, bounded by the reaper.
    pub async fn select_or_create(&self, lang: &str) -> Result<String> {
        let prefix = Self::container_prefix(lang);
        let existing = tokio::time::timeout(SETUP_TIMEOUT, self.engine.list_containers(&prefix))
            .await
            .map_err(|_| Error::new("pool.select_or_create", Kind::Io, "list_containers timed out"))??;

        if let Some(chosen) = existing.choose(&mut rand::rng()) {
            return Ok(chosen.clone());
        }

        self.create_container(lang).await
    }

    /// Create, start, and set up a fresh container for `lang`.
    pub async fn create_container(&self, lang: &str) -> Result<String> {
        let limits = self.settings.resolve(lang)?;
        let name = format!("{SERVICE_PREFIX}_{lang}_{}", self.ids.next());
        let image = image::image_name(lang);

        self.setup(&name, &image, limits).await.map_err(|e| {
            Error::wrap("pool.create_container", Kind::Internal, e)
        })?;

        info!(container = name.as_str(), lang, "container created");
        Ok(name)
    }

    async fn setup(&self, name: &str, image: &str, limits: LanguageConfig) -> Result<()> {
        with_setup_timeout(
            "pool.setup.create_and_start",
            self.engine.create_and_start_container(name, image, limits),
        )
        .await?;

        with_setup_timeout(
            "pool.setup.mkdir_eval",
            self.engine.exec(
                name,
                vec!["mkdir".to_string(), "eval".to_string()],
                ExecOptions::default(),
            ),
        )
        .await?;

        with_setup_timeout(
            "pool.setup.chmod_eval",
            self.engine.exec(
                name,
                vec!["chmod".to_string(), "711".to_string(), "eval".to_string()],
                ExecOptions::default(),
            ),
        )
        .await?;

        Ok(())
    }

    /// Create one container per language up front, in parallel.
    pub async fn prepare_all(&self, langs: &[String]) -> Result<()> {
        let results = join_all(langs.iter().map(|lang| self.create_container(lang))).await;

        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// One reap pass: list every service-owned running container and kill
    /// each, in parallel. Returns the names successfully killed; failures
    /// are logged and otherwise ignored.
    pub async fn reap(&self) -> Vec<String> {
        let prefix = format!("{SERVICE_PREFIX}_");
        let containers = match with_setup_timeout(
            "pool.reap.list",
            self.engine.list_containers(&prefix),
        )
        .await
        {
            Ok(names) => names,
            Err(e) => {
                warn!("reap: failed to list containers: {e}");
                return Vec::new();
            }
        };

        let kills = containers.iter().map(|name| {
            let name = name.clone();
            async move {
                match with_setup_timeout("pool.reap.kill", self.engine.kill_container(&name)).await {
                    Ok(()) => Some(name),
                    Err(e) => {
                        warn!(container = name.as_str(), "reap: failed to kill container: {e}");
                        None
                    }
                }
            }
        });

        join_all(kills).await.into_iter().flatten().collect()
    }

    /// Spawn the background reaper task; it runs for the lifetime of the
    /// process, firing every `interval`.
    pub fn spawn_reaper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick
            loop {
                ticker.tick().await;
                let cleaned = self.reap().await;
                info!(count = cleaned.len(), "periodic reap complete");
            }
        })
    }
}

async fn with_setup_timeout<F, T>(op: &'static str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(SETUP_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::new(op, Kind::Io, "operation timed out")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ExecOutput, MockEngineClient};
    use std::collections::HashMap;

    fn settings_with_echo() -> Settings {
        let mut languages = HashMap::new();
        languages.insert("echo".to_string(), Default::default());
        Settings {
            languages,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_container_names_match_prefix_lang_id() {
        let mut mock = MockEngineClient::new();
        mock.expect_create_and_start_container()
            .returning(|_, _, _| Box::pin(async { Ok(()) }));
        mock.expect_exec()
            .returning(|_, _, _| Box::pin(async { Ok(ExecOutput::default()) }));

        let pool = ContainerPool::new(Arc::new(mock), Arc::new(settings_with_echo()));
        let name = pool.create_container("echo").await.unwrap();

        assert!(name.starts_with("myriag_echo_"));
        let suffix = name.strip_prefix("myriag_echo_").unwrap();
        assert!(suffix.parse::<u64>().is_ok());
    }

    #[tokio::test]
    async fn select_or_create_reuses_an_existing_container() {
        let mut mock = MockEngineClient::new();
        mock.expect_list_containers()
            .returning(|_| Box::pin(async { Ok(vec!["myriag_echo_7".to_string()]) }));

        let pool = ContainerPool::new(Arc::new(mock), Arc::new(settings_with_echo()));
        let chosen = pool.select_or_create("echo").await.unwrap();
        assert_eq!(chosen, "myriag_echo_7");
    }

    #[tokio::test]
    async fn reap_only_reports_successfully_killed_containers() {
        let mut mock = MockEngineClient::new();
        mock.expect_list_containers().returning(|_| {
            Box::pin(async {
                Ok(vec![
                    "myriag_echo_1".to_string(),
                    "myriag_echo_2".to_string(),
                ])
            })
        });
        mock.expect_kill_container().returning(|name| {
            let name = name.to_string();
            Box::pin(async move {
                if name == "myriag_echo_2" {
                    Err(Error::new("engine.kill_container", Kind::Internal, "boom"))
                } else {
                    Ok(())
                }
            })
        });

        let pool = ContainerPool::new(Arc::new(mock), Arc::new(settings_with_echo()));
        let cleaned = pool.reap().await;
        assert_eq!(cleaned, vec!["myriag_echo_1".to_string()]);
    }
}
