//! Bollard-backed implementation of [`EngineClient`].

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{KillContainerOptions, ListContainersOptions};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::BuildImageOptions;
use bollard::models::{HostConfig, RestartPolicy, RestartPolicyNameEnum};
use bollard::container::{Config, CreateContainerOptions};
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::StreamExt;
use tracing::debug;

use super::{EngineClient, ExecOptions, ExecOutput};
use crate::config::LanguageConfig;
use crate::error::{Error, Kind, Result};

pub struct BollardEngine {
    client: Docker,
}

impl BollardEngine {
    /// Connect using the engine's standard environment-variable discovery
    /// (host, TLS certs) — see §6.
    pub fn connect() -> Result<Self> {
        let client = Docker::connect_with_local_defaults()
            .map_err(|e| Error::wrap("engine.connect", Kind::Io, e))?;
        Ok(BollardEngine { client })
    }
}

#[async_trait]
impl EngineClient for BollardEngine {
    async fn build_image(&self, context_tar: Vec<u8>, tag: &str) -> Result<()> {
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            pull: true,
            ..Default::default()
        };

        let mut stream = self
            .client
            .build_image(options, None, Some(Bytes::from(context_tar).into()));

        while let Some(next) = stream.next().await {
            match next {
                Ok(info) => {
                    if let Some(stream_msg) = info.stream {
                        debug!(tag, "{}", stream_msg.trim_end());
                    }
                    if let Some(err) = info.error {
                        return Err(Error::new("engine.build_image", Kind::Io, err));
                    }
                }
                Err(e) => return Err(Error::wrap("engine.build_image", Kind::Io, e)),
            }
        }

        // Many engines only materialize the image after the build stream
        // ends; confirm it actually exists before declaring success.
        self.client
            .inspect_image(tag)
            .await
            .map_err(|e| Error::wrap("engine.build_image.verify", Kind::Io, e))?;

        Ok(())
    }

    async fn create_and_start_container(
        &self,
        name: &str,
        image: &str,
        limits: LanguageConfig,
    ) -> Result<()> {
        let host_config = HostConfig {
            auto_remove: Some(true),
            memory: Some(limits.memory_bytes as i64),
            memory_swap: Some(limits.memory_bytes as i64),
            nano_cpus: Some(limits.nano_cpus()),
            network_mode: Some("none".to_string()),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::NO),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = Config {
            image: Some(image.to_string()),
            user: Some("1000:1000".to_string()),
            working_dir: Some("/tmp/".to_string()),
            tty: Some(true),
            network_disabled: Some(true),
            entrypoint: Some(vec!["/bin/sh".to_string()]),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        self.client
            .create_container(Some(options), config)
            .await
            .map_err(|e| Error::wrap("engine.create_container", Kind::Internal, e))?;

        self.client
            .start_container::<String>(name, None)
            .await
            .map_err(|e| Error::wrap("engine.start_container", Kind::Internal, e))?;

        Ok(())
    }

    async fn exec(&self, container: &str, cmd: Vec<String>, opts: ExecOptions) -> Result<ExecOutput> {
        let exec_config = CreateExecOptions {
            user: opts.user.clone(),
            working_dir: opts.workdir.clone(),
            attach_stdout: Some(opts.attach_output),
            attach_stderr: Some(opts.attach_output),
            // No TTY on the exec itself: this is what gives us the engine's
            // demultiplexed stdout/stderr framing rather than one blended
            // console stream (the container itself is created with a TTY
            // purely to keep its idle `/bin/sh` entrypoint alive).
            tty: Some(false),
            cmd: Some(cmd),
            ..Default::default()
        };

        let created = self
            .client
            .create_exec(container, exec_config)
            .await
            .map_err(|e| Error::wrap("engine.exec.create", Kind::Internal, e))?;

        let mut output = ExecOutput::default();

        if opts.attach_output {
            match self
                .client
                .start_exec(&created.id, None)
                .await
                .map_err(|e| Error::wrap("engine.exec.start", Kind::Internal, e))?
            {
                StartExecResults::Attached { mut output: stream, .. } => {
                    while let Some(next) = stream.next().await {
                        match next.map_err(|e| Error::wrap("engine.exec.demux", Kind::Internal, e))? {
                            bollard::container::LogOutput::StdOut { message } => {
                                output.stdout.extend_from_slice(&message)
                            }
                            bollard::container::LogOutput::StdErr { message } => {
                                output.stderr.extend_from_slice(&message)
                            }
                            bollard::container::LogOutput::Console { message } => {
                                output.stdout.extend_from_slice(&message)
                            }
                            bollard::container::LogOutput::StdIn { .. } => {}
                        }
                    }
                }
                StartExecResults::Detached => {}
            }
        } else {
            self.client
                .start_exec(&created.id, None)
                .await
                .map_err(|e| Error::wrap("engine.exec.start", Kind::Internal, e))?;
        }

        self.client
            .inspect_exec(&created.id)
            .await
            .map_err(|e| Error::wrap("engine.exec.inspect", Kind::Internal, e))?;

        Ok(output)
    }

    async fn list_containers(&self, prefix: &str) -> Result<Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);

        let options = ListContainersOptions {
            all: false,
            filters,
            ..Default::default()
        };

        let containers = self
            .client
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::wrap("engine.list_containers", Kind::Internal, e))?;

        let names = containers
            .into_iter()
            .filter_map(|c| c.names)
            .flatten()
            .map(|n| n.trim_start_matches('/').to_string())
            .filter(|n| n.starts_with(prefix))
            .collect();

        Ok(names)
    }

    async fn kill_container(&self, name: &str) -> Result<()> {
        match self
            .client
            .kill_container(name, None::<KillContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // Already gone or already stopped: treat as success, matching
            // the source's best-effort reap semantics.
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError { status_code: 409, .. }) => Ok(()),
            Err(e) => Err(Error::wrap("engine.kill_container", Kind::Internal, e)),
        }
    }
}
