/// k3d (k3s in Docker) admin
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::admin::{
    classify_delete, connect_network, ensure_docker_cpus, ensure_tool, observed, require_listed,
    Admin, AdminInContainer, ConfigWriter,
};
use crate::api::{Cluster, Product};
use crate::error::{Error, Result};
use crate::exec::{CmdRunner, CommandBuilder};

const K3D: &str = "k3d";
const INSTALL_URL: &str = "https://k3d.io/#installation";
const K3S_IMAGE: &str = "rancher/k3s";
const DEFAULT_CLUSTER: &str = "k3s-default";
const SERVER_LB_PORT: u16 = 6443;

#[derive(Debug, Deserialize)]
struct K3dClusterInfo {
    name: String,
    #[serde(default)]
    nodes: Vec<K3dNode>,
}

#[derive(Debug, Deserialize)]
struct K3dNode {
    #[serde(default)]
    created: String,
}

/// Uses the k3d CLI to manage k3d clusters
pub struct K3dAdmin {
    runner: Arc<dyn CmdRunner>,
}

impl K3dAdmin {
    pub fn new(runner: Arc<dyn CmdRunner>) -> Self {
        Self { runner }
    }

    /// k3d cluster name behind a `k3d-` context name. The bare product
    /// name is k3d's own default cluster.
    fn k3d_name(name: &str) -> &str {
        match name {
            "k3d" => DEFAULT_CLUSTER,
            other => other.strip_prefix("k3d-").unwrap_or(other),
        }
    }

    async fn clusters(&self, ctx: &CancellationToken) -> Result<Vec<K3dClusterInfo>> {
        let stdout = self
            .runner
            .run(
                ctx,
                CommandBuilder::new(K3D).args(["cluster", "list", "-o", "json"]),
            )
            .await?;
        if stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&stdout)?)
    }

    /// Write the simple config block to a temp file that lives as long as the handle
    fn write_config_file(simple: &serde_yaml::Value) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix("yap-k3d-")
            .suffix(".yaml")
            .tempfile()?;
        serde_yaml::to_writer(&mut file, simple)?;
        Ok(file)
    }
}

/// Point every cluster server in a kubeconfig at `host:6443`
fn rewrite_servers(kubeconfig: &str, host: &str) -> Result<String> {
    let mut doc: serde_yaml::Value = serde_yaml::from_str(kubeconfig)?;

    if let Some(clusters) = doc.get_mut("clusters").and_then(|c| c.as_sequence_mut()) {
        for entry in clusters {
            let Some(server) = entry.get_mut("cluster").and_then(|c| c.get_mut("server")) else {
                continue;
            };
            let Some(raw) = server.as_str().map(str::to_string) else {
                continue;
            };

            let mut url = Url::parse(&raw).map_err(|e| {
                Error::validation(format!("invalid kubeconfig server {:?}: {}", raw, e))
            })?;
            url.set_host(Some(host)).map_err(|e| {
                Error::validation(format!("invalid kubeconfig host {:?}: {}", host, e))
            })?;
            url.set_port(Some(SERVER_LB_PORT))
                .map_err(|_| Error::validation(format!("cannot set port on {:?}", raw)))?;

            *server = serde_yaml::Value::from(url.as_str().trim_end_matches('/'));
        }
    }

    Ok(serde_yaml::to_string(&doc)?)
}

#[async_trait]
impl Admin for K3dAdmin {
    fn product(&self) -> Product {
        Product::K3d
    }

    async fn ensure_installed(&self, _ctx: &CancellationToken) -> Result<()> {
        ensure_tool(self.runner.as_ref(), K3D, INSTALL_URL)
    }

    async fn create(&self, ctx: &CancellationToken, desired: &Cluster) -> Result<()> {
        debug!("Creating cluster with config:\n{:#?}\n---", desired);

        let k3d_name = Self::k3d_name(&desired.name);
        let existing = self
            .clusters(ctx)
            .await
            .map_err(|e| Error::backend("creating k3d cluster", e))?;
        if existing.iter().any(|c| c.name == k3d_name) {
            info!("k3d cluster {} already exists", k3d_name);
            return Ok(());
        }

        if desired.min_cpus > 0 {
            ensure_docker_cpus(self.runner.as_ref(), ctx, desired.min_cpus).await?;
        }

        let config = desired.k3d.clone().unwrap_or_default();
        let config_file = config
            .v1alpha4_simple
            .as_ref()
            .map(Self::write_config_file)
            .transpose()?;

        let mut cmd = CommandBuilder::new(K3D)
            .args(["cluster", "create"])
            .args(config.start_flags);
        if let Some(file) = &config_file {
            cmd = cmd.arg(format!("--config={}", file.path().display()));
        }
        cmd = cmd.arg(k3d_name);
        if !desired.kubernetes_version.is_empty() {
            cmd = cmd.arg(format!(
                "--image={}:{}-k3s1",
                K3S_IMAGE, desired.kubernetes_version
            ));
        }

        let result = self
            .runner
            .run_io(ctx, cmd)
            .await
            .map_err(|e| Error::backend("creating k3d cluster", e));
        drop(config_file);
        result
    }

    async fn delete(&self, ctx: &CancellationToken, config: &Cluster) -> Result<()> {
        let k3d_name = Self::k3d_name(&config.name);
        let clusters = self
            .list(ctx)
            .await
            .map_err(|e| Error::backend("deleting k3d cluster", e))?;
        require_listed(&clusters, &format!("k3d-{}", k3d_name))
            .map_err(|e| Error::backend("deleting k3d cluster", e))?;

        let output = self
            .runner
            .output(
                ctx,
                CommandBuilder::new(K3D).args(["cluster", "delete", k3d_name]),
            )
            .await?;
        classify_delete(output, K3D, &config.name)
            .map(|_| ())
            .map_err(|e| Error::backend("deleting k3d cluster", e))
    }

    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<Cluster>> {
        Ok(self
            .clusters(ctx)
            .await?
            .into_iter()
            .map(|info| {
                let mut cluster = observed(format!("k3d-{}", info.name), Product::K3d);
                cluster.status.creation_timestamp = info
                    .nodes
                    .iter()
                    .filter_map(|node| DateTime::parse_from_rfc3339(&node.created).ok())
                    .map(|created| created.with_timezone(&Utc))
                    .min();
                cluster
            })
            .collect())
    }

    fn in_container(&self) -> Option<&dyn AdminInContainer> {
        Some(self)
    }
}

#[async_trait]
impl AdminInContainer for K3dAdmin {
    async fn modify_config_in_container(
        &self,
        ctx: &CancellationToken,
        cluster: &Cluster,
        container_id: &str,
        writer: &dyn ConfigWriter,
    ) -> Result<()> {
        let k3d_name = Self::k3d_name(&cluster.name);
        connect_network(
            self.runner.as_ref(),
            ctx,
            &format!("k3d-{}", k3d_name),
            container_id,
        )
        .await?;

        let kubeconfig = self
            .runner
            .run(
                ctx,
                CommandBuilder::new(K3D).args(["kubeconfig", "get", k3d_name]),
            )
            .await
            .map_err(|e| Error::backend("reading k3d kubeconfig", e))?;

        let rewritten = rewrite_servers(&kubeconfig, &format!("k3d-{}-serverlb", k3d_name))?;
        writer.write_config(ctx, container_id, &rewritten).await
    }
}
