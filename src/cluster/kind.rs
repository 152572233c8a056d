/// kind (Kubernetes in Docker) admin
use async_trait::async_trait;
use serde_yaml::{Mapping, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::admin::{
    connect_network, ensure_docker_cpus, ensure_tool, observed, require_listed, Admin,
    AdminInContainer, ConfigWriter,
};
use crate::api::{Cluster, Product};
use crate::error::{Error, Result};
use crate::exec::{CmdRunner, CommandBuilder};

const KIND: &str = "kind";
const INSTALL_URL: &str = "https://kind.sigs.k8s.io/docs/user/quick-start/#installation";
const KIND_CONFIG_API_VERSION: &str = "kind.x-k8s.io/v1alpha4";
const NODE_IMAGE: &str = "kindest/node";

/// Uses the kind CLI to manage kind clusters
pub struct KindAdmin {
    runner: Arc<dyn CmdRunner>,
}

impl KindAdmin {
    pub fn new(runner: Arc<dyn CmdRunner>) -> Self {
        Self { runner }
    }

    /// kind cluster name behind a `kind-` context name
    fn kind_name(name: &str) -> &str {
        name.strip_prefix("kind-").unwrap_or(name)
    }

    async fn cluster_names(&self, ctx: &CancellationToken) -> Result<Vec<String>> {
        let stdout = self
            .runner
            .run(ctx, CommandBuilder::new(KIND).args(["get", "clusters"]))
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    /// Kind config handed to `kind create cluster --config -`
    fn config_yaml(desired: &Cluster) -> Result<String> {
        let mut config = match &desired.kind_config {
            Some(Value::Mapping(mapping)) => mapping.clone(),
            Some(Value::Null) | None => Mapping::new(),
            Some(_) => {
                return Err(Error::validation(
                    "kindV1Alpha4Cluster must be a kind Cluster config mapping",
                ))
            }
        };

        if !config.contains_key("kind") {
            config.insert(Value::from("kind"), Value::from("Cluster"));
        }
        if !config.contains_key("apiVersion") {
            config.insert(Value::from("apiVersion"), Value::from(KIND_CONFIG_API_VERSION));
        }

        Ok(serde_yaml::to_string(&config)?)
    }
}

#[async_trait]
impl Admin for KindAdmin {
    fn product(&self) -> Product {
        Product::Kind
    }

    async fn ensure_installed(&self, _ctx: &CancellationToken) -> Result<()> {
        ensure_tool(self.runner.as_ref(), KIND, INSTALL_URL)
    }

    async fn create(&self, ctx: &CancellationToken, desired: &Cluster) -> Result<()> {
        debug!("Creating cluster with config:\n{:#?}\n---", desired);

        let kind_name = Self::kind_name(&desired.name);
        let existing = self
            .cluster_names(ctx)
            .await
            .map_err(|e| Error::backend("creating kind cluster", e))?;
        if existing.iter().any(|n| n == kind_name) {
            info!("kind cluster {} already exists", kind_name);
            return Ok(());
        }

        if desired.min_cpus > 0 {
            ensure_docker_cpus(self.runner.as_ref(), ctx, desired.min_cpus).await?;
        }

        let mut cmd = CommandBuilder::new(KIND).args(["create", "cluster", "--name", kind_name]);
        if !desired.kubernetes_version.is_empty() {
            cmd = cmd
                .arg("--image")
                .arg(format!("{}:{}", NODE_IMAGE, desired.kubernetes_version));
        }
        cmd = cmd.args(["--config", "-"]).stdin(Self::config_yaml(desired)?);

        self.runner
            .run_io(ctx, cmd)
            .await
            .map_err(|e| Error::backend("creating kind cluster", e))
    }

    async fn delete(&self, ctx: &CancellationToken, config: &Cluster) -> Result<()> {
        let clusters = self
            .list(ctx)
            .await
            .map_err(|e| Error::backend("deleting kind cluster", e))?;
        require_listed(&clusters, &format!("kind-{}", Self::kind_name(&config.name)))
            .map_err(|e| Error::backend("deleting kind cluster", e))?;

        self.runner
            .run_io(
                ctx,
                CommandBuilder::new(KIND).args([
                    "delete",
                    "cluster",
                    "--name",
                    Self::kind_name(&config.name),
                ]),
            )
            .await
            .map_err(|e| Error::backend("deleting kind cluster", e))
    }

    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<Cluster>> {
        Ok(self
            .cluster_names(ctx)
            .await?
            .into_iter()
            .map(|name| observed(format!("kind-{}", name), Product::Kind))
            .collect())
    }

    fn in_container(&self) -> Option<&dyn AdminInContainer> {
        Some(self)
    }
}

#[async_trait]
impl AdminInContainer for KindAdmin {
    async fn modify_config_in_container(
        &self,
        ctx: &CancellationToken,
        cluster: &Cluster,
        container_id: &str,
        writer: &dyn ConfigWriter,
    ) -> Result<()> {
        connect_network(self.runner.as_ref(), ctx, "kind", container_id).await?;

        let kubeconfig = self
            .runner
            .run(
                ctx,
                CommandBuilder::new(KIND).args([
                    "get",
                    "kubeconfig",
                    "--internal",
                    "--name",
                    Self::kind_name(&cluster.name),
                ]),
            )
            .await
            .map_err(|e| Error::backend("reading kind kubeconfig", e))?;

        writer.write_config(ctx, container_id, &kubeconfig).await
    }
}
