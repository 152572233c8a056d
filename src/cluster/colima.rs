/// colima admin
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::admin::{classify_delete, ensure_tool, observed, require_listed, Admin};
use crate::api::{Cluster, Product};
use crate::error::{Error, Result};
use crate::exec::{CmdRunner, CommandBuilder};

const COLIMA: &str = "colima";
const INSTALL_URL: &str = "https://github.com/abiosoft/colima#installation";
const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Deserialize)]
struct ColimaInstance {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    cpus: u32,
}

/// Uses the colima CLI to manage colima Kubernetes clusters
pub struct ColimaAdmin {
    runner: Arc<dyn CmdRunner>,
}

impl ColimaAdmin {
    pub fn new(runner: Arc<dyn CmdRunner>) -> Self {
        Self { runner }
    }

    /// colima profile behind a cluster name
    fn profile(name: &str) -> &str {
        if name == COLIMA {
            DEFAULT_PROFILE
        } else {
            name.strip_prefix("colima-").unwrap_or(name)
        }
    }

    /// Context name colima uses for a profile
    fn context_name(profile: &str) -> String {
        if profile == DEFAULT_PROFILE {
            COLIMA.to_string()
        } else {
            format!("colima-{}", profile)
        }
    }
}

#[async_trait]
impl Admin for ColimaAdmin {
    fn product(&self) -> Product {
        Product::Colima
    }

    async fn ensure_installed(&self, _ctx: &CancellationToken) -> Result<()> {
        ensure_tool(self.runner.as_ref(), COLIMA, INSTALL_URL)
    }

    async fn create(&self, ctx: &CancellationToken, desired: &Cluster) -> Result<()> {
        debug!("Creating cluster with config:\n{:#?}\n---", desired);

        let config = desired.colima.clone().unwrap_or_default();
        let container_runtime = if config.container_runtime.is_empty() {
            "containerd".to_string()
        } else {
            config.container_runtime
        };

        // servicelb and traefik are replaced by metallb
        let mut cmd = CommandBuilder::new(COLIMA)
            .arg("start")
            .args(config.start_flags)
            .arg(format!("--profile={}", Self::profile(&desired.name)))
            .arg("--kubernetes")
            .arg(format!("--runtime={}", container_runtime))
            .arg("--kubernetes-disable=servicelb,traefik")
            .arg("--install-metallb");
        if !config.metallb_cidr.is_empty() {
            cmd = cmd.arg(format!("--metallb-address-pool={}", config.metallb_cidr));
        }

        if desired.min_cpus != 0 {
            cmd = cmd.arg(format!("--cpu={}", desired.min_cpus));
        }
        if !desired.kubernetes_version.is_empty() {
            cmd = cmd.args(["--kubernetes-version", desired.kubernetes_version.as_str()]);
        }

        self.runner
            .run_io(ctx, cmd.stdin(""))
            .await
            .map_err(|e| Error::backend("creating colima kubernetes cluster", e))
    }

    async fn delete(&self, ctx: &CancellationToken, config: &Cluster) -> Result<()> {
        let profile = Self::profile(&config.name);
        let clusters = self
            .list(ctx)
            .await
            .map_err(|e| Error::backend("deleting colima cluster", e))?;
        require_listed(&clusters, &Self::context_name(profile))
            .map_err(|e| Error::backend("deleting colima cluster", e))?;

        let output = self
            .runner
            .output(
                ctx,
                CommandBuilder::new(COLIMA).args(["delete", "-p", profile, "--force"]),
            )
            .await?;
        classify_delete(output, COLIMA, &config.name)
            .map(|_| ())
            .map_err(|e| Error::backend("deleting colima cluster", e))
    }

    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<Cluster>> {
        let stdout = self
            .runner
            .run(ctx, CommandBuilder::new(COLIMA).args(["list", "--json"]))
            .await?;

        stdout
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with('{'))
            .map(|line| -> Result<Cluster> {
                let instance: ColimaInstance = serde_json::from_str(line)?;
                let mut cluster = observed(Self::context_name(&instance.name), Product::Colima);
                cluster.status.cpus = instance.cpus;
                if !instance.status.is_empty() && instance.status != "Running" {
                    cluster.status.error = format!("colima profile is {}", instance.status);
                }
                Ok(cluster)
            })
            .collect()
    }
}
