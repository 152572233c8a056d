/// minikube admin
use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::admin::{classify_delete, ensure_tool, observed, require_listed, Admin};
use crate::api::{Cluster, Product};
use crate::error::{Error, Result};
use crate::exec::{CmdRunner, CommandBuilder};

const MINIKUBE: &str = "minikube";
const INSTALL_URL: &str = "https://minikube.sigs.k8s.io/";
const DEFAULT_EXTRA_CONFIG: &str = "kubelet.max-pods=500";
const MIN_VERSION: Version = Version::new(1, 20, 0);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MinikubeVersionResponse {
    #[serde(default)]
    minikube_version: String,
}

#[derive(Debug, Deserialize)]
struct ProfileList {
    #[serde(default)]
    valid: Vec<Profile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Profile {
    name: String,
    #[serde(default)]
    config: Option<ProfileConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProfileConfig {
    #[serde(default, rename = "CPUs")]
    cpus: u32,
}

/// Uses the minikube CLI to manipulate a minikube cluster
pub struct MinikubeAdmin {
    runner: Arc<dyn CmdRunner>,
}

impl MinikubeAdmin {
    pub fn new(runner: Arc<dyn CmdRunner>) -> Self {
        Self { runner }
    }

    /// Version of the installed minikube, from `minikube version -o json`
    pub async fn version(&self, ctx: &CancellationToken) -> Result<Version> {
        let stdout = self
            .runner
            .run(
                ctx,
                CommandBuilder::new(MINIKUBE).args(["version", "-o", "json"]),
            )
            .await
            .map_err(|e| Error::backend("minikube version", e))?;

        let response: MinikubeVersionResponse = serde_json::from_str(&stdout)
            .map_err(|e| Error::backend("minikube version", e.into()))?;
        if response.minikube_version.is_empty() {
            return Err(Error::backend(
                "minikube version",
                Error::validation("minikube version not found"),
            ));
        }

        parse_tolerant(&response.minikube_version).map_err(|e| {
            Error::backend(
                "minikube version",
                Error::validation(format!("{:?}: {}", response.minikube_version, e)),
            )
        })
    }
}

/// Parse a version, accepting a leading `v` and missing minor/patch parts
pub fn parse_tolerant(raw: &str) -> std::result::Result<Version, semver::Error> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    let split = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, rest) = trimmed.split_at(split);

    let mut parts: Vec<&str> = core.split('.').collect();
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&format!("{}{}", parts.join("."), rest))
}

#[async_trait]
impl Admin for MinikubeAdmin {
    fn product(&self) -> Product {
        Product::Minikube
    }

    async fn ensure_installed(&self, _ctx: &CancellationToken) -> Result<()> {
        ensure_tool(self.runner.as_ref(), MINIKUBE, INSTALL_URL)
    }

    async fn create(&self, ctx: &CancellationToken, desired: &Cluster) -> Result<()> {
        debug!("Creating cluster with config:\n{:#?}\n---", desired);

        let version = self.version(ctx).await?;
        if version < MIN_VERSION {
            return Err(Error::validation(format!(
                "minikube {} is too old. yap requires minikube {} or newer",
                version, MIN_VERSION
            )));
        }
        info!("Using minikube {}", version);

        let config = desired.minikube.clone().unwrap_or_default();
        let container_runtime = if config.container_runtime.is_empty() {
            "containerd".to_string()
        } else {
            config.container_runtime
        };
        let extra_configs = if config.extra_configs.is_empty() {
            vec![DEFAULT_EXTRA_CONFIG.to_string()]
        } else {
            config.extra_configs
        };

        let mut cmd = CommandBuilder::new(MINIKUBE)
            .arg("start")
            .args(config.start_flags)
            .args(["-p", desired.name.as_str(), "--driver=docker"])
            .arg(format!("--container-runtime={}", container_runtime))
            .args(extra_configs.iter().map(|c| format!("--extra-config={}", c)));

        if desired.min_cpus != 0 {
            cmd = cmd.arg(format!("--cpus={}", desired.min_cpus));
        }
        if !desired.kubernetes_version.is_empty() {
            cmd = cmd.args(["--kubernetes-version", desired.kubernetes_version.as_str()]);
        }

        self.runner
            .run_io(ctx, cmd.stdin(""))
            .await
            .map_err(|e| Error::backend("creating minikube cluster", e))
    }

    async fn delete(&self, ctx: &CancellationToken, config: &Cluster) -> Result<()> {
        let clusters = self
            .list(ctx)
            .await
            .map_err(|e| Error::backend("deleting minikube cluster", e))?;
        require_listed(&clusters, &config.name)
            .map_err(|e| Error::backend("deleting minikube cluster", e))?;

        let output = self
            .runner
            .output(
                ctx,
                CommandBuilder::new(MINIKUBE).args(["delete", "-p", config.name.as_str()]),
            )
            .await?;
        classify_delete(output, MINIKUBE, &config.name)
            .map(|_| ())
            .map_err(|e| Error::backend("deleting minikube cluster", e))
    }

    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<Cluster>> {
        let output = self
            .runner
            .output(
                ctx,
                CommandBuilder::new(MINIKUBE).args(["profile", "list", "-o", "json"]),
            )
            .await?;

        if !output.success
            && format!("{}{}", output.stdout, output.stderr).contains("No minikube profile")
        {
            return Ok(Vec::new());
        }
        let stdout = output.into_result(MINIKUBE)?;
        let profiles: ProfileList = serde_json::from_str(&stdout)?;

        Ok(profiles
            .valid
            .into_iter()
            .map(|profile| {
                let mut cluster = observed(profile.name, Product::Minikube);
                cluster.status.cpus = profile.config.map(|c| c.cpus).unwrap_or_default();
                cluster
            })
            .collect())
    }
}
