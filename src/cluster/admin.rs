/// Backend admin contract shared by every cluster product
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{Cluster, Product, TypeMeta};
use crate::error::{Error, Result};
use crate::exec::{CmdRunner, CommandBuilder, CommandOutput};

/// Start/stop functionality of one cluster product, independent of the
/// machine it runs on.
#[async_trait]
pub trait Admin: Send + Sync {
    fn product(&self) -> Product;

    /// Fails with `Error::NotInstalled` when the product CLI is not on PATH
    async fn ensure_installed(&self, ctx: &CancellationToken) -> Result<()>;

    /// Create a new cluster.
    ///
    /// Makes a best effort attempt to clear anything that would block
    /// creation, and leaves an existing cluster of the same name alone.
    async fn create(&self, ctx: &CancellationToken, desired: &Cluster) -> Result<()>;

    /// Delete a cluster. Fails with a not-found error if the product has no such cluster.
    async fn delete(&self, ctx: &CancellationToken, config: &Cluster) -> Result<()>;

    /// Clusters the product currently knows about, named by kubeconfig context
    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<Cluster>>;

    /// Optional capability to fix up a kubeconfig for use inside another container
    fn in_container(&self) -> Option<&dyn AdminInContainer> {
        None
    }
}

/// Admins whose kubeconfig can be made valid from inside a container
#[async_trait]
pub trait AdminInContainer: Send + Sync {
    async fn modify_config_in_container(
        &self,
        ctx: &CancellationToken,
        cluster: &Cluster,
        container_id: &str,
        writer: &dyn ConfigWriter,
    ) -> Result<()>;
}

/// Writes a kubeconfig into a container
#[async_trait]
pub trait ConfigWriter: Send + Sync {
    async fn write_config(
        &self,
        ctx: &CancellationToken,
        container_id: &str,
        kubeconfig: &str,
    ) -> Result<()>;
}

/// Writes the kubeconfig to `$HOME/.kube/config` through `docker exec`
pub struct DockerConfigWriter<'a> {
    runner: &'a dyn CmdRunner,
}

impl<'a> DockerConfigWriter<'a> {
    pub fn new(runner: &'a dyn CmdRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ConfigWriter for DockerConfigWriter<'_> {
    async fn write_config(
        &self,
        ctx: &CancellationToken,
        container_id: &str,
        kubeconfig: &str,
    ) -> Result<()> {
        info!("Writing kubeconfig into container {}", container_id);
        self.runner
            .run(
                ctx,
                CommandBuilder::new("docker")
                    .args(["exec", "-i", container_id, "sh", "-c"])
                    .arg(r#"mkdir -p "$HOME/.kube" && cat > "$HOME/.kube/config""#)
                    .stdin(kubeconfig),
            )
            .await
            .map_err(|e| Error::backend("writing kubeconfig into container", e))?;
        Ok(())
    }
}

/// Check that a product CLI is resolvable on PATH
pub(crate) fn ensure_tool(
    runner: &dyn CmdRunner,
    tool: &'static str,
    install_url: &'static str,
) -> Result<()> {
    match runner.look_path(tool) {
        Some(path) => {
            debug!("{} found at {}", tool, path.display());
            Ok(())
        }
        None => Err(Error::NotInstalled { tool, install_url }),
    }
}

/// Observed cluster skeleton as reported by a product
pub(crate) fn observed(name: impl Into<String>, product: Product) -> Cluster {
    let type_meta = TypeMeta::cluster();
    Cluster {
        kind: type_meta.kind,
        api_version: type_meta.api_version,
        name: name.into(),
        product: Some(product),
        ..Default::default()
    }
}

/// Fail with not-found unless the listed clusters contain `name`
pub(crate) fn require_listed(clusters: &[Cluster], name: &str) -> Result<()> {
    if clusters.iter().any(|c| c.name == name) {
        Ok(())
    } else {
        Err(Error::cluster_not_found(name))
    }
}

/// Interpret the output of a delete command, classifying "no such cluster"
pub(crate) fn classify_delete(output: CommandOutput, program: &str, name: &str) -> Result<String> {
    if !output.success && reports_not_found(&output.stderr) {
        return Err(Error::cluster_not_found(name));
    }
    output.into_result(program)
}

fn reports_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("not found") || stderr.contains("does not exist") || stderr.contains("no such")
}

/// Make sure the Docker VM offers at least `min_cpus` CPUs
pub(crate) async fn ensure_docker_cpus(
    runner: &dyn CmdRunner,
    ctx: &CancellationToken,
    min_cpus: u32,
) -> Result<()> {
    let stdout = runner
        .run(
            ctx,
            CommandBuilder::new("docker").args(["info", "--format", "{{.NCPU}}"]),
        )
        .await
        .map_err(|e| Error::backend("reading docker CPU count", e))?;

    let cpus: u32 = stdout.trim().parse().map_err(|_| {
        Error::validation(format!("unexpected docker CPU count {:?}", stdout.trim()))
    })?;

    if cpus < min_cpus {
        return Err(Error::validation(format!(
            "cluster requires {} CPUs but Docker only has {}. Increase the CPUs of your Docker VM",
            min_cpus, cpus
        )));
    }
    Ok(())
}

/// Attach a container to a docker network, tolerating an existing attachment
pub(crate) async fn connect_network(
    runner: &dyn CmdRunner,
    ctx: &CancellationToken,
    network: &str,
    container_id: &str,
) -> Result<()> {
    let output = runner
        .output(
            ctx,
            CommandBuilder::new("docker").args(["network", "connect", network, container_id]),
        )
        .await?;
    if output.stderr.contains("already exists") {
        return Ok(());
    }
    output
        .into_result("docker")
        .map(|_| ())
        .map_err(|e| Error::backend(format!("connecting container to network {}", network), e))
}
