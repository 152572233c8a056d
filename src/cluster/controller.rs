/// Lifecycle controller: the entry point the commands drive
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::admin::{Admin, ConfigWriter};
use super::colima::ColimaAdmin;
use super::defaults::infer_product;
use super::k3d::K3dAdmin;
use super::kind::KindAdmin;
use super::minikube::MinikubeAdmin;
use super::normalize::normalized_get;
use crate::api::{Cluster, ClusterStatus, Product};
use crate::error::{Error, Result};
use crate::exec::{CmdRunner, CommandBuilder};

const KUBECTL: &str = "kubectl";

/// Operations the command workflows need from a controller
#[async_trait]
pub trait ClusterController: Send + Sync {
    /// Create the cluster if needed and return its observed state
    async fn apply(&self, ctx: &CancellationToken, desired: &Cluster) -> Result<Cluster>;

    /// Observed state of one cluster. `product` picks the backend; when it
    /// is `None` the product is inferred from the name. Fails with
    /// not-found if no backend has it.
    async fn get(
        &self,
        ctx: &CancellationToken,
        name: &str,
        product: Option<Product>,
    ) -> Result<Cluster>;

    /// Every cluster of every installed backend, sorted by name
    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<Cluster>>;

    async fn delete(
        &self,
        ctx: &CancellationToken,
        name: &str,
        product: Option<Product>,
    ) -> Result<()>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KubectlVersion {
    server_version: Option<ServerVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerVersion {
    git_version: String,
}

/// Routes each cluster to the admin of its product
pub struct Controller {
    runner: Arc<dyn CmdRunner>,
    admins: BTreeMap<Product, Arc<dyn Admin>>,
}

impl Controller {
    /// Controller with an admin for every supported product
    pub fn new(runner: Arc<dyn CmdRunner>) -> Self {
        let admins: Vec<Arc<dyn Admin>> = vec![
            Arc::new(KindAdmin::new(runner.clone())),
            Arc::new(MinikubeAdmin::new(runner.clone())),
            Arc::new(K3dAdmin::new(runner.clone())),
            Arc::new(ColimaAdmin::new(runner.clone())),
        ];
        Self::with_admins(runner, admins)
    }

    pub fn with_admins(
        runner: Arc<dyn CmdRunner>,
        admins: impl IntoIterator<Item = Arc<dyn Admin>>,
    ) -> Self {
        let admins = admins
            .into_iter()
            .map(|admin| (admin.product(), admin))
            .collect();
        Self { runner, admins }
    }

    pub fn runner(&self) -> &dyn CmdRunner {
        self.runner.as_ref()
    }

    fn admin(&self, product: Product) -> Result<&Arc<dyn Admin>> {
        self.admins
            .get(&product)
            .ok_or_else(|| Error::validation(format!("no admin registered for product {}", product)))
    }

    /// Admins whose CLI is on PATH. Missing ones are skipped.
    async fn installed_admins(&self, ctx: &CancellationToken) -> Vec<&Arc<dyn Admin>> {
        let mut installed = Vec::new();
        for admin in self.admins.values() {
            match admin.ensure_installed(ctx).await {
                Ok(()) => installed.push(admin),
                Err(e) => debug!("Skipping {}: {}", admin.product(), e),
            }
        }
        installed
    }

    /// Admins that could own `name`: the declared or inferred product's,
    /// or every installed one
    async fn candidate_admins(
        &self,
        ctx: &CancellationToken,
        name: &str,
        product: Option<Product>,
    ) -> Result<Vec<&Arc<dyn Admin>>> {
        match product.or_else(|| infer_product(name)) {
            Some(product) => {
                let admin = self.admin(product)?;
                admin.ensure_installed(ctx).await?;
                Ok(vec![admin])
            }
            None => Ok(self.installed_admins(ctx).await),
        }
    }

    async fn current_context(&self, ctx: &CancellationToken) -> Option<String> {
        self.runner.look_path(KUBECTL)?;
        match self
            .runner
            .run(
                ctx,
                CommandBuilder::new(KUBECTL).args(["config", "current-context"]),
            )
            .await
        {
            Ok(stdout) => Some(stdout.trim().to_string()).filter(|c| !c.is_empty()),
            Err(e) => {
                debug!("Reading current context: {}", e);
                None
            }
        }
    }

    async fn server_version(&self, ctx: &CancellationToken, context: &str) -> Result<String> {
        let stdout = self
            .runner
            .run(
                ctx,
                CommandBuilder::new(KUBECTL).args([
                    "version",
                    "--context",
                    context,
                    "-o",
                    "json",
                    "--request-timeout=5s",
                ]),
            )
            .await?;
        let version: KubectlVersion = serde_json::from_str(&stdout)?;
        Ok(version
            .server_version
            .map(|v| v.git_version)
            .unwrap_or_default())
    }

    /// Fill the parts of status that come from kubectl
    async fn observe(&self, ctx: &CancellationToken, cluster: &mut Cluster, current: Option<&str>) {
        cluster.status.current = current == Some(cluster.name.as_str());

        if self.runner.look_path(KUBECTL).is_none() || !cluster.status.error.is_empty() {
            return;
        }
        match self.server_version(ctx, &cluster.name).await {
            Ok(version) => cluster.status.kubernetes_version = version,
            Err(e) => debug!("Reading server version of {}: {}", cluster.name, e),
        }
    }

    /// Make a cluster's kubeconfig usable from inside another container
    pub async fn modify_config_in_container(
        &self,
        ctx: &CancellationToken,
        name: &str,
        container_id: &str,
        writer: &dyn ConfigWriter,
    ) -> Result<()> {
        let cluster = normalized_get(ctx, self, name, None).await?;
        let product = cluster
            .product
            .ok_or_else(|| Error::validation(format!("cluster {} has no product", cluster.name)))?;

        let admin = self.admin(product)?;
        let in_container = admin.in_container().ok_or_else(|| {
            Error::validation(format!(
                "{} clusters cannot be configured for use inside a container",
                product
            ))
        })?;

        info!(
            "Configuring container {} for cluster {}",
            container_id, cluster.name
        );
        in_container
            .modify_config_in_container(ctx, &cluster, container_id, writer)
            .await
    }
}

#[async_trait]
impl ClusterController for Controller {
    async fn apply(&self, ctx: &CancellationToken, desired: &Cluster) -> Result<Cluster> {
        let product = desired.product.ok_or_else(|| {
            Error::validation(format!(
                "cluster {:?} has no product. Valid products: kind, minikube, k3d, colima",
                desired.name
            ))
        })?;
        desired.validate()?;

        let admin = self.admin(product)?;
        admin.ensure_installed(ctx).await?;

        let mut desired = desired.clone();
        if !desired.status.is_empty() {
            debug!("Ignoring status of desired cluster {}", desired.name);
            desired.status = ClusterStatus::default();
        }

        info!("Applying {} cluster {}", product, desired.name);
        admin.create(ctx, &desired).await?;

        match normalized_get(ctx, self, &desired.name, Some(product)).await {
            Ok(observed) => Ok(observed),
            Err(e) if e.is_not_found() => {
                warn!("{} did not report cluster {} after create", product, desired.name);
                desired.status.error = e.to_string();
                Ok(desired)
            }
            Err(e) => Err(e),
        }
    }

    async fn get(
        &self,
        ctx: &CancellationToken,
        name: &str,
        product: Option<Product>,
    ) -> Result<Cluster> {
        // A failing backend only matters when no other backend answered
        let mut answered = false;
        let mut failure = None;

        for admin in self.candidate_admins(ctx, name, product).await? {
            let clusters = match admin.list(ctx).await {
                Ok(clusters) => clusters,
                Err(e) => {
                    warn!("Listing {} clusters: {}", admin.product(), e);
                    failure = Some(e);
                    continue;
                }
            };
            answered = true;

            if let Some(mut cluster) = clusters.into_iter().find(|cluster| cluster.name == name) {
                let current = self.current_context(ctx).await;
                self.observe(ctx, &mut cluster, current.as_deref()).await;
                return Ok(cluster);
            }
        }

        match failure {
            Some(e) if !answered => Err(e),
            _ => Err(Error::cluster_not_found(name)),
        }
    }

    async fn list(&self, ctx: &CancellationToken) -> Result<Vec<Cluster>> {
        let current = self.current_context(ctx).await;

        let mut clusters = Vec::new();
        for admin in self.installed_admins(ctx).await {
            match admin.list(ctx).await {
                Ok(found) => clusters.extend(found),
                Err(e) => warn!("Listing {} clusters: {}", admin.product(), e),
            }
        }
        for cluster in clusters.iter_mut() {
            self.observe(ctx, cluster, current.as_deref()).await;
        }

        clusters.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clusters)
    }

    async fn delete(
        &self,
        ctx: &CancellationToken,
        name: &str,
        product: Option<Product>,
    ) -> Result<()> {
        let cluster = self.get(ctx, name, product).await?;
        let product = cluster
            .product
            .ok_or_else(|| Error::validation(format!("cluster {} has no product", name)))?;

        info!("Deleting {} cluster {}", product, name);
        self.admin(product)?.delete(ctx, &cluster).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ColimaCluster;
    use crate::exec::fake::FakeCmdRunner;
    use crate::exec::CommandOutput;
    use std::sync::Mutex;

    const KUBECTL_VERSION: &str =
        r#"{"clientVersion":{"gitVersion":"v1.28.0"},"serverVersion":{"gitVersion":"v1.27.3"}}"#;

    /// kind, kubectl and docker are installed; kind knows `kind_clusters`
    fn kind_only(kind_clusters: &'static str) -> Arc<FakeCmdRunner> {
        Arc::new(
            FakeCmdRunner::new(move |argv| match (argv[0].as_str(), argv[1].as_str()) {
                ("kind", "get") => CommandOutput::ok(kind_clusters),
                ("kubectl", "config") => CommandOutput::ok("kind-kind\n"),
                ("kubectl", "version") => CommandOutput::ok(KUBECTL_VERSION),
                _ => CommandOutput::ok(""),
            })
            .with_missing(["minikube", "k3d", "colima"]),
        )
    }

    fn kind_cluster(name: &str) -> Cluster {
        let mut cluster = Cluster::for_product(Product::Kind);
        cluster.name = name.to_string();
        cluster
    }

    #[tokio::test]
    async fn test_get_observes_status() {
        let controller = Controller::new(kind_only("kind\ndev\n"));
        let ctx = CancellationToken::new();

        let cluster = controller.get(&ctx, "kind-kind", None).await.unwrap();
        assert_eq!(cluster.product, Some(Product::Kind));
        assert!(cluster.status.current);
        assert_eq!(cluster.status.kubernetes_version, "v1.27.3");

        let other = controller.get(&ctx, "kind-dev", None).await.unwrap();
        assert!(!other.status.current);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let controller = Controller::new(kind_only("kind\n"));
        let err = controller
            .get(&CancellationToken::new(), "garbage", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            r#"clusters.yap.pseudonator.io "garbage" not found"#
        );
    }

    #[tokio::test]
    async fn test_get_of_uninstalled_product() {
        let controller = Controller::new(kind_only(""));
        let err = controller
            .get(&CancellationToken::new(), "colima", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotInstalled { tool: "colima", .. }));
    }

    #[tokio::test]
    async fn test_apply_returns_observed_cluster() {
        let created = Arc::new(Mutex::new(false));
        let state = created.clone();
        let runner = Arc::new(
            FakeCmdRunner::new(move |argv| {
                let mut created = state.lock().unwrap();
                match (argv[0].as_str(), argv[1].as_str()) {
                    ("kind", "get") if *created => CommandOutput::ok("kind\n"),
                    ("kind", "create") => {
                        *created = true;
                        CommandOutput::ok("")
                    }
                    ("kubectl", "version") => CommandOutput::ok(KUBECTL_VERSION),
                    _ => CommandOutput::ok(""),
                }
            })
            .with_missing(["minikube", "k3d", "colima"]),
        );
        let controller = Controller::new(runner.clone());

        let mut desired = kind_cluster("kind-kind");
        desired.status.cpus = 99;
        let observed = controller
            .apply(&CancellationToken::new(), &desired)
            .await
            .unwrap();

        assert_eq!(observed.name, "kind-kind");
        assert_eq!(observed.status.kubernetes_version, "v1.27.3");
        assert_eq!(observed.status.cpus, 0);
        assert!(runner
            .calls()
            .iter()
            .any(|argv| argv[..3] == ["kind", "create", "cluster"]));
    }

    #[tokio::test]
    async fn test_apply_echoes_unreported_cluster() {
        let controller = Controller::new(kind_only(""));
        let observed = controller
            .apply(&CancellationToken::new(), &kind_cluster("kind-kind"))
            .await
            .unwrap();
        assert_eq!(observed.name, "kind-kind");
        assert!(observed.status.error.contains("not found"));
    }

    #[tokio::test]
    async fn test_apply_requires_product() {
        let controller = Controller::new(kind_only(""));
        let err = controller
            .apply(&CancellationToken::new(), &Cluster::named("mystery"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has no product"));
    }

    #[tokio::test]
    async fn test_apply_rejects_mismatched_block() {
        let controller = Controller::new(kind_only(""));
        let mut desired = kind_cluster("kind-kind");
        desired.colima = Some(ColimaCluster::default());
        let err = controller
            .apply(&CancellationToken::new(), &desired)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_apply_not_installed() {
        let controller = Controller::new(kind_only(""));
        let mut desired = Cluster::for_product(Product::Minikube);
        desired.name = "minikube".to_string();
        let err = controller
            .apply(&CancellationToken::new(), &desired)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("minikube not installed"));
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let runner = Arc::new(
            FakeCmdRunner::new(|argv| match (argv[0].as_str(), argv[1].as_str()) {
                ("kind", "get") => CommandOutput::ok("zeta\nalpha\n"),
                ("colima", "list") => {
                    CommandOutput::ok("{\"name\":\"default\",\"status\":\"Running\",\"cpus\":2}\n")
                }
                _ => CommandOutput::failed("unreachable"),
            })
            .with_missing(["minikube", "k3d", "kubectl"]),
        );
        let controller = Controller::new(runner);
        let names: Vec<String> = controller
            .list(&CancellationToken::new())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["colima", "kind-alpha", "kind-zeta"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let runner = kind_only("kind\n");
        let controller = Controller::new(runner.clone());
        controller
            .delete(&CancellationToken::new(), "kind-kind", None)
            .await
            .unwrap();
        assert_eq!(
            runner.last_args(),
            vec!["kind", "delete", "cluster", "--name", "kind"]
        );
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let runner = kind_only("");
        let controller = Controller::new(runner.clone());
        let err = controller
            .delete(&CancellationToken::new(), "kind-dev", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!runner.calls().iter().any(|argv| argv[1] == "delete"));
    }

    #[tokio::test]
    async fn test_declared_product_routes_lookup() {
        let started = Arc::new(Mutex::new(false));
        let state = started.clone();
        let runner = Arc::new(
            FakeCmdRunner::new(move |argv| {
                let mut started = state.lock().unwrap();
                match (argv[0].as_str(), argv[1].as_str()) {
                    ("minikube", "version") => {
                        CommandOutput::ok(r#"{"minikubeVersion":"v1.32.0"}"#)
                    }
                    ("minikube", "start") => {
                        *started = true;
                        CommandOutput::ok("")
                    }
                    ("minikube", "profile") if *started => CommandOutput::ok(
                        r#"{"valid":[{"Name":"kind-looking","Config":{"CPUs":2}}]}"#,
                    ),
                    ("minikube", "profile") => CommandOutput::ok(r#"{"valid":[]}"#),
                    _ => CommandOutput::ok(""),
                }
            })
            .with_missing(["kind", "k3d", "colima", "kubectl"]),
        );
        let controller = Controller::new(runner.clone());
        let ctx = CancellationToken::new();

        let mut desired = Cluster::for_product(Product::Minikube);
        desired.name = "kind-looking".to_string();
        let observed = controller.apply(&ctx, &desired).await.unwrap();
        assert_eq!(observed.product, Some(Product::Minikube));
        assert!(observed.status.error.is_empty());
        assert_eq!(observed.status.cpus, 2);

        controller
            .delete(&ctx, "kind-looking", Some(Product::Minikube))
            .await
            .unwrap();
        assert_eq!(
            runner.last_args(),
            vec!["minikube", "delete", "-p", "kind-looking"]
        );
    }

    #[tokio::test]
    async fn test_apply_bare_k3d_reports_created_cluster() {
        let created = Arc::new(Mutex::new(false));
        let state = created.clone();
        let runner = Arc::new(
            FakeCmdRunner::new(move |argv| {
                let mut created = state.lock().unwrap();
                match argv.get(2).map(String::as_str) {
                    Some("list") if *created => {
                        CommandOutput::ok(r#"[{"name":"k3s-default","nodes":[]}]"#)
                    }
                    Some("list") => CommandOutput::ok("[]"),
                    Some("create") => {
                        *created = true;
                        CommandOutput::ok("")
                    }
                    _ => CommandOutput::ok(""),
                }
            })
            .with_missing(["kind", "minikube", "colima", "kubectl"]),
        );
        let controller = Controller::new(runner.clone());

        let mut desired = Cluster::for_product(Product::K3d);
        desired.name = "k3d".to_string();
        let observed = controller
            .apply(&CancellationToken::new(), &desired)
            .await
            .unwrap();

        assert_eq!(observed.name, "k3d-k3s-default");
        assert!(runner
            .calls()
            .iter()
            .any(|argv| argv == &["k3d", "cluster", "create", "k3s-default"]));
    }

    #[tokio::test]
    async fn test_get_skips_failing_backend() {
        let runner = Arc::new(
            FakeCmdRunner::new(|argv| match (argv[0].as_str(), argv[1].as_str()) {
                ("kind", "get") => CommandOutput::failed(
                    "Cannot connect to the Docker daemon at unix:///var/run/docker.sock",
                ),
                ("minikube", "profile") => {
                    CommandOutput::ok(r#"{"valid":[{"Name":"dev","Config":{"CPUs":4}}]}"#)
                }
                _ => CommandOutput::ok(""),
            })
            .with_missing(["k3d", "colima", "kubectl"]),
        );
        let controller = Controller::new(runner);
        let ctx = CancellationToken::new();

        let cluster = controller.get(&ctx, "dev", None).await.unwrap();
        assert_eq!(cluster.product, Some(Product::Minikube));
        assert_eq!(cluster.status.cpus, 4);

        let err = controller.get(&ctx, "missing", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_reports_error_when_every_backend_fails() {
        let runner = Arc::new(
            FakeCmdRunner::new(|_| CommandOutput::failed("Cannot connect to the Docker daemon"))
                .with_missing(["minikube", "k3d", "colima", "kubectl"]),
        );
        let controller = Controller::new(runner);
        let err = controller
            .get(&CancellationToken::new(), "dev", None)
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("Cannot connect to the Docker daemon"));
    }

    struct RecordingWriter(Mutex<Option<String>>);

    #[async_trait]
    impl ConfigWriter for RecordingWriter {
        async fn write_config(
            &self,
            _ctx: &CancellationToken,
            _container_id: &str,
            kubeconfig: &str,
        ) -> Result<()> {
            *self.0.lock().unwrap() = Some(kubeconfig.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_modify_config_in_container() {
        let runner = Arc::new(
            FakeCmdRunner::new(|argv| match (argv[0].as_str(), argv[1].as_str()) {
                ("kind", "get") if argv[2] == "clusters" => CommandOutput::ok("kind\n"),
                ("kind", "get") => CommandOutput::ok("apiVersion: v1\nkind: Config\n"),
                _ => CommandOutput::ok(""),
            })
            .with_missing(["kubectl"]),
        );
        let controller = Controller::new(runner);
        let writer = RecordingWriter(Mutex::new(None));

        controller
            .modify_config_in_container(&CancellationToken::new(), "kind", "abc123", &writer)
            .await
            .unwrap();
        assert_eq!(
            writer.0.lock().unwrap().as_deref(),
            Some("apiVersion: v1\nkind: Config\n")
        );
    }

    #[tokio::test]
    async fn test_modify_config_unsupported_product() {
        let runner = Arc::new(
            FakeCmdRunner::new(|_| {
                CommandOutput::ok(r#"{"valid":[{"Name":"minikube","Config":{"CPUs":2}}]}"#)
            })
            .with_missing(["kubectl"]),
        );
        let controller = Controller::new(runner);
        let writer = RecordingWriter(Mutex::new(None));

        let err = controller
            .modify_config_in_container(&CancellationToken::new(), "minikube", "abc123", &writer)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot be configured"));
    }
}
