/// Resource model for yap clusters
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// API group of every yap resource
pub const API_GROUP: &str = "yap.pseudonator.io";

/// The one supported apiVersion
pub const API_VERSION: &str = "yap.pseudonator.io/v1alpha1";

/// Kind of the cluster resource
pub const KIND_CLUSTER: &str = "Cluster";

/// Discriminator pair read before committing to a concrete schema.
///
/// Unknown fields are ignored here; the concrete types reject them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(
        default,
        rename = "apiVersion",
        skip_serializing_if = "String::is_empty"
    )]
    pub api_version: String,
}

impl TypeMeta {
    /// Type meta of a yap Cluster
    pub fn cluster() -> Self {
        Self {
            kind: KIND_CLUSTER.to_string(),
            api_version: API_VERSION.to_string(),
        }
    }
}

impl fmt::Display for TypeMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kind={:?} apiVersion={:?}", self.kind, self.api_version)
    }
}

/// Tool used to provision a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    Kind,
    Minikube,
    K3d,
    Colima,
}

impl Product {
    /// Every supported product, in lookup order
    pub const ALL: [Product; 4] = [
        Product::Kind,
        Product::Minikube,
        Product::K3d,
        Product::Colima,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Kind => "kind",
            Product::Minikube => "minikube",
            Product::K3d => "k3d",
            Product::Colima => "colima",
        }
    }

    /// Name of the cluster the product creates when none is given
    pub fn default_cluster_name(&self) -> &'static str {
        match self {
            Product::Kind => "kind-kind",
            Product::Minikube => "minikube",
            Product::K3d => "k3d-k3s-default",
            Product::Colima => "colima",
        }
    }

    /// Prefix the product puts on kubeconfig context names
    pub fn context_prefix(&self) -> Option<&'static str> {
        match self {
            Product::Kind => Some("kind-"),
            Product::Minikube => None,
            Product::K3d => Some("k3d-"),
            Product::Colima => Some("colima-"),
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Product {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Product::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                Error::validation(format!(
                    "unknown product {:?}. Valid products: kind, minikube, k3d, colima",
                    s
                ))
            })
    }
}

/// Cluster configuration, desired and observed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Cluster {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    /// The cluster name, as it appears in the kubeconfig
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// The tool used to create this cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<Product>,

    /// Lower bound on the CPUs available to the cluster
    #[serde(default, rename = "minCPUs", skip_serializing_if = "is_zero")]
    pub min_cpus: u32,

    /// Desired Kubernetes version, e.g. v1.27.3. Not every product honors it.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubernetes_version: String,

    /// Raw kind.x-k8s.io/v1alpha4 Cluster config. Only for product: kind.
    #[serde(
        default,
        rename = "kindV1Alpha4Cluster",
        alias = "kindConfig",
        skip_serializing_if = "Option::is_none"
    )]
    pub kind_config: Option<serde_yaml::Value>,

    /// Only for product: minikube
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minikube: Option<MinikubeCluster>,

    /// Only for product: k3d
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k3d: Option<K3dCluster>,

    /// Only for product: colima
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colima: Option<ColimaCluster>,

    /// Most recently observed status. Read-only.
    #[serde(default, skip_serializing_if = "ClusterStatus::is_empty")]
    pub status: ClusterStatus,
}

/// Observed cluster state, populated by reads only
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub cpus: u32,

    /// Whether this is the current kubectl context
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub current: bool,

    /// Version reported by the API server. May carry a build tag.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kubernetes_version: String,

    /// Set when reading the status failed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ClusterStatus {
    pub fn is_empty(&self) -> bool {
        *self == ClusterStatus::default()
    }
}

/// minikube options. Mirrors `minikube start` flags where possible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MinikubeCluster {
    /// Defaults to containerd
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_runtime: String,

    /// Passed as --extra-config. Defaults to kubelet.max-pods=500.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_configs: Vec<String>,

    /// Passed to `minikube start` before the default flags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start_flags: Vec<String>,
}

/// k3d options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct K3dCluster {
    /// Raw k3d.io/v1alpha4 Simple config, handed to k3d as a config file
    #[serde(
        default,
        rename = "v1alpha4Simple",
        skip_serializing_if = "Option::is_none"
    )]
    pub v1alpha4_simple: Option<serde_yaml::Value>,

    /// Passed to `k3d cluster create` before the default flags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start_flags: Vec<String>,
}

/// colima options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ColimaCluster {
    /// Defaults to containerd
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_runtime: String,

    /// Passed to `colima start` before the default flags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub start_flags: Vec<String>,

    /// MetalLB address pool
    #[serde(
        default,
        rename = "metallbCidr",
        skip_serializing_if = "String::is_empty"
    )]
    pub metallb_cidr: String,
}

/// List wrapper used when printing several clusters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterList {
    pub kind: String,
    pub api_version: String,
    pub items: Vec<Cluster>,
}

impl ClusterList {
    pub fn new(items: Vec<Cluster>) -> Self {
        Self {
            kind: "ClusterList".to_string(),
            api_version: API_VERSION.to_string(),
            items,
        }
    }
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Cluster {
    /// Cluster addressed only by name, as given on the command line
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            kind: KIND_CLUSTER.to_string(),
            api_version: API_VERSION.to_string(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Cluster of the given product, name left for defaulting
    pub fn for_product(product: Product) -> Self {
        Self {
            kind: KIND_CLUSTER.to_string(),
            api_version: API_VERSION.to_string(),
            product: Some(product),
            ..Default::default()
        }
    }

    /// Validate a defaulted desired-state cluster
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::validation("cluster name cannot be empty"));
        }

        let blocks: Vec<Product> = [
            (self.kind_config.is_some(), Product::Kind),
            (self.minikube.is_some(), Product::Minikube),
            (self.k3d.is_some(), Product::K3d),
            (self.colima.is_some(), Product::Colima),
        ]
        .into_iter()
        .filter_map(|(set, product)| set.then_some(product))
        .collect();

        if blocks.len() > 1 {
            return Err(Error::validation(format!(
                "cluster {} sets more than one product config block: {:?}",
                self.name, blocks
            )));
        }

        if let Some(block) = blocks.first() {
            if self.product != Some(*block) {
                return Err(Error::validation(format!(
                    "cluster {} has a {} config block but product {}",
                    self.name,
                    block,
                    self.product.map(|p| p.as_str()).unwrap_or("<unset>")
                )));
            }
        }

        if !self.kubernetes_version.is_empty() && !self.kubernetes_version.starts_with('v') {
            return Err(Error::validation(format!(
                "kubernetesVersion {:?} must start with 'v', e.g. v1.27.3",
                self.kubernetes_version
            )));
        }

        Ok(())
    }
}
