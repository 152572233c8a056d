/// Defaulting applied to every cluster before it reaches the controller
use crate::api::{Cluster, Product, API_VERSION, KIND_CLUSTER};

/// Infer the product that owns a cluster name, if the name says so
pub fn infer_product(name: &str) -> Option<Product> {
    if name == "kind" || name.starts_with("kind-") {
        Some(Product::Kind)
    } else if name == "k3d" || name.starts_with("k3d-") {
        Some(Product::K3d)
    } else if name == "minikube" {
        Some(Product::Minikube)
    } else if name == "colima" || name.starts_with("colima-") {
        Some(Product::Colima)
    } else {
        None
    }
}

/// Fill in type meta, product and name.
///
/// Names of prefixed products are turned into their kubeconfig context
/// name; the bare product identifier is left for the name normalizer.
pub fn fill_defaults(cluster: &mut Cluster) {
    if cluster.kind.is_empty() {
        cluster.kind = KIND_CLUSTER.to_string();
    }
    if cluster.api_version.is_empty() {
        cluster.api_version = API_VERSION.to_string();
    }

    if cluster.product.is_none() {
        cluster.product = infer_product(&cluster.name);
    }

    let Some(product) = cluster.product else {
        return;
    };

    if cluster.name.is_empty() {
        cluster.name = product.default_cluster_name().to_string();
        return;
    }

    if let Some(prefix) = product.context_prefix() {
        if cluster.name != product.as_str() && !cluster.name.starts_with(prefix) {
            cluster.name = format!("{}{}", prefix, cluster.name);
        }
    }
}
