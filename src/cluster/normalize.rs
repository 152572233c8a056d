/// Resolution of short product names to real cluster names
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::controller::ClusterController;
use crate::api::{Cluster, Product};
use crate::error::Result;

/// Get a cluster, falling back to the product's default cluster name.
///
/// Clusters are created with `yap create cluster kind`, but kind names
/// the result `kind-kind`. A lookup of a bare product name that comes
/// back not-found is retried with that product's default name. When the
/// retry fails too, the original error is returned. A declared product
/// other than the one the name spells is never retried.
pub async fn normalized_get<C>(
    ctx: &CancellationToken,
    controller: &C,
    name: &str,
    product: Option<Product>,
) -> Result<Cluster>
where
    C: ClusterController + ?Sized,
{
    let err = match controller.get(ctx, name, product).await {
        Ok(cluster) => return Ok(cluster),
        Err(err) if err.is_not_found() => err,
        Err(err) => return Err(err),
    };

    let named = match name.parse::<Product>() {
        Ok(named) if product.unwrap_or(named) == named => named,
        _ => return Err(err),
    };
    let retry_name = named.default_cluster_name();
    if retry_name == name {
        return Err(err);
    }

    debug!("cluster {} not found, retrying as {}", name, retry_name);
    controller
        .get(ctx, retry_name, Some(named))
        .await
        .map_err(|_| err)
}
