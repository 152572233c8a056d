/// `yap create cluster PRODUCT`
use std::io::Write;
use tokio_util::sync::CancellationToken;

use super::printer::{OutputFormat, Printer};
use crate::api::{Cluster, Product};
use crate::cluster::{fill_defaults, ClusterController};
use crate::error::Result;

pub struct CreateClusterOptions {
    pub product: String,
    pub name: Option<String>,
    pub min_cpus: u32,
    pub kubernetes_version: Option<String>,
    pub output: OutputFormat,
}

impl CreateClusterOptions {
    /// Desired cluster described by the flags, defaulted
    pub fn to_cluster(&self) -> Result<Cluster> {
        let product: Product = self.product.parse()?;
        let mut cluster = Cluster::for_product(product);
        cluster.name = self.name.clone().unwrap_or_default();
        cluster.min_cpus = self.min_cpus;
        cluster.kubernetes_version = self.kubernetes_version.clone().unwrap_or_default();
        fill_defaults(&mut cluster);
        Ok(cluster)
    }
}

pub async fn run<C>(
    ctx: &CancellationToken,
    controller: &C,
    options: &CreateClusterOptions,
    out: &mut dyn Write,
) -> Result<()>
where
    C: ClusterController + ?Sized,
{
    let desired = options.to_cluster()?;
    let observed = controller.apply(ctx, &desired).await?;
    Printer::new(options.output, "created").print_obj(&observed, out)
}
