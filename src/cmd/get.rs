/// `yap get clusters [NAME...]`
use std::io::Write;
use tokio_util::sync::CancellationToken;

use super::parse_resource_type;
use super::printer::{OutputFormat, Printer};
use crate::api::Cluster;
use crate::cluster::{fill_defaults, normalized_get, ClusterController};
use crate::error::Result;

pub struct GetOptions {
    pub resource: String,
    pub names: Vec<String>,
    pub output: OutputFormat,
}

pub async fn run<C>(
    ctx: &CancellationToken,
    controller: &C,
    options: &GetOptions,
    out: &mut dyn Write,
) -> Result<()>
where
    C: ClusterController + ?Sized,
{
    parse_resource_type(&options.resource)?;
    let printer = Printer::new(options.output, "");

    if options.names.is_empty() {
        return printer.print_list(controller.list(ctx).await?, out);
    }

    let mut clusters = Vec::with_capacity(options.names.len());
    for name in &options.names {
        let mut wanted = Cluster::named(name.as_str());
        fill_defaults(&mut wanted);
        clusters.push(normalized_get(ctx, controller, &wanted.name, wanted.product).await?);
    }

    match clusters.as_slice() {
        [cluster] if options.output != OutputFormat::Table => printer.print_obj(cluster, out),
        _ => printer.print_list(clusters, out),
    }
}
