/// `yap apply -f FILENAME`
use std::io::{Read, Write};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::printer::{OutputFormat, Printer};
use crate::cluster::{fill_defaults, ClusterController};
use crate::encoding::Object;
use crate::error::{Error, Result};
use crate::visitor::decode_all;

pub struct ApplyOptions {
    pub filenames: Vec<String>,
    pub output: OutputFormat,
}

/// Apply every object of every source, stopping at the first failure
pub async fn run<C>(
    ctx: &CancellationToken,
    controller: &C,
    options: &ApplyOptions,
    stdin: &mut dyn Read,
    out: &mut dyn Write,
) -> Result<()>
where
    C: ClusterController + ?Sized,
{
    if options.filenames.is_empty() {
        return Err(Error::validation("Expected source files with -f"));
    }

    let printer = Printer::new(options.output, "created");
    for object in decode_all(&options.filenames, stdin)? {
        match object {
            Object::Cluster(mut cluster) => {
                fill_defaults(&mut cluster);
                debug!("Applying cluster {}", cluster.name);
                let observed = controller.apply(ctx, &cluster).await?;
                printer.print_obj(&observed, out)?;
            }
        }
    }
    Ok(())
}
