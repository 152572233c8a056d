/// `yap delete -f FILENAME` and `yap delete cluster NAME...`
use std::io::{Read, Write};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::parse_resource_type;
use super::printer::Printer;
use crate::api::Cluster;
use crate::cluster::{fill_defaults, normalized_get, ClusterController};
use crate::encoding::Object;
use crate::error::{Error, Result};
use crate::visitor::decode_all;

pub struct DeleteOptions {
    pub filenames: Vec<String>,
    pub ignore_not_found: bool,

    /// Only "true" and "false" for now. More modes may follow, as they
    /// did for `kubectl delete --cascade`.
    pub cascade: String,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            filenames: Vec::new(),
            ignore_not_found: false,
            cascade: "false".to_string(),
        }
    }
}

impl DeleteOptions {
    fn validate_cascade(&self) -> Result<()> {
        match self.cascade.as_str() {
            "" | "true" | "false" => Ok(()),
            other => Err(Error::validation(format!(
                "Invalid cascade: {}. Valid values: true, false.",
                other
            ))),
        }
    }

    fn parse_explicit_resources(&self, args: &[String], stdin: &mut dyn Read) -> Result<Vec<Object>> {
        let has_files = !self.filenames.is_empty();
        let has_names = args.len() >= 2;
        if !(has_files || has_names) {
            return Err(Error::validation(
                "Expected resources, specified as files ('yap delete -f') or names ('yap delete cluster foo')",
            ));
        }
        if has_files && has_names {
            return Err(Error::validation(
                "Can only specify one of {files, resource names}",
            ));
        }

        if has_files {
            return decode_all(&self.filenames, stdin);
        }

        parse_resource_type(&args[0])?;
        Ok(args[1..]
            .iter()
            .map(|name| Object::Cluster(Cluster::named(name.as_str())))
            .collect())
    }
}

/// Delete every resource in order, stopping at the first failure
pub async fn run<C>(
    ctx: &CancellationToken,
    controller: &C,
    options: &DeleteOptions,
    args: &[String],
    stdin: &mut dyn Read,
    out: &mut dyn Write,
) -> Result<()>
where
    C: ClusterController + ?Sized,
{
    options.validate_cascade()?;
    let resources = options.parse_explicit_resources(args, stdin)?;
    let printer = Printer::Name {
        operation: "deleted",
    };

    for resource in resources {
        match resource {
            Object::Cluster(mut cluster) => {
                fill_defaults(&mut cluster);

                // Resolve `yap delete cluster kind` to kind-kind
                if let Ok(found) =
                    normalized_get(ctx, controller, &cluster.name, cluster.product).await
                {
                    cluster.name = found.name;
                }

                if options.cascade == "true" {
                    info!("No dependent resources to cascade for cluster {}", cluster.name);
                }

                match controller.delete(ctx, &cluster.name, cluster.product).await {
                    Ok(()) => printer.print_obj(&cluster, out)?,
                    Err(e) if options.ignore_not_found && e.is_not_found() => {
                        debug!("Ignoring missing cluster {}", cluster.name);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
    }
    Ok(())
}
