/// Command workflows behind the CLI
pub mod apply;
pub mod create;
pub mod delete;
pub mod get;
pub mod printer;

use crate::error::{Error, Result};

/// Accept the resource type names yap knows on the command line
pub(crate) fn parse_resource_type(name: &str) -> Result<()> {
    match name {
        "cluster" | "clusters" => Ok(()),
        other => Err(Error::validation(format!("Unrecognized type: {}", other))),
    }
}
