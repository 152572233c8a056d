/// Decoding of multi-document yap configuration streams
use serde::Deserialize;
use std::io::Read;
use tracing::debug;

use crate::api::{Cluster, TypeMeta, API_VERSION, KIND_CLUSTER};
use crate::error::{Error, Result};

/// A decoded resource, tagged by its kind
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Cluster(Cluster),
}

/// Concrete schema selected by a discriminator
enum Schema {
    Cluster,
}

/// Parse a stream of YAML documents into typed objects, in stream order.
///
/// Each document is read twice: once for its `kind`/`apiVersion` only,
/// then strictly into the type those select. Empty documents are skipped.
pub fn parse_stream<R: Read>(reader: R) -> Result<Vec<Object>> {
    let mut result = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_reader(reader).enumerate() {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| Error::Decode {
            discriminator: format!("document {}", index + 1),
            message: e.to_string(),
        })?;
        if value.is_null() {
            continue;
        }

        let type_meta: TypeMeta =
            serde_yaml::from_value(value.clone()).map_err(|e| Error::Decode {
                discriminator: format!("document {}", index + 1),
                message: e.to_string(),
            })?;

        let schema = determine_schema(&type_meta)?;
        let discriminator = format!("document {} ({})", index + 1, type_meta);
        let object = match schema {
            Schema::Cluster => serde_yaml::from_value::<Cluster>(value)
                .map(Object::Cluster)
                .map_err(|e| Error::Decode {
                    discriminator,
                    message: e.to_string(),
                })?,
        };

        debug!(document = index + 1, %type_meta, "decoded object");
        result.push(object);
    }

    Ok(result)
}

/// Parse a YAML string
#[cfg(test)]
pub fn parse_str(input: &str) -> Result<Vec<Object>> {
    parse_stream(input.as_bytes())
}

fn determine_schema(type_meta: &TypeMeta) -> Result<Schema> {
    if type_meta.api_version != API_VERSION {
        return Err(Error::Decode {
            discriminator: type_meta.to_string(),
            message: format!("yap config must contain: `apiVersion: {}`", API_VERSION),
        });
    }

    match type_meta.kind.as_str() {
        KIND_CLUSTER => Ok(Schema::Cluster),
        _ => Err(Error::Decode {
            discriminator: type_meta.to_string(),
            message: format!("unrecognized kind; yap config must contain: `kind: {}`", KIND_CLUSTER),
        }),
    }
}
