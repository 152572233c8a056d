/// Sources for `-f`: files on disk, or stdin when the name is `-`
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::debug;

use crate::encoding::{parse_stream, Object};
use crate::error::{Error, Result};

/// Name that selects stdin
pub const STDIN: &str = "-";

/// Decode every source, in argument order
pub fn decode_all(filenames: &[String], stdin: &mut dyn Read) -> Result<Vec<Object>> {
    let mut objects = Vec::new();
    for filename in filenames {
        let decoded = if filename == STDIN {
            debug!("Reading objects from stdin");
            parse_stream(&mut *stdin)
        } else {
            debug!("Reading objects from {}", filename);
            let file = File::open(filename)
                .map_err(|e| Error::validation(format!("reading {}: {}", filename, e)))?;
            parse_stream(BufReader::new(file))
        };
        objects.extend(decoded.map_err(|e| in_source(filename, e))?);
    }
    Ok(objects)
}

/// Prefix decode failures with the source they came from
fn in_source(filename: &str, error: Error) -> Error {
    match error {
        Error::Decode {
            discriminator,
            message,
        } => Error::Decode {
            discriminator: format!("{}: {}", filename, discriminator),
            message,
        },
        other => other,
    }
}
