//! Record stream decoding for the CLI

use anyhow::{Context, Result};
use jpart_core::PartitionError;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Open the input file, or stdin when no path is given.
pub fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Failed to open input {:?}", path))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Lazily decode JSON values from `reader`.
///
/// Accepts JSON lines as well as documents separated by arbitrary
/// whitespace. A malformed document is yielded as an error and ends the
/// stream.
pub fn records_from_reader<R: Read>(reader: R) -> impl Iterator<Item = jpart_core::Result<Value>> {
    let mut failed = false;
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<Value>()
        .map(|record| record.map_err(PartitionError::from))
        .take_while(move |record| {
            let keep = !failed;
            failed |= record.is_err();
            keep
        })
}
