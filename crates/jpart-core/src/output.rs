//! Output naming and the line format shared by every write path

use serde_json::Value;
use std::io::Write;

use crate::error::Result;

pub const OUTPUT_SUFFIX: &str = ".jsonl";

/// Join partition key values into the output filename, e.g. `aa-bb.jsonl`.
pub fn construct_output_filename<S: AsRef<str>>(parts: &[S]) -> String {
    let joined = parts
        .iter()
        .map(|p| p.as_ref())
        .collect::<Vec<_>>()
        .join("-");
    format!("{}{}", joined, OUTPUT_SUFFIX)
}

/// Write `record` as one compact JSON line.
pub fn write_json_line<W: Write + ?Sized>(writer: &mut W, record: &Value) -> Result<()> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    Ok(())
}
