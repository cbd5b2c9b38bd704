//! Line-delimited JSON serialization for batch artifacts.

use crate::models::Record;
use std::error::Error;

/// Serialize records to JSONL bytes, one compact object per line.
pub fn serialize(records: &[Record]) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.push(b'\n');
    }
    Ok(out)
}
