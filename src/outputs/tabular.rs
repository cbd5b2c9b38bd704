//! CSV serialization for batch artifacts.

use crate::models::Record;
use std::error::Error;

/// Serialize records to CSV bytes, header row included.
pub fn serialize(records: &[Record]) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    Ok(writer.into_inner()?)
}
