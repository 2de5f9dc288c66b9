use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::visitor::VisitorRecord;

/// File name offered for downloaded backups.
pub const BACKUP_FILE_NAME: &str = "visitors.bin.gz";

pub fn write_backup<W: Write>(records: &[VisitorRecord], out: W) -> io::Result<()> {
    let encoder = GzEncoder::new(out, Compression::default());
    let mut writer = BufWriter::new(encoder);
    serialize_into(&mut writer, records).map_err(io::Error::other)?;
    writer
        .into_inner()
        .map_err(|e| e.into_error())?
        .finish()?;
    Ok(())
}

pub fn read_backup<R: Read>(input: R) -> io::Result<Vec<VisitorRecord>> {
    let mut reader = BufReader::new(GzDecoder::new(input));
    deserialize_from(&mut reader).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

pub fn save_backup(records: &[VisitorRecord], path: impl AsRef<Path>) -> io::Result<()> {
    write_backup(records, File::create(path)?)
}

pub fn load_backup(path: impl AsRef<Path>) -> io::Result<Vec<VisitorRecord>> {
    read_backup(File::open(path)?)
}

/// Gzip-compressed bincode of the whole record set.
pub fn backup_to_memory(records: &[VisitorRecord]) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_backup(records, &mut buffer)?;
    Ok(buffer)
}

pub fn backup_from_memory(data: &[u8]) -> io::Result<Vec<VisitorRecord>> {
    read_backup(data)
}
