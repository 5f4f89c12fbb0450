//! Zip handling for SDF bundles: unpack the downloaded archive into named CSV
//! texts, and pack entity tables back into an attachment.

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::SdfError;
use crate::schema::EntityKind;

/// One file pulled out of an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub text: String,
}

/// Decompress every file entry, in archive order. Entries must be UTF-8.
pub fn unzip_entries(bytes: &[u8]) -> Result<Vec<ArchiveEntry>, SdfError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut out = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut text = String::new();
        file.read_to_string(&mut text)
            .map_err(|e| SdfError::Archive(format!("{name}: {e}")))?;
        out.push(ArchiveEntry { name, text });
    }
    Ok(out)
}

/// An unpacked SDF download: the entity files we recognise, plus anything else.
#[derive(Clone, Debug, Default)]
pub struct SdfBundle {
    pub entities: Vec<(EntityKind, ArchiveEntry)>,
    pub other: Vec<ArchiveEntry>,
}

impl SdfBundle {
    pub fn from_zip(bytes: &[u8]) -> Result<Self, SdfError> {
        let mut bundle = SdfBundle::default();
        for entry in unzip_entries(bytes)? {
            match EntityKind::from_file_name(&entry.name) {
                Some(kind) => bundle.entities.push((kind, entry)),
                None => {
                    tracing::debug!("ignoring archive entry {:?}", entry.name);
                    bundle.other.push(entry);
                }
            }
        }
        Ok(bundle)
    }

    pub fn get(&self, kind: EntityKind) -> Option<&ArchiveEntry> {
        self.entities.iter().find(|(k, _)| *k == kind).map(|(_, e)| e)
    }
}

/// Deflate `(file name, contents)` pairs into an in-memory zip.
pub fn zip_files<N: AsRef<str>, C: AsRef<[u8]>>(files: &[(N, C)]) -> Result<Vec<u8>, SdfError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, content) in files {
        writer.start_file(name.as_ref(), options)?;
        writer
            .write_all(content.as_ref())
            .map_err(|e| SdfError::Archive(format!("{}: {e}", name.as_ref())))?;
    }
    Ok(writer.finish()?.into_inner())
}
