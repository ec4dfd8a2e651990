use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io,
    path::Path,
};
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

use crate::process::utils::is_yearly_file;

/// Unpack every entry of `zip_path` under `out_dir`, keeping the archive's
/// directory layout. Entries whose names would land outside `out_dir` are
/// skipped. Returns the number of files written.
#[instrument(level = "info", skip(zip_path, out_dir), fields(path = %zip_path.as_ref().display()))]
pub fn extract_archive(zip_path: impl AsRef<Path>, out_dir: impl AsRef<Path>) -> Result<usize> {
    let zip_path = zip_path.as_ref();
    let out_dir = out_dir.as_ref();
    let file = File::open(zip_path)
        .with_context(|| format!("Failed to open ZIP file: {:?}", zip_path))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("Failed to read ZIP archive: {:?}", zip_path))?;

    let mut written = 0;
    let mut yearly = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to access ZIP entry #{} in {:?}", i, zip_path))?;
        let Some(rel) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "entry escapes the extraction directory; skipped");
            continue;
        };
        let target = out_dir.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("creating {:?}", target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {:?}", parent))?;
        }
        let mut out =
            File::create(&target).with_context(|| format!("creating {}", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("extracting {} to {}", entry.name(), target.display()))?;

        if rel
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_yearly_file)
        {
            yearly += 1;
        }
        written += 1;
        debug!(file = %target.display(), "extracted");
    }

    info!(files = written, yearly_csvs = yearly, out = %out_dir.display(), "archive extracted");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;
    use zip::write::FileOptions;
    use zip::CompressionMethod;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) -> Result<()> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options: FileOptions<'_, ()> =
                FileOptions::default().compression_method(CompressionMethod::Stored);
            for (name, content) in entries {
                zip.start_file(*name, options)?;
                zip.write_all(content.as_bytes())?;
            }
            zip.finish()?;
        }
        fs::write(path, buf)?;
        Ok(())
    }

    #[test]
    fn extracts_nested_yearly_files() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("inegi_atus.zip");
        write_zip(
            &zip_path,
            &[
                ("conjunto_de_datos/atus_anual_2019.csv", "ANIO\n2019\n"),
                ("conjunto_de_datos/atus_anual_2020.csv", "ANIO\n2020\n"),
                ("diccionario_de_datos/diccionario.csv", "x\n"),
            ],
        )?;

        let out = dir.path().join("raw");
        assert_eq!(extract_archive(&zip_path, &out)?, 3);
        assert_eq!(
            fs::read_to_string(out.join("conjunto_de_datos/atus_anual_2020.csv"))?,
            "ANIO\n2020\n"
        );
        assert!(out.join("diccionario_de_datos/diccionario.csv").exists());
        Ok(())
    }

    #[test]
    fn escaping_entries_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("evil.zip");
        write_zip(
            &zip_path,
            &[("../outside.csv", "x\n"), ("conjunto_de_datos/atus_anual_2019.csv", "ANIO\n")],
        )?;

        let out = dir.path().join("raw");
        assert_eq!(extract_archive(&zip_path, &out)?, 1);
        assert!(!dir.path().join("outside.csv").exists());
        Ok(())
    }

    #[test]
    fn corrupt_archive_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let zip_path = dir.path().join("broken.zip");
        fs::write(&zip_path, b"not a zip")?;
        assert!(extract_archive(&zip_path, dir.path()).is_err());
        Ok(())
    }
}
