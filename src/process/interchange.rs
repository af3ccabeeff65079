use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::Process;
use crate::error::Error;

/// Reads a process graph from an interchange format
pub trait Importer {
    fn import(&self, reader: &mut dyn BufRead) -> Result<Process, Error>;
}

/// Writes a process graph in an interchange format
pub trait Exporter {
    /// File extension of the format, without the dot
    fn extension(&self) -> &'static str;

    fn export(&self, process: &Process, writer: &mut dyn Write) -> Result<(), Error>;

    /// Export into a file. A path without extension gets the one of the format.
    /// Returns the path that was written.
    fn export_file(&self, process: &Process, path: &Path) -> Result<PathBuf, Error> {
        let path = match path.extension() {
            Some(_) => path.to_path_buf(),
            None => path.with_extension(self.extension()),
        };
        let mut writer = BufWriter::new(File::create(&path)?);
        self.export(process, &mut writer)?;
        writer.flush()?;
        Ok(path)
    }
}
