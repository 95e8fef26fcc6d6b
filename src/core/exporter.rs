/*
 * Writes the export dump: a three-line header followed by every selected file,
 * each introduced by a `===== FILE: <path> =====` marker. Files are streamed one
 * at a time through a fixed-size buffer. A file that cannot be read is replaced by
 * an error line and the dump continues with the next file.
 *
 * Two sinks share the same writer so their output is byte-identical: one writes to
 * a file chosen by the user, the other renders into memory and hands the text to the
 * system clipboard.
 */
use crate::core::path_utils;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;

const READ_BUFFER_SIZE: usize = 64 * 1024;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug)]
pub enum ExportError {
    OpenDestination(PathBuf, io::Error),
    Write(io::Error),
    Clipboard(String),
}

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> Self {
        ExportError::Write(err)
    }
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::OpenDestination(path, e) => {
                write!(f, "Could not open export destination {path:?}: {e}")
            }
            ExportError::Write(e) => write!(f, "Failed to write export: {e}"),
            ExportError::Clipboard(e) => write!(f, "Clipboard unavailable: {e}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::OpenDestination(_, e) => Some(e),
            ExportError::Write(e) => Some(e),
            ExportError::Clipboard(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;

/* Inputs of the dump header. Paths in markers are rendered relative to `solution_dir`. */
#[derive(Debug, Clone)]
pub struct DumpHeader {
    pub generated_at: OffsetDateTime,
    pub solution_file_name: String,
    pub solution_dir: PathBuf,
}

impl DumpHeader {
    pub fn for_solution(solution_path: &Path) -> Self {
        DumpHeader {
            generated_at: OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc()),
            solution_file_name: solution_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            solution_dir: solution_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        }
    }

    fn timestamp(&self) -> String {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
        self.generated_at
            .format(format)
            .unwrap_or_else(|_| self.generated_at.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub files_written: usize,
    pub read_failures: usize,
}

pub fn write_dump<W: Write>(
    writer: &mut W,
    files: &[PathBuf],
    header: &DumpHeader,
) -> io::Result<DumpStats> {
    writeln!(writer, "// Generated: {}", header.timestamp())?;
    writeln!(writer, "// Solution: {}", header.solution_file_name)?;
    writeln!(writer, "// Files: {}", files.len())?;
    writeln!(writer)?;

    let mut stats = DumpStats::default();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    for path in files {
        let display_path = path_utils::relative_display_path(path, &header.solution_dir);
        writeln!(writer, "===== FILE: {display_path} =====")?;
        match stream_file_as_text(path, writer, &mut buffer) {
            Ok(ends_with_newline) => {
                if !ends_with_newline {
                    writeln!(writer)?;
                }
                stats.files_written += 1;
            }
            Err(StreamError::Read(e)) => {
                log::warn!("Exporter: Failed to read {path:?}: {e}");
                writeln!(writer, "[ERROR: could not read file: {e}]")?;
                stats.read_failures += 1;
            }
            Err(StreamError::Write(e)) => return Err(e),
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(stats)
}

enum StreamError {
    Read(io::Error),
    Write(io::Error),
}

/*
 * Copies one file into `writer` as UTF-8 text, replacing invalid sequences and dropping
 * a leading byte-order mark. Returns whether the written text ended with a newline
 * (true for an empty file, so no blank line is added).
 */
fn stream_file_as_text<W: Write>(
    path: &Path,
    writer: &mut W,
    buffer: &mut [u8],
) -> std::result::Result<bool, StreamError> {
    let mut file = File::open(path).map_err(StreamError::Read)?;
    let mut pending: Vec<u8> = Vec::new();
    let mut first_chunk = true;
    let mut last_byte: Option<u8> = None;

    loop {
        let read = match file.read(buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(StreamError::Read(e)),
        };
        pending.extend_from_slice(&buffer[..read]);
        if first_chunk {
            if pending.len() < UTF8_BOM.len() && UTF8_BOM.starts_with(&pending) {
                continue;
            }
            if pending.starts_with(UTF8_BOM) {
                pending.drain(..UTF8_BOM.len());
            }
            first_chunk = false;
        }
        let consumed = write_complete_utf8(&pending, writer).map_err(StreamError::Write)?;
        if consumed > 0 {
            last_byte = Some(pending[consumed - 1]);
        }
        pending.drain(..consumed);
    }

    if !pending.is_empty() {
        if first_chunk && pending.starts_with(UTF8_BOM) {
            pending.drain(..UTF8_BOM.len());
        }
        let text = String::from_utf8_lossy(&pending);
        writer
            .write_all(text.as_bytes())
            .map_err(StreamError::Write)?;
        last_byte = text.as_bytes().last().copied().or(last_byte);
    }
    Ok(last_byte.is_none_or(|byte| byte == b'\n'))
}

/*
 * Writes the longest prefix of `bytes` that does not end in a truncated UTF-8
 * sequence, with invalid sequences replaced. Returns how many input bytes were used.
 */
fn write_complete_utf8<W: Write>(bytes: &[u8], writer: &mut W) -> io::Result<usize> {
    let mut consumed = 0;
    loop {
        match std::str::from_utf8(&bytes[consumed..]) {
            Ok(valid) => {
                writer.write_all(valid.as_bytes())?;
                return Ok(bytes.len());
            }
            Err(e) => {
                let valid_end = consumed + e.valid_up_to();
                writer.write_all(&bytes[consumed..valid_end])?;
                match e.error_len() {
                    Some(invalid_len) => {
                        writer.write_all(char::REPLACEMENT_CHARACTER.to_string().as_bytes())?;
                        consumed = valid_end + invalid_len;
                    }
                    // Truncated sequence at the end: wait for more input.
                    None => return Ok(valid_end),
                }
            }
        }
    }
}

/* A destination for the dump. */
pub trait ExportSink {
    fn export(&self, files: &[PathBuf], header: &DumpHeader) -> Result<DumpStats>;
}

pub struct FileExportSink {
    destination: PathBuf,
}

impl FileExportSink {
    pub fn new(destination: PathBuf) -> Self {
        FileExportSink { destination }
    }
}

impl ExportSink for FileExportSink {
    fn export(&self, files: &[PathBuf], header: &DumpHeader) -> Result<DumpStats> {
        let file = File::create(&self.destination)
            .map_err(|e| ExportError::OpenDestination(self.destination.clone(), e))?;
        let mut writer = BufWriter::new(file);
        let stats = write_dump(&mut writer, files, header)?;
        log::info!(
            "Exporter: Wrote {} files to {:?} ({} unreadable).",
            stats.files_written,
            self.destination,
            stats.read_failures
        );
        Ok(stats)
    }
}

pub struct ClipboardExportSink;

impl ClipboardExportSink {
    pub fn new() -> Self {
        ClipboardExportSink
    }

    /* Renders the dump into memory exactly as the file sink would write it. */
    pub fn render(&self, files: &[PathBuf], header: &DumpHeader) -> Result<(String, DumpStats)> {
        let mut buffer: Vec<u8> = Vec::new();
        let stats = write_dump(&mut buffer, files, header)?;
        // Everything written is valid UTF-8 by construction.
        let text = String::from_utf8_lossy(&buffer).into_owned();
        Ok((text, stats))
    }
}

impl Default for ClipboardExportSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ExportSink for ClipboardExportSink {
    fn export(&self, files: &[PathBuf], header: &DumpHeader) -> Result<DumpStats> {
        let (text, stats) = self.render(files, header)?;
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ExportError::Clipboard(e.to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|e| ExportError::Clipboard(e.to_string()))?;
        log::info!(
            "Exporter: Copied {} files to the clipboard.",
            stats.files_written
        );
        Ok(stats)
    }
}
