//! Dump file opening and decoder error types
//!
//! Dumps arrive compressed in several formats. `.bz2` is decoded in-process,
//! the rarer `.gz`, `.7z` and `.lzma` archives are piped through the usual
//! command-line decompressors.

use bzip2::read::MultiBzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use thiserror::Error;

/// Read buffer in front of the XML parser
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Errors that abort the decoding of a dump file
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error at byte {position}: {message}")]
    XmlParse { position: u64, message: String },

    #[error("Invalid dump format: {0}")]
    InvalidFormat(String),

    #[error("Truncated dump: end of input inside <{0}>")]
    Truncated(String),

    #[error("Unsupported dump extension: {0}")]
    UnsupportedExtension(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Dump has no namespace table")]
    MissingNamespaces,
}

/// Compression of a dump file, detected from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DumpFormat {
    /// Uncompressed XML
    PlainXml,
    /// bzip2, possibly multi-stream
    Bzip2,
    /// gzip, through `zcat`
    Gzip,
    /// 7-Zip archive, through `7za e -so`
    SevenZip,
    /// LZMA, through `lzcat`
    Lzma,
}

impl DumpFormat {
    /// Detect format from file path
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xml" => Some(DumpFormat::PlainXml),
            "bz2" => Some(DumpFormat::Bzip2),
            "gz" => Some(DumpFormat::Gzip),
            "7z" => Some(DumpFormat::SevenZip),
            "lzma" => Some(DumpFormat::Lzma),
            _ => None,
        }
    }

    /// External decompression command, for formats not decoded in-process
    pub fn command(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            DumpFormat::Gzip => Some(("zcat", &[])),
            DumpFormat::SevenZip => Some(("7za", &["e", "-so"])),
            DumpFormat::Lzma => Some(("lzcat", &[])),
            DumpFormat::PlainXml | DumpFormat::Bzip2 => None,
        }
    }
}

/// Decompressed byte stream of a dump file
pub type DumpStream = Box<dyn BufRead + Send>;

/// Open a dump file and return its decompressed contents
pub fn open_dump(path: &Path) -> Result<DumpStream, DecodeError> {
    let format = DumpFormat::detect(path)
        .ok_or_else(|| DecodeError::UnsupportedExtension(path.display().to_string()))?;

    let stream: DumpStream = match format {
        DumpFormat::PlainXml => {
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, File::open(path)?))
        }
        DumpFormat::Bzip2 => {
            let decoder = MultiBzDecoder::new(File::open(path)?);
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, decoder))
        }
        _ => {
            if !path.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                )
                .into());
            }
            let reader = CommandReader::spawn(format, path)?;
            Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, reader))
        }
    };
    Ok(stream)
}

/// Stdout of a decompression child process
///
/// The child is killed and reaped when the reader is dropped, so an aborted
/// decode does not leave the decompressor running.
struct CommandReader {
    child: Child,
    stdout: ChildStdout,
}

impl CommandReader {
    fn spawn(format: DumpFormat, path: &Path) -> Result<Self, DecodeError> {
        let (program, args) = format
            .command()
            .ok_or_else(|| DecodeError::Decompression(format!("{:?} has no command", format)))?;

        let mut child = Command::new(program)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DecodeError::Decompression(format!("failed to start {}: {}", program, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DecodeError::Decompression(format!("{} has no stdout", program)))?;

        Ok(Self { child, stdout })
    }
}

impl Read for CommandReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Drop for CommandReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::io::Write;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DumpFormat::detect(Path::new("enwiki-latest-pages-meta-history.xml.bz2")),
            Some(DumpFormat::Bzip2)
        );
        assert_eq!(DumpFormat::detect(Path::new("dump.xml")), Some(DumpFormat::PlainXml));
        assert_eq!(DumpFormat::detect(Path::new("dump.xml.7z")), Some(DumpFormat::SevenZip));
        assert_eq!(DumpFormat::detect(Path::new("dump.xml.GZ")), Some(DumpFormat::Gzip));
        assert_eq!(DumpFormat::detect(Path::new("dump.xml.lzma")), Some(DumpFormat::Lzma));
        assert_eq!(DumpFormat::detect(Path::new("dump.zim")), None);
        assert_eq!(DumpFormat::detect(Path::new("dump")), None);
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let result = open_dump(Path::new("notes.txt"));
        assert!(matches!(result, Err(DecodeError::UnsupportedExtension(_))));
    }

    #[test]
    fn test_open_bzip2_dump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.xml.bz2");
        let mut encoder = BzEncoder::new(File::create(&path).unwrap(), Compression::fast());
        encoder.write_all(b"<mediawiki></mediawiki>").unwrap();
        encoder.finish().unwrap();

        let mut contents = String::new();
        open_dump(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "<mediawiki></mediawiki>");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = open_dump(Path::new("/nonexistent/dump.xml.gz"));
        assert!(matches!(result, Err(DecodeError::Io(_))));
    }
}
