//! Dump decoding
//!
//! Turns a compressed MediaWiki export into a lazy stream of typed records.
//!
//! # Example Usage
//!
//! ```no_run
//! use wikidat::import::{open_dump, DumpDecoder};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let stream = open_dump(Path::new("enwiki-latest-pages-meta-history1.xml.bz2"))?;
//! for record in DumpDecoder::new(stream) {
//!     let record = record?;
//!     println!("{} {}", record.kind(), record.id());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//!  dump file ──► open_dump ──► DumpDecoder ──► Record::{Page, Revision, LogItem}
//!   (.xml, .bz2,   (bzip2 in-process,  (quick-xml events,
//!    .gz, .7z,      zcat / 7za / lzcat  one page in flight)
//!    .lzma)         child processes)
//! ```

pub mod decoder;
pub mod progress;
pub mod source;

pub use decoder::{read_namespaces, DecoderStats, DumpDecoder};
pub use progress::{DecodeProgress, DecodeStats};
pub use source::{open_dump, DecodeError, DumpFormat, DumpStream};
