//! SQLite access helper for toolkit-style XML services.
//!
//! # Intention
//!
//! - Open and close SQLite sessions from a locator plus driver options.
//! - Run plain queries into memory and remember the last failure.
//! - Call the XML procedure whose output arrives split across rows and
//!   reassemble it up to the closing `</script>` tag.
//!
//! # Architectural Boundaries
//!
//! - Only database access and result reassembly belong here.
//! - No pooling, transactions or retries.

pub mod error;
pub mod sqlite;
pub mod support;
pub mod xml;

pub use error::{DbError, ErrorState};
pub use sqlite::{
    ConnectOptions, OpenMode, ProcedureBinds, Row, RowSource, Session, Value, MAX_BUSY_TIMEOUT_MS,
};
pub use support::SqliteSupport;
pub use xml::{assemble_xml, XmlAssembler, SCRIPT_END_TAG};
