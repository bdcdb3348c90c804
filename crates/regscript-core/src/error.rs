// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Fatal script errors.
//!
//! Per-line problems in `.reg` input are not errors at this level; they are
//! [`LineError`](crate::grammar::LineError)s, logged and counted by the
//! importer while the scan continues.

use std::io;
use std::path::PathBuf;

use regscript_store::StoreError;
use thiserror::Error;

/// Errors that abort an import, export or script load.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The input or output stream could not be opened.
    #[error("[SCRIPT_STREAM_OPEN] {}: {source}", path.display())]
    StreamOpen {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The leading byte-order marker names an encoding the reader cannot frame.
    #[error("[SCRIPT_UNSUPPORTED_ENCODING] {0}")]
    UnsupportedEncoding(&'static str),
    /// Writing the exported script failed.
    #[error("[SCRIPT_WRITE] {0}")]
    Write(#[from] io::Error),
    /// An `.rgs` script does not parse.
    #[error("[SCRIPT_SYNTAX] line {line}: {message}")]
    Syntax {
        /// 1-based line of the offending token.
        line: usize,
        /// What was expected.
        message: String,
    },
    /// A store operation failed where the caller cannot recover.
    #[error(transparent)]
    Store(#[from] StoreError),
}
