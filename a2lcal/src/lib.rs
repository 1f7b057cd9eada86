//! a2lcal reads a2l files and uses them to decode and encode calibration and measurement data.
//!
//! An a2l file is parsed into a [`Database`]. A database can be attached to a target, either a
//! static memory image ([`BinaryImage`]) or any other implementation of [`TargetAccess`], through
//! the [`LinkManager`]. The record layout engine then locates the values of characteristics,
//! axes and measurements in the target memory and converts them between raw and physical values.
//!
//! # Features
//!
//! - `export`: write the measurements and parameters of a database as an XCP / CCP ini configuration

mod convert;
mod database;
#[cfg(feature = "export")]
mod export;
mod ini;
mod itemlist;
mod layout;
mod link;
mod loader;
mod parser;
mod query;
mod specification;
mod target;
mod tokenizer;
mod update;
mod value;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use convert::{
    BasicFormulaEvaluator, ConvFlags, ConversionError, ConversionInfo, ConversionKind, Converter,
    FormulaEvaluator, conversion_description,
};
pub use database::Database;
#[cfg(feature = "export")]
pub use export::{ExportFormat, ExportOptions, export_ini, export_ini_file};
pub use ini::IniFile;
pub use itemlist::{A2lObjectLine, A2lObjectName, ItemList};
pub use layout::{AccessError, AccessState, Alignments, LayoutEngine, check_alignment_by_type};
pub use link::{
    AttachOptions, IniReferenceStore, LabelIndex, LinkError, LinkFlags, LinkManager, LinkNr,
    MAX_LINKS, RefDirection, ReferenceStore,
};
pub use parser::ParserError;
pub use query::{
    AxisInfos, FunctionMemberKind, FunctionMembers, LabelTypeMask, NameFilter, ValueInfos,
};
pub use specification::*;
pub use target::{BinaryImage, BlockKind, DataBlock, RequestGroup, TargetAccess, TargetError};
pub use tokenizer::TokenizerError;
pub use update::{AddressPatcher, UpdateMode, UpdateSummary, update_addresses};
pub use value::{A2lData, ArrayValue, LabelType, SingleValue, Value, ValueData, ValueFlags};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum A2lError {
    /// `FileOpenError`: An `IoError` that occurred while loading a file
    #[error("Failed to load {filename}: {ioerror}")]
    FileOpenError {
        filename: PathBuf,
        ioerror: std::io::Error,
    },

    /// `FileReadError`: An `IoError` that occurred while reading from a file
    #[error("Could not read from {filename}: {ioerror}")]
    FileReadError {
        filename: PathBuf,
        ioerror: std::io::Error,
    },

    /// `EmptyFileError`: No tokens found in the file
    #[error("File \"{filename}\" contains no a2l data")]
    EmptyFileError { filename: PathBuf },

    /// `TokenizerError`: Failed to tokenize the input
    #[error("Tokenizer error: {tokenizer_error}")]
    TokenizerError { tokenizer_error: TokenizerError },

    /// `ParserError`: Invalid data, the file could not be parsed
    #[error("Parser error: {parser_error}")]
    ParserError { parser_error: ParserError },
}

/**
Load an a2l file

`strict_parsing` toggles strict parsing: If strict parsing is enabled, unknown keywords and
blocks are errors. Otherwise they are skipped and reported in the returned list of warnings.

All entity lists of the loaded database are sorted by name.

# Example
```no_run
match a2lcal::load("example.a2l", false) {
    Ok((database, log_messages)) => {/* do something with it*/},
    Err(error_message) => println!("{error_message}")
}
```

# Errors

An `A2lError` provides details information if loading the file fails.
 */
pub fn load<P: AsRef<Path>>(
    path: P,
    strict_parsing: bool,
) -> Result<(Database, Vec<A2lError>), A2lError> {
    let pathref = path.as_ref();
    let filedata = loader::load(pathref)?;
    load_impl(pathref, &filedata, strict_parsing)
}

/**
load a2l data stored in a string

# Example

```rust
let text = r#"
ASAP2_VERSION 1 71
/begin PROJECT new_project ""
  /begin MODULE new_module ""
  /end MODULE
/end PROJECT
"#;
let (database, log_msgs) = a2lcal::load_from_string(&text, true).unwrap();
assert_eq!(database.module().name, "new_module");
assert!(log_msgs.is_empty());
```

# Errors

An `A2lError` provides details information if loading the data fails.
 */
pub fn load_from_string(
    a2ldata: &str,
    strict_parsing: bool,
) -> Result<(Database, Vec<A2lError>), A2lError> {
    load_impl(Path::new(""), a2ldata, strict_parsing)
}

fn load_impl(
    path: &Path,
    filedata: &str,
    strict_parsing: bool,
) -> Result<(Database, Vec<A2lError>), A2lError> {
    let filename = path.display().to_string();
    let mut parser = parser::ParserState::new(&filename, filedata, strict_parsing);

    // an input that contains nothing but whitespace and comments is not an a2l file
    let first_token = parser
        .peek_token()
        .map_err(into_a2l_error)?;
    if first_token.is_none() {
        return Err(A2lError::EmptyFileError {
            filename: path.to_path_buf(),
        });
    }

    let (asap2_version, project) =
        specification::parse_a2l_file(&mut parser).map_err(into_a2l_error)?;
    let log_msgs = parser.take_log_msgs();

    let mut database = Database::new(path, asap2_version, project);
    database.sort();
    Ok((database, log_msgs))
}

// tokenizer errors are passed through the parser, but reported separately
fn into_a2l_error(parser_error: ParserError) -> A2lError {
    match parser_error {
        ParserError::Tokenizer(tokenizer_error) => A2lError::TokenizerError { tokenizer_error },
        parser_error => A2lError::ParserError { parser_error },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_empty_input() {
        let result = load_from_string("  /* only a comment */  ", false);
        assert!(matches!(result, Err(A2lError::EmptyFileError { .. })));
    }

    #[test]
    fn load_tokenizer_error() {
        let result = load_from_string("ASAP2_VERSION 1 71 /* open comment", false);
        assert!(matches!(result, Err(A2lError::TokenizerError { .. })));
    }

    #[test]
    fn load_parser_error() {
        let result = load_from_string(
            r#"ASAP2_VERSION 1 71 /begin PROJECT p "" /begin MODULE m "" /end PROJECT"#,
            false,
        );
        assert!(matches!(result, Err(A2lError::ParserError { .. })));
    }

    #[test]
    fn load_sorted() {
        let text = r#"ASAP2_VERSION 1 71
        /begin PROJECT p ""
          /begin MODULE m ""
            /begin MEASUREMENT zeta "" UBYTE NO_COMPU_METHOD 1 0 0 255 /end MEASUREMENT
            /begin MEASUREMENT alpha "" UBYTE NO_COMPU_METHOD 1 0 0 255 /end MEASUREMENT
            /begin UNIT u "" "x" DERIVED /end UNIT
          /end MODULE
        /end PROJECT"#;
        let (database, log_msgs) = load_from_string(text, false).unwrap();
        assert!(log_msgs.is_empty());
        let module = database.module();
        assert_eq!(module.measurements[0].name, "alpha");
        assert_eq!(module.measurements.find_by_name("zeta"), Some(1));
    }

    #[test]
    fn load_strict_unknown_block() {
        let text = r#"ASAP2_VERSION 1 71
        /begin PROJECT p ""
          /begin MODULE m ""
            /begin SOMETHING_NEW x /end SOMETHING_NEW
          /end MODULE
        /end PROJECT"#;
        assert!(load_from_string(text, true).is_err());
        let (_, log_msgs) = load_from_string(text, false).unwrap();
        assert_eq!(log_msgs.len(), 1);
    }
}
