//! The a2l data model and the keyword tables used to parse it
//!
//! Each block type of the a2l grammar is represented by a struct. The struct's fixed
//! (positional) fields are read first; all optional keywords and sub-blocks are then handled
//! through the block's keyword table.

// shorthand for the entries of the keyword tables
macro_rules! keyword {
    ($name:literal, $block:ident, $params:expr, $max:expr, $handler:expr) => {
        $crate::parser::Keyword {
            name: $name,
            block: $crate::parser::BlockUse::$block,
            params: $params,
            max_count: $max,
            handler: $handler,
        }
    };
}

// all named entities carry their name and the line of their definition
macro_rules! impl_a2l_object {
    ($($t:ty),+) => {
        $(
            impl $crate::itemlist::A2lObjectName for $t {
                fn get_name(&self) -> &str {
                    &self.name
                }
            }

            impl $crate::itemlist::A2lObjectLine for $t {
                fn get_line(&self) -> u32 {
                    self.line
                }
            }
        )+
    };
}

mod axis_pts;
mod characteristic;
mod compu;
mod enums;
mod function;
mod ifdata;
mod measurement;
mod project;
mod record_layout;

pub use axis_pts::AxisPts;
pub use characteristic::{AxisDescr, Characteristic, FixAxis};
pub use compu::{Coeffs, CoeffsLinear, CompuMethod, CompuTab, CompuTabData, Formula};
pub use enums::*;
pub use function::Function;
pub use ifdata::{
    CanapeDisplay, CanapeExt, DaqListCanId, IfDataXcp, LinkMap, ProtocolLayer, XcpOnCan,
};
pub use measurement::Measurement;
pub use project::{AlignmentOverrides, ModCommon, Module, Project};
pub use record_layout::{AxisId, LayoutItem, LayoutItemKind, RecordLayout};

pub(crate) use project::parse_a2l_file;

use crate::itemlist::{A2lObjectLine, A2lObjectName, ItemList};
use crate::parser::{ParseContext, ParserError, ParserState};

/// the conversion name that stands for "no conversion"
pub const NO_COMPU_METHOD: &str = "NO_COMPU_METHOD";

/// SYMBOL_LINK: the name of the linker symbol of an object, and an offset from it
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolLink {
    pub symbol_name: String,
    pub offset: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExtendedLimits {
    pub lower_limit: f64,
    pub upper_limit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaxRefresh {
    pub scaling_unit: u16,
    pub rate: u32,
}

pub(crate) fn parse_symbol_link(
    parser: &mut ParserState,
    context: &ParseContext,
) -> Result<SymbolLink, ParserError> {
    let symbol_name = parser.get_string(context)?;
    let offset = parser.get_integer(context)?;
    Ok(SymbolLink {
        symbol_name,
        offset,
    })
}

pub(crate) fn parse_extended_limits(
    parser: &mut ParserState,
    context: &ParseContext,
) -> Result<ExtendedLimits, ParserError> {
    let lower_limit = parser.get_double(context)?;
    let upper_limit = parser.get_double(context)?;
    Ok(ExtendedLimits {
        lower_limit,
        upper_limit,
    })
}

pub(crate) fn parse_max_refresh(
    parser: &mut ParserState,
    context: &ParseContext,
) -> Result<MaxRefresh, ParserError> {
    let scaling_unit = parser.get_integer(context)?;
    let rate = parser.get_integer(context)?;
    Ok(MaxRefresh { scaling_unit, rate })
}

// MATRIX_DIM has three values in older files and one or more in newer ones
pub(crate) fn parse_matrix_dim(
    parser: &mut ParserState,
    context: &ParseContext,
) -> Result<Vec<u16>, ParserError> {
    let mut dims = vec![parser.get_integer(context)?];
    while parser.next_is_number()? {
        dims.push(parser.get_integer(context)?);
    }
    Ok(dims)
}

// a 1-dimensional object may have MATRIX_DIM 4 1 1; trailing 1s do not add a dimension
pub(crate) fn effective_matrix_dim(matrix_dim: &[u16]) -> Vec<u16> {
    let mut dims = matrix_dim.to_vec();
    while dims.len() > 1 && dims.last() == Some(&1) {
        dims.pop();
    }
    dims
}

// add a parsed entity to its list. A duplicate name is not an error, but only the first
// definition can be found by name
pub(crate) fn add_item<T: A2lObjectName + A2lObjectLine>(
    parser: &mut ParserState,
    context: &ParseContext,
    list: &mut ItemList<T>,
    item: T,
) {
    let name = item.get_name().to_string();
    if let Some(existing) = list.push(item) {
        let first_line = list[existing].get_line();
        parser.log_warning(ParserError::DuplicateName {
            filename: parser.filename().to_string(),
            error_line: context.line,
            blockname: context.element.clone(),
            name,
            first_line,
        });
    }
}
