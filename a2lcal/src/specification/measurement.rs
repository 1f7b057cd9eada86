use super::ifdata::parse_object_if_data;
use super::{
    ByteOrder, CanapeExt, DataType, IndexMode, SymbolLink, parse_matrix_dim, parse_symbol_link,
};
use crate::parser::{Keyword, ParseContext, ParserError, ParserState};

/// a MEASUREMENT: a runtime variable of the ECU
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub name: String,
    pub long_identifier: String,
    pub datatype: DataType,
    pub conversion: String,
    pub resolution: u16,
    pub accuracy: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub display_identifier: Option<String>,
    pub read_write: bool,
    pub format: Option<String>,
    pub array_size: Option<u16>,
    pub bit_mask: Option<u64>,
    pub byte_order: Option<ByteOrder>,
    pub ecu_address: Option<u32>,
    pub ecu_address_extension: Option<i16>,
    pub matrix_dim: Option<Vec<u16>>,
    pub symbol_link: Option<SymbolLink>,
    pub phys_unit: Option<String>,
    pub layout: Option<IndexMode>,
    pub discrete: bool,
    pub canape_ext: Vec<CanapeExt>,
    pub line: u32,
}

impl_a2l_object!(Measurement);

impl Measurement {
    pub(crate) fn parse(
        parser: &mut ParserState,
        context: &ParseContext,
    ) -> Result<Self, ParserError> {
        let mut measurement = Measurement {
            name: parser.get_identifier(context)?,
            long_identifier: parser.get_string(context)?,
            datatype: parser.get_enum(context, DataType::from_a2l)?,
            conversion: parser.get_identifier(context)?,
            resolution: parser.get_integer(context)?,
            accuracy: parser.get_double(context)?,
            lower_limit: parser.get_double(context)?,
            upper_limit: parser.get_double(context)?,
            display_identifier: None,
            read_write: false,
            format: None,
            array_size: None,
            bit_mask: None,
            byte_order: None,
            ecu_address: None,
            ecu_address_extension: None,
            matrix_dim: None,
            symbol_link: None,
            phys_unit: None,
            layout: None,
            discrete: false,
            canape_ext: Vec::new(),
            line: context.line,
        };
        parser.parse_block_body(context, MEASUREMENT_KEYWORDS, &mut measurement)?;
        Ok(measurement)
    }

    /// the dimensions of an array measurement; empty for a scalar
    ///
    /// MATRIX_DIM takes precedence over the older ARRAY_SIZE
    pub fn dimensions(&self) -> Vec<u16> {
        if let Some(matrix_dim) = &self.matrix_dim {
            let dims = super::effective_matrix_dim(matrix_dim);
            if dims.len() > 1 || dims[0] > 1 {
                return dims;
            }
        } else if let Some(array_size) = self.array_size {
            if array_size > 1 {
                return vec![array_size];
            }
        }
        Vec::new()
    }
}

const MEASUREMENT_KEYWORDS: &[Keyword<Measurement>] = &[
    keyword!("DISPLAY_IDENTIFIER", Forbidden, 1, Some(1), Some(parse_display_identifier)),
    keyword!("READ_WRITE", Forbidden, 0, Some(1), Some(parse_read_write)),
    keyword!("FORMAT", Forbidden, 1, Some(1), Some(parse_format)),
    keyword!("ARRAY_SIZE", Forbidden, 1, Some(1), Some(parse_array_size)),
    keyword!("BIT_MASK", Forbidden, 1, Some(1), Some(parse_bit_mask)),
    keyword!("BYTE_ORDER", Forbidden, 1, Some(1), Some(parse_byte_order)),
    keyword!("ECU_ADDRESS", Forbidden, 1, Some(1), Some(parse_ecu_address)),
    keyword!("ECU_ADDRESS_EXTENSION", Forbidden, 1, Some(1), Some(parse_ecu_address_extension)),
    keyword!("MATRIX_DIM", Forbidden, 1, Some(1), Some(parse_measurement_matrix_dim)),
    keyword!("SYMBOL_LINK", Forbidden, 2, Some(1), Some(parse_measurement_symbol_link)),
    keyword!("PHYS_UNIT", Forbidden, 1, Some(1), Some(parse_phys_unit)),
    keyword!("LAYOUT", Forbidden, 1, Some(1), Some(parse_layout)),
    keyword!("DISCRETE", Forbidden, 0, Some(1), Some(parse_discrete)),
    keyword!("IF_DATA", Required, 0, None, Some(parse_measurement_if_data)),
    keyword!("BIT_OPERATION", Required, 0, Some(1), None),
    keyword!("MAX_REFRESH", Forbidden, 2, Some(1), None),
    keyword!("VIRTUAL", Required, 0, Some(1), None),
    keyword!("FUNCTION_LIST", Required, 0, Some(1), None),
    keyword!("ERROR_MASK", Forbidden, 1, Some(1), None),
    keyword!("REF_MEMORY_SEGMENT", Forbidden, 1, Some(1), None),
    keyword!("ANNOTATION", Required, 0, None, None),
];

fn parse_display_identifier(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.display_identifier = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_read_write(
    _parser: &mut ParserState,
    _context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.read_write = true;
    Ok(())
}

fn parse_format(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.format = Some(parser.get_string(context)?);
    Ok(())
}

fn parse_array_size(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.array_size = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_bit_mask(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.bit_mask = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_byte_order(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.byte_order = Some(parser.get_enum(context, ByteOrder::from_a2l)?);
    Ok(())
}

fn parse_ecu_address(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.ecu_address = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_ecu_address_extension(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.ecu_address_extension = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_measurement_matrix_dim(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.matrix_dim = Some(parse_matrix_dim(parser, context)?);
    Ok(())
}

fn parse_measurement_symbol_link(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.symbol_link = Some(parse_symbol_link(parser, context)?);
    Ok(())
}

fn parse_phys_unit(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.phys_unit = Some(parser.get_string(context)?);
    Ok(())
}

fn parse_layout(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.layout = Some(parser.get_enum(context, IndexMode::from_a2l)?);
    Ok(())
}

fn parse_discrete(
    _parser: &mut ParserState,
    _context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    measurement.discrete = true;
    Ok(())
}

fn parse_measurement_if_data(
    parser: &mut ParserState,
    context: &ParseContext,
    measurement: &mut Measurement,
) -> Result<(), ParserError> {
    if let Some(canape_ext) = parse_object_if_data(parser, context)? {
        measurement.canape_ext.push(canape_ext);
    }
    Ok(())
}
