use super::ifdata::parse_object_if_data;
use super::{
    ByteOrder, CalibrationAccess, CanapeExt, Deposit, ExtendedLimits, Monotony, SymbolLink,
    parse_extended_limits, parse_symbol_link,
};
use crate::parser::{Keyword, ParseContext, ParserError, ParserState};

/// AXIS_PTS: an axis stored separately in memory, which can be shared by several characteristics
#[derive(Debug, Clone, PartialEq)]
pub struct AxisPts {
    pub name: String,
    pub long_identifier: String,
    pub address: u32,
    pub input_quantity: String,
    /// name of the RECORD_LAYOUT
    pub deposit_record: String,
    pub max_diff: f64,
    pub conversion: String,
    pub max_axis_points: u16,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub display_identifier: Option<String>,
    pub read_only: bool,
    pub format: Option<String>,
    pub deposit: Option<Deposit>,
    pub byte_order: Option<ByteOrder>,
    pub ref_memory_segment: Option<String>,
    pub guard_rails: bool,
    pub extended_limits: Option<ExtendedLimits>,
    pub calibration_access: Option<CalibrationAccess>,
    pub ecu_address_extension: Option<i16>,
    pub symbol_link: Option<SymbolLink>,
    pub phys_unit: Option<String>,
    pub monotony: Option<Monotony>,
    pub step_size: Option<f64>,
    pub canape_ext: Vec<CanapeExt>,
    pub line: u32,
}

impl_a2l_object!(AxisPts);

impl AxisPts {
    pub(crate) fn parse(
        parser: &mut ParserState,
        context: &ParseContext,
    ) -> Result<Self, ParserError> {
        let mut axis_pts = AxisPts {
            name: parser.get_identifier(context)?,
            long_identifier: parser.get_string(context)?,
            address: parser.get_integer(context)?,
            input_quantity: parser.get_identifier(context)?,
            deposit_record: parser.get_identifier(context)?,
            max_diff: parser.get_double(context)?,
            conversion: parser.get_identifier(context)?,
            max_axis_points: parser.get_integer(context)?,
            lower_limit: parser.get_double(context)?,
            upper_limit: parser.get_double(context)?,
            display_identifier: None,
            read_only: false,
            format: None,
            deposit: None,
            byte_order: None,
            ref_memory_segment: None,
            guard_rails: false,
            extended_limits: None,
            calibration_access: None,
            ecu_address_extension: None,
            symbol_link: None,
            phys_unit: None,
            monotony: None,
            step_size: None,
            canape_ext: Vec::new(),
            line: context.line,
        };
        parser.parse_block_body(context, AXIS_PTS_KEYWORDS, &mut axis_pts)?;
        Ok(axis_pts)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
            || matches!(
                self.calibration_access,
                Some(CalibrationAccess::NoCalibration | CalibrationAccess::NotInMcdSystem)
            )
    }
}

const AXIS_PTS_KEYWORDS: &[Keyword<AxisPts>] = &[
    keyword!("DISPLAY_IDENTIFIER", Forbidden, 1, Some(1), Some(parse_display_identifier)),
    keyword!("READ_ONLY", Forbidden, 0, Some(1), Some(parse_read_only)),
    keyword!("FORMAT", Forbidden, 1, Some(1), Some(parse_format)),
    keyword!("DEPOSIT", Forbidden, 1, Some(1), Some(parse_deposit)),
    keyword!("BYTE_ORDER", Forbidden, 1, Some(1), Some(parse_byte_order)),
    keyword!("REF_MEMORY_SEGMENT", Forbidden, 1, Some(1), Some(parse_ref_memory_segment)),
    keyword!("GUARD_RAILS", Forbidden, 0, Some(1), Some(parse_guard_rails)),
    keyword!("EXTENDED_LIMITS", Forbidden, 2, Some(1), Some(parse_axis_pts_extended_limits)),
    keyword!("CALIBRATION_ACCESS", Forbidden, 1, Some(1), Some(parse_calibration_access)),
    keyword!("ECU_ADDRESS_EXTENSION", Forbidden, 1, Some(1), Some(parse_ecu_address_extension)),
    keyword!("SYMBOL_LINK", Forbidden, 2, Some(1), Some(parse_axis_pts_symbol_link)),
    keyword!("PHYS_UNIT", Forbidden, 1, Some(1), Some(parse_phys_unit)),
    keyword!("MONOTONY", Forbidden, 1, Some(1), Some(parse_monotony)),
    keyword!("STEP_SIZE", Forbidden, 1, Some(1), Some(parse_step_size)),
    keyword!("IF_DATA", Required, 0, None, Some(parse_axis_pts_if_data)),
    keyword!("FUNCTION_LIST", Required, 0, Some(1), None),
    keyword!("ANNOTATION", Required, 0, None, None),
];

fn parse_display_identifier(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.display_identifier = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_read_only(
    _parser: &mut ParserState,
    _context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.read_only = true;
    Ok(())
}

fn parse_format(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.format = Some(parser.get_string(context)?);
    Ok(())
}

fn parse_deposit(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.deposit = Some(parser.get_enum(context, Deposit::from_a2l)?);
    Ok(())
}

fn parse_byte_order(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.byte_order = Some(parser.get_enum(context, ByteOrder::from_a2l)?);
    Ok(())
}

fn parse_ref_memory_segment(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.ref_memory_segment = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_guard_rails(
    _parser: &mut ParserState,
    _context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.guard_rails = true;
    Ok(())
}

fn parse_axis_pts_extended_limits(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.extended_limits = Some(parse_extended_limits(parser, context)?);
    Ok(())
}

fn parse_calibration_access(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.calibration_access = Some(parser.get_enum(context, CalibrationAccess::from_a2l)?);
    Ok(())
}

fn parse_ecu_address_extension(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.ecu_address_extension = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_axis_pts_symbol_link(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.symbol_link = Some(parse_symbol_link(parser, context)?);
    Ok(())
}

fn parse_phys_unit(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.phys_unit = Some(parser.get_string(context)?);
    Ok(())
}

fn parse_monotony(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.monotony = Some(parser.get_enum(context, Monotony::from_a2l)?);
    Ok(())
}

fn parse_step_size(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    axis_pts.step_size = Some(parser.get_double(context)?);
    Ok(())
}

fn parse_axis_pts_if_data(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_pts: &mut AxisPts,
) -> Result<(), ParserError> {
    if let Some(canape_ext) = parse_object_if_data(parser, context)? {
        axis_pts.canape_ext.push(canape_ext);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_pts() {
        let mut parser = ParserState::new(
            "test",
            r#"ax_rpm "rpm axis" 0x4000 rpm RL_AXIS 0 conv_rpm 8 0 8000
                DEPOSIT ABSOLUTE
                BYTE_ORDER MSB_LAST
                CALIBRATION_ACCESS CALIBRATION
                SYMBOL_LINK "ax_rpm" 0
                /begin FUNCTION_LIST f1 f2 /end FUNCTION_LIST
            /end AXIS_PTS"#,
            true,
        );
        let context = ParseContext {
            element: "AXIS_PTS".to_string(),
            line: 3,
        };
        let axis_pts = AxisPts::parse(&mut parser, &context).unwrap();
        parser.expect_end(&context).unwrap();
        assert_eq!(axis_pts.address, 0x4000);
        assert_eq!(axis_pts.deposit_record, "RL_AXIS");
        assert_eq!(axis_pts.max_axis_points, 8);
        assert_eq!(axis_pts.deposit, Some(Deposit::Absolute));
        assert!(!axis_pts.is_read_only());
        assert_eq!(axis_pts.line, 3);
    }
}
