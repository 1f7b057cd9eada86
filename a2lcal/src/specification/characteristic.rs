use super::ifdata::parse_object_if_data;
use super::{
    AxisAttribute, ByteOrder, CalibrationAccess, CanapeExt, CharacteristicType, Deposit,
    ExtendedLimits, MaxRefresh, Monotony, SymbolLink, parse_extended_limits, parse_matrix_dim,
    parse_max_refresh, parse_symbol_link,
};
use crate::parser::{Keyword, ParseContext, ParserError, ParserState};

/// a CHARACTERISTIC: a calibration parameter of the ECU
#[derive(Debug, Clone, PartialEq)]
pub struct Characteristic {
    pub name: String,
    pub long_identifier: String,
    pub characteristic_type: CharacteristicType,
    pub address: u32,
    /// name of the RECORD_LAYOUT
    pub deposit: String,
    pub max_diff: f64,
    pub conversion: String,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub display_identifier: Option<String>,
    pub format: Option<String>,
    pub byte_order: Option<ByteOrder>,
    pub bit_mask: Option<u64>,
    pub number: Option<u16>,
    pub extended_limits: Option<ExtendedLimits>,
    pub read_only: bool,
    pub guard_rails: bool,
    pub max_refresh: Option<MaxRefresh>,
    pub ref_memory_segment: Option<String>,
    pub comparison_quantity: Option<String>,
    pub calibration_access: Option<CalibrationAccess>,
    pub matrix_dim: Option<Vec<u16>>,
    pub ecu_address_extension: Option<i16>,
    pub symbol_link: Option<SymbolLink>,
    pub phys_unit: Option<String>,
    pub discrete: bool,
    pub step_size: Option<f64>,
    /// AXIS_DESCR of the x axis first, then the y axis
    pub axis_descr: Vec<AxisDescr>,
    pub canape_ext: Vec<CanapeExt>,
    pub line: u32,
}

/// the description of one axis of a CURVE or MAP
#[derive(Debug, Clone, PartialEq)]
pub struct AxisDescr {
    pub attribute: AxisAttribute,
    pub input_quantity: String,
    pub conversion: String,
    pub max_axis_points: u16,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub read_only: bool,
    pub format: Option<String>,
    pub axis_pts_ref: Option<String>,
    pub max_grad: Option<f64>,
    pub monotony: Option<Monotony>,
    pub byte_order: Option<ByteOrder>,
    pub extended_limits: Option<ExtendedLimits>,
    pub fix_axis: Option<FixAxis>,
    pub deposit: Option<Deposit>,
    pub curve_axis_ref: Option<String>,
    pub phys_unit: Option<String>,
    pub step_size: Option<f64>,
    pub line: u32,
}

/// the values of a fixed axis are not stored in memory, but calculated from the description
#[derive(Debug, Clone, PartialEq)]
pub enum FixAxis {
    /// FIX_AXIS_PAR: `offset + i * 2^shift`
    Par { offset: f64, shift: f64, count: u16 },
    /// FIX_AXIS_PAR_DIST: `offset + i * distance`
    ParDist { offset: f64, distance: f64, count: u16 },
    /// FIX_AXIS_PAR_LIST: the literal axis points
    ParList(Vec<f64>),
}

impl_a2l_object!(Characteristic);

impl Characteristic {
    pub(crate) fn parse(
        parser: &mut ParserState,
        context: &ParseContext,
    ) -> Result<Self, ParserError> {
        let mut characteristic = Characteristic {
            name: parser.get_identifier(context)?,
            long_identifier: parser.get_string(context)?,
            characteristic_type: parser.get_enum(context, CharacteristicType::from_a2l)?,
            address: parser.get_integer(context)?,
            deposit: parser.get_identifier(context)?,
            max_diff: parser.get_double(context)?,
            conversion: parser.get_identifier(context)?,
            lower_limit: parser.get_double(context)?,
            upper_limit: parser.get_double(context)?,
            display_identifier: None,
            format: None,
            byte_order: None,
            bit_mask: None,
            number: None,
            extended_limits: None,
            read_only: false,
            guard_rails: false,
            max_refresh: None,
            ref_memory_segment: None,
            comparison_quantity: None,
            calibration_access: None,
            matrix_dim: None,
            ecu_address_extension: None,
            symbol_link: None,
            phys_unit: None,
            discrete: false,
            step_size: None,
            axis_descr: Vec::new(),
            canape_ext: Vec::new(),
            line: context.line,
        };
        parser.parse_block_body(context, CHARACTERISTIC_KEYWORDS, &mut characteristic)?;
        Ok(characteristic)
    }

    /// true if the characteristic may not be written: READ_ONLY or any calibration access other than CALIBRATION
    pub fn is_read_only(&self) -> bool {
        self.read_only
            || matches!(
                self.calibration_access,
                Some(CalibrationAccess::NoCalibration | CalibrationAccess::NotInMcdSystem)
            )
    }
}

impl FixAxis {
    pub fn count(&self) -> usize {
        match self {
            FixAxis::Par { count, .. } | FixAxis::ParDist { count, .. } => usize::from(*count),
            FixAxis::ParList(values) => values.len(),
        }
    }

    /// the axis point at the given index
    pub fn value(&self, idx: usize) -> Option<f64> {
        if idx >= self.count() {
            return None;
        }
        match self {
            FixAxis::Par { offset, shift, .. } => Some(offset + idx as f64 * 2f64.powf(*shift)),
            FixAxis::ParDist {
                offset, distance, ..
            } => Some(offset + idx as f64 * distance),
            FixAxis::ParList(values) => values.get(idx).copied(),
        }
    }
}

const CHARACTERISTIC_KEYWORDS: &[Keyword<Characteristic>] = &[
    keyword!("DISPLAY_IDENTIFIER", Forbidden, 1, Some(1), Some(parse_display_identifier)),
    keyword!("FORMAT", Forbidden, 1, Some(1), Some(parse_format)),
    keyword!("BYTE_ORDER", Forbidden, 1, Some(1), Some(parse_byte_order)),
    keyword!("BIT_MASK", Forbidden, 1, Some(1), Some(parse_bit_mask)),
    keyword!("NUMBER", Forbidden, 1, Some(1), Some(parse_number)),
    keyword!("EXTENDED_LIMITS", Forbidden, 2, Some(1), Some(parse_characteristic_extended_limits)),
    keyword!("READ_ONLY", Forbidden, 0, Some(1), Some(parse_read_only)),
    keyword!("GUARD_RAILS", Forbidden, 0, Some(1), Some(parse_guard_rails)),
    keyword!("MAX_REFRESH", Forbidden, 2, Some(1), Some(parse_characteristic_max_refresh)),
    keyword!("REF_MEMORY_SEGMENT", Forbidden, 1, Some(1), Some(parse_ref_memory_segment)),
    keyword!("COMPARISON_QUANTITY", Forbidden, 1, Some(1), Some(parse_comparison_quantity)),
    keyword!("CALIBRATION_ACCESS", Forbidden, 1, Some(1), Some(parse_calibration_access)),
    keyword!("MATRIX_DIM", Forbidden, 1, Some(1), Some(parse_characteristic_matrix_dim)),
    keyword!("ECU_ADDRESS_EXTENSION", Forbidden, 1, Some(1), Some(parse_ecu_address_extension)),
    keyword!("SYMBOL_LINK", Forbidden, 2, Some(1), Some(parse_characteristic_symbol_link)),
    keyword!("PHYS_UNIT", Forbidden, 1, Some(1), Some(parse_phys_unit)),
    keyword!("DISCRETE", Forbidden, 0, Some(1), Some(parse_discrete)),
    keyword!("STEP_SIZE", Forbidden, 1, Some(1), Some(parse_step_size)),
    keyword!("AXIS_DESCR", Required, 0, Some(2), Some(parse_characteristic_axis_descr)),
    keyword!("IF_DATA", Required, 0, None, Some(parse_characteristic_if_data)),
    keyword!("FUNCTION_LIST", Required, 0, Some(1), None),
    keyword!("MAP_LIST", Required, 0, Some(1), None),
    keyword!("DEPENDENT_CHARACTERISTIC", Required, 0, Some(1), None),
    keyword!("VIRTUAL_CHARACTERISTIC", Required, 0, Some(1), None),
    keyword!("ANNOTATION", Required, 0, None, None),
];

fn parse_display_identifier(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.display_identifier = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_format(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.format = Some(parser.get_string(context)?);
    Ok(())
}

fn parse_byte_order(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.byte_order = Some(parser.get_enum(context, ByteOrder::from_a2l)?);
    Ok(())
}

fn parse_bit_mask(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.bit_mask = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_number(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.number = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_characteristic_extended_limits(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.extended_limits = Some(parse_extended_limits(parser, context)?);
    Ok(())
}

fn parse_read_only(
    _parser: &mut ParserState,
    _context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.read_only = true;
    Ok(())
}

fn parse_guard_rails(
    _parser: &mut ParserState,
    _context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.guard_rails = true;
    Ok(())
}

fn parse_characteristic_max_refresh(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.max_refresh = Some(parse_max_refresh(parser, context)?);
    Ok(())
}

fn parse_ref_memory_segment(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.ref_memory_segment = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_comparison_quantity(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.comparison_quantity = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_calibration_access(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.calibration_access =
        Some(parser.get_enum(context, CalibrationAccess::from_a2l)?);
    Ok(())
}

fn parse_characteristic_matrix_dim(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.matrix_dim = Some(parse_matrix_dim(parser, context)?);
    Ok(())
}

fn parse_ecu_address_extension(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.ecu_address_extension = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_characteristic_symbol_link(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.symbol_link = Some(parse_symbol_link(parser, context)?);
    Ok(())
}

fn parse_phys_unit(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.phys_unit = Some(parser.get_string(context)?);
    Ok(())
}

fn parse_discrete(
    _parser: &mut ParserState,
    _context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.discrete = true;
    Ok(())
}

fn parse_step_size(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    characteristic.step_size = Some(parser.get_double(context)?);
    Ok(())
}

fn parse_characteristic_axis_descr(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    let axis_descr = AxisDescr::parse(parser, context)?;
    characteristic.axis_descr.push(axis_descr);
    Ok(())
}

fn parse_characteristic_if_data(
    parser: &mut ParserState,
    context: &ParseContext,
    characteristic: &mut Characteristic,
) -> Result<(), ParserError> {
    if let Some(canape_ext) = parse_object_if_data(parser, context)? {
        characteristic.canape_ext.push(canape_ext);
    }
    Ok(())
}

impl AxisDescr {
    pub(crate) fn parse(
        parser: &mut ParserState,
        context: &ParseContext,
    ) -> Result<Self, ParserError> {
        let mut axis_descr = AxisDescr {
            attribute: parser.get_enum(context, AxisAttribute::from_a2l)?,
            input_quantity: parser.get_identifier(context)?,
            conversion: parser.get_identifier(context)?,
            max_axis_points: parser.get_integer(context)?,
            lower_limit: parser.get_double(context)?,
            upper_limit: parser.get_double(context)?,
            read_only: false,
            format: None,
            axis_pts_ref: None,
            max_grad: None,
            monotony: None,
            byte_order: None,
            extended_limits: None,
            fix_axis: None,
            deposit: None,
            curve_axis_ref: None,
            phys_unit: None,
            step_size: None,
            line: context.line,
        };
        parser.parse_block_body(context, AXIS_DESCR_KEYWORDS, &mut axis_descr)?;
        Ok(axis_descr)
    }
}

const AXIS_DESCR_KEYWORDS: &[Keyword<AxisDescr>] = &[
    keyword!("READ_ONLY", Forbidden, 0, Some(1), Some(parse_axis_read_only)),
    keyword!("FORMAT", Forbidden, 1, Some(1), Some(parse_axis_format)),
    keyword!("AXIS_PTS_REF", Forbidden, 1, Some(1), Some(parse_axis_pts_ref)),
    keyword!("MAX_GRAD", Forbidden, 1, Some(1), Some(parse_max_grad)),
    keyword!("MONOTONY", Forbidden, 1, Some(1), Some(parse_monotony)),
    keyword!("BYTE_ORDER", Forbidden, 1, Some(1), Some(parse_axis_byte_order)),
    keyword!("EXTENDED_LIMITS", Forbidden, 2, Some(1), Some(parse_axis_extended_limits)),
    keyword!("FIX_AXIS_PAR", Forbidden, 3, Some(1), Some(parse_fix_axis_par)),
    keyword!("FIX_AXIS_PAR_DIST", Forbidden, 3, Some(1), Some(parse_fix_axis_par_dist)),
    keyword!("FIX_AXIS_PAR_LIST", Required, 0, Some(1), Some(parse_fix_axis_par_list)),
    keyword!("DEPOSIT", Forbidden, 1, Some(1), Some(parse_axis_deposit)),
    keyword!("CURVE_AXIS_REF", Forbidden, 1, Some(1), Some(parse_curve_axis_ref)),
    keyword!("PHYS_UNIT", Forbidden, 1, Some(1), Some(parse_axis_phys_unit)),
    keyword!("STEP_SIZE", Forbidden, 1, Some(1), Some(parse_axis_step_size)),
    keyword!("ANNOTATION", Required, 0, None, None),
];

fn parse_axis_read_only(
    _parser: &mut ParserState,
    _context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.read_only = true;
    Ok(())
}

fn parse_axis_format(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.format = Some(parser.get_string(context)?);
    Ok(())
}

fn parse_axis_pts_ref(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.axis_pts_ref = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_max_grad(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.max_grad = Some(parser.get_double(context)?);
    Ok(())
}

fn parse_monotony(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.monotony = Some(parser.get_enum(context, Monotony::from_a2l)?);
    Ok(())
}

fn parse_axis_byte_order(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.byte_order = Some(parser.get_enum(context, ByteOrder::from_a2l)?);
    Ok(())
}

fn parse_axis_extended_limits(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.extended_limits = Some(parse_extended_limits(parser, context)?);
    Ok(())
}

fn parse_fix_axis_par(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    let offset = parser.get_double(context)?;
    let shift = parser.get_double(context)?;
    let count = parser.get_integer(context)?;
    axis_descr.fix_axis = Some(FixAxis::Par {
        offset,
        shift,
        count,
    });
    Ok(())
}

fn parse_fix_axis_par_dist(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    let offset = parser.get_double(context)?;
    let distance = parser.get_double(context)?;
    let count = parser.get_integer(context)?;
    axis_descr.fix_axis = Some(FixAxis::ParDist {
        offset,
        distance,
        count,
    });
    Ok(())
}

fn parse_fix_axis_par_list(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    let mut values = Vec::new();
    while parser.next_is_number()? {
        values.push(parser.get_double(context)?);
    }
    axis_descr.fix_axis = Some(FixAxis::ParList(values));
    Ok(())
}

fn parse_axis_deposit(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.deposit = Some(parser.get_enum(context, Deposit::from_a2l)?);
    Ok(())
}

fn parse_curve_axis_ref(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.curve_axis_ref = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_axis_phys_unit(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.phys_unit = Some(parser.get_string(context)?);
    Ok(())
}

fn parse_axis_step_size(
    parser: &mut ParserState,
    context: &ParseContext,
    axis_descr: &mut AxisDescr,
) -> Result<(), ParserError> {
    axis_descr.step_size = Some(parser.get_double(context)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_characteristic(text: &str) -> Result<Characteristic, ParserError> {
        let mut parser = ParserState::new("test", text, true);
        let context = ParseContext {
            element: "CHARACTERISTIC".to_string(),
            line: 1,
        };
        let characteristic = Characteristic::parse(&mut parser, &context)?;
        parser.expect_end(&context)?;
        Ok(characteristic)
    }

    #[test]
    fn characteristic_value() {
        let characteristic = parse_characteristic(
            r#"val "a value" VALUE 0x2000 RL_UWORD 0 NO_COMPU_METHOD 0 1000 READ_ONLY /end CHARACTERISTIC"#,
        )
        .unwrap();
        assert_eq!(characteristic.characteristic_type, CharacteristicType::Value);
        assert_eq!(characteristic.address, 0x2000);
        assert_eq!(characteristic.deposit, "RL_UWORD");
        assert!(characteristic.read_only);
        assert!(characteristic.is_read_only());
        assert!(characteristic.axis_descr.is_empty());
    }

    #[test]
    fn characteristic_map_with_axes() {
        let characteristic = parse_characteristic(
            r#"map "" MAP 0x3000 RL_MAP 0 conv 0 100
                /begin AXIS_DESCR COM_AXIS rpm conv_rpm 8 0 8000
                    AXIS_PTS_REF ax_rpm
                    MONOTONY STRICT_INCREASE
                    PHYS_UNIT "1/min"
                /end AXIS_DESCR
                /begin AXIS_DESCR FIX_AXIS load NO_COMPU_METHOD 4 0 100
                    FIX_AXIS_PAR_DIST 10 20 4
                    CURVE_AXIS_REF some_curve
                /end AXIS_DESCR
                CALIBRATION_ACCESS NO_CALIBRATION
                EXTENDED_LIMITS -10 110
            /end CHARACTERISTIC"#,
        )
        .unwrap();
        assert_eq!(characteristic.axis_descr.len(), 2);
        let x_axis = &characteristic.axis_descr[0];
        assert_eq!(x_axis.attribute, AxisAttribute::ComAxis);
        assert_eq!(x_axis.axis_pts_ref.as_deref(), Some("ax_rpm"));
        assert_eq!(x_axis.phys_unit.as_deref(), Some("1/min"));
        assert_eq!(x_axis.monotony, Some(Monotony::StrictIncrease));
        let y_axis = &characteristic.axis_descr[1];
        assert_eq!(y_axis.curve_axis_ref.as_deref(), Some("some_curve"));
        let fix_axis = y_axis.fix_axis.as_ref().unwrap();
        assert_eq!(fix_axis.count(), 4);
        assert_eq!(fix_axis.value(3), Some(70.0));
        assert_eq!(fix_axis.value(4), None);
        assert!(characteristic.is_read_only());
        assert_eq!(characteristic.extended_limits.unwrap().lower_limit, -10.0);
    }

    #[test]
    fn fix_axis_variants() {
        let characteristic = parse_characteristic(
            r#"c "" CURVE 0x10 RL 0 conv 0 100
                /begin AXIS_DESCR FIX_AXIS q NO_COMPU_METHOD 3 0 100
                    /begin FIX_AXIS_PAR_LIST 1 5 9.5 /end FIX_AXIS_PAR_LIST
                /end AXIS_DESCR
            /end CHARACTERISTIC"#,
        )
        .unwrap();
        let fix_axis = characteristic.axis_descr[0].fix_axis.as_ref().unwrap();
        assert_eq!(fix_axis, &FixAxis::ParList(vec![1.0, 5.0, 9.5]));

        let par = FixAxis::Par {
            offset: 0.0,
            shift: 2.0,
            count: 3,
        };
        assert_eq!(par.value(2), Some(8.0));
    }

    #[test]
    fn too_many_axis_descr() {
        let axis = "/begin AXIS_DESCR STD_AXIS q NO_COMPU_METHOD 3 0 100 /end AXIS_DESCR";
        let text = format!("c \"\" MAP 0x10 RL 0 conv 0 100 {axis} {axis} {axis} /end CHARACTERISTIC");
        let result = parse_characteristic(&text);
        assert!(matches!(
            result,
            Err(ParserError::InvalidMultiplicityTooMany { .. })
        ));
    }
}
