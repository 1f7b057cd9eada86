use crate::parser::{Keyword, ParseContext, ParserError, ParserState};

/// FUNCTION: groups the characteristics and measurements of one software function
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Function {
    pub name: String,
    pub long_identifier: String,
    pub def_characteristic: Vec<String>,
    pub ref_characteristic: Vec<String>,
    pub in_measurement: Vec<String>,
    pub out_measurement: Vec<String>,
    pub loc_measurement: Vec<String>,
    pub sub_function: Vec<String>,
    pub function_version: Option<String>,
    pub line: u32,
}

impl_a2l_object!(Function);

impl Function {
    pub(crate) fn parse(
        parser: &mut ParserState,
        context: &ParseContext,
    ) -> Result<Self, ParserError> {
        let mut function = Function {
            name: parser.get_identifier(context)?,
            long_identifier: parser.get_string(context)?,
            line: context.line,
            ..Default::default()
        };
        parser.parse_block_body(context, FUNCTION_KEYWORDS, &mut function)?;
        Ok(function)
    }
}

const FUNCTION_KEYWORDS: &[Keyword<Function>] = &[
    keyword!("DEF_CHARACTERISTIC", Required, 0, Some(1), Some(parse_member_list)),
    keyword!("REF_CHARACTERISTIC", Required, 0, Some(1), Some(parse_member_list)),
    keyword!("IN_MEASUREMENT", Required, 0, Some(1), Some(parse_member_list)),
    keyword!("OUT_MEASUREMENT", Required, 0, Some(1), Some(parse_member_list)),
    keyword!("LOC_MEASUREMENT", Required, 0, Some(1), Some(parse_member_list)),
    keyword!("SUB_FUNCTION", Required, 0, Some(1), Some(parse_member_list)),
    keyword!("FUNCTION_VERSION", Forbidden, 1, Some(1), Some(parse_function_version)),
    keyword!("ANNOTATION", Required, 0, None, None),
    keyword!("IF_DATA", Required, 0, None, None),
];

// all member lists have the same syntax; the context tells which list is being parsed
fn parse_member_list(
    parser: &mut ParserState,
    context: &ParseContext,
    function: &mut Function,
) -> Result<(), ParserError> {
    let names = parser.get_identifier_list(context)?;
    let list = match context.element.as_str() {
        "DEF_CHARACTERISTIC" => &mut function.def_characteristic,
        "REF_CHARACTERISTIC" => &mut function.ref_characteristic,
        "IN_MEASUREMENT" => &mut function.in_measurement,
        "OUT_MEASUREMENT" => &mut function.out_measurement,
        "LOC_MEASUREMENT" => &mut function.loc_measurement,
        _ => &mut function.sub_function,
    };
    *list = names;
    Ok(())
}

fn parse_function_version(
    parser: &mut ParserState,
    context: &ParseContext,
    function: &mut Function,
) -> Result<(), ParserError> {
    function.function_version = Some(parser.get_string(context)?);
    Ok(())
}
