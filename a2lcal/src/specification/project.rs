use super::{
    AxisPts, ByteOrder, Characteristic, CompuMethod, CompuTab, DataType, Deposit, Function,
    IfDataXcp, Measurement, RecordLayout, add_item,
};
use crate::itemlist::ItemList;
use crate::parser::{Keyword, ParseContext, ParserError, ParserState};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Project {
    pub name: String,
    pub long_identifier: String,
    pub modules: ItemList<Module>,
    pub line: u32,
}

/// a MODULE owns all entities of one ECU
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub name: String,
    pub long_identifier: String,
    pub mod_common: Option<ModCommon>,
    pub if_data_xcp: Option<IfDataXcp>,
    pub measurements: ItemList<Measurement>,
    pub characteristics: ItemList<Characteristic>,
    pub axis_pts: ItemList<AxisPts>,
    pub record_layouts: ItemList<RecordLayout>,
    pub compu_methods: ItemList<CompuMethod>,
    /// COMPU_TAB, COMPU_VTAB and COMPU_VTAB_RANGE share one name space
    pub compu_tabs: ItemList<CompuTab>,
    pub functions: ItemList<Function>,
    pub line: u32,
}

/// module wide defaults for the memory layout
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModCommon {
    pub comment: String,
    pub s_rec_layout: Option<String>,
    pub deposit: Option<Deposit>,
    pub byte_order: Option<ByteOrder>,
    pub data_size: Option<u16>,
    pub alignment: AlignmentOverrides,
}

/// alignment settings of MOD_COMMON or a RECORD_LAYOUT; None keeps the next lower priority setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignmentOverrides {
    pub byte: Option<u32>,
    pub word: Option<u32>,
    pub long: Option<u32>,
    pub int64: Option<u32>,
    pub float16: Option<u32>,
    pub float32: Option<u32>,
    pub float64: Option<u32>,
}

impl_a2l_object!(Module);

impl Module {
    /// sort all entity lists by name
    pub fn sort(&mut self) {
        self.measurements.sort_by_name();
        self.characteristics.sort_by_name();
        self.axis_pts.sort_by_name();
        self.record_layouts.sort_by_name();
        self.compu_methods.sort_by_name();
        self.compu_tabs.sort_by_name();
        self.functions.sort_by_name();
    }
}

impl AlignmentOverrides {
    /// the alignment setting that applies to the given data type
    pub fn for_type(&self, datatype: DataType) -> Option<u32> {
        match datatype {
            DataType::Ubyte | DataType::Sbyte => self.byte,
            DataType::Uword | DataType::Sword => self.word,
            DataType::Ulong | DataType::Slong => self.long,
            DataType::AUint64 | DataType::AInt64 => self.int64,
            DataType::Float16Ieee => self.float16,
            DataType::Float32Ieee => self.float32,
            DataType::Float64Ieee => self.float64,
        }
    }
}

// handles all ALIGNMENT_* keywords; the keyword is taken from the context
pub(crate) fn parse_alignment(
    parser: &mut ParserState,
    context: &ParseContext,
    alignment: &mut AlignmentOverrides,
) -> Result<(), ParserError> {
    let value = Some(parser.get_integer(context)?);
    match context.element.as_str() {
        "ALIGNMENT_BYTE" => alignment.byte = value,
        "ALIGNMENT_WORD" => alignment.word = value,
        "ALIGNMENT_LONG" => alignment.long = value,
        "ALIGNMENT_INT64" => alignment.int64 = value,
        "ALIGNMENT_FLOAT16_IEEE" => alignment.float16 = value,
        "ALIGNMENT_FLOAT32_IEEE" => alignment.float32 = value,
        "ALIGNMENT_FLOAT64_IEEE" => alignment.float64 = value,
        _ => {}
    }
    Ok(())
}

#[derive(Default)]
struct A2lRoot {
    asap2_version: Option<(u16, u16)>,
    project: Option<Project>,
}

/// parse a complete a2l file: ASAP2_VERSION, A2ML_VERSION and the PROJECT
pub(crate) fn parse_a2l_file(
    parser: &mut ParserState,
) -> Result<(Option<(u16, u16)>, Project), ParserError> {
    let context = ParseContext {
        element: "A2L_FILE".to_string(),
        line: 1,
    };
    let mut root = A2lRoot::default();
    parser.parse_block_body(&context, ROOT_KEYWORDS, &mut root)?;
    parser.check_end_of_input()?;

    // Starting with 1.60, the ASAP2_VERSION element is mandatory. For compatibility with old
    // files, a missing version is only an error if strict parsing is requested
    if root.asap2_version.is_none() {
        parser.error_or_log(ParserError::MissingVersionInfo)?;
    }
    let project = root.project.ok_or_else(|| ParserError::MissingProject {
        filename: parser.filename().to_string(),
    })?;

    Ok((root.asap2_version, project))
}

const ROOT_KEYWORDS: &[Keyword<A2lRoot>] = &[
    keyword!("ASAP2_VERSION", Forbidden, 2, Some(1), Some(parse_asap2_version)),
    keyword!("A2ML_VERSION", Forbidden, 2, Some(1), None),
    keyword!("PROJECT", Required, 0, Some(1), Some(parse_project)),
];

fn parse_asap2_version(
    parser: &mut ParserState,
    context: &ParseContext,
    root: &mut A2lRoot,
) -> Result<(), ParserError> {
    let version_no = parser.get_integer(context)?;
    let upgrade_no = parser.get_integer(context)?;
    root.asap2_version = Some((version_no, upgrade_no));
    Ok(())
}

fn parse_project(
    parser: &mut ParserState,
    context: &ParseContext,
    root: &mut A2lRoot,
) -> Result<(), ParserError> {
    let mut project = Project {
        name: parser.get_identifier(context)?,
        long_identifier: parser.get_string(context)?,
        line: context.line,
        ..Default::default()
    };
    parser.parse_block_body(context, PROJECT_KEYWORDS, &mut project)?;
    root.project = Some(project);
    Ok(())
}

const PROJECT_KEYWORDS: &[Keyword<Project>] = &[
    keyword!("HEADER", Required, 0, Some(1), None),
    keyword!("MODULE", Required, 0, None, Some(parse_module)),
];

fn parse_module(
    parser: &mut ParserState,
    context: &ParseContext,
    project: &mut Project,
) -> Result<(), ParserError> {
    let mut module = Module {
        name: parser.get_identifier(context)?,
        long_identifier: parser.get_string(context)?,
        line: context.line,
        ..Default::default()
    };
    parser.parse_block_body(context, MODULE_KEYWORDS, &mut module)?;
    add_item(parser, context, &mut project.modules, module);
    Ok(())
}

const MODULE_KEYWORDS: &[Keyword<Module>] = &[
    keyword!("MOD_COMMON", Required, 0, Some(1), Some(parse_mod_common)),
    keyword!("IF_DATA", Required, 0, None, Some(parse_module_if_data)),
    keyword!("CHARACTERISTIC", Required, 0, None, Some(parse_module_characteristic)),
    keyword!("AXIS_PTS", Required, 0, None, Some(parse_module_axis_pts)),
    keyword!("MEASUREMENT", Required, 0, None, Some(parse_module_measurement)),
    keyword!("COMPU_METHOD", Required, 0, None, Some(parse_module_compu_method)),
    keyword!("COMPU_TAB", Required, 0, None, Some(parse_module_compu_tab)),
    keyword!("COMPU_VTAB", Required, 0, None, Some(parse_module_compu_tab)),
    keyword!("COMPU_VTAB_RANGE", Required, 0, None, Some(parse_module_compu_tab)),
    keyword!("FUNCTION", Required, 0, None, Some(parse_module_function)),
    keyword!("RECORD_LAYOUT", Required, 0, None, Some(parse_module_record_layout)),
    keyword!("A2ML", Required, 0, Some(1), None),
    keyword!("MOD_PAR", Required, 0, Some(1), None),
    keyword!("GROUP", Required, 0, None, None),
    keyword!("VARIANT_CODING", Required, 0, Some(1), None),
    keyword!("FRAME", Required, 0, None, None),
    keyword!("USER_RIGHTS", Required, 0, None, None),
    keyword!("UNIT", Required, 0, None, None),
    keyword!("TYPEDEF_AXIS", Required, 0, None, None),
    keyword!("TYPEDEF_BLOB", Required, 0, None, None),
    keyword!("TYPEDEF_CHARACTERISTIC", Required, 0, None, None),
    keyword!("TYPEDEF_MEASUREMENT", Required, 0, None, None),
    keyword!("TYPEDEF_STRUCTURE", Required, 0, None, None),
    keyword!("INSTANCE", Required, 0, None, None),
    keyword!("BLOB", Required, 0, None, None),
    keyword!("TRANSFORMER", Required, 0, None, None),
];

fn parse_module_if_data(
    parser: &mut ParserState,
    context: &ParseContext,
    module: &mut Module,
) -> Result<(), ParserError> {
    super::ifdata::parse_module_if_data(parser, context, &mut module.if_data_xcp)
}

fn parse_module_characteristic(
    parser: &mut ParserState,
    context: &ParseContext,
    module: &mut Module,
) -> Result<(), ParserError> {
    let characteristic = Characteristic::parse(parser, context)?;
    add_item(parser, context, &mut module.characteristics, characteristic);
    Ok(())
}

fn parse_module_axis_pts(
    parser: &mut ParserState,
    context: &ParseContext,
    module: &mut Module,
) -> Result<(), ParserError> {
    let axis_pts = AxisPts::parse(parser, context)?;
    add_item(parser, context, &mut module.axis_pts, axis_pts);
    Ok(())
}

fn parse_module_measurement(
    parser: &mut ParserState,
    context: &ParseContext,
    module: &mut Module,
) -> Result<(), ParserError> {
    let measurement = Measurement::parse(parser, context)?;
    add_item(parser, context, &mut module.measurements, measurement);
    Ok(())
}

fn parse_module_compu_method(
    parser: &mut ParserState,
    context: &ParseContext,
    module: &mut Module,
) -> Result<(), ParserError> {
    let compu_method = CompuMethod::parse(parser, context)?;
    add_item(parser, context, &mut module.compu_methods, compu_method);
    Ok(())
}

// COMPU_TAB, COMPU_VTAB and COMPU_VTAB_RANGE
fn parse_module_compu_tab(
    parser: &mut ParserState,
    context: &ParseContext,
    module: &mut Module,
) -> Result<(), ParserError> {
    let compu_tab = CompuTab::parse(parser, context)?;
    add_item(parser, context, &mut module.compu_tabs, compu_tab);
    Ok(())
}

fn parse_module_function(
    parser: &mut ParserState,
    context: &ParseContext,
    module: &mut Module,
) -> Result<(), ParserError> {
    let function = Function::parse(parser, context)?;
    add_item(parser, context, &mut module.functions, function);
    Ok(())
}

fn parse_module_record_layout(
    parser: &mut ParserState,
    context: &ParseContext,
    module: &mut Module,
) -> Result<(), ParserError> {
    let record_layout = RecordLayout::parse(parser, context)?;
    add_item(parser, context, &mut module.record_layouts, record_layout);
    Ok(())
}

fn parse_mod_common(
    parser: &mut ParserState,
    context: &ParseContext,
    module: &mut Module,
) -> Result<(), ParserError> {
    let mut mod_common = ModCommon {
        comment: parser.get_string(context)?,
        ..Default::default()
    };
    parser.parse_block_body(context, MOD_COMMON_KEYWORDS, &mut mod_common)?;
    module.mod_common = Some(mod_common);
    Ok(())
}

const MOD_COMMON_KEYWORDS: &[Keyword<ModCommon>] = &[
    keyword!("S_REC_LAYOUT", Forbidden, 1, Some(1), Some(parse_s_rec_layout)),
    keyword!("DEPOSIT", Forbidden, 1, Some(1), Some(parse_mod_common_deposit)),
    keyword!("BYTE_ORDER", Forbidden, 1, Some(1), Some(parse_mod_common_byte_order)),
    keyword!("DATA_SIZE", Forbidden, 1, Some(1), Some(parse_data_size)),
    keyword!("ALIGNMENT_BYTE", Forbidden, 1, Some(1), Some(parse_mod_common_alignment)),
    keyword!("ALIGNMENT_WORD", Forbidden, 1, Some(1), Some(parse_mod_common_alignment)),
    keyword!("ALIGNMENT_LONG", Forbidden, 1, Some(1), Some(parse_mod_common_alignment)),
    keyword!("ALIGNMENT_INT64", Forbidden, 1, Some(1), Some(parse_mod_common_alignment)),
    keyword!("ALIGNMENT_FLOAT16_IEEE", Forbidden, 1, Some(1), Some(parse_mod_common_alignment)),
    keyword!("ALIGNMENT_FLOAT32_IEEE", Forbidden, 1, Some(1), Some(parse_mod_common_alignment)),
    keyword!("ALIGNMENT_FLOAT64_IEEE", Forbidden, 1, Some(1), Some(parse_mod_common_alignment)),
];

fn parse_s_rec_layout(
    parser: &mut ParserState,
    context: &ParseContext,
    mod_common: &mut ModCommon,
) -> Result<(), ParserError> {
    mod_common.s_rec_layout = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_mod_common_deposit(
    parser: &mut ParserState,
    context: &ParseContext,
    mod_common: &mut ModCommon,
) -> Result<(), ParserError> {
    mod_common.deposit = Some(parser.get_enum(context, Deposit::from_a2l)?);
    Ok(())
}

fn parse_mod_common_byte_order(
    parser: &mut ParserState,
    context: &ParseContext,
    mod_common: &mut ModCommon,
) -> Result<(), ParserError> {
    mod_common.byte_order = Some(parser.get_enum(context, ByteOrder::from_a2l)?);
    Ok(())
}

fn parse_data_size(
    parser: &mut ParserState,
    context: &ParseContext,
    mod_common: &mut ModCommon,
) -> Result<(), ParserError> {
    mod_common.data_size = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_mod_common_alignment(
    parser: &mut ParserState,
    context: &ParseContext,
    mod_common: &mut ModCommon,
) -> Result<(), ParserError> {
    parse_alignment(parser, context, &mut mod_common.alignment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str, strict: bool) -> Result<(Option<(u16, u16)>, Project), ParserError> {
        let mut parser = ParserState::new("test", text, strict);
        parse_a2l_file(&mut parser)
    }

    #[test]
    fn minimal_file() {
        let (version, project) = parse(
            r#"ASAP2_VERSION 1 71 /begin PROJECT p "" /begin MODULE m "" /end MODULE /end PROJECT"#,
            true,
        )
        .unwrap();
        assert_eq!(version, Some((1, 71)));
        assert_eq!(project.name, "p");
        assert_eq!(project.modules.len(), 1);
        assert_eq!(project.modules[0].name, "m");
    }

    #[test]
    fn mod_common() {
        let (_, project) = parse(
            r#"ASAP2_VERSION 1 61
            /begin PROJECT p ""
                /begin HEADER "h" VERSION "1" /end HEADER
                /begin MODULE m ""
                    /begin MOD_COMMON "comment"
                        BYTE_ORDER MSB_LAST
                        ALIGNMENT_BYTE 1 ALIGNMENT_WORD 1 ALIGNMENT_FLOAT64_IEEE 4
                        DEPOSIT ABSOLUTE
                    /end MOD_COMMON
                    /begin UNIT u "" "km/h" DERIVED /end UNIT
                /end MODULE
            /end PROJECT"#,
            true,
        )
        .unwrap();
        let mod_common = project.modules[0].mod_common.as_ref().unwrap();
        assert_eq!(mod_common.comment, "comment");
        assert_eq!(mod_common.byte_order, Some(ByteOrder::MsbLast));
        assert_eq!(mod_common.alignment.word, Some(1));
        assert_eq!(mod_common.alignment.long, None);
        assert_eq!(mod_common.alignment.for_type(DataType::Float64Ieee), Some(4));
        assert_eq!(mod_common.deposit, Some(Deposit::Absolute));
    }

    #[test]
    fn missing_version_and_project() {
        let result = parse(r#"/begin PROJECT p "" /end PROJECT"#, true);
        assert!(matches!(result, Err(ParserError::MissingVersionInfo)));

        let mut parser = ParserState::new("test", r#"/begin PROJECT p "" /end PROJECT"#, false);
        assert!(parse_a2l_file(&mut parser).is_ok());
        assert_eq!(parser.take_log_msgs().len(), 1);

        let result = parse("ASAP2_VERSION 1 71", true);
        assert!(matches!(result, Err(ParserError::MissingProject { .. })));
    }

    #[test]
    fn additional_tokens() {
        let text = r#"ASAP2_VERSION 1 71 /begin PROJECT p "" /end PROJECT /end MODULE"#;
        let result = parse(text, true);
        assert!(matches!(
            result,
            Err(ParserError::AdditionalTokensError { .. })
        ));
        assert!(parse(text, false).is_ok());
    }

    #[test]
    fn duplicate_mod_common() {
        let result = parse(
            r#"ASAP2_VERSION 1 71 /begin PROJECT p "" /begin MODULE m ""
                /begin MOD_COMMON "" /end MOD_COMMON
                /begin MOD_COMMON "" /end MOD_COMMON
            /end MODULE /end PROJECT"#,
            true,
        );
        let err = result.err().unwrap();
        assert!(err.to_string().contains("\"MOD_COMMON\" already defined"));
    }
}
