use crate::parser::{Keyword, ParseContext, ParserError, ParserState};
use crate::tokenizer::A2lTokenType;

/// IF_DATA XCP of a MODULE; only the protocol layer and the CAN transport layer are kept
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IfDataXcp {
    pub protocol_layer: Option<ProtocolLayer>,
    pub xcp_on_can: Option<XcpOnCan>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProtocolLayer {
    pub version: u16,
    /// timeouts T1 .. T7 in ms
    pub timeouts: [u16; 7],
    pub max_cto: u16,
    pub max_dto: u16,
    pub byte_order: String,
    pub address_granularity: String,
    pub optional_cmd: Vec<String>,
    pub seed_and_key_external_function: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XcpOnCan {
    pub version: u16,
    pub can_id_broadcast: Option<u32>,
    pub can_id_master: Option<u32>,
    pub can_id_slave: Option<u32>,
    pub baudrate: Option<u32>,
    pub sample_point: Option<u8>,
    pub sample_rate: Option<String>,
    pub btl_cycles: Option<u8>,
    pub sjw: Option<u8>,
    pub sync_edge: Option<String>,
    pub max_dlc_required: bool,
    pub max_bus_load: Option<u8>,
    pub daq_list_can_ids: Vec<DaqListCanId>,
}

/// `can_id` is None if the DAQ list uses a VARIABLE id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaqListCanId {
    pub daq_list: u16,
    pub can_id: Option<u32>,
}

/// IF_DATA CANAPE_EXT of a MEASUREMENT, CHARACTERISTIC or AXIS_PTS
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanapeExt {
    pub version: u16,
    pub link_map: Option<LinkMap>,
    pub display: Option<CanapeDisplay>,
}

/// the linker symbol an object was placed at by the last address update
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinkMap {
    pub label: String,
    pub address: u32,
    pub address_extension: u16,
    pub relative_to_ds: bool,
    pub offset: i32,
    pub datatype_valid: bool,
    pub datatype: u16,
    pub bit_offset: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanapeDisplay {
    pub color: u32,
    pub min: f64,
    pub max: f64,
}

// the IF_DATA tag has been consumed; the content up to the /end IF_DATA is handled here.
// Returns None for IF_DATA blocks of any other vendor.
pub(crate) fn parse_object_if_data(
    parser: &mut ParserState,
    context: &ParseContext,
) -> Result<Option<CanapeExt>, ParserError> {
    if !next_is_ifdata_tag(parser, "CANAPE_EXT")? {
        parser.skip_block_content(context)?;
        return Ok(None);
    }
    let tag = parser.get_token(context)?;
    let ext_context = ParseContext::from_token(&tag);
    let mut canape_ext = CanapeExt {
        version: parser.get_integer(&ext_context)?,
        ..Default::default()
    };
    parser.parse_ifdata_body(&ext_context, CANAPE_EXT_KEYWORDS, &mut canape_ext)?;
    Ok(Some(canape_ext))
}

// module level IF_DATA: XCP is parsed, anything else is skipped
pub(crate) fn parse_module_if_data(
    parser: &mut ParserState,
    context: &ParseContext,
    if_data_xcp: &mut Option<IfDataXcp>,
) -> Result<(), ParserError> {
    if !next_is_ifdata_tag(parser, "XCP")? {
        return parser.skip_block_content(context);
    }
    if if_data_xcp.is_some() {
        return Err(ParserError::DuplicateIfDataXcp {
            filename: parser.filename().to_string(),
            error_line: context.line,
        });
    }
    let tag = parser.get_token(context)?;
    let xcp_context = ParseContext::from_token(&tag);
    let mut xcp = IfDataXcp::default();
    parser.parse_ifdata_body(&xcp_context, XCP_KEYWORDS, &mut xcp)?;
    *if_data_xcp = Some(xcp);
    Ok(())
}

fn next_is_ifdata_tag(parser: &mut ParserState, tag: &str) -> Result<bool, ParserError> {
    Ok(matches!(
        parser.peek_token()?,
        Some(token) if token.ttype == A2lTokenType::Identifier && token.text == tag
    ))
}

const CANAPE_EXT_KEYWORDS: &[Keyword<CanapeExt>] = &[
    keyword!("LINK_MAP", Forbidden, 8, Some(1), Some(parse_link_map)),
    keyword!("DISPLAY", Forbidden, 3, Some(1), Some(parse_canape_display)),
    keyword!("VIRTUAL_CONVERSION", Either, 1, None, None),
];

fn parse_link_map(
    parser: &mut ParserState,
    context: &ParseContext,
    canape_ext: &mut CanapeExt,
) -> Result<(), ParserError> {
    let label = parser.get_string(context)?;
    let address = parser.get_integer(context)?;
    let address_extension = parser.get_integer(context)?;
    let relative_to_ds = parser.get_integer::<u16>(context)? != 0;
    let offset = parser.get_integer(context)?;
    let datatype_valid = parser.get_integer::<u16>(context)? != 0;
    let datatype = parser.get_integer(context)?;
    let bit_offset = parser.get_integer(context)?;
    canape_ext.link_map = Some(LinkMap {
        label,
        address,
        address_extension,
        relative_to_ds,
        offset,
        datatype_valid,
        datatype,
        bit_offset,
    });
    Ok(())
}

fn parse_canape_display(
    parser: &mut ParserState,
    context: &ParseContext,
    canape_ext: &mut CanapeExt,
) -> Result<(), ParserError> {
    let color = parser.get_integer(context)?;
    let min = parser.get_double(context)?;
    let max = parser.get_double(context)?;
    canape_ext.display = Some(CanapeDisplay { color, min, max });
    Ok(())
}

const XCP_KEYWORDS: &[Keyword<IfDataXcp>] = &[
    keyword!("PROTOCOL_LAYER", Required, 0, Some(1), Some(parse_protocol_layer)),
    keyword!("XCP_ON_CAN", Required, 0, Some(1), Some(parse_xcp_on_can)),
];

fn parse_protocol_layer(
    parser: &mut ParserState,
    context: &ParseContext,
    xcp: &mut IfDataXcp,
) -> Result<(), ParserError> {
    let version = parser.get_integer(context)?;
    let mut timeouts = [0u16; 7];
    for timeout in &mut timeouts {
        *timeout = parser.get_integer(context)?;
    }
    let max_cto = parser.get_integer(context)?;
    let max_dto = parser.get_integer(context)?;
    let byte_order = parser.get_identifier(context)?;
    let address_granularity = parser.get_identifier(context)?;
    let mut protocol_layer = ProtocolLayer {
        version,
        timeouts,
        max_cto,
        max_dto,
        byte_order,
        address_granularity,
        ..Default::default()
    };
    parser.parse_ifdata_body(context, PROTOCOL_LAYER_KEYWORDS, &mut protocol_layer)?;
    xcp.protocol_layer = Some(protocol_layer);
    Ok(())
}

const PROTOCOL_LAYER_KEYWORDS: &[Keyword<ProtocolLayer>] = &[
    keyword!("OPTIONAL_CMD", Forbidden, 1, None, Some(parse_optional_cmd)),
    keyword!(
        "SEED_AND_KEY_EXTERNAL_FUNCTION",
        Forbidden,
        1,
        Some(1),
        Some(parse_seed_and_key)
    ),
];

fn parse_optional_cmd(
    parser: &mut ParserState,
    context: &ParseContext,
    protocol_layer: &mut ProtocolLayer,
) -> Result<(), ParserError> {
    protocol_layer
        .optional_cmd
        .push(parser.get_identifier(context)?);
    Ok(())
}

fn parse_seed_and_key(
    parser: &mut ParserState,
    context: &ParseContext,
    protocol_layer: &mut ProtocolLayer,
) -> Result<(), ParserError> {
    protocol_layer.seed_and_key_external_function = Some(parser.get_string(context)?);
    Ok(())
}

fn parse_xcp_on_can(
    parser: &mut ParserState,
    context: &ParseContext,
    xcp: &mut IfDataXcp,
) -> Result<(), ParserError> {
    let mut xcp_on_can = XcpOnCan {
        version: parser.get_integer(context)?,
        ..Default::default()
    };
    parser.parse_ifdata_body(context, XCP_ON_CAN_KEYWORDS, &mut xcp_on_can)?;
    xcp.xcp_on_can = Some(xcp_on_can);
    Ok(())
}

const XCP_ON_CAN_KEYWORDS: &[Keyword<XcpOnCan>] = &[
    keyword!("CAN_ID_BROADCAST", Forbidden, 1, Some(1), Some(parse_can_id_broadcast)),
    keyword!("CAN_ID_MASTER", Forbidden, 1, Some(1), Some(parse_can_id_master)),
    keyword!("CAN_ID_SLAVE", Forbidden, 1, Some(1), Some(parse_can_id_slave)),
    keyword!("BAUDRATE", Forbidden, 1, Some(1), Some(parse_baudrate)),
    keyword!("SAMPLE_POINT", Forbidden, 1, Some(1), Some(parse_sample_point)),
    keyword!("SAMPLE_RATE", Forbidden, 1, Some(1), Some(parse_sample_rate)),
    keyword!("BTL_CYCLES", Forbidden, 1, Some(1), Some(parse_btl_cycles)),
    keyword!("SJW", Forbidden, 1, Some(1), Some(parse_sjw)),
    keyword!("SYNC_EDGE", Forbidden, 1, Some(1), Some(parse_sync_edge)),
    keyword!("MAX_DLC_REQUIRED", Forbidden, 0, Some(1), Some(parse_max_dlc_required)),
    keyword!("MAX_BUS_LOAD", Forbidden, 1, Some(1), Some(parse_max_bus_load)),
    keyword!("DAQ_LIST_CAN_ID", Required, 0, Some(32), Some(parse_daq_list_can_id)),
];

fn parse_can_id_broadcast(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.can_id_broadcast = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_can_id_master(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.can_id_master = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_can_id_slave(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.can_id_slave = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_baudrate(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.baudrate = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_sample_point(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.sample_point = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_sample_rate(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.sample_rate = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_btl_cycles(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.btl_cycles = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_sjw(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.sjw = Some(parser.get_integer(context)?);
    Ok(())
}

fn parse_sync_edge(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.sync_edge = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_max_dlc_required(
    _parser: &mut ParserState,
    _context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.max_dlc_required = true;
    Ok(())
}

fn parse_max_bus_load(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    can.max_bus_load = Some(parser.get_integer(context)?);
    Ok(())
}

// /begin DAQ_LIST_CAN_ID <daq list> VARIABLE | FIXED <can id> /end DAQ_LIST_CAN_ID
fn parse_daq_list_can_id(
    parser: &mut ParserState,
    context: &ParseContext,
    can: &mut XcpOnCan,
) -> Result<(), ParserError> {
    let daq_list = parser.get_integer(context)?;
    let mode = parser.get_identifier(context)?;
    let can_id = match mode.as_str() {
        "FIXED" => Some(parser.get_integer(context)?),
        "VARIABLE" => None,
        _ => return Err(ParserError::invalid_enum_value(parser, context, &mode)),
    };
    can.daq_list_can_ids.push(DaqListCanId { daq_list, can_id });
    Ok(())
}
