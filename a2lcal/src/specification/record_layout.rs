use super::project::parse_alignment;
use super::{AddrType, AlignmentOverrides, DataType, IndexMode, IndexOrder};
use crate::parser::{Keyword, ParseContext, ParserError, ParserState};

/// RECORD_LAYOUT: describes how the data of a characteristic or an axis is stored in memory
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    pub name: String,
    /// the positioned items, sorted by position
    pub items: Vec<LayoutItem>,
    /// FIX_NO_AXIS_PTS_X/Y/Z
    pub fix_no_axis_pts: [Option<u16>; 3],
    pub alignment: AlignmentOverrides,
    pub static_record_layout: bool,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisId {
    W,
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutItem {
    pub position: u16,
    pub datatype: DataType,
    pub kind: LayoutItemKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayoutItemKind {
    FncValues {
        index_mode: IndexMode,
        addr_type: AddrType,
    },
    Identification,
    AxisPts {
        axis: AxisId,
        index_order: IndexOrder,
        addr_type: AddrType,
    },
    AxisRescale {
        axis: AxisId,
        max_rescale_pairs: u16,
        index_order: IndexOrder,
        addr_type: AddrType,
    },
    NoAxisPts(AxisId),
    NoRescale(AxisId),
    SrcAddr(AxisId),
    RipAddr(AxisId),
    ShiftOp(AxisId),
    Offset(AxisId),
    DistOp(AxisId),
    Reserved,
}

impl_a2l_object!(RecordLayout);

impl AxisId {
    // the axis is named by the last letter of the keyword: AXIS_PTS_X, RIP_ADDR_W, ...
    fn from_keyword(keyword: &str) -> Self {
        match keyword.as_bytes().last() {
            Some(b'W') => AxisId::W,
            Some(b'Y') => AxisId::Y,
            Some(b'Z') => AxisId::Z,
            _ => AxisId::X,
        }
    }

    /// position of the axis in x / y / z dimension lists; W has no dimension
    pub fn dim_index(self) -> Option<usize> {
        match self {
            AxisId::X => Some(0),
            AxisId::Y => Some(1),
            AxisId::Z => Some(2),
            AxisId::W => None,
        }
    }
}

impl std::fmt::Display for AxisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AxisId::W => "W",
            AxisId::X => "X",
            AxisId::Y => "Y",
            AxisId::Z => "Z",
        };
        f.write_str(name)
    }
}

impl LayoutItemKind {
    /// the a2l keyword of the item, e.g. "AXIS_PTS_X"
    pub fn keyword(&self) -> String {
        match self {
            LayoutItemKind::FncValues { .. } => "FNC_VALUES".to_string(),
            LayoutItemKind::Identification => "IDENTIFICATION".to_string(),
            LayoutItemKind::AxisPts { axis, .. } => format!("AXIS_PTS_{axis}"),
            LayoutItemKind::AxisRescale { axis, .. } => format!("AXIS_RESCALE_{axis}"),
            LayoutItemKind::NoAxisPts(axis) => format!("NO_AXIS_PTS_{axis}"),
            LayoutItemKind::NoRescale(axis) => format!("NO_RESCALE_{axis}"),
            LayoutItemKind::SrcAddr(axis) => format!("SRC_ADDR_{axis}"),
            LayoutItemKind::RipAddr(axis) => format!("RIP_ADDR_{axis}"),
            LayoutItemKind::ShiftOp(axis) => format!("SHIFT_OP_{axis}"),
            LayoutItemKind::Offset(axis) => format!("OFFSET_{axis}"),
            LayoutItemKind::DistOp(axis) => format!("DIST_OP_{axis}"),
            LayoutItemKind::Reserved => "RESERVED".to_string(),
        }
    }
}

impl RecordLayout {
    pub(crate) fn parse(
        parser: &mut ParserState,
        context: &ParseContext,
    ) -> Result<Self, ParserError> {
        let mut record_layout = RecordLayout {
            name: parser.get_identifier(context)?,
            items: Vec::new(),
            fix_no_axis_pts: [None; 3],
            alignment: AlignmentOverrides::default(),
            static_record_layout: false,
            line: context.line,
        };
        parser.parse_block_body(context, RECORD_LAYOUT_KEYWORDS, &mut record_layout)?;
        // sort_by_key is stable: items at the same position keep their order of definition
        record_layout.items.sort_by_key(|item| item.position);
        Ok(record_layout)
    }

    /// the FNC_VALUES item, if the layout has one
    pub fn fnc_values(&self) -> Option<&LayoutItem> {
        self.items
            .iter()
            .find(|item| matches!(item.kind, LayoutItemKind::FncValues { .. }))
    }

    /// the AXIS_PTS_<axis> item
    pub fn axis_pts(&self, axis: AxisId) -> Option<&LayoutItem> {
        self.items
            .iter()
            .find(|item| matches!(item.kind, LayoutItemKind::AxisPts { axis: a, .. } if a == axis))
    }

    /// the NO_AXIS_PTS_<axis> item
    pub fn no_axis_pts(&self, axis: AxisId) -> Option<&LayoutItem> {
        self.items
            .iter()
            .find(|item| item.kind == LayoutItemKind::NoAxisPts(axis))
    }

    /// FIX_NO_AXIS_PTS_<axis>
    pub fn fix_no_axis_pts(&self, axis: AxisId) -> Option<u16> {
        axis.dim_index().and_then(|idx| self.fix_no_axis_pts[idx])
    }
}

const RECORD_LAYOUT_KEYWORDS: &[Keyword<RecordLayout>] = &[
    keyword!("FNC_VALUES", Forbidden, 4, Some(1), Some(parse_fnc_values)),
    keyword!("IDENTIFICATION", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("AXIS_PTS_X", Forbidden, 4, Some(1), Some(parse_axis_pts)),
    keyword!("AXIS_PTS_Y", Forbidden, 4, Some(1), Some(parse_axis_pts)),
    keyword!("AXIS_PTS_Z", Forbidden, 4, Some(1), Some(parse_axis_pts)),
    keyword!("AXIS_RESCALE_X", Forbidden, 5, Some(1), Some(parse_axis_rescale)),
    keyword!("AXIS_RESCALE_Y", Forbidden, 5, Some(1), Some(parse_axis_rescale)),
    keyword!("AXIS_RESCALE_Z", Forbidden, 5, Some(1), Some(parse_axis_rescale)),
    keyword!("NO_AXIS_PTS_X", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("NO_AXIS_PTS_Y", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("NO_AXIS_PTS_Z", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("NO_RESCALE_X", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("NO_RESCALE_Y", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("NO_RESCALE_Z", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("FIX_NO_AXIS_PTS_X", Forbidden, 1, Some(1), Some(parse_fix_no_axis_pts)),
    keyword!("FIX_NO_AXIS_PTS_Y", Forbidden, 1, Some(1), Some(parse_fix_no_axis_pts)),
    keyword!("FIX_NO_AXIS_PTS_Z", Forbidden, 1, Some(1), Some(parse_fix_no_axis_pts)),
    keyword!("SRC_ADDR_X", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("SRC_ADDR_Y", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("SRC_ADDR_Z", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("RIP_ADDR_W", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("RIP_ADDR_X", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("RIP_ADDR_Y", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("RIP_ADDR_Z", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("SHIFT_OP_X", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("SHIFT_OP_Y", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("SHIFT_OP_Z", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("OFFSET_X", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("OFFSET_Y", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("OFFSET_Z", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("DIST_OP_X", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("DIST_OP_Y", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("DIST_OP_Z", Forbidden, 2, Some(1), Some(parse_simple_item)),
    keyword!("RESERVED", Forbidden, 2, None, Some(parse_reserved)),
    keyword!("ALIGNMENT_BYTE", Forbidden, 1, Some(1), Some(parse_record_layout_alignment)),
    keyword!("ALIGNMENT_WORD", Forbidden, 1, Some(1), Some(parse_record_layout_alignment)),
    keyword!("ALIGNMENT_LONG", Forbidden, 1, Some(1), Some(parse_record_layout_alignment)),
    keyword!("ALIGNMENT_INT64", Forbidden, 1, Some(1), Some(parse_record_layout_alignment)),
    keyword!("ALIGNMENT_FLOAT16_IEEE", Forbidden, 1, Some(1), Some(parse_record_layout_alignment)),
    keyword!("ALIGNMENT_FLOAT32_IEEE", Forbidden, 1, Some(1), Some(parse_record_layout_alignment)),
    keyword!("ALIGNMENT_FLOAT64_IEEE", Forbidden, 1, Some(1), Some(parse_record_layout_alignment)),
    keyword!("STATIC_RECORD_LAYOUT", Forbidden, 0, Some(1), Some(parse_static_record_layout)),
    keyword!("STATIC_ADDRESS_OFFSETS", Forbidden, 0, Some(1), None),
];

// FNC_VALUES position datatype index_mode addr_type
fn parse_fnc_values(
    parser: &mut ParserState,
    context: &ParseContext,
    record_layout: &mut RecordLayout,
) -> Result<(), ParserError> {
    let position = parser.get_integer(context)?;
    let datatype = parser.get_enum(context, DataType::from_a2l)?;
    let index_mode = parser.get_enum(context, IndexMode::from_a2l)?;
    let addr_type = parser.get_enum(context, AddrType::from_a2l)?;
    record_layout.items.push(LayoutItem {
        position,
        datatype,
        kind: LayoutItemKind::FncValues {
            index_mode,
            addr_type,
        },
    });
    Ok(())
}

// AXIS_PTS_X position datatype index_order addr_type
fn parse_axis_pts(
    parser: &mut ParserState,
    context: &ParseContext,
    record_layout: &mut RecordLayout,
) -> Result<(), ParserError> {
    let position = parser.get_integer(context)?;
    let datatype = parser.get_enum(context, DataType::from_a2l)?;
    let index_order = parser.get_enum(context, IndexOrder::from_a2l)?;
    let addr_type = parser.get_enum(context, AddrType::from_a2l)?;
    record_layout.items.push(LayoutItem {
        position,
        datatype,
        kind: LayoutItemKind::AxisPts {
            axis: AxisId::from_keyword(&context.element),
            index_order,
            addr_type,
        },
    });
    Ok(())
}

// AXIS_RESCALE_X position datatype max_number_of_rescale_pairs index_order addr_type
fn parse_axis_rescale(
    parser: &mut ParserState,
    context: &ParseContext,
    record_layout: &mut RecordLayout,
) -> Result<(), ParserError> {
    let position = parser.get_integer(context)?;
    let datatype = parser.get_enum(context, DataType::from_a2l)?;
    let max_rescale_pairs = parser.get_integer(context)?;
    let index_order = parser.get_enum(context, IndexOrder::from_a2l)?;
    let addr_type = parser.get_enum(context, AddrType::from_a2l)?;
    record_layout.items.push(LayoutItem {
        position,
        datatype,
        kind: LayoutItemKind::AxisRescale {
            axis: AxisId::from_keyword(&context.element),
            max_rescale_pairs,
            index_order,
            addr_type,
        },
    });
    Ok(())
}

// all items that only have a position and a data type
fn parse_simple_item(
    parser: &mut ParserState,
    context: &ParseContext,
    record_layout: &mut RecordLayout,
) -> Result<(), ParserError> {
    let position = parser.get_integer(context)?;
    let datatype = parser.get_enum(context, DataType::from_a2l)?;
    let keyword = context.element.as_str();
    let axis = AxisId::from_keyword(keyword);
    let kind = if keyword == "IDENTIFICATION" {
        LayoutItemKind::Identification
    } else if keyword.starts_with("NO_AXIS_PTS_") {
        LayoutItemKind::NoAxisPts(axis)
    } else if keyword.starts_with("NO_RESCALE_") {
        LayoutItemKind::NoRescale(axis)
    } else if keyword.starts_with("SRC_ADDR_") {
        LayoutItemKind::SrcAddr(axis)
    } else if keyword.starts_with("RIP_ADDR_") {
        LayoutItemKind::RipAddr(axis)
    } else if keyword.starts_with("SHIFT_OP_") {
        LayoutItemKind::ShiftOp(axis)
    } else if keyword.starts_with("OFFSET_") {
        LayoutItemKind::Offset(axis)
    } else {
        LayoutItemKind::DistOp(axis)
    };
    record_layout.items.push(LayoutItem {
        position,
        datatype,
        kind,
    });
    Ok(())
}

// RESERVED position BYTE|WORD|LONG
fn parse_reserved(
    parser: &mut ParserState,
    context: &ParseContext,
    record_layout: &mut RecordLayout,
) -> Result<(), ParserError> {
    let position = parser.get_integer(context)?;
    let datatype = parser.get_enum(context, DataType::from_data_size)?;
    record_layout.items.push(LayoutItem {
        position,
        datatype,
        kind: LayoutItemKind::Reserved,
    });
    Ok(())
}

fn parse_fix_no_axis_pts(
    parser: &mut ParserState,
    context: &ParseContext,
    record_layout: &mut RecordLayout,
) -> Result<(), ParserError> {
    let count = parser.get_integer(context)?;
    if let Some(idx) = AxisId::from_keyword(&context.element).dim_index() {
        record_layout.fix_no_axis_pts[idx] = Some(count);
    }
    Ok(())
}

fn parse_record_layout_alignment(
    parser: &mut ParserState,
    context: &ParseContext,
    record_layout: &mut RecordLayout,
) -> Result<(), ParserError> {
    parse_alignment(parser, context, &mut record_layout.alignment)
}

fn parse_static_record_layout(
    _parser: &mut ParserState,
    _context: &ParseContext,
    record_layout: &mut RecordLayout,
) -> Result<(), ParserError> {
    record_layout.static_record_layout = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_layout(text: &str) -> Result<RecordLayout, ParserError> {
        let mut parser = ParserState::new("test", text, true);
        let context = ParseContext {
            element: "RECORD_LAYOUT".to_string(),
            line: 1,
        };
        let record_layout = RecordLayout::parse(&mut parser, &context)?;
        parser.expect_end(&context)?;
        Ok(record_layout)
    }

    #[test]
    fn items_sorted_by_position() {
        let record_layout = parse_layout(
            r#"RL_MAP
                FNC_VALUES 5 UWORD COLUMN_DIR DIRECT
                AXIS_PTS_Y 4 SWORD INDEX_INCR DIRECT
                NO_AXIS_PTS_X 1 UBYTE
                AXIS_PTS_X 3 SWORD INDEX_INCR DIRECT
                NO_AXIS_PTS_Y 2 UBYTE
                ALIGNMENT_WORD 1
            /end RECORD_LAYOUT"#,
        )
        .unwrap();
        let positions: Vec<u16> = record_layout.items.iter().map(|item| item.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);
        assert_eq!(record_layout.items[0].kind, LayoutItemKind::NoAxisPts(AxisId::X));
        assert_eq!(record_layout.alignment.word, Some(1));
        assert_eq!(record_layout.fnc_values().unwrap().datatype, DataType::Uword);
        assert_eq!(record_layout.axis_pts(AxisId::Y).unwrap().position, 4);
        assert!(record_layout.no_axis_pts(AxisId::Z).is_none());
    }

    #[test]
    fn equal_positions_are_stable() {
        let record_layout = parse_layout(
            r#"RL RESERVED 1 WORD RESERVED 1 BYTE FNC_VALUES 1 UBYTE ROW_DIR DIRECT /end RECORD_LAYOUT"#,
        )
        .unwrap();
        assert_eq!(record_layout.items[0].datatype, DataType::Uword);
        assert_eq!(record_layout.items[1].datatype, DataType::Ubyte);
        assert!(matches!(
            record_layout.items[2].kind,
            LayoutItemKind::FncValues {
                index_mode: IndexMode::RowDir,
                ..
            }
        ));
    }

    #[test]
    fn fixed_axis_counts_and_other_items() {
        let record_layout = parse_layout(
            r#"RL_FIX
                FIX_NO_AXIS_PTS_X 8
                FIX_NO_AXIS_PTS_Y 4
                RIP_ADDR_W 1 UWORD
                AXIS_RESCALE_X 2 UBYTE 5 INDEX_INCR DIRECT
                IDENTIFICATION 3 ULONG
                SHIFT_OP_Z 4 UBYTE
                STATIC_RECORD_LAYOUT
            /end RECORD_LAYOUT"#,
        )
        .unwrap();
        assert_eq!(record_layout.fix_no_axis_pts(AxisId::X), Some(8));
        assert_eq!(record_layout.fix_no_axis_pts(AxisId::Y), Some(4));
        assert_eq!(record_layout.fix_no_axis_pts(AxisId::Z), None);
        assert_eq!(record_layout.items[0].kind, LayoutItemKind::RipAddr(AxisId::W));
        assert_eq!(record_layout.items[1].kind.keyword(), "AXIS_RESCALE_X");
        assert_eq!(record_layout.items[2].kind, LayoutItemKind::Identification);
        assert_eq!(record_layout.items[3].kind.keyword(), "SHIFT_OP_Z");
        assert!(record_layout.static_record_layout);
    }

    #[test]
    fn duplicate_item() {
        let result = parse_layout(
            r#"RL FNC_VALUES 1 UBYTE ROW_DIR DIRECT FNC_VALUES 2 UBYTE ROW_DIR DIRECT /end RECORD_LAYOUT"#,
        );
        assert!(matches!(result, Err(ParserError::AlreadyDefined { .. })));
    }
}
