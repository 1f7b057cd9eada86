use super::ConversionType;
use crate::parser::{Keyword, ParseContext, ParserError, ParserState};

/// COMPU_METHOD: the rule to convert between raw values and physical values
#[derive(Debug, Clone, PartialEq)]
pub struct CompuMethod {
    pub name: String,
    pub long_identifier: String,
    pub conversion_type: ConversionType,
    pub format: String,
    pub unit: String,
    pub coeffs: Option<Coeffs>,
    pub coeffs_linear: Option<CoeffsLinear>,
    pub compu_tab_ref: Option<String>,
    pub formula: Option<Formula>,
    pub ref_unit: Option<String>,
    pub status_string_ref: Option<String>,
    pub line: u32,
}

/// RAT_FUNC coefficients: `(a*x^2 + b*x + c) / (d*x^2 + e*x + f)` describes raw = f(phys)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Coeffs {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

/// LINEAR coefficients: `phys = a * raw + b`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoeffsLinear {
    pub a: f64,
    pub b: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Formula {
    pub formula: String,
    pub formula_inv: Option<String>,
}

/// COMPU_TAB, COMPU_VTAB or COMPU_VTAB_RANGE
#[derive(Debug, Clone, PartialEq)]
pub struct CompuTab {
    pub name: String,
    pub long_identifier: String,
    pub conversion_type: ConversionType,
    pub data: CompuTabData,
    pub default_value: Option<String>,
    pub default_value_numeric: Option<f64>,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompuTabData {
    /// COMPU_TAB: raw -> phys pairs
    Numeric(Vec<(f64, f64)>),
    /// COMPU_VTAB: raw -> text pairs
    Verbal(Vec<(f64, String)>),
    /// COMPU_VTAB_RANGE: raw min, raw max -> text
    VerbalRange(Vec<(f64, f64, String)>),
}

impl_a2l_object!(CompuMethod, CompuTab);

impl CompuMethod {
    pub(crate) fn parse(
        parser: &mut ParserState,
        context: &ParseContext,
    ) -> Result<Self, ParserError> {
        let mut compu_method = CompuMethod {
            name: parser.get_identifier(context)?,
            long_identifier: parser.get_string(context)?,
            conversion_type: parser.get_enum(context, ConversionType::from_a2l)?,
            format: parser.get_string(context)?,
            unit: parser.get_string(context)?,
            coeffs: None,
            coeffs_linear: None,
            compu_tab_ref: None,
            formula: None,
            ref_unit: None,
            status_string_ref: None,
            line: context.line,
        };
        parser.parse_block_body(context, COMPU_METHOD_KEYWORDS, &mut compu_method)?;
        Ok(compu_method)
    }
}

const COMPU_METHOD_KEYWORDS: &[Keyword<CompuMethod>] = &[
    keyword!("COEFFS", Forbidden, 6, Some(1), Some(parse_coeffs)),
    keyword!("COEFFS_LINEAR", Forbidden, 2, Some(1), Some(parse_coeffs_linear)),
    keyword!("COMPU_TAB_REF", Forbidden, 1, Some(1), Some(parse_compu_tab_ref)),
    keyword!("FORMULA", Required, 0, Some(1), Some(parse_formula)),
    keyword!("REF_UNIT", Forbidden, 1, Some(1), Some(parse_ref_unit)),
    keyword!("STATUS_STRING_REF", Forbidden, 1, Some(1), Some(parse_status_string_ref)),
];

fn parse_coeffs(
    parser: &mut ParserState,
    context: &ParseContext,
    compu_method: &mut CompuMethod,
) -> Result<(), ParserError> {
    compu_method.coeffs = Some(Coeffs {
        a: parser.get_double(context)?,
        b: parser.get_double(context)?,
        c: parser.get_double(context)?,
        d: parser.get_double(context)?,
        e: parser.get_double(context)?,
        f: parser.get_double(context)?,
    });
    Ok(())
}

fn parse_coeffs_linear(
    parser: &mut ParserState,
    context: &ParseContext,
    compu_method: &mut CompuMethod,
) -> Result<(), ParserError> {
    compu_method.coeffs_linear = Some(CoeffsLinear {
        a: parser.get_double(context)?,
        b: parser.get_double(context)?,
    });
    Ok(())
}

fn parse_compu_tab_ref(
    parser: &mut ParserState,
    context: &ParseContext,
    compu_method: &mut CompuMethod,
) -> Result<(), ParserError> {
    compu_method.compu_tab_ref = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_ref_unit(
    parser: &mut ParserState,
    context: &ParseContext,
    compu_method: &mut CompuMethod,
) -> Result<(), ParserError> {
    compu_method.ref_unit = Some(parser.get_identifier(context)?);
    Ok(())
}

fn parse_status_string_ref(
    parser: &mut ParserState,
    context: &ParseContext,
    compu_method: &mut CompuMethod,
) -> Result<(), ParserError> {
    compu_method.status_string_ref = Some(parser.get_identifier(context)?);
    Ok(())
}

// /begin FORMULA "f(x)" [FORMULA_INV "g(x)"] /end FORMULA
fn parse_formula(
    parser: &mut ParserState,
    context: &ParseContext,
    compu_method: &mut CompuMethod,
) -> Result<(), ParserError> {
    let mut formula = Formula {
        formula: parser.get_string(context)?,
        formula_inv: None,
    };
    parser.parse_block_body(context, FORMULA_KEYWORDS, &mut formula)?;
    compu_method.formula = Some(formula);
    Ok(())
}

const FORMULA_KEYWORDS: &[Keyword<Formula>] = &[keyword!(
    "FORMULA_INV",
    Forbidden,
    1,
    Some(1),
    Some(parse_formula_inv)
)];

fn parse_formula_inv(
    parser: &mut ParserState,
    context: &ParseContext,
    formula: &mut Formula,
) -> Result<(), ParserError> {
    formula.formula_inv = Some(parser.get_string(context)?);
    Ok(())
}

impl CompuTab {
    /// parse the content of a COMPU_TAB, COMPU_VTAB or COMPU_VTAB_RANGE; the context tells which one
    pub(crate) fn parse(
        parser: &mut ParserState,
        context: &ParseContext,
    ) -> Result<Self, ParserError> {
        let name = parser.get_identifier(context)?;
        let long_identifier = parser.get_string(context)?;
        let is_range = context.element == "COMPU_VTAB_RANGE";
        let conversion_type = if is_range {
            ConversionType::TabVerb
        } else {
            parser.get_enum(context, ConversionType::from_a2l)?
        };
        let count: u16 = parser.get_integer(context)?;

        let data = match context.element.as_str() {
            "COMPU_VTAB" => {
                let mut pairs = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    expect_value_pair(parser, context)?;
                    let raw = parser.get_double(context)?;
                    let text = parser.get_string(context)?;
                    pairs.push((raw, text));
                }
                CompuTabData::Verbal(pairs)
            }
            "COMPU_VTAB_RANGE" => {
                let mut triples = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    expect_value_pair(parser, context)?;
                    let min = parser.get_double(context)?;
                    let max = parser.get_double(context)?;
                    let text = parser.get_string(context)?;
                    triples.push((min, max, text));
                }
                CompuTabData::VerbalRange(triples)
            }
            _ => {
                let mut pairs = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    expect_value_pair(parser, context)?;
                    let raw = parser.get_double(context)?;
                    let phys = parser.get_double(context)?;
                    pairs.push((raw, phys));
                }
                CompuTabData::Numeric(pairs)
            }
        };

        let mut compu_tab = CompuTab {
            name,
            long_identifier,
            conversion_type,
            data,
            default_value: None,
            default_value_numeric: None,
            line: context.line,
        };
        parser.parse_block_body(context, COMPU_TAB_KEYWORDS, &mut compu_tab)?;
        Ok(compu_tab)
    }

    pub fn len(&self) -> usize {
        match &self.data {
            CompuTabData::Numeric(pairs) => pairs.len(),
            CompuTabData::Verbal(pairs) => pairs.len(),
            CompuTabData::VerbalRange(triples) => triples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn expect_value_pair(parser: &mut ParserState, context: &ParseContext) -> Result<(), ParserError> {
    if parser.next_is_number()? {
        Ok(())
    } else {
        Err(ParserError::missing_value_pair(parser, context))
    }
}

const COMPU_TAB_KEYWORDS: &[Keyword<CompuTab>] = &[
    keyword!("DEFAULT_VALUE", Forbidden, 1, Some(1), Some(parse_default_value)),
    keyword!("DEFAULT_VALUE_NUMERIC", Forbidden, 1, Some(1), Some(parse_default_value_numeric)),
];

fn parse_default_value(
    parser: &mut ParserState,
    context: &ParseContext,
    compu_tab: &mut CompuTab,
) -> Result<(), ParserError> {
    compu_tab.default_value = Some(parser.get_string(context)?);
    Ok(())
}

fn parse_default_value_numeric(
    parser: &mut ParserState,
    context: &ParseContext,
    compu_tab: &mut CompuTab,
) -> Result<(), ParserError> {
    compu_tab.default_value_numeric = Some(parser.get_double(context)?);
    Ok(())
}
