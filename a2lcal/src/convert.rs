use crate::specification::{
    CompuMethod, CompuTab, CompuTabData, ConversionType, Module, NO_COMPU_METHOD,
};
use crate::value::Value;
use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// selects which conversions are applied when values are read
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ConvFlags: u32 {
        /// convert numeric values to physical values
        const PHYS = 0x1;
        /// replace enumerated values by their text
        const TEXT_REPLACE = 0x2;
        /// attach the unit of the conversion to physical values
        const UNIT = 0x4;
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConversionError {
    #[error("unknown conversion method \"{0}\"")]
    UnknownMethod(String),

    #[error("conversion method \"{method}\" references the unknown conversion table \"{table}\"")]
    UnknownTable { method: String, table: String },

    #[error("conversion method \"{method}\" has no {item}")]
    MissingParameter { method: String, item: &'static str },

    #[error("conversion method \"{0}\": division by zero")]
    DivisionByZero(String),

    #[error("conversion method \"{method}\": cannot evaluate formula \"{formula}\"")]
    Formula { method: String, formula: String },

    #[error("conversion method \"{method}\": no table entry matches {value}")]
    NoMatch { method: String, value: String },

    #[error("conversion method \"{0}\" cannot be inverted")]
    NotInvertible(String),

    #[error("conversion method \"{0}\" does not accept text values")]
    TextValue(String),
}

/// evaluates the formulas of FORM conversions
pub trait FormulaEvaluator: Send + Sync {
    /// evaluate `formula`, in which the character `#` stands for `value`
    fn evaluate(&self, formula: &str, value: f64) -> Option<f64>;
}

/// a small expression evaluator that handles the usual arithmetic of conversion formulas
///
/// Supported are numbers, `#` as the input value, parentheses, `+ - * / %`, the integer
/// operators `& | << >>` and the functions `abs acos asin atan ceil cos cosh exp floor ln log
/// log10 pow sin sinh sqrt tan tanh`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicFormulaEvaluator;

impl FormulaEvaluator for BasicFormulaEvaluator {
    fn evaluate(&self, formula: &str, value: f64) -> Option<f64> {
        let mut parser = FormulaParser {
            text: formula.as_bytes(),
            pos: 0,
            value,
        };
        let result = parser.bit_or()?;
        parser.skip_whitespace();
        if parser.pos == parser.text.len() && result.is_finite() {
            Some(result)
        } else {
            None
        }
    }
}

struct FormulaParser<'a> {
    text: &'a [u8],
    pos: usize,
    value: f64,
}

impl FormulaParser<'_> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.text.len() && self.text[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.text.get(self.pos).copied()
    }

    fn eat(&mut self, op: &str) -> bool {
        self.skip_whitespace();
        if self.text[self.pos..].starts_with(op.as_bytes()) {
            self.pos += op.len();
            true
        } else {
            false
        }
    }

    fn bit_or(&mut self) -> Option<f64> {
        let mut left = self.bit_and()?;
        while self.peek() == Some(b'|') {
            self.pos += 1;
            let right = self.bit_and()?;
            left = ((left as i64) | (right as i64)) as f64;
        }
        Some(left)
    }

    fn bit_and(&mut self) -> Option<f64> {
        let mut left = self.shift()?;
        while self.peek() == Some(b'&') {
            self.pos += 1;
            let right = self.shift()?;
            left = ((left as i64) & (right as i64)) as f64;
        }
        Some(left)
    }

    fn shift(&mut self) -> Option<f64> {
        let mut left = self.sum()?;
        loop {
            if self.eat("<<") {
                let right = self.sum()?;
                left = (left as i64).checked_shl(right as u32)? as f64;
            } else if self.eat(">>") {
                let right = self.sum()?;
                left = (left as i64).checked_shr(right as u32)? as f64;
            } else {
                return Some(left);
            }
        }
    }

    fn sum(&mut self) -> Option<f64> {
        let mut left = self.product()?;
        loop {
            match self.peek() {
                Some(b'+') => {
                    self.pos += 1;
                    left += self.product()?;
                }
                Some(b'-') => {
                    self.pos += 1;
                    left -= self.product()?;
                }
                _ => return Some(left),
            }
        }
    }

    fn product(&mut self) -> Option<f64> {
        let mut left = self.unary()?;
        loop {
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    left *= self.unary()?;
                }
                Some(b'/') => {
                    self.pos += 1;
                    left /= self.unary()?;
                }
                Some(b'%') => {
                    self.pos += 1;
                    left %= self.unary()?;
                }
                _ => return Some(left),
            }
        }
    }

    fn unary(&mut self) -> Option<f64> {
        match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                Some(-self.unary()?)
            }
            Some(b'+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Option<f64> {
        match self.peek()? {
            b'#' => {
                self.pos += 1;
                Some(self.value)
            }
            b'(' => {
                self.pos += 1;
                let inner = self.bit_or()?;
                self.eat(")").then_some(inner)
            }
            c if c.is_ascii_digit() || c == b'.' => self.number(),
            c if c.is_ascii_alphabetic() => self.function(),
            _ => None,
        }
    }

    fn number(&mut self) -> Option<f64> {
        let start = self.pos;
        if self.text[self.pos..].starts_with(b"0x") || self.text[self.pos..].starts_with(b"0X") {
            self.pos += 2;
            let hex_start = self.pos;
            while self.pos < self.text.len() && self.text[self.pos].is_ascii_hexdigit() {
                self.pos += 1;
            }
            let digits = std::str::from_utf8(&self.text[hex_start..self.pos]).ok()?;
            return u64::from_str_radix(digits, 16).ok().map(|v| v as f64);
        }
        while self.pos < self.text.len()
            && (self.text[self.pos].is_ascii_digit() || self.text[self.pos] == b'.')
        {
            self.pos += 1;
        }
        // exponent
        if self.pos < self.text.len() && (self.text[self.pos] == b'e' || self.text[self.pos] == b'E') {
            let mut end = self.pos + 1;
            if end < self.text.len() && (self.text[end] == b'+' || self.text[end] == b'-') {
                end += 1;
            }
            if end < self.text.len() && self.text[end].is_ascii_digit() {
                while end < self.text.len() && self.text[end].is_ascii_digit() {
                    end += 1;
                }
                self.pos = end;
            }
        }
        std::str::from_utf8(&self.text[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    fn function(&mut self) -> Option<f64> {
        let start = self.pos;
        while self.pos < self.text.len()
            && (self.text[self.pos].is_ascii_alphanumeric() || self.text[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let name = std::str::from_utf8(&self.text[start..self.pos]).ok()?.to_ascii_lowercase();
        if name == "pi" {
            return Some(std::f64::consts::PI);
        }
        if !self.eat("(") {
            return None;
        }
        let arg = self.bit_or()?;
        let result = if name == "pow" {
            if !self.eat(",") {
                return None;
            }
            let exponent = self.bit_or()?;
            arg.powf(exponent)
        } else {
            match name.as_str() {
                "abs" => arg.abs(),
                "acos" => arg.acos(),
                "asin" => arg.asin(),
                "atan" => arg.atan(),
                "ceil" => arg.ceil(),
                "cos" => arg.cos(),
                "cosh" => arg.cosh(),
                "exp" => arg.exp(),
                "floor" => arg.floor(),
                "ln" | "log" => arg.ln(),
                "log10" => arg.log10(),
                "sin" => arg.sin(),
                "sinh" => arg.sinh(),
                "sqrt" => arg.sqrt(),
                "tan" => arg.tan(),
                "tanh" => arg.tanh(),
                _ => return None,
            }
        };
        self.eat(")").then_some(result)
    }
}

/// replace the input variable of a formula (`x`, `X`, `x1` or `X1` standing alone) by `#`
pub(crate) fn formula_placeholder(formula: &str) -> String {
    let chars: Vec<char> = formula.chars().collect();
    let mut result = String::with_capacity(formula.len());
    let mut idx = 0;
    while idx < chars.len() {
        let c = chars[idx];
        let prev_alpha = idx > 0 && chars[idx - 1].is_ascii_alphabetic();
        let next_alpha = chars.get(idx + 1).is_some_and(|n| n.is_ascii_alphabetic());
        if (c == 'x' || c == 'X') && !prev_alpha && !next_alpha {
            result.push('#');
            idx += 1;
            if chars.get(idx) == Some(&'1') {
                idx += 1;
            }
        } else {
            result.push(c);
            idx += 1;
        }
    }
    result
}

/// converts values between their raw and physical representation
///
/// Conversion methods and tables are looked up by name in the module.
pub struct Converter<'a> {
    module: &'a Module,
    evaluator: &'a dyn FormulaEvaluator,
}

impl<'a> Converter<'a> {
    pub fn new(module: &'a Module, evaluator: &'a dyn FormulaEvaluator) -> Self {
        Self { module, evaluator }
    }

    /// convert a raw value to its physical value
    ///
    /// Only the conversions selected by `flags` are performed, all other values are returned
    /// unchanged. Physical values and texts are never converted a second time.
    pub fn to_physical(
        &self,
        method_name: &str,
        flags: ConvFlags,
        raw: &Value,
    ) -> Result<Value, ConversionError> {
        if !flags.intersects(ConvFlags::PHYS | ConvFlags::TEXT_REPLACE) {
            return Ok(raw.clone());
        }
        let Some(raw_value) = raw.to_f64() else {
            return Ok(raw.clone());
        };
        if matches!(raw, Value::PhysDouble(_)) {
            return Ok(raw.clone());
        }
        let phys = flags.contains(ConvFlags::PHYS);

        let Some(method) = self.module.compu_methods.get(method_name) else {
            if method_name == NO_COMPU_METHOD {
                return Ok(if phys { Value::PhysDouble(raw_value) } else { raw.clone() });
            }
            return Err(ConversionError::UnknownMethod(method_name.to_string()));
        };

        match method.conversion_type {
            ConversionType::TabVerb => {
                if flags.contains(ConvFlags::TEXT_REPLACE) {
                    let table = self.table(method)?;
                    verbal_lookup(method, table, raw_value).map(Value::Text)
                } else {
                    Ok(raw.clone())
                }
            }
            _ if !phys => Ok(raw.clone()),
            ConversionType::Identical => Ok(Value::PhysDouble(raw_value)),
            ConversionType::Linear => {
                let coeffs = method.coeffs_linear.as_ref().ok_or_else(|| missing(method, "COEFFS_LINEAR"))?;
                Ok(Value::PhysDouble(coeffs.a * raw_value + coeffs.b))
            }
            ConversionType::RatFunc => {
                let coeffs = method.coeffs.as_ref().ok_or_else(|| missing(method, "COEFFS"))?;
                // raw = (a*p^2 + b*p + c) / (d*p^2 + e*p + f), solved for p
                let qa = coeffs.a - raw_value * coeffs.d;
                let qb = coeffs.b - raw_value * coeffs.e;
                let qc = coeffs.c - raw_value * coeffs.f;
                let constant = coeffs.a == 0.0 && coeffs.b == 0.0 && coeffs.d == 0.0 && coeffs.e == 0.0;
                let result = if constant && coeffs.c != 0.0 {
                    // every raw value maps to the same physical value
                    coeffs.f / coeffs.c
                } else if qa == 0.0 {
                    if qb == 0.0 {
                        return Err(ConversionError::DivisionByZero(method.name.clone()));
                    }
                    -qc / qb
                } else {
                    let discriminant = qb * qb - 4.0 * qa * qc;
                    if discriminant < 0.0 {
                        return Err(ConversionError::NotInvertible(method.name.clone()));
                    }
                    // the larger root, which is the non-negative one for pure quadratic terms
                    let root = discriminant.sqrt();
                    ((-qb + root) / (2.0 * qa)).max((-qb - root) / (2.0 * qa))
                };
                Ok(Value::PhysDouble(result))
            }
            ConversionType::Form => {
                let formula = method.formula.as_ref().ok_or_else(|| missing(method, "FORMULA"))?;
                self.evaluate(method, &formula.formula, raw_value)
                    .map(Value::PhysDouble)
            }
            ConversionType::TabIntp | ConversionType::TabNointp => {
                let table = self.table(method)?;
                let CompuTabData::Numeric(pairs) = &table.data else {
                    return Err(missing(method, "numeric COMPU_TAB"));
                };
                let interpolate = method.conversion_type == ConversionType::TabIntp;
                table_lookup(pairs.iter().map(|(r, p)| (*r, *p)), raw_value, interpolate)
                    .map(Value::PhysDouble)
                    .ok_or_else(|| ConversionError::NoMatch {
                        method: method.name.clone(),
                        value: raw_value.to_string(),
                    })
            }
        }
    }

    /// convert a physical value (or a replacement text) to its raw value
    pub fn to_raw(&self, method_name: &str, phys: &Value) -> Result<f64, ConversionError> {
        let Some(method) = self.module.compu_methods.get(method_name) else {
            if method_name == NO_COMPU_METHOD {
                return phys
                    .to_f64()
                    .ok_or_else(|| ConversionError::TextValue(method_name.to_string()));
            }
            return Err(ConversionError::UnknownMethod(method_name.to_string()));
        };

        if let Value::Text(text) = phys {
            if method.conversion_type != ConversionType::TabVerb {
                return Err(ConversionError::TextValue(method.name.clone()));
            }
            let table = self.table(method)?;
            return verbal_reverse_lookup(table, text).ok_or_else(|| ConversionError::NoMatch {
                method: method.name.clone(),
                value: text.clone(),
            });
        }
        let Some(phys_value) = phys.to_f64() else {
            return Err(ConversionError::TextValue(method.name.clone()));
        };

        match method.conversion_type {
            // a number given for a verbal conversion is already the raw value
            ConversionType::Identical | ConversionType::TabVerb => Ok(phys_value),
            ConversionType::Linear => {
                let coeffs = method.coeffs_linear.as_ref().ok_or_else(|| missing(method, "COEFFS_LINEAR"))?;
                if coeffs.a == 0.0 {
                    return Err(ConversionError::DivisionByZero(method.name.clone()));
                }
                Ok((phys_value - coeffs.b) / coeffs.a)
            }
            ConversionType::RatFunc => {
                let c = method.coeffs.as_ref().ok_or_else(|| missing(method, "COEFFS"))?;
                let numerator = c.a * phys_value * phys_value + c.b * phys_value + c.c;
                let denominator = c.d * phys_value * phys_value + c.e * phys_value + c.f;
                if denominator == 0.0 {
                    return Err(ConversionError::DivisionByZero(method.name.clone()));
                }
                Ok(numerator / denominator)
            }
            ConversionType::Form => {
                let formula = method.formula.as_ref().ok_or_else(|| missing(method, "FORMULA"))?;
                let inverse = formula
                    .formula_inv
                    .as_ref()
                    .ok_or_else(|| ConversionError::NotInvertible(method.name.clone()))?;
                self.evaluate(method, inverse, phys_value)
            }
            ConversionType::TabIntp | ConversionType::TabNointp => {
                let table = self.table(method)?;
                let CompuTabData::Numeric(pairs) = &table.data else {
                    return Err(missing(method, "numeric COMPU_TAB"));
                };
                let interpolate = method.conversion_type == ConversionType::TabIntp;
                table_lookup(pairs.iter().map(|(r, p)| (*p, *r)), phys_value, interpolate)
                    .ok_or_else(|| ConversionError::NoMatch {
                        method: method.name.clone(),
                        value: phys_value.to_string(),
                    })
            }
        }
    }

    /// the unit of a conversion method; None if the method is unknown or has no unit
    pub fn unit(&self, method_name: &str) -> Option<&'a str> {
        let module = self.module;
        module
            .compu_methods
            .get(method_name)
            .map(|method| method.unit.as_str())
            .filter(|unit| !unit.is_empty())
    }

    fn table(&self, method: &CompuMethod) -> Result<&'a CompuTab, ConversionError> {
        let module = self.module;
        let table_name = method
            .compu_tab_ref
            .as_ref()
            .ok_or_else(|| missing(method, "COMPU_TAB_REF"))?;
        module
            .compu_tabs
            .get(table_name)
            .ok_or_else(|| ConversionError::UnknownTable {
                method: method.name.clone(),
                table: table_name.clone(),
            })
    }

    fn evaluate(&self, method: &CompuMethod, formula: &str, value: f64) -> Result<f64, ConversionError> {
        let prepared = formula_placeholder(formula);
        self.evaluator
            .evaluate(&prepared, value)
            .ok_or_else(|| ConversionError::Formula {
                method: method.name.clone(),
                formula: formula.to_string(),
            })
    }
}

fn missing(method: &CompuMethod, item: &'static str) -> ConversionError {
    ConversionError::MissingParameter {
        method: method.name.clone(),
        item,
    }
}

// look up `input` in a table of (in, out) pairs sorted by in. Values outside of the table are
// clamped to the first / last entry; without interpolation the entry at or below the input is used
fn table_lookup(
    pairs: impl Iterator<Item = (f64, f64)>,
    input: f64,
    interpolate: bool,
) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = pairs.collect();
    let (first, last) = (pairs.first()?, pairs.last()?);
    if input <= first.0 {
        return Some(first.1);
    }
    if input >= last.0 {
        return Some(last.1);
    }
    // first entry with in > input; 1 <= upper < len
    let upper = pairs.partition_point(|(i, _)| *i <= input);
    let (in_low, out_low) = pairs[upper - 1];
    let (in_high, out_high) = pairs[upper];
    if !interpolate || in_high == in_low {
        return Some(out_low);
    }
    Some(out_low + (out_high - out_low) * (input - in_low) / (in_high - in_low))
}

fn verbal_lookup(method: &CompuMethod, table: &CompuTab, raw: f64) -> Result<String, ConversionError> {
    let found = match &table.data {
        CompuTabData::Verbal(pairs) => pairs
            .iter()
            .find(|(value, _)| *value == raw.round())
            .map(|(_, text)| text.clone()),
        CompuTabData::VerbalRange(triples) => triples
            .iter()
            .find(|(min, max, _)| *min <= raw && raw <= *max)
            .map(|(_, _, text)| text.clone()),
        CompuTabData::Numeric(_) => None,
    };
    found
        .or_else(|| table.default_value.clone())
        .ok_or_else(|| ConversionError::NoMatch {
            method: method.name.clone(),
            value: raw.to_string(),
        })
}

// for a range, the lower limit is the raw value
fn verbal_reverse_lookup(table: &CompuTab, text: &str) -> Option<f64> {
    match &table.data {
        CompuTabData::Verbal(pairs) => pairs.iter().find(|(_, t)| t == text).map(|(v, _)| *v),
        CompuTabData::VerbalRange(triples) => triples
            .iter()
            .find(|(_, _, t)| t == text)
            .map(|(min, _, _)| *min),
        CompuTabData::Numeric(_) => None,
    }
}

/// the kind of a conversion, as reported by [`conversion_description`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    /// no conversion, or one that is not applied
    None,
    FactorOffset,
    RatFunc,
    Formula,
    TabIntp,
    TabNointp,
    TextReplace,
}

/// a compact description of a conversion method
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionInfo {
    pub kind: ConversionKind,
    /// `factor:offset`, `a:b:c:d:e:f`, the formula with `#` as input, or the table as text
    pub text: String,
    pub unit: String,
    /// width and precision taken from the FORMAT string, e.g. "%8.3"
    pub format_length: i32,
    pub format_layout: i32,
}

impl ConversionInfo {
    fn none() -> Self {
        Self {
            kind: ConversionKind::None,
            text: String::new(),
            unit: String::new(),
            format_length: 8,
            format_layout: 8,
        }
    }
}

/// describe the conversion method `name` of the module
///
/// An unknown name and NO_COMPU_METHOD are described as [`ConversionKind::None`].
pub fn conversion_description(module: &Module, name: &str) -> ConversionInfo {
    let Some(method) = module.compu_methods.get(name) else {
        return ConversionInfo::none();
    };
    let (kind, text) = match method.conversion_type {
        ConversionType::Identical => (ConversionKind::None, String::new()),
        ConversionType::Linear => match &method.coeffs_linear {
            Some(c) => (ConversionKind::FactorOffset, format!("{}:{}", c.a, c.b)),
            None => (ConversionKind::None, String::new()),
        },
        ConversionType::RatFunc => match &method.coeffs {
            // raw = (b*p + c) / f  <=>  p = f/b * raw - c/b
            Some(c) if c.a == 0.0 && c.b != 0.0 && c.d == 0.0 && c.e == 0.0 => (
                ConversionKind::FactorOffset,
                // adding 0 turns an offset of -0 into 0
                format!("{}:{}", c.f / c.b, -c.c / c.b + 0.0),
            ),
            Some(c) => (
                ConversionKind::RatFunc,
                format!("{}:{}:{}:{}:{}:{}", c.a, c.b, c.c, c.d, c.e, c.f),
            ),
            None => (ConversionKind::None, String::new()),
        },
        ConversionType::Form => match &method.formula {
            Some(formula) => (ConversionKind::Formula, formula_placeholder(&formula.formula)),
            None => (ConversionKind::None, String::new()),
        },
        ConversionType::TabIntp | ConversionType::TabNointp | ConversionType::TabVerb => {
            let table = method
                .compu_tab_ref
                .as_ref()
                .and_then(|table_name| module.compu_tabs.get(table_name));
            match table {
                Some(table) => {
                    let kind = match method.conversion_type {
                        ConversionType::TabIntp => ConversionKind::TabIntp,
                        ConversionType::TabNointp => ConversionKind::TabNointp,
                        _ => ConversionKind::TextReplace,
                    };
                    (kind, table_text(table))
                }
                None => (ConversionKind::None, String::new()),
            }
        }
    };
    let (format_length, format_layout) = format_width(&method.format);
    ConversionInfo {
        kind,
        text,
        unit: method.unit.clone(),
        format_length,
        format_layout,
    }
}

fn table_text(table: &CompuTab) -> String {
    match &table.data {
        CompuTabData::Numeric(pairs) => pairs
            .iter()
            .map(|(raw, phys)| format!("{raw}/{phys}"))
            .collect::<Vec<_>>()
            .join(":"),
        CompuTabData::Verbal(pairs) => pairs
            .iter()
            .map(|(value, text)| format!("{0} {0} \"{text}\";", *value as i64))
            .collect(),
        CompuTabData::VerbalRange(triples) => triples
            .iter()
            .map(|(min, max, text)| format!("{} {} \"{text}\";", *min as i64, *max as i64))
            .collect(),
    }
}

// "%8.3" -> (8, 3); anything else -> (4, 3)
pub(crate) fn format_width(format: &str) -> (i32, i32) {
    let Some(spec) = format.strip_prefix('%') else {
        return (4, 3);
    };
    let (length, layout) = spec.split_once('.').unwrap_or((spec, ""));
    let leading_number = |text: &str| -> Option<i32> {
        let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().ok()
    };
    (
        leading_number(length).unwrap_or(0),
        if spec.contains('.') {
            leading_number(layout).unwrap_or(0)
        } else {
            3
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(text: &str) -> Module {
        let a2l = format!(
            r#"ASAP2_VERSION 1 71 /begin PROJECT p "" /begin MODULE m "" {text} /end MODULE /end PROJECT"#
        );
        let (database, log_msgs) = crate::load_from_string(&a2l, true).unwrap();
        assert!(log_msgs.is_empty());
        database.module().clone()
    }

    const METHODS: &str = r#"
        /begin COMPU_METHOD lin "" LINEAR "%8.3" "km/h" COEFFS_LINEAR 2 10 /end COMPU_METHOD
        /begin COMPU_METHOD rat "" RAT_FUNC "%6.2" "" COEFFS 0 4 8 0 0 2 /end COMPU_METHOD
        /begin COMPU_METHOD quad "" RAT_FUNC "%6.2" "" COEFFS 1 0 0 0 0 1 /end COMPU_METHOD
        /begin COMPU_METHOD ident "" IDENTICAL "%4.0" "" /end COMPU_METHOD
        /begin COMPU_METHOD form "" FORM "%8.2" "V"
            /begin FORMULA "X1 * 0.5 + 1" FORMULA_INV "(X - 1) * 2" /end FORMULA
        /end COMPU_METHOD
        /begin COMPU_METHOD tab_i "" TAB_INTP "%4.1" "" COMPU_TAB_REF tab /end COMPU_METHOD
        /begin COMPU_METHOD tab_n "" TAB_NOINTP "%4.1" "" COMPU_TAB_REF tab /end COMPU_METHOD
        /begin COMPU_METHOD verb "" TAB_VERB "%4.0" "" COMPU_TAB_REF states /end COMPU_METHOD
        /begin COMPU_METHOD range "" TAB_VERB "%4.0" "" COMPU_TAB_REF ranges /end COMPU_METHOD
        /begin COMPU_TAB tab "" TAB_INTP 3 0 0 10 100 20 400 /end COMPU_TAB
        /begin COMPU_VTAB states "" TAB_VERB 2 0 "off" 1 "on" /end COMPU_VTAB
        /begin COMPU_VTAB_RANGE ranges "" 2 0 9 "low" 10 19 "high" DEFAULT_VALUE "invalid" /end COMPU_VTAB_RANGE
    "#;

    #[test]
    fn linear_conversion() {
        let module = module(METHODS);
        let converter = Converter::new(&module, &BasicFormulaEvaluator);
        let phys = converter.to_physical("lin", ConvFlags::PHYS, &Value::Uint(5)).unwrap();
        assert_eq!(phys, Value::PhysDouble(20.0));
        assert_eq!(converter.to_raw("lin", &Value::PhysDouble(20.0)).unwrap(), 5.0);
        assert_eq!(converter.unit("lin"), Some("km/h"));
        assert_eq!(converter.unit("ident"), None);
    }

    #[test]
    fn conversion_needs_flags() {
        let module = module(METHODS);
        let converter = Converter::new(&module, &BasicFormulaEvaluator);
        let raw = Value::Int(5);
        assert_eq!(converter.to_physical("lin", ConvFlags::empty(), &raw).unwrap(), raw);
        // TEXT_REPLACE alone does not trigger numeric conversions
        assert_eq!(converter.to_physical("lin", ConvFlags::TEXT_REPLACE, &raw).unwrap(), raw);
        assert_eq!(converter.to_physical("verb", ConvFlags::PHYS, &raw).unwrap(), raw);
    }

    #[test]
    fn identity_conversions() {
        let module = module(METHODS);
        let converter = Converter::new(&module, &BasicFormulaEvaluator);
        let phys = converter
            .to_physical(NO_COMPU_METHOD, ConvFlags::PHYS, &Value::Uint(100))
            .unwrap();
        assert_eq!(phys, Value::PhysDouble(100.0));
        assert_eq!(converter.to_raw(NO_COMPU_METHOD, &phys).unwrap(), 100.0);
        let phys = converter.to_physical("ident", ConvFlags::PHYS, &Value::Int(-7)).unwrap();
        assert_eq!(phys, Value::PhysDouble(-7.0));
        assert_eq!(converter.to_raw("ident", &phys).unwrap(), -7.0);
        assert!(matches!(
            converter.to_physical("missing", ConvFlags::PHYS, &Value::Int(1)),
            Err(ConversionError::UnknownMethod(_))
        ));
    }

    #[test]
    fn rational_conversion() {
        let module = module(METHODS);
        let converter = Converter::new(&module, &BasicFormulaEvaluator);
        // raw = (4p + 8) / 2 = 2p + 4
        for raw in [4.0, 10.0, 123.0] {
            let phys = converter.to_physical("rat", ConvFlags::PHYS, &Value::Double(raw)).unwrap();
            let back = converter.to_raw("rat", &phys).unwrap();
            assert!((back - raw).abs() < 1e-9);
        }
        let phys = converter.to_physical("rat", ConvFlags::PHYS, &Value::Uint(10)).unwrap();
        assert_eq!(phys, Value::PhysDouble(3.0));
        // raw = p^2
        let phys = converter.to_physical("quad", ConvFlags::PHYS, &Value::Uint(16)).unwrap();
        assert_eq!(phys, Value::PhysDouble(4.0));
        assert!(matches!(
            converter.to_physical("quad", ConvFlags::PHYS, &Value::Int(-4)),
            Err(ConversionError::NotInvertible(_))
        ));
    }

    #[test]
    fn rational_conversion_special_cases() {
        let module = module(
            r#"
            /begin COMPU_METHOD inv "" RAT_FUNC "%6.2" "" COEFFS 0 0 100 1 0 0 /end COMPU_METHOD
            /begin COMPU_METHOD fixed "" RAT_FUNC "%6.2" "" COEFFS 0 0 2 0 0 14 /end COMPU_METHOD
            "#,
        );
        let converter = Converter::new(&module, &BasicFormulaEvaluator);
        // raw = 100 / p^2 has the roots -5 and 5 for raw = 4
        let phys = converter.to_physical("inv", ConvFlags::PHYS, &Value::Uint(4)).unwrap();
        assert_eq!(phys, Value::PhysDouble(5.0));
        assert_eq!(converter.to_raw("inv", &phys).unwrap(), 4.0);
        // without any term depending on p the physical value is f / c
        for raw in [0, 7] {
            let phys = converter.to_physical("fixed", ConvFlags::PHYS, &Value::Uint(raw)).unwrap();
            assert_eq!(phys, Value::PhysDouble(7.0));
        }
    }

    #[test]
    fn formula_conversion() {
        let module = module(METHODS);
        let converter = Converter::new(&module, &BasicFormulaEvaluator);
        let phys = converter.to_physical("form", ConvFlags::PHYS, &Value::Uint(8)).unwrap();
        assert_eq!(phys, Value::PhysDouble(5.0));
        assert_eq!(converter.to_raw("form", &phys).unwrap(), 8.0);
    }

    #[test]
    fn table_conversion() {
        let module = module(METHODS);
        let converter = Converter::new(&module, &BasicFormulaEvaluator);
        let phys = |name: &str, raw: f64| {
            converter
                .to_physical(name, ConvFlags::PHYS, &Value::Double(raw))
                .unwrap()
        };
        assert_eq!(phys("tab_i", 5.0), Value::PhysDouble(50.0));
        assert_eq!(phys("tab_i", 15.0), Value::PhysDouble(250.0));
        assert_eq!(phys("tab_i", -3.0), Value::PhysDouble(0.0));
        assert_eq!(phys("tab_i", 99.0), Value::PhysDouble(400.0));
        assert_eq!(phys("tab_n", 15.0), Value::PhysDouble(100.0));
        assert_eq!(converter.to_raw("tab_i", &Value::PhysDouble(250.0)).unwrap(), 15.0);
    }

    #[test]
    fn verbal_conversion() {
        let module = module(METHODS);
        let converter = Converter::new(&module, &BasicFormulaEvaluator);
        let text = |name: &str, raw: i64| converter.to_physical(name, ConvFlags::TEXT_REPLACE, &Value::Int(raw));
        assert_eq!(text("verb", 1).unwrap(), Value::Text("on".to_string()));
        assert!(matches!(text("verb", 5), Err(ConversionError::NoMatch { .. })));
        assert_eq!(text("range", 12).unwrap(), Value::Text("high".to_string()));
        assert_eq!(text("range", 42).unwrap(), Value::Text("invalid".to_string()));
        assert_eq!(converter.to_raw("verb", &Value::Text("off".to_string())).unwrap(), 0.0);
        assert_eq!(converter.to_raw("range", &Value::Text("high".to_string())).unwrap(), 10.0);
        assert!(converter.to_raw("lin", &Value::Text("on".to_string())).is_err());
    }

    #[test]
    fn formula_evaluator() {
        let evaluator = BasicFormulaEvaluator;
        assert_eq!(evaluator.evaluate("# * 2 + 1", 3.0), Some(7.0));
        assert_eq!(evaluator.evaluate("-(# - 1) / 4", 9.0), Some(-2.0));
        assert_eq!(evaluator.evaluate("sqrt(#) + pow(2, 3)", 16.0), Some(12.0));
        assert_eq!(evaluator.evaluate("(# >> 4) & 0x0F", 0xAB as f64), Some(10.0));
        assert_eq!(evaluator.evaluate("1.5e2 + #", 0.0), Some(150.0));
        assert_eq!(evaluator.evaluate("# / 0", 1.0), None);
        assert_eq!(evaluator.evaluate("# +", 1.0), None);
        assert_eq!(evaluator.evaluate("unknown(#)", 1.0), None);
    }

    #[test]
    fn placeholders() {
        assert_eq!(formula_placeholder("x/1000"), "#/1000");
        assert_eq!(formula_placeholder("X1*0.1234"), "#*0.1234");
        assert_eq!(formula_placeholder("exp(x) + max"), "exp(#) + max");
    }

    #[test]
    fn descriptions() {
        let module = module(METHODS);
        let lin = conversion_description(&module, "lin");
        assert_eq!(lin.kind, ConversionKind::FactorOffset);
        assert_eq!(lin.text, "2:10");
        assert_eq!((lin.format_length, lin.format_layout), (8, 3));
        assert_eq!(lin.unit, "km/h");

        let rat = conversion_description(&module, "rat");
        assert_eq!(rat.kind, ConversionKind::FactorOffset);
        assert_eq!(rat.text, "0.5:-2");
        assert_eq!(conversion_description(&module, "quad").text, "1:0:0:0:0:1");
        assert_eq!(conversion_description(&module, "form").text, "# * 0.5 + 1");
        assert_eq!(conversion_description(&module, "tab_i").text, "0/0:10/100:20/400");
        assert_eq!(
            conversion_description(&module, "verb").text,
            "0 0 \"off\";1 1 \"on\";"
        );
        let none = conversion_description(&module, NO_COMPU_METHOD);
        assert_eq!(none.kind, ConversionKind::None);
        assert_eq!(none.format_length, 8);
    }
}
