use crate::specification::{CharacteristicType, DataType};
use bitflags::bitflags;

bitflags! {
    /// properties of a value read from a target
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ValueFlags: u32 {
        const CALIBRATION = 0x1;
        const MEASUREMENT = 0x2;
        /// the value has been converted to its physical representation
        const PHYS = 0x4;
        const READ_ONLY = 0x8;
        /// the value is not stored in the target, e.g. a fixed axis point
        const ONLY_VIRTUAL = 0x10;
        /// the value was changed and should be written back to the target
        const UPDATE = 0x1000;
    }
}

/// one decoded value: a raw integer or floating point value, a physical value or a replacement text
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Uint(u64),
    Double(f64),
    PhysDouble(f64),
    Text(String),
}

impl Value {
    /// numeric value as f64; a text has no numeric value
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Uint(v) => Some(*v as f64),
            Value::Double(v) | Value::PhysDouble(v) => Some(*v),
            Value::Text(_) => None,
        }
    }

    /// numeric value as i64. Floating point values are rounded, values outside of the i64 range
    /// have no i64 representation
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => i64::try_from(*v).ok(),
            Value::Double(v) | Value::PhysDouble(v) => {
                let rounded = v.round();
                if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64 {
                    Some(rounded as i64)
                } else {
                    None
                }
            }
            Value::Text(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Double(v) | Value::PhysDouble(v) => write!(f, "{v}"),
            Value::Text(text) => f.write_str(text),
        }
    }
}

/// a value together with its origin in the target memory
#[derive(Debug, Clone, PartialEq)]
pub struct SingleValue {
    pub value: Value,
    pub flags: ValueFlags,
    /// data type of the value in the target; None for virtual values
    pub target_type: Option<DataType>,
    pub address: u64,
    pub unit: Option<String>,
}

impl SingleValue {
    pub(crate) fn new(value: Value, flags: ValueFlags, target_type: Option<DataType>, address: u64) -> Self {
        Self {
            value,
            flags,
            target_type,
            address,
            unit: None,
        }
    }

    /// replace the value and mark it for writing
    pub fn update(&mut self, value: Value) {
        self.value = value;
        self.flags.insert(ValueFlags::UPDATE);
    }
}

/// one array of values, e.g. the x axis of a curve or the values of a map
///
/// The values of multi-dimensional arrays are stored with x varying fastest:
/// `values[z * ydim * xdim + y * xdim + x]`
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub dims: Vec<usize>,
    pub flags: ValueFlags,
    pub values: Vec<SingleValue>,
}

impl ArrayValue {
    pub fn element_count(&self) -> usize {
        self.values.len()
    }

    pub fn dimension_count(&self) -> usize {
        self.dims.len()
    }
}

/// the kind of object a value buffer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelType {
    Measurement,
    Characteristic(CharacteristicType),
    AxisPts,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueData {
    Single(SingleValue),
    Arrays(Vec<ArrayValue>),
}

/// the decoded data of a measurement, characteristic or axis
///
/// Scalars hold a single value. All other objects hold a list of arrays:
/// - CURVE: x axis, values
/// - MAP: x axis, y axis, values
/// - VAL_BLK, ASCII and array measurements: values
/// - AXIS_PTS: axis points
#[derive(Debug, Clone, PartialEq)]
pub struct A2lData {
    pub label_type: LabelType,
    pub data: ValueData,
}

impl A2lData {
    pub(crate) fn single(label_type: LabelType, value: SingleValue) -> Self {
        Self {
            label_type,
            data: ValueData::Single(value),
        }
    }

    pub(crate) fn arrays(label_type: LabelType, arrays: Vec<ArrayValue>) -> Self {
        Self {
            label_type,
            data: ValueData::Arrays(arrays),
        }
    }

    pub fn label_type(&self) -> LabelType {
        self.label_type
    }

    /// number of arrays; 0 for a single value
    pub fn array_count(&self) -> usize {
        match &self.data {
            ValueData::Single(_) => 0,
            ValueData::Arrays(arrays) => arrays.len(),
        }
    }

    /// number of elements of the array `array_no`
    pub fn array_size(&self, array_no: usize) -> Option<usize> {
        self.array(array_no).map(ArrayValue::element_count)
    }

    pub fn array(&self, array_no: usize) -> Option<&ArrayValue> {
        match &self.data {
            ValueData::Single(_) => None,
            ValueData::Arrays(arrays) => arrays.get(array_no),
        }
    }

    pub fn array_mut(&mut self, array_no: usize) -> Option<&mut ArrayValue> {
        match &mut self.data {
            ValueData::Single(_) => None,
            ValueData::Arrays(arrays) => arrays.get_mut(array_no),
        }
    }

    pub fn single_value(&self) -> Option<&SingleValue> {
        match &self.data {
            ValueData::Single(value) => Some(value),
            ValueData::Arrays(_) => None,
        }
    }

    pub fn single_value_mut(&mut self) -> Option<&mut SingleValue> {
        match &mut self.data {
            ValueData::Single(value) => Some(value),
            ValueData::Arrays(_) => None,
        }
    }

    pub fn array_value(&self, array_no: usize, element_no: usize) -> Option<&SingleValue> {
        self.array(array_no)?.values.get(element_no)
    }

    pub fn array_value_mut(
        &mut self,
        array_no: usize,
        element_no: usize,
    ) -> Option<&mut SingleValue> {
        self.array_mut(array_no)?.values.get_mut(element_no)
    }

    /// iterate over all values, arrays in order
    pub fn values(&self) -> Box<dyn Iterator<Item = &SingleValue> + '_> {
        match &self.data {
            ValueData::Single(value) => Box::new(std::iter::once(value)),
            ValueData::Arrays(arrays) => Box::new(arrays.iter().flat_map(|a| a.values.iter())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: u64) -> SingleValue {
        SingleValue::new(Value::Uint(value), ValueFlags::CALIBRATION, Some(DataType::Uword), 0)
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::Int(-3).to_f64(), Some(-3.0));
        assert_eq!(Value::Uint(7).to_i64(), Some(7));
        assert_eq!(Value::Uint(u64::MAX).to_i64(), None);
        assert_eq!(Value::Double(2.5).to_i64(), Some(3));
        assert_eq!(Value::PhysDouble(-2.4).to_i64(), Some(-2));
        assert_eq!(Value::Double(f64::NAN).to_i64(), None);
        assert_eq!(Value::Text("on".to_string()).to_f64(), None);
        assert_eq!(Value::Text("on".to_string()).to_string(), "on");
    }

    #[test]
    fn value_flags() {
        let mut flags = ValueFlags::CALIBRATION | ValueFlags::READ_ONLY;
        assert!(flags.contains(ValueFlags::READ_ONLY));
        assert!(!flags.contains(ValueFlags::UPDATE));
        flags.remove(ValueFlags::READ_ONLY);
        assert_eq!(flags, ValueFlags::CALIBRATION);
        assert_eq!(flags.bits(), 1);
    }

    #[test]
    fn a2l_data_access() {
        let x_axis = ArrayValue {
            dims: vec![2],
            flags: ValueFlags::CALIBRATION,
            values: vec![raw(0), raw(10)],
        };
        let values = ArrayValue {
            dims: vec![2],
            flags: ValueFlags::CALIBRATION,
            values: vec![raw(100), raw(200)],
        };
        let mut data = A2lData::arrays(
            LabelType::Characteristic(CharacteristicType::Curve),
            vec![x_axis, values],
        );
        assert_eq!(data.array_count(), 2);
        assert_eq!(data.array_size(1), Some(2));
        assert_eq!(data.array_size(2), None);
        assert!(data.single_value().is_none());
        assert_eq!(data.array_value(1, 1).unwrap().value, Value::Uint(200));

        let copy = data.clone();
        assert_eq!(copy, data);
        data.array_value_mut(1, 0).unwrap().update(Value::Uint(50));
        assert_ne!(copy, data);
        assert!(data.array_value(1, 0).unwrap().flags.contains(ValueFlags::UPDATE));
        assert_eq!(data.values().count(), 4);

        let single = A2lData::single(LabelType::Measurement, raw(5));
        assert_eq!(single.array_count(), 0);
        assert_eq!(single.single_value().unwrap().value, Value::Uint(5));
    }
}
