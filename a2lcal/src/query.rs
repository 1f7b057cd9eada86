use crate::convert::{ConversionInfo, conversion_description, format_width};
use crate::database::Database;
use crate::layout::AccessError;
use crate::link::LabelIndex;
use crate::specification::{CharacteristicType, DataType};
use bitflags::bitflags;
use regex::Regex;

/// A name filter with the wildcards `*` (any text) and `?` (any single character).
///
/// The whole name must match; the comparison is case sensitive.
#[derive(Debug, Clone, Default)]
pub enum NameFilter {
    #[default]
    Any,
    Pattern(Regex),
}

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        if pattern.is_empty() || pattern == "*" {
            return Ok(NameFilter::Any);
        }
        let mut regex_text = String::with_capacity(pattern.len() + 8);
        regex_text.push('^');
        let mut literal = String::new();
        for c in pattern.chars() {
            if c == '*' || c == '?' {
                regex_text.push_str(&regex::escape(&literal));
                literal.clear();
                regex_text.push_str(if c == '*' { ".*" } else { "." });
            } else {
                literal.push(c);
            }
        }
        regex_text.push_str(&regex::escape(&literal));
        regex_text.push('$');
        Ok(NameFilter::Pattern(Regex::new(&regex_text)?))
    }

    pub fn all() -> Self {
        NameFilter::Any
    }

    pub fn is_match(&self, name: &str) -> bool {
        match self {
            NameFilter::Any => true,
            NameFilter::Pattern(regex) => regex.is_match(name),
        }
    }
}

bitflags! {
    /// selects the kinds of objects that are visited by the `next_*` queries
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LabelTypeMask: u32 {
        const SINGLE_MEASUREMENT = 0x1;
        const ARRAY_1D_MEASUREMENT = 0x2;
        const ARRAY_2D_MEASUREMENT = 0x4;
        const ARRAY_3D_MEASUREMENT = 0x8;
        /// only objects that are not referenced (see [`crate::LinkManager::reference_label`])
        const NOT_REFERENCED = 0x10;
        /// only referenced objects
        const REFERENCED = 0x20;
        /// every measurement; includes both reference bits, so it never filters by reference
        const MEASUREMENT = 0xFF;
        const VALUE = 0x100;
        const ASCII = 0x200;
        const VAL_BLK = 0x400;
        const CURVE = 0x800;
        const MAP = 0x1000;
        const CUBOID = 0x2000;
        const CUBE_4 = 0x4000;
        const CUBE_5 = 0x8000;
        const CALIBRATION = 0xFF00;
        const AXIS_CALIBRATION = 0x1_0000;
        const ALL = 0x1_FF0F;
    }
}

const MEASUREMENT_DIMENSIONS: u32 = 0x0F;

impl LabelTypeMask {
    pub fn for_characteristic_type(characteristic_type: CharacteristicType) -> Self {
        LabelTypeMask::from_bits_retain(0x100 << characteristic_type.ordinal())
    }

    pub(crate) fn includes_measurements(self) -> bool {
        self.bits() & MEASUREMENT_DIMENSIONS != 0
    }

    pub(crate) fn includes_characteristics(self) -> bool {
        self.intersects(LabelTypeMask::CALIBRATION)
    }

    pub(crate) fn includes_axis_pts(self) -> bool {
        self.intersects(LabelTypeMask::AXIS_CALIBRATION)
    }

    // no reference bit, or both, accept any object
    fn accepts_reference(self, referenced: &dyn Fn() -> bool) -> bool {
        let only_unreferenced = self.contains(LabelTypeMask::NOT_REFERENCED);
        let only_referenced = self.contains(LabelTypeMask::REFERENCED);
        match (only_unreferenced, only_referenced) {
            (true, false) => !referenced(),
            (false, true) => referenced(),
            _ => true,
        }
    }
}

bitflags! {
    /// the member lists of a FUNCTION
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FunctionMembers: u32 {
        const DEF_CHARACTERISTIC = 0x1;
        const REF_CHARACTERISTIC = 0x2;
        const IN_MEASUREMENT = 0x4;
        const OUT_MEASUREMENT = 0x8;
        const LOC_MEASUREMENT = 0x10;
        const SUB_FUNCTION = 0x20;
        const ALL = 0x3F;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionMemberKind {
    DefCharacteristic,
    RefCharacteristic,
    InMeasurement,
    OutMeasurement,
    LocMeasurement,
    SubFunction,
}

impl FunctionMemberKind {
    const ORDER: [FunctionMemberKind; 6] = [
        FunctionMemberKind::DefCharacteristic,
        FunctionMemberKind::RefCharacteristic,
        FunctionMemberKind::InMeasurement,
        FunctionMemberKind::OutMeasurement,
        FunctionMemberKind::LocMeasurement,
        FunctionMemberKind::SubFunction,
    ];

    pub fn flag(self) -> FunctionMembers {
        match self {
            FunctionMemberKind::DefCharacteristic => FunctionMembers::DEF_CHARACTERISTIC,
            FunctionMemberKind::RefCharacteristic => FunctionMembers::REF_CHARACTERISTIC,
            FunctionMemberKind::InMeasurement => FunctionMembers::IN_MEASUREMENT,
            FunctionMemberKind::OutMeasurement => FunctionMembers::OUT_MEASUREMENT,
            FunctionMemberKind::LocMeasurement => FunctionMembers::LOC_MEASUREMENT,
            FunctionMemberKind::SubFunction => FunctionMembers::SUB_FUNCTION,
        }
    }
}

/// the members of each kind are numbered from `kind * MEMBER_RANGE`
const MEMBER_RANGE: u32 = 0x1000_0000;

/// the description of a measurement or of a VALUE characteristic
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfos {
    pub name: String,
    pub datatype: DataType,
    pub address: u64,
    /// the conversion; the format is taken from the object if it has its own FORMAT
    pub conversion: ConversionInfo,
    pub x_dim: u16,
    pub y_dim: u16,
    pub z_dim: u16,
    pub min: f64,
    pub max: f64,
    pub writable: bool,
}

/// the value range and input of one axis of a characteristic
#[derive(Debug, Clone, PartialEq)]
pub struct AxisInfos {
    pub min: f64,
    pub max: f64,
    /// None if the axis has no input quantity
    pub input_quantity: Option<String>,
    pub conversion: ConversionInfo,
}

fn first_after(previous: Option<usize>) -> usize {
    previous.map_or(0, |index| index + 1)
}

fn with_format(mut conversion: ConversionInfo, format: Option<&String>) -> ConversionInfo {
    if let Some(format) = format {
        (conversion.format_length, conversion.format_layout) = format_width(format);
    }
    conversion
}

fn split_dims(dims: &[u16]) -> (u16, u16, u16) {
    let dim = |i: usize| dims.get(i).copied().unwrap_or(0);
    (dim(0), dim(1), dim(2))
}

impl Database {
    /// the next module after `previous` whose name matches the filter
    pub fn next_module_name(
        &self,
        previous: Option<usize>,
        filter: &NameFilter,
    ) -> Option<(usize, &str)> {
        self.project
            .modules
            .iter()
            .enumerate()
            .skip(first_after(previous))
            .find(|(_, module)| filter.is_match(&module.name))
            .map(|(index, module)| (index, module.name.as_str()))
    }

    /// Find the next measurement after `previous` that matches the filter and the mask.
    ///
    /// The dimension bits of the mask select scalars and arrays; the reference bits are only
    /// checked if a `referenced` predicate is given.
    pub fn next_measurement(
        &self,
        previous: Option<usize>,
        filter: &NameFilter,
        mask: LabelTypeMask,
        referenced: Option<&dyn Fn(LabelIndex) -> bool>,
    ) -> Option<(usize, &str)> {
        self.module()
            .measurements
            .iter()
            .enumerate()
            .skip(first_after(previous))
            .find(|(index, measurement)| {
                let dims = measurement.dimensions().len().min(3);
                let dims_bit = LabelTypeMask::from_bits_retain(1 << dims);
                (!mask.includes_measurements() || mask.intersects(dims_bit))
                    && filter.is_match(&measurement.name)
                    && accepts(mask, referenced, LabelIndex::Measurement(*index))
            })
            .map(|(index, measurement)| (index, measurement.name.as_str()))
    }

    /// find the next characteristic after `previous` whose type is selected by the mask
    pub fn next_characteristic(
        &self,
        previous: Option<usize>,
        filter: &NameFilter,
        mask: LabelTypeMask,
        referenced: Option<&dyn Fn(LabelIndex) -> bool>,
    ) -> Option<(usize, &str)> {
        self.module()
            .characteristics
            .iter()
            .enumerate()
            .skip(first_after(previous))
            .find(|(index, characteristic)| {
                mask.intersects(LabelTypeMask::for_characteristic_type(
                    characteristic.characteristic_type,
                )) && filter.is_match(&characteristic.name)
                    && accepts(mask, referenced, LabelIndex::Characteristic(*index))
            })
            .map(|(index, characteristic)| (index, characteristic.name.as_str()))
    }

    pub fn next_axis_pts(
        &self,
        previous: Option<usize>,
        filter: &NameFilter,
        mask: LabelTypeMask,
        referenced: Option<&dyn Fn(LabelIndex) -> bool>,
    ) -> Option<(usize, &str)> {
        if !mask.includes_axis_pts() {
            return None;
        }
        self.module()
            .axis_pts
            .iter()
            .enumerate()
            .skip(first_after(previous))
            .find(|(index, axis_pts)| {
                filter.is_match(&axis_pts.name)
                    && accepts(mask, referenced, LabelIndex::AxisPts(*index))
            })
            .map(|(index, axis_pts)| (index, axis_pts.name.as_str()))
    }

    pub fn next_function(
        &self,
        previous: Option<usize>,
        filter: &NameFilter,
    ) -> Option<(usize, &str)> {
        self.module()
            .functions
            .iter()
            .enumerate()
            .skip(first_after(previous))
            .find(|(_, function)| filter.is_match(&function.name))
            .map(|(index, function)| (index, function.name.as_str()))
    }

    /// Find the next member of the function `function` after `previous`.
    ///
    /// The member lists are visited in the order DEF_CHARACTERISTIC, REF_CHARACTERISTIC,
    /// IN_MEASUREMENT, OUT_MEASUREMENT, LOC_MEASUREMENT, SUB_FUNCTION. The returned member
    /// number encodes the list and the position in the list; pass it as `previous` to continue.
    pub fn next_function_member(
        &self,
        function: usize,
        previous: Option<u32>,
        filter: &NameFilter,
        members: FunctionMembers,
    ) -> Option<(u32, &str, FunctionMemberKind)> {
        let function = self.function(function)?;
        let lists = [
            &function.def_characteristic,
            &function.ref_characteristic,
            &function.in_measurement,
            &function.out_measurement,
            &function.loc_measurement,
            &function.sub_function,
        ];
        let start = previous.map_or(0, |member| member.saturating_add(1));
        for (base, (kind, names)) in (0u32..)
            .map(|slot| slot * MEMBER_RANGE)
            .zip(FunctionMemberKind::ORDER.into_iter().zip(lists))
        {
            if !members.contains(kind.flag()) || start >= base + MEMBER_RANGE {
                continue;
            }
            let first = usize::try_from(start.saturating_sub(base)).unwrap_or(usize::MAX);
            let found = names
                .iter()
                .enumerate()
                .skip(first)
                .find(|(_, name)| filter.is_match(name));
            if let Some((position, name)) = found {
                let position = u32::try_from(position).ok()?;
                return Some((base + position, name.as_str(), kind));
            }
        }
        None
    }

    /// describe a measurement; only measurements with an ECU_ADDRESS can be described
    pub fn measurement_infos(&self, index: usize) -> Result<ValueInfos, AccessError> {
        let measurement = self.measurement(index).ok_or(AccessError::InvalidIndex {
            kind: "measurement",
            index,
        })?;
        let address = measurement
            .ecu_address
            .ok_or_else(|| AccessError::NoAddress(measurement.name.clone()))?;
        let conversion = conversion_description(self.module(), &measurement.conversion);
        let (x_dim, y_dim, z_dim) = split_dims(&measurement.dimensions());
        Ok(ValueInfos {
            name: measurement.name.clone(),
            datatype: measurement.datatype,
            address: u64::from(address),
            conversion: with_format(conversion, measurement.format.as_ref()),
            x_dim,
            y_dim,
            z_dim,
            min: measurement.lower_limit,
            max: measurement.upper_limit,
            writable: measurement.read_write,
        })
    }

    /// describe a characteristic of type VALUE; the data type is the one of its FNC_VALUES
    pub fn value_characteristic_infos(&self, index: usize) -> Result<ValueInfos, AccessError> {
        let characteristic = self
            .characteristic(index)
            .filter(|characteristic| {
                characteristic.characteristic_type == CharacteristicType::Value
            })
            .ok_or(AccessError::InvalidIndex {
                kind: "VALUE characteristic",
                index,
            })?;
        let layout = self.record_layout(&characteristic.deposit).ok_or_else(|| {
            AccessError::NoRecordLayout {
                name: characteristic.name.clone(),
                layout: characteristic.deposit.clone(),
            }
        })?;
        let fnc_values = layout
            .fnc_values()
            .ok_or_else(|| AccessError::MissingFncValues {
                name: characteristic.name.clone(),
                layout: layout.name.clone(),
            })?;
        let conversion = conversion_description(self.module(), &characteristic.conversion);
        let (x_dim, y_dim, z_dim) = characteristic
            .matrix_dim
            .as_deref()
            .map(split_dims)
            .unwrap_or_default();
        Ok(ValueInfos {
            name: characteristic.name.clone(),
            datatype: fnc_values.datatype,
            address: u64::from(characteristic.address),
            conversion: with_format(conversion, characteristic.format.as_ref()),
            x_dim,
            y_dim,
            z_dim,
            min: characteristic.lower_limit,
            max: characteristic.upper_limit,
            writable: !characteristic.is_read_only(),
        })
    }

    /// Describe an axis of a characteristic.
    ///
    /// Axis 0 is the value axis of the characteristic itself, 1 is the x axis and 2 the y axis.
    pub fn characteristic_axis_infos(
        &self,
        index: usize,
        axis: usize,
    ) -> Result<AxisInfos, AccessError> {
        let characteristic = self.characteristic(index).ok_or(AccessError::InvalidIndex {
            kind: "characteristic",
            index,
        })?;
        if axis == 0 {
            let conversion = conversion_description(self.module(), &characteristic.conversion);
            return Ok(AxisInfos {
                min: characteristic.lower_limit,
                max: characteristic.upper_limit,
                input_quantity: None,
                conversion: with_format(conversion, characteristic.format.as_ref()),
            });
        }
        let descr = characteristic
            .axis_descr
            .get(axis - 1)
            .filter(|_| axis <= 2)
            .ok_or(AccessError::InvalidIndex {
                kind: "axis",
                index: axis,
            })?;
        let conversion = conversion_description(self.module(), &descr.conversion);
        let input_quantity = Some(descr.input_quantity.clone())
            .filter(|input| input != "NO_INPUT_QUANTITY" && !input.is_empty());
        Ok(AxisInfos {
            min: descr.lower_limit,
            max: descr.upper_limit,
            input_quantity,
            conversion: with_format(conversion, descr.format.as_ref()),
        })
    }

    /// the lowest and the highest address of all characteristics that have an address
    pub fn min_max_calibration_address(&self) -> Option<(u64, u64)> {
        self.module()
            .characteristics
            .iter()
            .filter(|characteristic| characteristic.address != 0)
            .map(|characteristic| u64::from(characteristic.address))
            .fold(None, |range, address| match range {
                None => Some((address, address)),
                Some((min, max)) => Some((min.min(address), max.max(address))),
            })
    }

    /// `1 << type`, where the characteristic types are numbered from VALUE = 1 to CUBE_5 = 8
    pub fn characteristic_type_mask(&self, index: usize) -> Option<u32> {
        self.characteristic(index)
            .map(|characteristic| 1 << (characteristic.characteristic_type.ordinal() + 1))
    }
}

fn accepts(
    mask: LabelTypeMask,
    referenced: Option<&dyn Fn(LabelIndex) -> bool>,
    label: LabelIndex,
) -> bool {
    match referenced {
        Some(referenced) => mask.accepts_reference(&|| referenced(label)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConversionKind;

    const QUERIES: &str = r#"ASAP2_VERSION 1 71
    /begin PROJECT p ""
      /begin MODULE engine ""
        /begin COMPU_METHOD cm_lin "" LINEAR "%6.2" "km/h" COEFFS_LINEAR 0.5 -10 /end COMPU_METHOD
        /begin RECORD_LAYOUT rl_word FNC_VALUES 1 UWORD ROW_DIR DIRECT /end RECORD_LAYOUT
        /begin RECORD_LAYOUT rl_curve NO_AXIS_PTS_X 1 UBYTE AXIS_PTS_X 2 UBYTE INDEX_INCR DIRECT
          FNC_VALUES 3 UWORD ROW_DIR DIRECT /end RECORD_LAYOUT
        /begin MEASUREMENT n_eng "" UWORD cm_lin 1 0 0 8000 ECU_ADDRESS 0x1000 FORMAT "%8.1" /end MEASUREMENT
        /begin MEASUREMENT n_wheel "" UWORD NO_COMPU_METHOD 1 0 0 8000 ECU_ADDRESS 0x1002
          ARRAY_SIZE 4 READ_WRITE /end MEASUREMENT
        /begin MEASUREMENT t_map "" UBYTE NO_COMPU_METHOD 1 0 0 255 ECU_ADDRESS 0x1010
          MATRIX_DIM 2 3 1 /end MEASUREMENT
        /begin MEASUREMENT virtual "" UBYTE NO_COMPU_METHOD 1 0 0 255 /end MEASUREMENT
        /begin CHARACTERISTIC k_gain "" VALUE 0x2000 rl_word 0 cm_lin -10 100 /end CHARACTERISTIC
        /begin CHARACTERISTIC k_limit "" VALUE 0x2010 rl_word 0 NO_COMPU_METHOD 0 50 READ_ONLY /end CHARACTERISTIC
        /begin CHARACTERISTIC c_curve "" CURVE 0x2100 rl_curve 0 NO_COMPU_METHOD 0 100
          /begin AXIS_DESCR STD_AXIS n_eng cm_lin 8 0 8000 FORMAT "%5.0" /end AXIS_DESCR
        /end CHARACTERISTIC
        /begin CHARACTERISTIC c_free "" CURVE 0x2200 rl_curve 0 NO_COMPU_METHOD 0 100
          /begin AXIS_DESCR STD_AXIS NO_INPUT_QUANTITY NO_COMPU_METHOD 8 0 10 /end AXIS_DESCR
        /end CHARACTERISTIC
        /begin AXIS_PTS a_speed "" 0x3000 n_eng rl_word 0 NO_COMPU_METHOD 8 0 250 /end AXIS_PTS
        /begin FUNCTION f_ctrl ""
          /begin DEF_CHARACTERISTIC k_gain c_curve /end DEF_CHARACTERISTIC
          /begin IN_MEASUREMENT n_eng /end IN_MEASUREMENT
          /begin LOC_MEASUREMENT n_wheel t_map /end LOC_MEASUREMENT
          /begin SUB_FUNCTION f_sub /end SUB_FUNCTION
        /end FUNCTION
        /begin FUNCTION f_sub "" /end FUNCTION
      /end MODULE
      /begin MODULE gearbox "" /end MODULE
    /end PROJECT"#;

    fn database() -> Database {
        crate::load_from_string(QUERIES, true).unwrap().0
    }

    fn all_names<'a>(
        mut next: impl FnMut(Option<usize>) -> Option<(usize, &'a str)>,
    ) -> Vec<&'a str> {
        let mut names = Vec::new();
        let mut previous = None;
        while let Some((index, name)) = next(previous) {
            names.push(name);
            previous = Some(index);
        }
        names
    }

    #[test]
    fn name_filter() {
        assert!(matches!(NameFilter::new("*").unwrap(), NameFilter::Any));
        assert!(matches!(NameFilter::new("").unwrap(), NameFilter::Any));
        let filter = NameFilter::new("n_*").unwrap();
        assert!(filter.is_match("n_eng"));
        assert!(!filter.is_match("t_n_eng"));
        let filter = NameFilter::new("k_?ain").unwrap();
        assert!(filter.is_match("k_gain"));
        assert!(!filter.is_match("k_gains"));
        assert!(!filter.is_match("K_gain"));
        // regex syntax in a name is literal text
        let filter = NameFilter::new("a.b[0]").unwrap();
        assert!(filter.is_match("a.b[0]"));
        assert!(!filter.is_match("axb0"));
    }

    #[test]
    fn iterate_modules() {
        let database = database();
        let names = all_names(|previous| database.next_module_name(previous, &NameFilter::all()));
        assert_eq!(names, vec!["engine", "gearbox"]);
        let filter = NameFilter::new("gear*").unwrap();
        assert_eq!(database.next_module_name(None, &filter), Some((1, "gearbox")));
    }

    #[test]
    fn iterate_measurements() {
        let database = database();
        let all = NameFilter::all();
        let names = all_names(|previous| {
            database.next_measurement(previous, &all, LabelTypeMask::MEASUREMENT, None)
        });
        assert_eq!(names, vec!["n_eng", "n_wheel", "t_map", "virtual"]);

        let names = all_names(|previous| {
            database.next_measurement(previous, &all, LabelTypeMask::SINGLE_MEASUREMENT, None)
        });
        assert_eq!(names, vec!["n_eng", "virtual"]);

        let names = all_names(|previous| {
            database.next_measurement(
                previous,
                &all,
                LabelTypeMask::ARRAY_1D_MEASUREMENT | LabelTypeMask::ARRAY_2D_MEASUREMENT,
                None,
            )
        });
        assert_eq!(names, vec!["n_wheel", "t_map"]);

        let filter = NameFilter::new("n_*").unwrap();
        let referenced = |label: LabelIndex| label == LabelIndex::Measurement(1);
        let referenced_only = LabelTypeMask::SINGLE_MEASUREMENT
            | LabelTypeMask::ARRAY_1D_MEASUREMENT
            | LabelTypeMask::REFERENCED;
        let result = database.next_measurement(None, &filter, referenced_only, Some(&referenced));
        assert_eq!(result, Some((1, "n_wheel")));
        assert_eq!(
            database.next_measurement(Some(1), &filter, referenced_only, Some(&referenced)),
            None
        );
        // both reference bits accept referenced and unreferenced objects
        let result = database.next_measurement(
            None,
            &filter,
            LabelTypeMask::MEASUREMENT | LabelTypeMask::REFERENCED,
            Some(&referenced),
        );
        assert_eq!(result, Some((0, "n_eng")));
        let result = database.next_measurement(
            None,
            &filter,
            LabelTypeMask::SINGLE_MEASUREMENT | LabelTypeMask::NOT_REFERENCED,
            Some(&referenced),
        );
        assert_eq!(result, Some((0, "n_eng")));
    }

    #[test]
    fn iterate_characteristics() {
        let database = database();
        let all = NameFilter::all();
        let names = all_names(|previous| {
            database.next_characteristic(previous, &all, LabelTypeMask::CALIBRATION, None)
        });
        assert_eq!(names, vec!["c_curve", "c_free", "k_gain", "k_limit"]);

        let names = all_names(|previous| {
            database.next_characteristic(previous, &all, LabelTypeMask::VALUE, None)
        });
        assert_eq!(names, vec!["k_gain", "k_limit"]);
        assert_eq!(
            database.next_characteristic(None, &all, LabelTypeMask::MAP, None),
            None
        );

        let names = all_names(|previous| {
            database.next_axis_pts(previous, &all, LabelTypeMask::AXIS_CALIBRATION, None)
        });
        assert_eq!(names, vec!["a_speed"]);
        assert_eq!(database.next_axis_pts(None, &all, LabelTypeMask::CALIBRATION, None), None);
    }

    #[test]
    fn function_members() {
        let database = database();
        let all = NameFilter::all();
        let function = database.function_index("f_ctrl").unwrap();
        assert_eq!(database.next_function(None, &all), Some((0, "f_ctrl")));
        assert_eq!(database.next_function(Some(0), &all), Some((1, "f_sub")));
        assert_eq!(database.next_function(Some(1), &all), None);

        let mut members = Vec::new();
        let mut previous = None;
        while let Some((member, name, kind)) =
            database.next_function_member(function, previous, &all, FunctionMembers::ALL)
        {
            members.push((member, name, kind));
            previous = Some(member);
        }
        assert_eq!(
            members,
            vec![
                (0, "k_gain", FunctionMemberKind::DefCharacteristic),
                (1, "c_curve", FunctionMemberKind::DefCharacteristic),
                (0x2000_0000, "n_eng", FunctionMemberKind::InMeasurement),
                (0x4000_0000, "n_wheel", FunctionMemberKind::LocMeasurement),
                (0x4000_0001, "t_map", FunctionMemberKind::LocMeasurement),
                (0x5000_0000, "f_sub", FunctionMemberKind::SubFunction),
            ]
        );

        let measurements = FunctionMembers::IN_MEASUREMENT | FunctionMembers::LOC_MEASUREMENT;
        let filter = NameFilter::new("t_*").unwrap();
        assert_eq!(
            database.next_function_member(function, None, &filter, measurements),
            Some((0x4000_0001, "t_map", FunctionMemberKind::LocMeasurement))
        );
        assert_eq!(
            database.next_function_member(function, Some(0x4000_0001), &all, measurements),
            None
        );
    }

    #[test]
    fn measurement_infos() {
        let database = database();
        let infos = database
            .measurement_infos(database.measurement_index("n_eng").unwrap())
            .unwrap();
        assert_eq!(infos.datatype, DataType::Uword);
        assert_eq!(infos.address, 0x1000);
        assert_eq!(infos.conversion.kind, ConversionKind::FactorOffset);
        assert_eq!(infos.conversion.text, "0.5:-10");
        assert_eq!(infos.conversion.unit, "km/h");
        // FORMAT of the measurement overrides the one of the conversion
        assert_eq!(
            (infos.conversion.format_length, infos.conversion.format_layout),
            (8, 1)
        );
        assert_eq!((infos.x_dim, infos.y_dim, infos.z_dim), (0, 0, 0));
        assert!(!infos.writable);

        let infos = database
            .measurement_infos(database.measurement_index("n_wheel").unwrap())
            .unwrap();
        assert_eq!(infos.x_dim, 4);
        assert!(infos.writable);
        assert_eq!(infos.conversion.kind, ConversionKind::None);

        let infos = database
            .measurement_infos(database.measurement_index("t_map").unwrap())
            .unwrap();
        assert_eq!((infos.x_dim, infos.y_dim), (2, 3));

        let result = database.measurement_infos(database.measurement_index("virtual").unwrap());
        assert!(matches!(result, Err(AccessError::NoAddress(_))));
        assert!(database.measurement_infos(100).is_err());
    }

    #[test]
    fn characteristic_infos() {
        let database = database();
        let k_gain = database.characteristic_index("k_gain").unwrap();
        let infos = database.value_characteristic_infos(k_gain).unwrap();
        assert_eq!(infos.datatype, DataType::Uword);
        assert_eq!(infos.address, 0x2000);
        assert_eq!((infos.min, infos.max), (-10.0, 100.0));
        assert_eq!(
            (infos.conversion.format_length, infos.conversion.format_layout),
            (6, 2)
        );
        assert!(infos.writable);

        let k_limit = database.characteristic_index("k_limit").unwrap();
        assert!(!database.value_characteristic_infos(k_limit).unwrap().writable);

        let c_curve = database.characteristic_index("c_curve").unwrap();
        assert!(database.value_characteristic_infos(c_curve).is_err());

        let axis = database.characteristic_axis_infos(c_curve, 0).unwrap();
        assert_eq!((axis.min, axis.max), (0.0, 100.0));
        assert_eq!(axis.input_quantity, None);
        let axis = database.characteristic_axis_infos(c_curve, 1).unwrap();
        assert_eq!(axis.max, 8000.0);
        assert_eq!(axis.input_quantity.as_deref(), Some("n_eng"));
        assert_eq!(axis.conversion.kind, ConversionKind::FactorOffset);
        assert_eq!(axis.conversion.format_length, 5);
        assert!(database.characteristic_axis_infos(c_curve, 2).is_err());
        assert!(database.characteristic_axis_infos(c_curve, 3).is_err());

        let c_free = database.characteristic_index("c_free").unwrap();
        let axis = database.characteristic_axis_infos(c_free, 1).unwrap();
        assert_eq!(axis.input_quantity, None);
        assert_eq!(axis.conversion.kind, ConversionKind::None);
    }

    #[test]
    fn calibration_range_and_types() {
        let database = database();
        assert_eq!(database.min_max_calibration_address(), Some((0x2000, 0x2200)));
        let k_gain = database.characteristic_index("k_gain").unwrap();
        let c_curve = database.characteristic_index("c_curve").unwrap();
        assert_eq!(database.characteristic_type_mask(k_gain), Some(1 << 1));
        assert_eq!(database.characteristic_type_mask(c_curve), Some(1 << 4));
        assert_eq!(database.characteristic_type_mask(99), None);
        assert_eq!(
            LabelTypeMask::for_characteristic_type(CharacteristicType::Curve),
            LabelTypeMask::CURVE
        );
    }

    #[test]
    fn label_type_masks() {
        assert!(LabelTypeMask::MEASUREMENT.contains(LabelTypeMask::REFERENCED));
        assert!(LabelTypeMask::MEASUREMENT.contains(LabelTypeMask::NOT_REFERENCED));
        assert!(!LabelTypeMask::ALL.intersects(LabelTypeMask::REFERENCED));
        // reference bits alone do not select measurements
        assert!(!(LabelTypeMask::VALUE | LabelTypeMask::REFERENCED).includes_measurements());
        assert!(LabelTypeMask::ARRAY_3D_MEASUREMENT.includes_measurements());
        assert!(LabelTypeMask::CUBE_5.includes_characteristics());
        assert!(!LabelTypeMask::MEASUREMENT.includes_characteristics());
        assert!(LabelTypeMask::ALL.includes_axis_pts());
        assert_eq!(LabelTypeMask::default(), LabelTypeMask::empty());

        let mut members = FunctionMembers::DEF_CHARACTERISTIC;
        members.insert(FunctionMemberKind::SubFunction.flag());
        assert!(FunctionMembers::ALL.contains(members));
        assert_eq!(members.bits(), 0x21);
    }
}
