use crate::convert::{ConvFlags, ConversionError, Converter, FormulaEvaluator};
use crate::database::Database;
use crate::link::{LabelIndex, LinkFlags};
use crate::specification::{
    AlignmentOverrides, AxisId, ByteOrder, Characteristic, CharacteristicType, DataType,
    IndexMode, LayoutItemKind, ModCommon, NO_COMPU_METHOD, RecordLayout, effective_matrix_dim,
};
use crate::target::{RequestGroup, TargetAccess, TargetError};
use crate::value::{A2lData, ArrayValue, LabelType, SingleValue, Value, ValueFlags};
use thiserror::Error;

/// the alignment in bytes of each data type inside a record layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignments {
    pub byte: u32,
    pub word: u32,
    pub long: u32,
    pub int64: u32,
    pub float16: u32,
    pub float32: u32,
    pub float64: u32,
}

impl Default for Alignments {
    fn default() -> Self {
        Self {
            byte: 1,
            word: 2,
            long: 4,
            int64: 8,
            float16: 2,
            float32: 4,
            float64: 8,
        }
    }
}

impl Alignments {
    /// all data types byte aligned
    pub fn packed() -> Self {
        Self {
            byte: 1,
            word: 1,
            long: 1,
            int64: 1,
            float16: 1,
            float32: 1,
            float64: 1,
        }
    }

    /// Build the alignment table of a record layout.
    ///
    /// The defaults are overridden by the ALIGNMENT_* settings of MOD_COMMON, which in turn are
    /// overridden by the settings of the record layout. The link flags can disable each level.
    pub fn new(
        flags: LinkFlags,
        mod_common: Option<&ModCommon>,
        record_layout: Option<&RecordLayout>,
    ) -> Self {
        let mut alignments = if flags.contains(LinkFlags::NO_DEFAULT_ALIGNMENT) {
            Self::packed()
        } else {
            Self::default()
        };
        if !flags.contains(LinkFlags::IGNORE_MOD_COMMON_ALIGNMENTS) {
            if let Some(mod_common) = mod_common {
                alignments.apply(&mod_common.alignment);
            }
        }
        if !flags.contains(LinkFlags::IGNORE_RECORD_LAYOUT_ALIGNMENTS) {
            if let Some(record_layout) = record_layout {
                alignments.apply(&record_layout.alignment);
            }
        }
        alignments
    }

    fn apply(&mut self, overrides: &AlignmentOverrides) {
        self.byte = overrides.byte.unwrap_or(self.byte);
        self.word = overrides.word.unwrap_or(self.word);
        self.long = overrides.long.unwrap_or(self.long);
        self.int64 = overrides.int64.unwrap_or(self.int64);
        self.float16 = overrides.float16.unwrap_or(self.float16);
        self.float32 = overrides.float32.unwrap_or(self.float32);
        self.float64 = overrides.float64.unwrap_or(self.float64);
    }

    pub fn for_type(&self, datatype: DataType) -> u32 {
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

/// Align `address` for a value of type `datatype`.
///
/// The base address of a record is never moved; every other address is rounded up to the next
/// multiple of the alignment of the type.
pub fn check_alignment_by_type(
    address: u64,
    base: u64,
    datatype: DataType,
    alignments: &Alignments,
) -> u64 {
    if address == base {
        return address;
    }
    let alignment = u64::from(alignments.for_type(datatype).max(1));
    match address % alignment {
        0 => address,
        remainder => address + (alignment - remainder),
    }
}

/// the steps of a staged read or write
///
/// A read starts with `ReadDimensionsReq` and ends with `Successful`. A write starts with
/// `ReadMaskReq`. Between two steps the request groups are handed to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    /// queue the reads of the axis point counts stored in the target
    ReadDimensionsReq,
    /// consume the point counts and queue the reads of the values
    ReadDimensionsAckDataReq,
    /// decode the values
    ReadData,
    Successful,
    /// queue the reads of the memory shared with masked values
    ReadMaskReq,
    /// merge the masked values and queue the writes
    ReadMaskAckWriteDataReq,
    WriteData,
    Error,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AccessError {
    #[error("{index} is not a valid {kind}")]
    InvalidIndex { kind: &'static str, index: usize },

    #[error("{0} has no valid address")]
    NoAddress(String),

    #[error("the record layout {layout} of {name} does not exist")]
    NoRecordLayout { name: String, layout: String },

    #[error("no dimension defined for {0}")]
    NoDimension(String),

    #[error("the {axis} size of {name} is <= 0")]
    InvalidDimension { name: String, axis: AxisId },

    #[error("{name} references the unknown axis {reference}")]
    UnknownAxisReference { name: String, reference: String },

    #[error("\"{0}\" not implemented yet")]
    Unsupported(String),

    #[error("do not expect a \"{item}\" inside the RECORD_LAYOUT {layout} of an AXIS_PTS")]
    UnexpectedLayoutItem { item: String, layout: String },

    #[error("the RECORD_LAYOUT {layout} of {name} has no FNC_VALUES")]
    MissingFncValues { name: String, layout: String },

    #[error("{0} is read only")]
    ReadOnly(String),

    /// the value buffer passed to a write does not have the shape of the object
    #[error("the value buffer does not match the layout of {0}")]
    StructMismatch(String),

    #[error("no data was read from address 0x{address:X} ({size} bytes)")]
    MissingData { address: u64, size: usize },

    #[error("the value {value} of {name} can not be stored as {datatype}")]
    ValueRange {
        name: String,
        value: String,
        datatype: DataType,
    },

    #[error("conversion of {name} failed: {source}")]
    Conversion {
        name: String,
        source: ConversionError,
    },

    #[error("the state {0:?} is not valid here")]
    InvalidState(AccessState),

    #[error(transparent)]
    Target(#[from] TargetError),
}

// where one value of an array comes from
#[derive(Debug, Clone, Copy, PartialEq)]
enum Element {
    Stored { address: u64, datatype: DataType },
    // fixed axis points are calculated, not stored
    Virtual(f64),
}

#[derive(Debug)]
struct PlannedArray<'a> {
    dims: Vec<usize>,
    flags: ValueFlags,
    conversion: &'a str,
    big_endian: bool,
    mask: u64,
    elements: Vec<Element>,
}

// the resolved memory layout of one object
#[derive(Debug)]
struct Plan<'a> {
    label_type: LabelType,
    name: &'a str,
    single: bool,
    arrays: Vec<PlannedArray<'a>>,
}

#[derive(Debug)]
struct AxisPlan<'a> {
    id: AxisId,
    points: usize,
    // false while the count still has to be taken from a NO_AXIS_PTS item
    valid: bool,
    max_points: usize,
    // the points are stored in the record of the characteristic
    inline: bool,
    array: PlannedArray<'a>,
}

// supplies the point counts that are stored in NO_AXIS_PTS items
trait DimensionSource {
    /// number of points of array `array_no`; None if the count is not available yet
    fn axis_points(
        &mut self,
        array_no: usize,
        address: u64,
        datatype: DataType,
        big_endian: bool,
    ) -> Result<Option<usize>, AccessError>;
}

// reads the counts from the target. Missing counts are queued, or are an error once no more
// requests are possible
struct TargetDimensions<'g> {
    group: &'g mut RequestGroup,
    request: bool,
}

impl DimensionSource for TargetDimensions<'_> {
    fn axis_points(
        &mut self,
        _array_no: usize,
        address: u64,
        datatype: DataType,
        big_endian: bool,
    ) -> Result<Option<usize>, AccessError> {
        let size = datatype.size();
        if let Some(bytes) = self.group.data(address, size) {
            let count = decode_raw(bytes, datatype, big_endian, u64::MAX)
                .to_i64()
                .unwrap_or(0)
                .max(0);
            return Ok(Some(usize::try_from(count).unwrap_or(usize::MAX)));
        }
        if self.request {
            self.group.request_read(address, size);
            Ok(None)
        } else {
            Err(AccessError::MissingData { address, size })
        }
    }
}

// a write takes the counts from the value buffer
struct SuppliedDimensions<'d> {
    data: &'d A2lData,
}

impl DimensionSource for SuppliedDimensions<'_> {
    fn axis_points(
        &mut self,
        array_no: usize,
        _address: u64,
        _datatype: DataType,
        _big_endian: bool,
    ) -> Result<Option<usize>, AccessError> {
        Ok(self.data.array_size(array_no))
    }
}

/// Locates the values of measurements, characteristics and axes in the target memory and
/// converts them.
///
/// Reads and writes are performed in steps (see [`AccessState`]); `get_data` and `set_data`
/// run all steps against a target.
pub struct LayoutEngine<'a> {
    database: &'a Database,
    flags: LinkFlags,
    base_offset: u64,
    converter: Converter<'a>,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(
        database: &'a Database,
        flags: LinkFlags,
        base_offset: u64,
        evaluator: &'a dyn FormulaEvaluator,
    ) -> Self {
        Self {
            database,
            flags,
            base_offset,
            converter: Converter::new(database.module(), evaluator),
        }
    }

    /// the address in the target of an address from the a2l file
    pub fn translate_address(&self, address: u64) -> Result<u64, AccessError> {
        address
            .checked_add(self.base_offset)
            .ok_or(AccessError::Target(TargetError::AddressOverflow(address)))
    }

    /// read and decode the data of an object
    pub fn get_data(
        &self,
        target: &dyn TargetAccess,
        label: LabelIndex,
        conv_flags: ConvFlags,
    ) -> Result<A2lData, AccessError> {
        let mut dimensions = RequestGroup::new();
        let mut data = RequestGroup::new();
        let mut state = AccessState::ReadDimensionsReq;
        loop {
            let (next, result) =
                self.get_data_state(label, conv_flags, state, &mut dimensions, &mut data)?;
            if let Some(result) = result {
                return Ok(result);
            }
            target.fetch(&mut dimensions)?;
            target.fetch(&mut data)?;
            state = next;
        }
    }

    /// Perform one step of a read.
    ///
    /// Returns the next state. The decoded data is returned by the `ReadData` step, which ends
    /// the read. Before the next step the target must answer the reads queued in `dimensions`
    /// and `data`.
    pub fn get_data_state(
        &self,
        label: LabelIndex,
        conv_flags: ConvFlags,
        state: AccessState,
        dimensions: &mut RequestGroup,
        data: &mut RequestGroup,
    ) -> Result<(AccessState, Option<A2lData>), AccessError> {
        match state {
            AccessState::ReadDimensionsReq | AccessState::ReadDimensionsAckDataReq => {
                let mut source = TargetDimensions {
                    group: dimensions,
                    request: true,
                };
                match self.plan(label, &mut source)? {
                    // another round of point counts is needed
                    None => Ok((AccessState::ReadDimensionsAckDataReq, None)),
                    Some(plan) => {
                        self.request_data(&plan, data)?;
                        Ok((AccessState::ReadData, None))
                    }
                }
            }
            AccessState::ReadData => {
                let mut source = TargetDimensions {
                    group: dimensions,
                    request: false,
                };
                let plan = self
                    .plan(label, &mut source)?
                    .ok_or(AccessError::InvalidState(state))?;
                let result = self.decode(&plan, data, conv_flags)?;
                Ok((AccessState::Successful, Some(result)))
            }
            other => Err(AccessError::InvalidState(other)),
        }
    }

    /// write all values of `data` that are marked for update
    pub fn set_data(
        &self,
        target: &dyn TargetAccess,
        label: LabelIndex,
        data: &A2lData,
    ) -> Result<(), AccessError> {
        if !target.is_writable() {
            return Err(AccessError::Target(TargetError::ReadOnly(
                target.name().to_string(),
            )));
        }
        let mut masks = RequestGroup::new();
        let mut writes = RequestGroup::new();
        let mut state = AccessState::ReadMaskReq;
        loop {
            state = self.set_data_state(label, data, state, &mut masks, &mut writes)?;
            match state {
                AccessState::ReadMaskAckWriteDataReq => target.fetch(&mut masks)?,
                AccessState::WriteData => target.flush(&mut writes)?,
                AccessState::Successful => return Ok(()),
                other => return Err(AccessError::InvalidState(other)),
            }
        }
    }

    /// Perform one step of a write.
    ///
    /// `ReadMaskReq` queues reads into `masks` for values that share memory with other data
    /// (BIT_MASK); `ReadMaskAckWriteDataReq` queues the writes into `writes`. `WriteData` is
    /// called after the writes were performed.
    pub fn set_data_state(
        &self,
        label: LabelIndex,
        data: &A2lData,
        state: AccessState,
        masks: &mut RequestGroup,
        writes: &mut RequestGroup,
    ) -> Result<AccessState, AccessError> {
        let (name, read_only) = self.label_access(label)?;
        if read_only && !self.flags.contains(LinkFlags::IGNORE_READ_ONLY) {
            return Err(AccessError::ReadOnly(name.to_string()));
        }

        match state {
            AccessState::ReadMaskReq | AccessState::ReadMaskAckWriteDataReq => {
                let plan = self
                    .plan(label, &mut SuppliedDimensions { data })?
                    .ok_or_else(|| AccessError::StructMismatch(name.to_string()))?;
                for (planned, element, value) in paired_values(&plan, data)? {
                    if !value.flags.contains(ValueFlags::UPDATE) {
                        continue;
                    }
                    let Element::Stored { address, datatype } = *element else {
                        log::debug!("{name}: the fixed axis points are not written");
                        continue;
                    };
                    if planned.flags.contains(ValueFlags::READ_ONLY)
                        && !self.flags.contains(LinkFlags::IGNORE_READ_ONLY)
                    {
                        return Err(AccessError::ReadOnly(name.to_string()));
                    }
                    let address = self.translate_address(address)?;
                    if state == AccessState::ReadMaskReq {
                        if planned.mask != u64::MAX {
                            masks.request_read(address, datatype.size());
                        }
                    } else {
                        let bytes = self.encode_value(plan.name, planned, value, address, datatype, masks)?;
                        writes.request_write(address, bytes);
                    }
                }
                Ok(if state == AccessState::ReadMaskReq {
                    AccessState::ReadMaskAckWriteDataReq
                } else {
                    AccessState::WriteData
                })
            }
            AccessState::WriteData => Ok(AccessState::Successful),
            other => Err(AccessError::InvalidState(other)),
        }
    }

    fn label_access(&self, label: LabelIndex) -> Result<(&'a str, bool), AccessError> {
        let database = self.database;
        match label {
            LabelIndex::Measurement(index) => database
                .measurement(index)
                .map(|m| (m.name.as_str(), !m.read_write))
                .ok_or(AccessError::InvalidIndex {
                    kind: "measurement",
                    index,
                }),
            LabelIndex::Characteristic(index) => database
                .characteristic(index)
                .map(|c| (c.name.as_str(), c.is_read_only()))
                .ok_or(AccessError::InvalidIndex {
                    kind: "characteristic",
                    index,
                }),
            LabelIndex::AxisPts(index) => database
                .axis_pts(index)
                .map(|a| (a.name.as_str(), a.is_read_only()))
                .ok_or(AccessError::InvalidIndex {
                    kind: "axis",
                    index,
                }),
        }
    }

    fn plan(
        &self,
        label: LabelIndex,
        dimensions: &mut dyn DimensionSource,
    ) -> Result<Option<Plan<'a>>, AccessError> {
        match label {
            LabelIndex::Measurement(index) => self.measurement_plan(index).map(Some),
            LabelIndex::Characteristic(index) => self.characteristic_plan(index, dimensions),
            LabelIndex::AxisPts(index) => {
                let name = self.label_access(label)?.0;
                Ok(self.axis_array(index, 0, dimensions)?.map(|array| Plan {
                    label_type: LabelType::AxisPts,
                    name,
                    single: false,
                    arrays: vec![array],
                }))
            }
        }
    }

    fn measurement_plan(&self, index: usize) -> Result<Plan<'a>, AccessError> {
        let database = self.database;
        let measurement = database
            .measurement(index)
            .ok_or(AccessError::InvalidIndex {
                kind: "measurement",
                index,
            })?;
        let address = match measurement.ecu_address {
            Some(address) if address != 0 => u64::from(address),
            _ => return Err(AccessError::NoAddress(measurement.name.clone())),
        };
        let mut flags = ValueFlags::MEASUREMENT;
        if !measurement.read_write {
            flags |= ValueFlags::READ_ONLY;
        }
        let dims: Vec<usize> = measurement
            .dimensions()
            .into_iter()
            .map(usize::from)
            .collect();
        let count: usize = dims.iter().product();
        let datatype = measurement.datatype;
        let size = datatype.size() as u64;
        let elements = (0..count as u64)
            .map(|idx| Element::Stored {
                address: address + idx * size,
                datatype,
            })
            .collect();

        Ok(Plan {
            label_type: LabelType::Measurement,
            name: &measurement.name,
            single: dims.is_empty(),
            arrays: vec![PlannedArray {
                dims,
                flags,
                conversion: &measurement.conversion,
                big_endian: self.big_endian(measurement.byte_order),
                mask: measurement.bit_mask.unwrap_or(u64::MAX),
                elements,
            }],
        })
    }

    // the points of the AXIS_PTS `index`, as array `array_no` of the value buffer
    fn axis_array(
        &self,
        index: usize,
        array_no: usize,
        dimensions: &mut dyn DimensionSource,
    ) -> Result<Option<PlannedArray<'a>>, AccessError> {
        let database = self.database;
        let axis = database
            .axis_pts(index)
            .ok_or(AccessError::InvalidIndex { kind: "axis", index })?;
        if axis.address == 0 {
            return Err(AccessError::NoAddress(axis.name.clone()));
        }
        let layout = database.record_layout(&axis.deposit_record).ok_or_else(|| {
            AccessError::NoRecordLayout {
                name: axis.name.clone(),
                layout: axis.deposit_record.clone(),
            }
        })?;
        let alignments = self.alignments(layout);
        let big_endian = self.big_endian(axis.byte_order);
        let max_points = usize::from(axis.max_axis_points);
        let (mut points, mut valid) = match layout.fix_no_axis_pts(AxisId::X) {
            Some(fix) => (usize::from(fix), true),
            None => (max_points, layout.no_axis_pts(AxisId::X).is_none()),
        };

        let base = u64::from(axis.address);
        let mut address = base;
        let mut elements = Vec::new();
        for item in &layout.items {
            let size = item.datatype.size() as u64;
            match item.kind {
                LayoutItemKind::FncValues { .. } => {
                    return Err(AccessError::UnexpectedLayoutItem {
                        item: item.kind.keyword(),
                        layout: layout.name.clone(),
                    });
                }
                LayoutItemKind::AxisPts {
                    axis: AxisId::X | AxisId::Y,
                    ..
                } => {
                    if points == 0 {
                        return Err(AccessError::InvalidDimension {
                            name: axis.name.clone(),
                            axis: AxisId::X,
                        });
                    }
                    for _ in 0..points {
                        address = check_alignment_by_type(address, base, item.datatype, &alignments);
                        elements.push(Element::Stored {
                            address,
                            datatype: item.datatype,
                        });
                        address += size;
                    }
                }
                LayoutItemKind::NoAxisPts(AxisId::X | AxisId::Y) => {
                    address = check_alignment_by_type(address, base, item.datatype, &alignments);
                    if !valid {
                        let translated = self.translate_address(address)?;
                        match dimensions.axis_points(array_no, translated, item.datatype, big_endian)? {
                            Some(count) => {
                                points = count.min(max_points);
                                valid = true;
                            }
                            None => return Ok(None),
                        }
                    }
                    address += size;
                }
                LayoutItemKind::Reserved => address += size,
                other => return Err(AccessError::Unsupported(other.keyword())),
            }
        }

        let mut flags = ValueFlags::CALIBRATION;
        if axis.is_read_only() && !self.flags.contains(LinkFlags::IGNORE_READ_ONLY) {
            flags |= ValueFlags::READ_ONLY;
        }
        Ok(Some(PlannedArray {
            dims: vec![elements.len()],
            flags,
            conversion: &axis.conversion,
            big_endian,
            mask: u64::MAX,
            elements,
        }))
    }

    fn characteristic_plan(
        &self,
        index: usize,
        dimensions: &mut dyn DimensionSource,
    ) -> Result<Option<Plan<'a>>, AccessError> {
        let database = self.database;
        let characteristic = database
            .characteristic(index)
            .ok_or(AccessError::InvalidIndex {
                kind: "characteristic",
                index,
            })?;
        let name = &characteristic.name;
        if characteristic.address == 0 {
            return Err(AccessError::NoAddress(name.clone()));
        }
        let layout = database
            .record_layout(&characteristic.deposit)
            .ok_or_else(|| AccessError::NoRecordLayout {
                name: name.clone(),
                layout: characteristic.deposit.clone(),
            })?;
        let alignments = self.alignments(layout);
        let big_endian = self.big_endian(characteristic.byte_order);
        let mut flags = ValueFlags::CALIBRATION;
        if characteristic.is_read_only() && !self.flags.contains(LinkFlags::IGNORE_READ_ONLY) {
            flags |= ValueFlags::READ_ONLY;
        }

        let mut block_dims = Vec::new();
        let mut axes = Vec::new();
        match characteristic.characteristic_type {
            CharacteristicType::Value => {}
            CharacteristicType::Ascii | CharacteristicType::ValBlk => {
                block_dims = if let Some(matrix_dim) = &characteristic.matrix_dim {
                    effective_matrix_dim(matrix_dim)
                        .into_iter()
                        .map(usize::from)
                        .collect()
                } else if let Some(number) = characteristic.number {
                    vec![usize::from(number)]
                } else if let Some(fix) = layout.fix_no_axis_pts(AxisId::X) {
                    vec![usize::from(fix)]
                } else {
                    return Err(AccessError::NoDimension(name.clone()));
                };
                if block_dims.len() > 3 {
                    return Err(AccessError::Unsupported(format!(
                        "MATRIX_DIM with {} dimensions",
                        block_dims.len()
                    )));
                }
            }
            CharacteristicType::Curve | CharacteristicType::Map => {
                let axis_count = if characteristic.characteristic_type == CharacteristicType::Curve {
                    1
                } else {
                    2
                };
                for axis_no in 0..axis_count {
                    match self.characteristic_axis(characteristic, layout, axis_no, dimensions)? {
                        Some(axis) => axes.push(axis),
                        None => return Ok(None),
                    }
                }
            }
            other => return Err(AccessError::Unsupported(other.name().to_string())),
        }

        let base = u64::from(characteristic.address);
        let mut address = base;
        let mut values = None;
        for item in &layout.items {
            let size = item.datatype.size() as u64;
            match item.kind {
                LayoutItemKind::FncValues { index_mode, .. } => {
                    address = check_alignment_by_type(address, base, item.datatype, &alignments);
                    let dims = if axes.is_empty() {
                        block_dims.clone()
                    } else {
                        for axis in &axes {
                            if axis.points == 0 {
                                return Err(AccessError::InvalidDimension {
                                    name: name.clone(),
                                    axis: axis.id,
                                });
                            }
                        }
                        axes.iter().map(|axis| axis.points).collect()
                    };
                    let xdim = dims.first().copied().unwrap_or(1);
                    let ydim = dims.get(1).copied().unwrap_or(1);
                    let zdim = dims.get(2).copied().unwrap_or(1);
                    let row_dir = match index_mode {
                        IndexMode::RowDir => true,
                        IndexMode::ColumnDir => false,
                        alternate => {
                            log::warn!(
                                "{name}: index mode {alternate} is not supported, using COLUMN_DIR"
                            );
                            false
                        }
                    };
                    let mut elements = Vec::with_capacity(xdim * ydim * zdim);
                    // values are kept with x varying fastest, independent of the memory order
                    for z in 0..zdim {
                        for y in 0..ydim {
                            for x in 0..xdim {
                                let offset = if row_dir {
                                    z * ydim * xdim + y * xdim + x
                                } else {
                                    z * ydim * xdim + x * ydim + y
                                };
                                elements.push(Element::Stored {
                                    address: address + offset as u64 * size,
                                    datatype: item.datatype,
                                });
                            }
                        }
                    }
                    address += (xdim * ydim * zdim) as u64 * size;
                    values = Some(PlannedArray {
                        dims,
                        flags,
                        conversion: &characteristic.conversion,
                        big_endian,
                        mask: characteristic.bit_mask.unwrap_or(u64::MAX),
                        elements,
                    });
                }
                LayoutItemKind::AxisPts {
                    axis: id @ (AxisId::X | AxisId::Y),
                    ..
                } => {
                    let Some(axis) = axes.iter_mut().find(|axis| axis.id == id && axis.inline)
                    else {
                        log::debug!("{name}: {} is not used by the axis description", item.kind.keyword());
                        continue;
                    };
                    if axis.points == 0 {
                        return Err(AccessError::InvalidDimension {
                            name: name.clone(),
                            axis: id,
                        });
                    }
                    for _ in 0..axis.points {
                        address = check_alignment_by_type(address, base, item.datatype, &alignments);
                        axis.array.elements.push(Element::Stored {
                            address,
                            datatype: item.datatype,
                        });
                        address += size;
                    }
                }
                LayoutItemKind::NoAxisPts(id @ (AxisId::X | AxisId::Y)) => {
                    address = check_alignment_by_type(address, base, item.datatype, &alignments);
                    let array_no = id.dim_index().unwrap_or(0);
                    if let Some(axis) = axes.iter_mut().find(|axis| axis.id == id && !axis.valid) {
                        let translated = self.translate_address(address)?;
                        match dimensions.axis_points(array_no, translated, item.datatype, big_endian)? {
                            Some(count) => {
                                axis.points = count.min(axis.max_points);
                                axis.valid = true;
                            }
                            None => return Ok(None),
                        }
                    }
                    address += size;
                }
                LayoutItemKind::Reserved => address += size,
                other => return Err(AccessError::Unsupported(other.keyword())),
            }
        }

        let values = values.ok_or_else(|| AccessError::MissingFncValues {
            name: name.clone(),
            layout: layout.name.clone(),
        })?;
        let single = characteristic.characteristic_type == CharacteristicType::Value;
        let mut arrays = Vec::with_capacity(axes.len() + 1);
        for mut axis in axes {
            axis.array.dims = vec![axis.array.elements.len()];
            arrays.push(axis.array);
        }
        arrays.push(values);
        Ok(Some(Plan {
            label_type: LabelType::Characteristic(characteristic.characteristic_type),
            name,
            single,
            arrays,
        }))
    }

    // resolve where the points of axis `axis_no` of a curve or map come from
    fn characteristic_axis(
        &self,
        characteristic: &'a Characteristic,
        layout: &RecordLayout,
        axis_no: usize,
        dimensions: &mut dyn DimensionSource,
    ) -> Result<Option<AxisPlan<'a>>, AccessError> {
        let id = if axis_no == 0 { AxisId::X } else { AxisId::Y };
        let descr = characteristic.axis_descr.get(axis_no);
        let conversion = descr.map_or(NO_COMPU_METHOD, |descr| descr.conversion.as_str());
        let big_endian = self.big_endian(
            descr
                .and_then(|descr| descr.byte_order)
                .or(characteristic.byte_order),
        );
        let mut flags = ValueFlags::CALIBRATION;
        let read_only = characteristic.is_read_only() || descr.is_some_and(|descr| descr.read_only);
        if read_only && !self.flags.contains(LinkFlags::IGNORE_READ_ONLY) {
            flags |= ValueFlags::READ_ONLY;
        }

        if let Some(fix_axis) = descr.and_then(|descr| descr.fix_axis.as_ref()) {
            let points = fix_axis.count();
            let elements = (0..points)
                .filter_map(|idx| fix_axis.value(idx))
                .map(Element::Virtual)
                .collect();
            return Ok(Some(AxisPlan {
                id,
                points,
                valid: true,
                max_points: points,
                inline: false,
                array: PlannedArray {
                    dims: vec![points],
                    flags: flags | ValueFlags::READ_ONLY | ValueFlags::ONLY_VIRTUAL,
                    conversion,
                    big_endian,
                    mask: u64::MAX,
                    elements,
                },
            }));
        }

        if let Some(reference) = descr.and_then(|descr| descr.axis_pts_ref.as_ref()) {
            let axis_index = self.database.axis_pts_index(reference).ok_or_else(|| {
                AccessError::UnknownAxisReference {
                    name: characteristic.name.clone(),
                    reference: reference.clone(),
                }
            })?;
            let Some(array) = self.axis_array(axis_index, axis_no, dimensions)? else {
                return Ok(None);
            };
            let points = array.elements.len();
            return Ok(Some(AxisPlan {
                id,
                points,
                valid: true,
                max_points: points,
                inline: false,
                array,
            }));
        }

        // the points are stored in the record of the characteristic
        let max_points = descr.map_or(usize::MAX, |descr| usize::from(descr.max_axis_points));
        let (points, valid) = match layout.fix_no_axis_pts(id) {
            Some(fix) => (usize::from(fix), true),
            None => (
                descr.map_or(0, |descr| usize::from(descr.max_axis_points)),
                layout.no_axis_pts(id).is_none(),
            ),
        };
        Ok(Some(AxisPlan {
            id,
            points,
            valid,
            max_points,
            inline: true,
            array: PlannedArray {
                dims: Vec::new(),
                flags,
                conversion,
                big_endian,
                mask: u64::MAX,
                elements: Vec::new(),
            },
        }))
    }

    fn alignments(&self, layout: &RecordLayout) -> Alignments {
        Alignments::new(
            self.flags,
            self.database.module().mod_common.as_ref(),
            Some(layout),
        )
    }

    // the byte order of an object defaults to the byte order of MOD_COMMON, then to little endian
    fn big_endian(&self, byte_order: Option<ByteOrder>) -> bool {
        byte_order
            .or_else(|| {
                self.database
                    .module()
                    .mod_common
                    .as_ref()
                    .and_then(|mod_common| mod_common.byte_order)
            })
            .is_some_and(|byte_order| byte_order.is_big_endian())
    }

    fn request_data(&self, plan: &Plan, data: &mut RequestGroup) -> Result<(), AccessError> {
        for planned in &plan.arrays {
            for element in &planned.elements {
                if let Element::Stored { address, datatype } = *element {
                    data.request_read(self.translate_address(address)?, datatype.size());
                }
            }
        }
        Ok(())
    }

    fn decode(
        &self,
        plan: &Plan,
        data: &RequestGroup,
        conv_flags: ConvFlags,
    ) -> Result<A2lData, AccessError> {
        let mut arrays = Vec::with_capacity(plan.arrays.len());
        for planned in &plan.arrays {
            let mut values = Vec::with_capacity(planned.elements.len());
            for element in &planned.elements {
                let value = match *element {
                    Element::Stored { address, datatype } => {
                        let size = datatype.size();
                        let translated = self.translate_address(address)?;
                        let bytes = data.data(translated, size).ok_or(AccessError::MissingData {
                            address: translated,
                            size,
                        })?;
                        let raw = decode_raw(bytes, datatype, planned.big_endian, planned.mask);
                        self.convert(plan.name, planned, raw, Some(datatype), address, conv_flags)
                    }
                    Element::Virtual(point) => {
                        self.convert(plan.name, planned, Value::Double(point), None, 0, conv_flags)
                    }
                };
                values.push(value);
            }
            arrays.push(ArrayValue {
                dims: planned.dims.clone(),
                flags: planned.flags,
                values,
            });
        }

        if plan.single {
            let value = arrays
                .into_iter()
                .next()
                .and_then(|array| array.values.into_iter().next())
                .ok_or_else(|| AccessError::StructMismatch(plan.name.to_string()))?;
            Ok(A2lData::single(plan.label_type, value))
        } else {
            Ok(A2lData::arrays(plan.label_type, arrays))
        }
    }

    // a failed conversion leaves the raw value in place
    fn convert(
        &self,
        name: &str,
        planned: &PlannedArray,
        raw: Value,
        target_type: Option<DataType>,
        address: u64,
        conv_flags: ConvFlags,
    ) -> SingleValue {
        let mut flags = planned.flags;
        let value = match self.converter.to_physical(planned.conversion, conv_flags, &raw) {
            Ok(value) => value,
            Err(error) => {
                log::debug!("{name}: {error}");
                raw
            }
        };
        if matches!(value, Value::PhysDouble(_) | Value::Text(_)) {
            flags.insert(ValueFlags::PHYS);
        }
        let mut single = SingleValue::new(value, flags, target_type, address);
        if conv_flags.contains(ConvFlags::UNIT) {
            single.unit = self.converter.unit(planned.conversion).map(str::to_string);
        }
        single
    }

    // the bytes to write for one value; masked values are merged into the current memory content
    fn encode_value(
        &self,
        name: &str,
        planned: &PlannedArray,
        value: &SingleValue,
        address: u64,
        datatype: DataType,
        masks: &RequestGroup,
    ) -> Result<Vec<u8>, AccessError> {
        let raw = match &value.value {
            Value::PhysDouble(_) | Value::Text(_) => Value::Double(
                self.converter
                    .to_raw(planned.conversion, &value.value)
                    .map_err(|source| AccessError::Conversion {
                        name: name.to_string(),
                        source,
                    })?,
            ),
            other => other.clone(),
        };
        let mut bits = encode_raw(&raw, datatype).ok_or_else(|| AccessError::ValueRange {
            name: name.to_string(),
            value: raw.to_string(),
            datatype,
        })?;

        let size = datatype.size();
        if planned.mask != u64::MAX {
            let current = masks
                .data(address, size)
                .ok_or(AccessError::MissingData { address, size })?;
            let current = bytes_to_bits(current, planned.big_endian);
            let shifted = bits.checked_shl(planned.mask.trailing_zeros()).unwrap_or(0);
            bits = (current & !planned.mask) | (shifted & planned.mask);
        }
        Ok(bits_to_bytes(bits, size, planned.big_endian))
    }
}

// match the values of a buffer to the elements of a plan
fn paired_values<'p, 'd>(
    plan: &'p Plan,
    data: &'d A2lData,
) -> Result<Vec<(&'p PlannedArray<'p>, &'p Element, &'d SingleValue)>, AccessError> {
    let mismatch = || AccessError::StructMismatch(plan.name.to_string());
    let mut pairs = Vec::new();
    if plan.single {
        let value = data.single_value().ok_or_else(mismatch)?;
        let planned = plan.arrays.first().ok_or_else(mismatch)?;
        let element = planned.elements.first().ok_or_else(mismatch)?;
        pairs.push((planned, element, value));
        return Ok(pairs);
    }
    if data.array_count() != plan.arrays.len() {
        return Err(mismatch());
    }
    for (array_no, planned) in plan.arrays.iter().enumerate() {
        let array = data.array(array_no).ok_or_else(mismatch)?;
        if array.values.len() != planned.elements.len() {
            return Err(mismatch());
        }
        for (element, value) in planned.elements.iter().zip(&array.values) {
            pairs.push((planned, element, value));
        }
    }
    Ok(pairs)
}

fn bytes_to_bits(bytes: &[u8], big_endian: bool) -> u64 {
    let mut buffer = [0u8; 8];
    let len = bytes.len().min(8);
    if big_endian {
        for (idx, byte) in bytes[..len].iter().rev().enumerate() {
            buffer[idx] = *byte;
        }
    } else {
        buffer[..len].copy_from_slice(&bytes[..len]);
    }
    u64::from_le_bytes(buffer)
}

fn bits_to_bytes(bits: u64, size: usize, big_endian: bool) -> Vec<u8> {
    let mut bytes = bits.to_le_bytes()[..size.min(8)].to_vec();
    if big_endian {
        bytes.reverse();
    }
    bytes
}

// decode the bytes of one value; a masked value is shifted down to bit 0
fn decode_raw(bytes: &[u8], datatype: DataType, big_endian: bool, mask: u64) -> Value {
    let mut bits = bytes_to_bits(bytes, big_endian);
    if mask != u64::MAX {
        bits = (bits & mask).checked_shr(mask.trailing_zeros()).unwrap_or(0);
    }
    match datatype {
        DataType::Ubyte | DataType::Uword | DataType::Ulong | DataType::AUint64 => {
            Value::Uint(bits)
        }
        DataType::Sbyte => Value::Int(i64::from(bits as u8 as i8)),
        DataType::Sword => Value::Int(i64::from(bits as u16 as i16)),
        DataType::Slong => Value::Int(i64::from(bits as u32 as i32)),
        DataType::AInt64 => Value::Int(bits as i64),
        DataType::Float16Ieee => Value::Double(f16_to_f64(bits as u16)),
        DataType::Float32Ieee => Value::Double(f64::from(f32::from_bits(bits as u32))),
        DataType::Float64Ieee => Value::Double(f64::from_bits(bits)),
    }
}

// the bit pattern of a raw value; None if the value does not fit into the data type
fn encode_raw(value: &Value, datatype: DataType) -> Option<u64> {
    match datatype {
        DataType::Ubyte => cast::<u8>(value).map(u64::from),
        DataType::Sbyte => cast::<i8>(value).map(|v| u64::from(v as u8)),
        DataType::Uword => cast::<u16>(value).map(u64::from),
        DataType::Sword => cast::<i16>(value).map(|v| u64::from(v as u16)),
        DataType::Ulong => cast::<u32>(value).map(u64::from),
        DataType::Slong => cast::<i32>(value).map(|v| u64::from(v as u32)),
        DataType::AUint64 => cast::<u64>(value),
        DataType::AInt64 => cast::<i64>(value).map(|v| v as u64),
        DataType::Float16Ieee => value.to_f64().map(|v| u64::from(f64_to_f16(v))),
        DataType::Float32Ieee => value.to_f64().map(|v| u64::from((v as f32).to_bits())),
        DataType::Float64Ieee => value.to_f64().map(f64::to_bits),
    }
}

fn cast<T: num_traits::NumCast>(value: &Value) -> Option<T> {
    match value {
        Value::Int(v) => <T as num_traits::NumCast>::from(*v),
        Value::Uint(v) => <T as num_traits::NumCast>::from(*v),
        Value::Double(v) | Value::PhysDouble(v) => <T as num_traits::NumCast>::from(v.round()),
        Value::Text(_) => None,
    }
}

fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = i32::from((bits >> 10) & 0x1F);
    let fraction = f64::from(bits & 0x3FF);
    match exponent {
        0 => sign * fraction * 2f64.powi(-24),
        0x1F if fraction == 0.0 => sign * f64::INFINITY,
        0x1F => f64::NAN,
        _ => sign * (1.0 + fraction / 1024.0) * 2f64.powi(exponent - 15),
    }
}

fn f64_to_f16(value: f64) -> u16 {
    if value.is_nan() {
        return 0x7E00;
    }
    let sign: u16 = if value.is_sign_negative() { 0x8000 } else { 0 };
    let abs = value.abs();
    if abs >= 65520.0 {
        return sign | 0x7C00;
    }
    if abs < 2f64.powi(-14) {
        // subnormal
        return sign | (abs / 2f64.powi(-24)).round() as u16;
    }
    let mut exponent = abs.log2().floor() as i32;
    let mut mantissa = ((abs / 2f64.powi(exponent) - 1.0) * 1024.0).round() as u16;
    if mantissa == 1024 {
        mantissa = 0;
        exponent += 1;
    }
    sign | (((exponent + 15) as u16) << 10) | mantissa
}
