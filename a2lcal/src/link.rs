use crate::A2lError;
use crate::convert::{BasicFormulaEvaluator, ConvFlags, FormulaEvaluator};
use crate::database::Database;
use crate::ini::IniFile;
use crate::layout::{AccessError, AccessState, LayoutEngine};
use crate::query::{
    AxisInfos, FunctionMemberKind, FunctionMembers, LabelTypeMask, NameFilter, ValueInfos,
};
use crate::target::{RequestGroup, TargetAccess};
use crate::update::{AddressPatcher, UpdateMode, update_addresses};
use crate::value::A2lData;
use bitflags::bitflags;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

/// the number of databases that can be attached at the same time
pub const MAX_LINKS: usize = 32;

const FIRST_GENERATION: u32 = 0xA200;
const SLOT_MASK: u32 = 0xFF;
const GENERATION_MASK: u32 = 0x00FF_FFFF;

bitflags! {
    /// options of a link, set when a database is attached
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LinkFlags: u32 {
        /// update the addresses with an [`AddressPatcher`] while attaching
        const UPDATE = 0x1;
        /// keep the a2l address of objects whose symbol is unknown
        const UPDATE_IGNORE = 0x2;
        /// set the address of objects whose symbol is unknown to 0
        const UPDATE_ZERO = 0x4;
        /// save the referenced labels on close and restore them on attach
        const REMEMBER_REFERENCED_LABELS = 0x20;
        const IGNORE_MOD_COMMON_ALIGNMENTS = 0x40;
        const IGNORE_RECORD_LAYOUT_ALIGNMENTS = 0x80;
        /// allow writing characteristics and axes that are declared READ_ONLY
        const IGNORE_READ_ONLY = 0x100;
        /// all data types are byte aligned unless an ALIGNMENT_* setting says otherwise
        const NO_DEFAULT_ALIGNMENT = 0x200;
    }
}

bitflags! {
    /// the direction in which a referenced label is transferred
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RefDirection: u32 {
        const TO_TARGET = 0x1;
        const FROM_TARGET = 0x2;
        const BOTH = 0x3;
    }
}

impl RefDirection {
    // the names used in the reference file
    fn ini_text(self) -> &'static str {
        match self.bits() {
            1 => "bb2ep",
            2 => "ep2bb",
            3 => "readwrite",
            _ => "default",
        }
    }

    fn from_ini_text(text: &str) -> Option<Self> {
        match text {
            "bb2ep" => Some(RefDirection::TO_TARGET),
            "ep2bb" => Some(RefDirection::FROM_TARGET),
            "readwrite" => Some(RefDirection::BOTH),
            _ => None,
        }
    }
}

/// Identifies an attached database.
///
/// The low byte is the slot of the link; the upper bits hold a generation counter, so that the
/// number of a closed link does not match a later link in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkNr(u32);

impl LinkNr {
    pub fn from_raw(raw: u32) -> Self {
        LinkNr(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn slot(self) -> usize {
        (self.0 & SLOT_MASK) as usize
    }

    pub fn generation(self) -> u32 {
        self.0 >> 8
    }
}

impl Display for LinkNr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// A measurement, characteristic or axis of the selected module, identified by its index.
///
/// In the raw encoding the upper bits select the object list: measurements are stored as the
/// plain index, characteristics with bit 30 set and axes with bits 29 and 30 set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelIndex {
    Measurement(usize),
    Characteristic(usize),
    AxisPts(usize),
}

const CHARACTERISTIC_TAG: u32 = 0x4000_0000;
const AXIS_PTS_TAG: u32 = 0x6000_0000;
const RAW_INDEX_MASK: u32 = 0x1FFF_FFFF;

impl LabelIndex {
    pub fn from_raw(raw: u32) -> Self {
        let index = (raw & RAW_INDEX_MASK) as usize;
        if raw & AXIS_PTS_TAG == AXIS_PTS_TAG {
            LabelIndex::AxisPts(index)
        } else if raw & CHARACTERISTIC_TAG != 0 {
            LabelIndex::Characteristic(index)
        } else {
            LabelIndex::Measurement(index)
        }
    }

    /// the raw encoding; indices are truncated to 29 bits
    pub fn raw(self) -> u32 {
        match self {
            LabelIndex::Measurement(index) => index as u32 & RAW_INDEX_MASK,
            LabelIndex::Characteristic(index) => (index as u32 & RAW_INDEX_MASK) | CHARACTERISTIC_TAG,
            LabelIndex::AxisPts(index) => (index as u32 & RAW_INDEX_MASK) | AXIS_PTS_TAG,
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinkError {
    /// the link is closed, or was never attached
    #[error("link {0} is not attached")]
    InvalidLink(LinkNr),

    #[error("all {} links are in use", MAX_LINKS)]
    NoFreeSlot,

    #[error(transparent)]
    Load(#[from] A2lError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("cannot set measurement {0}")]
    MeasurementWrite(String),

    #[error("Failed to access the label references in {filename}: {ioerror}")]
    ReferenceStore {
        filename: PathBuf,
        ioerror: std::io::Error,
    },
}

/// persistent storage of the referenced labels of each target
pub trait ReferenceStore: Send + Sync {
    /// the stored pairs of label name and direction
    fn load(&self, target: &str) -> Result<Vec<(String, String)>, LinkError>;

    fn store(&self, target: &str, labels: &[(String, String)]) -> Result<(), LinkError>;
}

/// stores the referenced labels of each target in a section of an ini file
#[derive(Debug)]
pub struct IniReferenceStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl IniReferenceStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn section_name(target: &str) -> String {
        format!("Signal referenced from A2L for Process {target}")
    }

    fn io_error(&self, ioerror: std::io::Error) -> LinkError {
        LinkError::ReferenceStore {
            filename: self.path.clone(),
            ioerror,
        }
    }
}

impl ReferenceStore for IniReferenceStore {
    fn load(&self, target: &str) -> Result<Vec<(String, String)>, LinkError> {
        let _guard = self.lock.lock();
        let ini = IniFile::load(&self.path).map_err(|error| self.io_error(error))?;
        Ok(ini
            .section(&Self::section_name(target))
            .map(<[_]>::to_vec)
            .unwrap_or_default())
    }

    fn store(&self, target: &str, labels: &[(String, String)]) -> Result<(), LinkError> {
        let _guard = self.lock.lock();
        let mut ini = IniFile::load(&self.path).map_err(|error| self.io_error(error))?;
        let section = Self::section_name(target);
        if labels.is_empty() {
            ini.remove_section(&section);
        } else {
            ini.set_section(&section, labels.to_vec());
        }
        ini.save(&self.path).map_err(|error| self.io_error(error))
    }
}

/// options for [`LinkManager::attach`]
#[derive(Clone, Copy, Default)]
pub struct AttachOptions<'a> {
    pub flags: LinkFlags,
    /// added to every address of the a2l file before the target is accessed
    pub base_offset: u64,
    /// resolves the symbols for the address update requested by [`LinkFlags::UPDATE`]
    pub patcher: Option<&'a dyn AddressPatcher>,
}

#[derive(Debug, Clone, Copy)]
struct LabelReference {
    count: u32,
    dir: RefDirection,
}

// a database attached to a target
struct Link {
    nr: LinkNr,
    database: Database,
    target: Arc<dyn TargetAccess>,
    flags: LinkFlags,
    base_offset: u64,
    references: Mutex<FnvHashMap<LabelIndex, LabelReference>>,
}

impl Link {
    fn engine<'a>(&'a self, evaluator: &'a dyn FormulaEvaluator) -> LayoutEngine<'a> {
        LayoutEngine::new(&self.database, self.flags, self.base_offset, evaluator)
    }

    fn reference_count(&self, label: LabelIndex) -> u32 {
        self.references
            .lock()
            .get(&label)
            .map_or(0, |reference| reference.count)
    }

    // label names and directions of all referenced labels, sorted by name
    fn referenced_labels(&self) -> Vec<(String, String)> {
        let references = self.references.lock();
        let mut labels: Vec<(String, String)> = references
            .iter()
            .filter(|(_, reference)| reference.count > 0)
            .filter_map(|(label, reference)| {
                let name = label_name(&self.database, *label)?;
                Some((name.to_string(), reference.dir.ini_text().to_string()))
            })
            .collect();
        labels.sort();
        labels
    }
}

enum SlotState {
    Empty,
    Attached(Arc<Link>),
    // closed while operations were still running; freed by the next attach
    MarkedForRemoval(Arc<Link>),
}

struct LinkSlot {
    state: Mutex<SlotState>,
    // number of running operations; only changed while `state` is locked
    busy: AtomicU32,
}

// decrements the busy counter of a slot when an operation ends
struct BusyGuard<'s> {
    slot: &'s LinkSlot,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let _state = self.slot.state.lock();
        self.slot.busy.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Manages the links between attached databases and their targets.
///
/// All operations can be called from multiple threads. The operations on one link run
/// concurrently; a link that is closed while operations are running stays allocated until
/// the last of them has finished.
pub struct LinkManager {
    slots: Vec<LinkSlot>,
    // the next generation; the lock serializes the allocation of slots
    table: Mutex<u32>,
    evaluator: Arc<dyn FormulaEvaluator>,
    reference_store: Option<Arc<dyn ReferenceStore>>,
}

impl Default for LinkManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkManager {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_LINKS)
                .map(|_| LinkSlot {
                    state: Mutex::new(SlotState::Empty),
                    busy: AtomicU32::new(0),
                })
                .collect(),
            table: Mutex::new(FIRST_GENERATION),
            evaluator: Arc::new(BasicFormulaEvaluator),
            reference_store: None,
        }
    }

    /// use a different evaluator for FORM conversions
    pub fn with_evaluator(mut self, evaluator: Arc<dyn FormulaEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// the store used by links with [`LinkFlags::REMEMBER_REFERENCED_LABELS`]
    pub fn with_reference_store(mut self, store: Arc<dyn ReferenceStore>) -> Self {
        self.reference_store = Some(store);
        self
    }

    /// load an a2l file and attach it to a target
    pub fn attach<P: AsRef<Path>>(
        &self,
        path: P,
        target: Arc<dyn TargetAccess>,
        options: &AttachOptions,
    ) -> Result<LinkNr, LinkError> {
        let (database, log_msgs) = crate::load(path, false)?;
        if !log_msgs.is_empty() {
            log::debug!(
                "{} warnings while loading {}",
                log_msgs.len(),
                database.filename.display()
            );
        }
        self.attach_database(database, target, options)
    }

    /// Attach a loaded database to a target.
    ///
    /// With [`LinkFlags::UPDATE`] the addresses are updated first. Slots of links that were
    /// closed while in use are freed here, once they are no longer busy.
    pub fn attach_database(
        &self,
        mut database: Database,
        target: Arc<dyn TargetAccess>,
        options: &AttachOptions,
    ) -> Result<LinkNr, LinkError> {
        let flags = options.flags;
        if flags.contains(LinkFlags::UPDATE) {
            match options.patcher {
                Some(patcher) => {
                    update_addresses(&mut database, patcher, UpdateMode::from_flags(flags));
                }
                None => log::warn!(
                    "no address patcher for {}, the addresses are not updated",
                    target.name()
                ),
            }
        }
        let references = if flags.contains(LinkFlags::REMEMBER_REFERENCED_LABELS) {
            self.load_references(&database, target.name())
        } else {
            FnvHashMap::default()
        };

        let mut generation = self.table.lock();
        self.sweep();
        let (slot_no, slot) = self
            .slots
            .iter()
            .enumerate()
            .find(|(_, slot)| matches!(*slot.state.lock(), SlotState::Empty))
            .ok_or(LinkError::NoFreeSlot)?;
        let nr = LinkNr((*generation << 8) | slot_no as u32);
        *generation = (*generation + 1) & GENERATION_MASK;

        log::info!(
            "attached {} to {} as link {nr}",
            database.filename.display(),
            target.name()
        );
        *slot.state.lock() = SlotState::Attached(Arc::new(Link {
            nr,
            database,
            target,
            flags,
            base_offset: options.base_offset,
            references: Mutex::new(references),
        }));
        Ok(nr)
    }

    // free the slots of closed links that are no longer busy
    fn sweep(&self) {
        for (slot_no, slot) in self.slots.iter().enumerate() {
            let mut state = slot.state.lock();
            if matches!(*state, SlotState::MarkedForRemoval(_))
                && slot.busy.load(Ordering::SeqCst) == 0
            {
                log::debug!("freeing slot {slot_no} of a closed link");
                *state = SlotState::Empty;
            }
        }
    }

    fn load_references(
        &self,
        database: &Database,
        target: &str,
    ) -> FnvHashMap<LabelIndex, LabelReference> {
        let mut references = FnvHashMap::default();
        let Some(store) = &self.reference_store else {
            log::warn!("no reference store, the referenced labels of {target} are not restored");
            return references;
        };
        let labels = match store.load(target) {
            Ok(labels) => labels,
            Err(error) => {
                log::warn!("{error}");
                return references;
            }
        };
        for (name, dir) in labels {
            let Some(label) =
                label_index(database, &name, LabelTypeMask::MEASUREMENT | LabelTypeMask::VALUE)
            else {
                log::debug!("the referenced label {name} no longer exists");
                continue;
            };
            let dir = RefDirection::from_ini_text(&dir)
                .unwrap_or_else(|| default_direction(database, label));
            references.insert(label, LabelReference { count: 1, dir });
        }
        references
    }

    /// Close a link.
    ///
    /// The link number becomes invalid immediately. If operations on the link are still
    /// running, its slot is only freed by a later attach.
    pub fn close(&self, nr: LinkNr) -> Result<(), LinkError> {
        let slot = self.slots.get(nr.slot()).ok_or(LinkError::InvalidLink(nr))?;
        let link = {
            let mut state = slot.state.lock();
            let link = match &*state {
                SlotState::Attached(link) if link.nr == nr => Arc::clone(link),
                _ => return Err(LinkError::InvalidLink(nr)),
            };
            if slot.busy.load(Ordering::SeqCst) == 0 {
                log::debug!("closed link {nr}");
                *state = SlotState::Empty;
            } else {
                log::debug!("link {nr} is busy, the slot is freed later");
                *state = SlotState::MarkedForRemoval(Arc::clone(&link));
            }
            link
        };

        if link.flags.contains(LinkFlags::REMEMBER_REFERENCED_LABELS) {
            if let Some(store) = &self.reference_store {
                store.store(link.target.name(), &link.referenced_labels())?;
            }
        }
        Ok(())
    }

    // run an operation on an attached link; the slot counts as busy meanwhile
    fn with_link<R>(
        &self,
        nr: LinkNr,
        f: impl FnOnce(&Link) -> Result<R, LinkError>,
    ) -> Result<R, LinkError> {
        let slot = self.slots.get(nr.slot()).ok_or(LinkError::InvalidLink(nr))?;
        let link = {
            let state = slot.state.lock();
            match &*state {
                SlotState::Attached(link) if link.nr == nr => {
                    slot.busy.fetch_add(1, Ordering::SeqCst);
                    Arc::clone(link)
                }
                _ => return Err(LinkError::InvalidLink(nr)),
            }
        };
        let _guard = BusyGuard { slot };
        f(&link)
    }

    /// the number of attached links
    pub fn link_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(*slot.state.lock(), SlotState::Attached(_)))
            .count()
    }

    /// the first link whose target has the given name
    pub fn link_to_target(&self, name: &str) -> Option<LinkNr> {
        self.slots.iter().find_map(|slot| match &*slot.state.lock() {
            SlotState::Attached(link) if link.target.name() == name => Some(link.nr),
            _ => None,
        })
    }

    /// run `f` with the database of a link
    pub fn with_database<R>(
        &self,
        nr: LinkNr,
        f: impl FnOnce(&Database) -> R,
    ) -> Result<R, LinkError> {
        self.with_link(nr, |link| Ok(f(&link.database)))
    }

    /// read and decode the data of a label from the target
    pub fn get_data(
        &self,
        nr: LinkNr,
        label: LabelIndex,
        conv_flags: ConvFlags,
    ) -> Result<A2lData, LinkError> {
        self.with_link(nr, |link| {
            let engine = link.engine(self.evaluator.as_ref());
            Ok(engine.get_data(link.target.as_ref(), label, conv_flags)?)
        })
    }

    /// write the updated values of `data` to the target; measurements can not be written
    pub fn set_data(&self, nr: LinkNr, label: LabelIndex, data: &A2lData) -> Result<(), LinkError> {
        self.with_link(nr, |link| {
            reject_measurement(&link.database, label)?;
            let engine = link.engine(self.evaluator.as_ref());
            Ok(engine.set_data(link.target.as_ref(), label, data)?)
        })
    }

    /// one step of a read, see [`LayoutEngine::get_data_state`]
    pub fn get_data_state(
        &self,
        nr: LinkNr,
        label: LabelIndex,
        conv_flags: ConvFlags,
        state: AccessState,
        dimensions: &mut RequestGroup,
        data: &mut RequestGroup,
    ) -> Result<(AccessState, Option<A2lData>), LinkError> {
        self.with_link(nr, |link| {
            let engine = link.engine(self.evaluator.as_ref());
            Ok(engine.get_data_state(label, conv_flags, state, dimensions, data)?)
        })
    }

    /// one step of a write, see [`LayoutEngine::set_data_state`]
    pub fn set_data_state(
        &self,
        nr: LinkNr,
        label: LabelIndex,
        data: &A2lData,
        state: AccessState,
        masks: &mut RequestGroup,
        writes: &mut RequestGroup,
    ) -> Result<AccessState, LinkError> {
        self.with_link(nr, |link| {
            reject_measurement(&link.database, label)?;
            let engine = link.engine(self.evaluator.as_ref());
            Ok(engine.set_data_state(label, data, state, masks, writes)?)
        })
    }

    /// Find a label by name.
    ///
    /// Measurements are searched first, then characteristics of the types in the mask, then axes.
    pub fn get_index(
        &self,
        nr: LinkNr,
        name: &str,
        mask: LabelTypeMask,
    ) -> Result<Option<LabelIndex>, LinkError> {
        self.with_link(nr, |link| Ok(label_index(&link.database, name, mask)))
    }

    pub fn get_function_index(&self, nr: LinkNr, name: &str) -> Result<Option<usize>, LinkError> {
        self.with_link(nr, |link| Ok(link.database.function_index(name)))
    }

    /// Iterate over the labels selected by the mask and the filter.
    ///
    /// All measurements are visited first, then the characteristics and then the axes. The
    /// reference bits of the mask use the reference counts of this link.
    pub fn next_symbol(
        &self,
        nr: LinkNr,
        previous: Option<LabelIndex>,
        mask: LabelTypeMask,
        filter: &NameFilter,
    ) -> Result<Option<(LabelIndex, String)>, LinkError> {
        self.with_link(nr, |link| {
            let database = &link.database;
            let referenced = |label: LabelIndex| link.reference_count(label) > 0;
            let (stage, mut previous) = match previous {
                None => (0, None),
                Some(LabelIndex::Measurement(index)) => (0, Some(index)),
                Some(LabelIndex::Characteristic(index)) => (1, Some(index)),
                Some(LabelIndex::AxisPts(index)) => (2, Some(index)),
            };
            if stage == 0 && mask.includes_measurements() {
                if let Some((index, name)) =
                    database.next_measurement(previous, filter, mask, Some(&referenced))
                {
                    return Ok(Some((LabelIndex::Measurement(index), name.to_string())));
                }
            }
            if stage < 1 {
                previous = None;
            }
            if stage <= 1 && mask.includes_characteristics() {
                if let Some((index, name)) =
                    database.next_characteristic(previous, filter, mask, Some(&referenced))
                {
                    return Ok(Some((LabelIndex::Characteristic(index), name.to_string())));
                }
            }
            if stage < 2 {
                previous = None;
            }
            Ok(database
                .next_axis_pts(previous, filter, mask, Some(&referenced))
                .map(|(index, name)| (LabelIndex::AxisPts(index), name.to_string())))
        })
    }

    pub fn next_function(
        &self,
        nr: LinkNr,
        previous: Option<usize>,
        filter: &NameFilter,
    ) -> Result<Option<(usize, String)>, LinkError> {
        self.with_link(nr, |link| {
            Ok(link
                .database
                .next_function(previous, filter)
                .map(|(index, name)| (index, name.to_string())))
        })
    }

    pub fn next_function_member(
        &self,
        nr: LinkNr,
        function: usize,
        previous: Option<u32>,
        filter: &NameFilter,
        members: FunctionMembers,
    ) -> Result<Option<(u32, String, FunctionMemberKind)>, LinkError> {
        self.with_link(nr, |link| {
            Ok(link
                .database
                .next_function_member(function, previous, filter, members)
                .map(|(member, name, kind)| (member, name.to_string(), kind)))
        })
    }

    /// describe a measurement, or a characteristic of type VALUE
    pub fn measurement_infos(&self, nr: LinkNr, label: LabelIndex) -> Result<ValueInfos, LinkError> {
        self.with_link(nr, |link| match label {
            LabelIndex::Measurement(index) => Ok(link.database.measurement_infos(index)?),
            LabelIndex::Characteristic(index) => {
                Ok(link.database.value_characteristic_infos(index)?)
            }
            LabelIndex::AxisPts(index) => Err(AccessError::InvalidIndex {
                kind: "measurement or characteristic",
                index,
            }
            .into()),
        })
    }

    pub fn characteristic_axis_infos(
        &self,
        nr: LinkNr,
        index: usize,
        axis: usize,
    ) -> Result<AxisInfos, LinkError> {
        self.with_link(nr, |link| {
            Ok(link.database.characteristic_axis_infos(index, axis)?)
        })
    }

    /// Get the transfer direction of a label.
    ///
    /// With `user_defined` the direction given when the label was referenced is returned (empty
    /// if it is not referenced). Otherwise it follows from the declaration of the label.
    pub fn read_write_flags(
        &self,
        nr: LinkNr,
        label: LabelIndex,
        user_defined: bool,
    ) -> Result<RefDirection, LinkError> {
        self.with_link(nr, |link| {
            if user_defined {
                Ok(link
                    .references
                    .lock()
                    .get(&label)
                    .map_or(RefDirection::empty(), |reference| reference.dir))
            } else {
                Ok(default_direction(&link.database, label))
            }
        })
    }

    /// increment the reference count of a label; returns the new count
    pub fn reference_label(
        &self,
        nr: LinkNr,
        label: LabelIndex,
        dir: RefDirection,
    ) -> Result<u32, LinkError> {
        self.with_link(nr, |link| {
            label_name(&link.database, label).ok_or(AccessError::InvalidIndex {
                kind: "label",
                index: label.raw() as usize,
            })?;
            let mut references = link.references.lock();
            let reference = references
                .entry(label)
                .or_insert(LabelReference { count: 0, dir });
            reference.count += 1;
            reference.dir = dir;
            Ok(reference.count)
        })
    }

    /// decrement the reference count of a label; returns the new count
    pub fn unreference_label(&self, nr: LinkNr, label: LabelIndex) -> Result<u32, LinkError> {
        self.with_link(nr, |link| {
            let mut references = link.references.lock();
            let count = match references.get_mut(&label) {
                Some(reference) => {
                    reference.count = reference.count.saturating_sub(1);
                    reference.count
                }
                None => 0,
            };
            if count == 0 {
                references.remove(&label);
            }
            Ok(count)
        })
    }

    pub fn reference_count(&self, nr: LinkNr, label: LabelIndex) -> Result<u32, LinkError> {
        self.with_link(nr, |link| Ok(link.reference_count(label)))
    }
}

fn reject_measurement(database: &Database, label: LabelIndex) -> Result<(), LinkError> {
    if let LabelIndex::Measurement(index) = label {
        let name = database
            .measurement(index)
            .map_or_else(|| index.to_string(), |measurement| measurement.name.clone());
        return Err(LinkError::MeasurementWrite(name));
    }
    Ok(())
}

fn label_name(database: &Database, label: LabelIndex) -> Option<&str> {
    match label {
        LabelIndex::Measurement(index) => database.measurement(index).map(|m| m.name.as_str()),
        LabelIndex::Characteristic(index) => {
            database.characteristic(index).map(|c| c.name.as_str())
        }
        LabelIndex::AxisPts(index) => database.axis_pts(index).map(|a| a.name.as_str()),
    }
}

fn label_index(database: &Database, name: &str, mask: LabelTypeMask) -> Option<LabelIndex> {
    if mask.includes_measurements() {
        if let Some(index) = database.measurement_index(name) {
            return Some(LabelIndex::Measurement(index));
        }
    }
    if mask.includes_characteristics() {
        let found = database.characteristic_index(name).filter(|index| {
            database.characteristic(*index).is_some_and(|characteristic| {
                mask.intersects(LabelTypeMask::for_characteristic_type(
                    characteristic.characteristic_type,
                ))
            })
        });
        if let Some(index) = found {
            return Some(LabelIndex::Characteristic(index));
        }
    }
    if mask.includes_axis_pts() {
        if let Some(index) = database.axis_pts_index(name) {
            return Some(LabelIndex::AxisPts(index));
        }
    }
    None
}

// the direction that follows from the declaration of a label
fn default_direction(database: &Database, label: LabelIndex) -> RefDirection {
    match label {
        LabelIndex::Characteristic(index) => match database.characteristic(index) {
            Some(characteristic) if !characteristic.is_read_only() => RefDirection::BOTH,
            _ => RefDirection::FROM_TARGET,
        },
        LabelIndex::Measurement(index) => match database.measurement(index) {
            Some(measurement) if measurement.read_write => RefDirection::BOTH,
            _ => RefDirection::FROM_TARGET,
        },
        LabelIndex::AxisPts(_) => RefDirection::FROM_TARGET,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::BinaryImage;
    use crate::value::Value;
    use std::collections::HashMap;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicUsize;

    const LINKED: &str = r#"ASAP2_VERSION 1 71
    /begin PROJECT p ""
      /begin MODULE m ""
        /begin RECORD_LAYOUT rl_word FNC_VALUES 1 UWORD ROW_DIR DIRECT /end RECORD_LAYOUT
        /begin RECORD_LAYOUT rl_axis AXIS_PTS_X 1 UBYTE INDEX_INCR DIRECT /end RECORD_LAYOUT
        /begin COMPU_METHOD cm_lin "" LINEAR "%6.2" "" COEFFS_LINEAR 2 10 /end COMPU_METHOD
        /begin MEASUREMENT speed "" UWORD NO_COMPU_METHOD 1 0 0 65535 ECU_ADDRESS 0x1000 /end MEASUREMENT
        /begin MEASUREMENT temp "" UBYTE NO_COMPU_METHOD 1 0 0 255 ECU_ADDRESS 0x1002 READ_WRITE /end MEASUREMENT
        /begin CHARACTERISTIC gain "" VALUE 0x1004 rl_word 0 cm_lin 0 1000 /end CHARACTERISTIC
        /begin CHARACTERISTIC limit "" VALUE 0x1006 rl_word 0 NO_COMPU_METHOD 0 1000 READ_ONLY /end CHARACTERISTIC
        /begin AXIS_PTS axis "" 0x1008 NO_INPUT_QUANTITY rl_axis 0 NO_COMPU_METHOD 2 0 100 /end AXIS_PTS
        /begin FUNCTION ctrl "" /begin IN_MEASUREMENT speed /end IN_MEASUREMENT /end FUNCTION
      /end MODULE
    /end PROJECT"#;

    fn database() -> Database {
        crate::load_from_string(LINKED, true).unwrap().0
    }

    fn image(name: &str) -> Arc<BinaryImage> {
        let mut data = vec![0u8; 16];
        data[0..2].copy_from_slice(&[0x64, 0x00]);
        data[2] = 21;
        data[4..6].copy_from_slice(&[5, 0]);
        data[6..8].copy_from_slice(&[7, 0]);
        data[8..10].copy_from_slice(&[10, 20]);
        Arc::new(BinaryImage::new(name, 0x1000, data))
    }

    fn attach(manager: &LinkManager, target: Arc<BinaryImage>, flags: LinkFlags) -> LinkNr {
        let options = AttachOptions {
            flags,
            ..Default::default()
        };
        manager.attach_database(database(), target, &options).unwrap()
    }

    #[test]
    fn link_numbers() {
        let manager = LinkManager::new();
        let first = attach(&manager, image("ecu"), LinkFlags::empty());
        let second = attach(&manager, image("ecu"), LinkFlags::empty());
        assert_eq!(first.raw(), 0xA2_0000);
        assert_eq!(second.raw(), 0xA2_0101);
        assert_eq!(second.slot(), 1);
        assert_eq!(second.generation(), 0xA201);
        assert_eq!(first.to_string(), "0xA20000");

        manager.close(first).unwrap();
        let third = attach(&manager, image("ecu"), LinkFlags::empty());
        // same slot, new generation
        assert_eq!(third.slot(), 0);
        assert_ne!(third, first);
        assert!(matches!(
            manager.get_index(first, "speed", LabelTypeMask::ALL),
            Err(LinkError::InvalidLink(_))
        ));
        assert!(matches!(manager.close(first), Err(LinkError::InvalidLink(_))));
        assert!(matches!(
            manager.close(LinkNr::from_raw(0xA2_00FF)),
            Err(LinkError::InvalidLink(_))
        ));

        assert_eq!(LabelIndex::from_raw(5), LabelIndex::Measurement(5));
        assert_eq!(LabelIndex::from_raw(0x4000_0003), LabelIndex::Characteristic(3));
        assert_eq!(LabelIndex::from_raw(0x6000_0002), LabelIndex::AxisPts(2));
        assert_eq!(LabelIndex::AxisPts(2).raw(), 0x6000_0002);
    }

    #[test]
    fn slot_exhaustion() {
        let manager = LinkManager::new();
        let links: Vec<LinkNr> = (0..MAX_LINKS)
            .map(|_| attach(&manager, image("ecu"), LinkFlags::empty()))
            .collect();
        assert_eq!(manager.link_count(), MAX_LINKS);
        let result = manager.attach_database(database(), image("ecu"), &AttachOptions::default());
        assert!(matches!(result, Err(LinkError::NoFreeSlot)));

        manager.close(links[7]).unwrap();
        let reused = attach(&manager, image("ecu"), LinkFlags::empty());
        assert_eq!(reused.slot(), 7);
    }

    #[test]
    fn data_access() {
        let manager = LinkManager::new();
        let target = image("ecu");
        let nr = attach(&manager, target.clone(), LinkFlags::empty());

        let speed = manager.get_index(nr, "speed", LabelTypeMask::ALL).unwrap().unwrap();
        assert_eq!(speed, LabelIndex::Measurement(0));
        let data = manager.get_data(nr, speed, ConvFlags::PHYS).unwrap();
        assert_eq!(data.single_value().unwrap().value, Value::PhysDouble(100.0));
        let result = manager.set_data(nr, speed, &data);
        assert!(matches!(result, Err(LinkError::MeasurementWrite(name)) if name == "speed"));

        let gain = manager.get_index(nr, "gain", LabelTypeMask::VALUE).unwrap().unwrap();
        let mut data = manager.get_data(nr, gain, ConvFlags::PHYS).unwrap();
        assert_eq!(data.single_value().unwrap().value, Value::PhysDouble(20.0));
        data.single_value_mut().unwrap().update(Value::PhysDouble(30.0));
        manager.set_data(nr, gain, &data).unwrap();
        assert_eq!(&target.data()[4..6], &[10, 0]);

        let limit = manager.get_index(nr, "limit", LabelTypeMask::CALIBRATION).unwrap().unwrap();
        let mut data = manager.get_data(nr, limit, ConvFlags::empty()).unwrap();
        data.single_value_mut().unwrap().update(Value::Uint(8));
        let result = manager.set_data(nr, limit, &data);
        assert!(matches!(result, Err(LinkError::Access(AccessError::ReadOnly(_)))));

        let axis = manager.get_index(nr, "axis", LabelTypeMask::ALL).unwrap().unwrap();
        let data = manager.get_data(nr, axis, ConvFlags::empty()).unwrap();
        assert_eq!(data.array(0).unwrap().values.len(), 2);

        // the type bits of the mask select the characteristics
        assert_eq!(manager.get_index(nr, "gain", LabelTypeMask::CURVE).unwrap(), None);
        assert_eq!(manager.get_index(nr, "gain", LabelTypeMask::MEASUREMENT).unwrap(), None);
        assert_eq!(manager.get_index(nr, "unknown", LabelTypeMask::ALL).unwrap(), None);
        assert_eq!(manager.get_function_index(nr, "ctrl").unwrap(), Some(0));

        let infos = manager.measurement_infos(nr, speed).unwrap();
        assert_eq!(infos.address, 0x1000);
        let infos = manager.measurement_infos(nr, gain).unwrap();
        assert_eq!(infos.name, "gain");
        assert!(manager.measurement_infos(nr, axis).is_err());
        assert_eq!(manager.with_database(nr, |database| database.module().name.clone()).unwrap(), "m");
    }

    #[test]
    fn staged_access() {
        let manager = LinkManager::new();
        let target = image("ecu");
        let nr = attach(&manager, target.clone(), LinkFlags::empty());
        let gain = manager.get_index(nr, "gain", LabelTypeMask::VALUE).unwrap().unwrap();

        let mut dimensions = RequestGroup::new();
        let mut data = RequestGroup::new();
        let (state, result) = manager
            .get_data_state(nr, gain, ConvFlags::empty(), AccessState::ReadDimensionsReq, &mut dimensions, &mut data)
            .unwrap();
        assert_eq!(state, AccessState::ReadData);
        assert!(result.is_none());
        target.fetch(&mut data).unwrap();
        let (state, result) = manager
            .get_data_state(nr, gain, ConvFlags::empty(), state, &mut dimensions, &mut data)
            .unwrap();
        assert_eq!(state, AccessState::Successful);
        let mut value = result.unwrap();
        assert_eq!(value.single_value().unwrap().value, Value::Uint(5));

        value.single_value_mut().unwrap().update(Value::Uint(6));
        let mut masks = RequestGroup::new();
        let mut writes = RequestGroup::new();
        let state = manager
            .set_data_state(nr, gain, &value, AccessState::ReadMaskReq, &mut masks, &mut writes)
            .unwrap();
        let state = manager
            .set_data_state(nr, gain, &value, state, &mut masks, &mut writes)
            .unwrap();
        assert_eq!(state, AccessState::WriteData);
        target.flush(&mut writes).unwrap();
        assert_eq!(&target.data()[4..6], &[6, 0]);
    }

    #[test]
    fn symbol_iteration() {
        let manager = LinkManager::new();
        let nr = attach(&manager, image("ecu"), LinkFlags::empty());
        let all = NameFilter::all();

        let mut names = Vec::new();
        let mut previous = None;
        while let Some((label, name)) = manager.next_symbol(nr, previous, LabelTypeMask::ALL, &all).unwrap() {
            names.push(name);
            previous = Some(label);
        }
        assert_eq!(names, vec!["speed", "temp", "gain", "limit", "axis"]);

        let temp = LabelIndex::Measurement(1);
        assert_eq!(manager.reference_label(nr, temp, RefDirection::FROM_TARGET).unwrap(), 1);
        let referenced = LabelTypeMask::ALL | LabelTypeMask::REFERENCED;
        let first = manager.next_symbol(nr, None, referenced, &all).unwrap();
        assert_eq!(first, Some((temp, "temp".to_string())));
        assert_eq!(manager.next_symbol(nr, Some(temp), referenced, &all).unwrap(), None);

        let filter = NameFilter::new("?ai*").unwrap();
        let found = manager.next_symbol(nr, None, LabelTypeMask::ALL, &filter).unwrap();
        assert_eq!(found, Some((LabelIndex::Characteristic(0), "gain".to_string())));

        let function = manager.next_function(nr, None, &all).unwrap();
        assert_eq!(function, Some((0, "ctrl".to_string())));
        let member = manager
            .next_function_member(nr, 0, None, &all, FunctionMembers::ALL)
            .unwrap();
        assert_eq!(member, Some((0x2000_0000, "speed".to_string(), FunctionMemberKind::InMeasurement)));
    }

    #[test]
    fn references_and_directions() {
        let manager = LinkManager::new();
        let nr = attach(&manager, image("ecu"), LinkFlags::empty());
        let speed = LabelIndex::Measurement(0);
        let temp = LabelIndex::Measurement(1);
        let gain = LabelIndex::Characteristic(0);
        let limit = LabelIndex::Characteristic(1);

        assert_eq!(manager.read_write_flags(nr, speed, false).unwrap(), RefDirection::FROM_TARGET);
        assert_eq!(manager.read_write_flags(nr, temp, false).unwrap(), RefDirection::BOTH);
        assert_eq!(manager.read_write_flags(nr, gain, false).unwrap(), RefDirection::BOTH);
        assert_eq!(manager.read_write_flags(nr, limit, false).unwrap(), RefDirection::FROM_TARGET);
        assert_eq!(manager.read_write_flags(nr, gain, true).unwrap(), RefDirection::empty());

        assert_eq!(manager.reference_label(nr, gain, RefDirection::TO_TARGET).unwrap(), 1);
        assert_eq!(manager.reference_label(nr, gain, RefDirection::TO_TARGET).unwrap(), 2);
        assert_eq!(manager.read_write_flags(nr, gain, true).unwrap(), RefDirection::TO_TARGET);
        assert_eq!(manager.unreference_label(nr, gain).unwrap(), 1);
        assert_eq!(manager.unreference_label(nr, gain).unwrap(), 0);
        // never below zero
        assert_eq!(manager.unreference_label(nr, gain).unwrap(), 0);
        assert_eq!(manager.reference_count(nr, gain).unwrap(), 0);
        assert!(manager.reference_label(nr, LabelIndex::Measurement(50), RefDirection::BOTH).is_err());

        assert_eq!(manager.link_to_target("ecu"), Some(nr));
        assert_eq!(manager.link_to_target("other"), None);
    }

    #[test]
    fn remembered_references() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("references.ini");
        let store = Arc::new(IniReferenceStore::new(&path));
        let manager = LinkManager::new().with_reference_store(store);
        let flags = LinkFlags::REMEMBER_REFERENCED_LABELS;

        let nr = attach(&manager, image("ecu"), flags);
        manager.reference_label(nr, LabelIndex::Measurement(0), RefDirection::FROM_TARGET).unwrap();
        manager.reference_label(nr, LabelIndex::Characteristic(0), RefDirection::BOTH).unwrap();
        // axes are not restored
        manager.reference_label(nr, LabelIndex::AxisPts(0), RefDirection::BOTH).unwrap();
        manager.close(nr).unwrap();

        let ini = IniFile::load(&path).unwrap();
        let section = IniReferenceStore::section_name("ecu");
        assert_eq!(ini.get(&section, "speed"), Some("ep2bb"));
        assert_eq!(ini.get(&section, "gain"), Some("readwrite"));

        let mut ini = ini;
        ini.set(&section, "temp", "default");
        ini.save(&path).unwrap();

        let nr = attach(&manager, image("ecu"), flags);
        assert_eq!(manager.reference_count(nr, LabelIndex::Measurement(0)).unwrap(), 1);
        assert_eq!(manager.reference_count(nr, LabelIndex::Characteristic(0)).unwrap(), 1);
        assert_eq!(manager.reference_count(nr, LabelIndex::AxisPts(0)).unwrap(), 0);
        assert_eq!(
            manager.read_write_flags(nr, LabelIndex::Measurement(1), true).unwrap(),
            RefDirection::BOTH
        );

        // another target has its own section
        let other = attach(&manager, image("other"), flags);
        assert_eq!(manager.reference_count(other, LabelIndex::Measurement(0)).unwrap(), 0);
    }

    struct Symbols(HashMap<&'static str, u64>);

    impl AddressPatcher for Symbols {
        fn symbol_address(&self, name: &str) -> Option<u64> {
            self.0.get(name).copied()
        }
    }

    #[test]
    fn attach_with_update() {
        let manager = LinkManager::new();
        let symbols = Symbols(HashMap::from([("speed", 0x1002)]));
        let options = AttachOptions {
            flags: LinkFlags::UPDATE | LinkFlags::UPDATE_ZERO,
            base_offset: 0,
            patcher: Some(&symbols),
        };
        let nr = manager.attach_database(database(), image("ecu"), &options).unwrap();
        let speed = LabelIndex::Measurement(0);
        let data = manager.get_data(nr, speed, ConvFlags::empty()).unwrap();
        assert_eq!(data.single_value().unwrap().address, 0x1002);
        // the address of gain was not found and set to 0
        let result = manager.get_data(nr, LabelIndex::Characteristic(0), ConvFlags::empty());
        assert!(matches!(result, Err(LinkError::Access(AccessError::NoAddress(_)))));
    }

    #[test]
    fn attach_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linked.a2l");
        std::fs::write(&path, LINKED).unwrap();
        let manager = LinkManager::new();
        let nr = manager.attach(&path, image("ecu"), &AttachOptions::default()).unwrap();
        let filename = manager.with_database(nr, |database| database.filename.clone()).unwrap();
        assert_eq!(filename, path);

        let result = manager.attach(dir.path().join("missing.a2l"), image("ecu"), &AttachOptions::default());
        assert!(matches!(result, Err(LinkError::Load(_))));
    }

    // a target whose reads wait until the test releases them
    struct BlockingTarget {
        image: BinaryImage,
        entered: Barrier,
        release: Barrier,
        active: AtomicUsize,
    }

    impl TargetAccess for BlockingTarget {
        fn name(&self) -> &str {
            "blocking"
        }

        fn read_bytes(&self, address: u64, buffer: &mut [u8]) -> Result<(), crate::TargetError> {
            self.active.fetch_add(1, Ordering::SeqCst);
            self.entered.wait();
            self.release.wait();
            let result = self.image.read_bytes(address, buffer);
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn write_bytes(&self, address: u64, data: &[u8]) -> Result<(), crate::TargetError> {
            self.image.write_bytes(address, data)
        }
    }

    #[test]
    fn close_while_busy() {
        const READERS: usize = 4;
        let manager = Arc::new(LinkManager::new());
        let target = Arc::new(BlockingTarget {
            image: BinaryImage::new("blocking", 0x1000, vec![0x64, 0x00]),
            entered: Barrier::new(READERS + 1),
            release: Barrier::new(READERS + 1),
            active: AtomicUsize::new(0),
        });
        let nr = manager
            .attach_database(database(), target.clone(), &AttachOptions::default())
            .unwrap();
        assert_eq!(nr.slot(), 0);

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    manager.get_data(nr, LabelIndex::Measurement(0), ConvFlags::empty())
                })
            })
            .collect();
        // all readers are inside the target now
        target.entered.wait();
        assert_eq!(target.active.load(Ordering::SeqCst), READERS);

        manager.close(nr).unwrap();
        assert_eq!(manager.link_count(), 0);
        assert!(matches!(
            manager.get_data(nr, LabelIndex::Measurement(0), ConvFlags::empty()),
            Err(LinkError::InvalidLink(_))
        ));
        // the slot of the busy link is not reused
        let other = attach(&manager, image("ecu"), LinkFlags::empty());
        assert_eq!(other.slot(), 1);

        target.release.wait();
        for reader in readers {
            let data = reader.join().unwrap().unwrap();
            assert_eq!(data.single_value().unwrap().value, Value::Uint(100));
        }
        assert_eq!(target.active.load(Ordering::SeqCst), 0);

        // the next attach frees the slot
        let next = attach(&manager, image("ecu"), LinkFlags::empty());
        assert_eq!(next.slot(), 0);
    }
}
