use crate::specification::{
    AxisPts, Characteristic, CompuMethod, CompuTab, Function, Measurement, Module, Project,
    RecordLayout,
};
use std::path::{Path, PathBuf};

/// A loaded a2l file
///
/// The database owns the parsed project. All queries work on the selected module, which is the
/// first module of the project unless another one is chosen with [`Database::select_module`].
/// Entities are identified by their index in the lists of the selected module; these indices
/// stay valid until the lists are sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct Database {
    pub filename: PathBuf,
    pub asap2_version: Option<(u16, u16)>,
    pub project: Project,
    selected_module: usize,
}

impl Database {
    pub(crate) fn new(path: &Path, asap2_version: Option<(u16, u16)>, mut project: Project) -> Self {
        if project.modules.is_empty() {
            // every query needs a module
            log::warn!("project {} contains no MODULE", project.name);
            project.modules.push(Module::default());
        }
        Self {
            filename: path.to_path_buf(),
            asap2_version,
            project,
            selected_module: 0,
        }
    }

    /// the selected module
    pub fn module(&self) -> &Module {
        &self.project.modules[self.selected_module]
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.project.modules[self.selected_module]
    }

    pub fn module_count(&self) -> usize {
        self.project.modules.len()
    }

    pub fn selected_module_index(&self) -> usize {
        self.selected_module
    }

    /// select the module that all following queries work on
    ///
    /// Returns false if there is no module with the given name; the selection is unchanged then.
    pub fn select_module(&mut self, name: &str) -> bool {
        match self.project.modules.find_by_name(name) {
            Some(index) => {
                log::debug!("selected module {name}");
                self.selected_module = index;
                true
            }
            None => false,
        }
    }

    /// sort the entity lists of all modules by name
    pub fn sort(&mut self) {
        for module in self.project.modules.iter_mut() {
            module.sort();
        }
    }

    pub fn measurement_index(&self, name: &str) -> Option<usize> {
        self.module().measurements.find_by_name(name)
    }

    pub fn characteristic_index(&self, name: &str) -> Option<usize> {
        self.module().characteristics.find_by_name(name)
    }

    pub fn axis_pts_index(&self, name: &str) -> Option<usize> {
        self.module().axis_pts.find_by_name(name)
    }

    pub fn record_layout_index(&self, name: &str) -> Option<usize> {
        self.module().record_layouts.find_by_name(name)
    }

    pub fn compu_method_index(&self, name: &str) -> Option<usize> {
        self.module().compu_methods.find_by_name(name)
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.module().functions.find_by_name(name)
    }

    pub fn measurement(&self, index: usize) -> Option<&Measurement> {
        self.module().measurements.get_index(index)
    }

    pub fn characteristic(&self, index: usize) -> Option<&Characteristic> {
        self.module().characteristics.get_index(index)
    }

    pub fn axis_pts(&self, index: usize) -> Option<&AxisPts> {
        self.module().axis_pts.get_index(index)
    }

    pub fn function(&self, index: usize) -> Option<&Function> {
        self.module().functions.get_index(index)
    }

    pub fn record_layout(&self, name: &str) -> Option<&RecordLayout> {
        self.module().record_layouts.get(name)
    }

    pub fn compu_method(&self, name: &str) -> Option<&CompuMethod> {
        self.module().compu_methods.get(name)
    }

    pub fn compu_tab(&self, name: &str) -> Option<&CompuTab> {
        self.module().compu_tabs.get(name)
    }
}

#[cfg(test)]
mod tests {
    const TWO_MODULES: &str = r#"ASAP2_VERSION 1 71
    /begin PROJECT p ""
      /begin MODULE engine ""
        /begin MEASUREMENT n "" UWORD NO_COMPU_METHOD 1 0 0 8000 ECU_ADDRESS 0x100 /end MEASUREMENT
        /begin RECORD_LAYOUT rl FNC_VALUES 1 UWORD ROW_DIR DIRECT /end RECORD_LAYOUT
      /end MODULE
      /begin MODULE gearbox ""
        /begin MEASUREMENT gear "" UBYTE NO_COMPU_METHOD 1 0 0 8 ECU_ADDRESS 0x200 /end MEASUREMENT
        /begin MEASUREMENT clutch "" UBYTE NO_COMPU_METHOD 1 0 0 1 ECU_ADDRESS 0x201 /end MEASUREMENT
      /end MODULE
    /end PROJECT"#;

    #[test]
    fn module_selection() {
        let (mut database, _) = crate::load_from_string(TWO_MODULES, true).unwrap();
        assert_eq!(database.module_count(), 2);
        assert_eq!(database.module().name, "engine");
        assert_eq!(database.measurement_index("n"), Some(0));
        assert!(database.record_layout("rl").is_some());

        assert!(database.select_module("gearbox"));
        assert_eq!(database.selected_module_index(), 1);
        assert_eq!(database.measurement_index("n"), None);
        // sorted by load
        assert_eq!(database.measurement_index("clutch"), Some(0));
        assert_eq!(database.measurement(1).unwrap().name, "gear");

        assert!(!database.select_module("chassis"));
        assert_eq!(database.module().name, "gearbox");
    }

    #[test]
    fn project_without_module() {
        let (database, _) =
            crate::load_from_string(r#"ASAP2_VERSION 1 71 /begin PROJECT p "" /end PROJECT"#, true)
                .unwrap();
        assert_eq!(database.module_count(), 1);
        assert!(database.module().measurements.is_empty());
    }
}
