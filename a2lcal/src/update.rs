use crate::database::Database;
use crate::link::LinkFlags;
use crate::specification::SymbolLink;

/// resolves symbol names to addresses, e.g. from the debug info of the target
pub trait AddressPatcher {
    fn symbol_address(&self, name: &str) -> Option<u64>;
}

/// what happens to objects whose symbol can not be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// keep the address from the a2l file
    Ignore,
    /// set the address to zero, which makes the object inaccessible
    Zero,
}

impl UpdateMode {
    pub fn from_flags(flags: LinkFlags) -> Self {
        if flags.contains(LinkFlags::UPDATE_ZERO) {
            UpdateMode::Zero
        } else {
            UpdateMode::Ignore
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub measurement_updated: u32,
    pub measurement_not_updated: u32,
    pub characteristic_updated: u32,
    pub characteristic_not_updated: u32,
    pub axis_pts_updated: u32,
    pub axis_pts_not_updated: u32,
}

/// Replace the addresses of all measurements, characteristics and axes of the selected module
/// with the addresses of their symbols.
///
/// The symbol of an object is the name given in SYMBOL_LINK (plus its offset), or the name of
/// the object itself.
pub fn update_addresses(
    database: &mut Database,
    patcher: &dyn AddressPatcher,
    mode: UpdateMode,
) -> UpdateSummary {
    let mut summary = UpdateSummary::default();
    let module = database.module_mut();

    for measurement in module.measurements.iter_mut() {
        match resolve(patcher, &measurement.name, measurement.symbol_link.as_ref()) {
            Some(address) => {
                measurement.ecu_address = Some(address);
                summary.measurement_updated += 1;
            }
            None => {
                if mode == UpdateMode::Zero {
                    measurement.ecu_address = None;
                }
                summary.measurement_not_updated += 1;
            }
        }
    }

    for characteristic in module.characteristics.iter_mut() {
        match resolve(patcher, &characteristic.name, characteristic.symbol_link.as_ref()) {
            Some(address) => {
                characteristic.address = address;
                summary.characteristic_updated += 1;
            }
            None => {
                if mode == UpdateMode::Zero {
                    characteristic.address = 0;
                }
                summary.characteristic_not_updated += 1;
            }
        }
    }

    for axis_pts in module.axis_pts.iter_mut() {
        match resolve(patcher, &axis_pts.name, axis_pts.symbol_link.as_ref()) {
            Some(address) => {
                axis_pts.address = address;
                summary.axis_pts_updated += 1;
            }
            None => {
                if mode == UpdateMode::Zero {
                    axis_pts.address = 0;
                }
                summary.axis_pts_not_updated += 1;
            }
        }
    }

    log::debug!(
        "address update: {} measurements, {} characteristics and {} axes updated",
        summary.measurement_updated,
        summary.characteristic_updated,
        summary.axis_pts_updated
    );
    summary
}

// a2l addresses are 32 bit; a symbol outside of that range can not be used
fn resolve(patcher: &dyn AddressPatcher, name: &str, symbol_link: Option<&SymbolLink>) -> Option<u32> {
    let (symbol, offset) = match symbol_link {
        Some(link) => (link.symbol_name.as_str(), i64::from(link.offset)),
        None => (name, 0),
    };
    let Some(address) = patcher.symbol_address(symbol) else {
        log::debug!("symbol {symbol} of {name} not found");
        return None;
    };
    let address = i64::try_from(address)
        .ok()
        .and_then(|address| address.checked_add(offset))
        .and_then(|address| u32::try_from(address).ok());
    if address.is_none() {
        log::warn!("the address of symbol {symbol} is out of range for {name}");
    }
    address
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Symbols(HashMap<&'static str, u64>);

    impl AddressPatcher for Symbols {
        fn symbol_address(&self, name: &str) -> Option<u64> {
            self.0.get(name).copied()
        }
    }

    const A2L: &str = r#"ASAP2_VERSION 1 71
    /begin PROJECT p ""
      /begin MODULE m ""
        /begin RECORD_LAYOUT rl FNC_VALUES 1 UWORD ROW_DIR DIRECT /end RECORD_LAYOUT
        /begin MEASUREMENT speed "" UWORD NO_COMPU_METHOD 1 0 0 65535 ECU_ADDRESS 0x10 /end MEASUREMENT
        /begin MEASUREMENT lost "" UWORD NO_COMPU_METHOD 1 0 0 65535 ECU_ADDRESS 0x20 /end MEASUREMENT
        /begin CHARACTERISTIC gain "" VALUE 0x30 rl 0 NO_COMPU_METHOD 0 10
          SYMBOL_LINK "ctrl" 4
        /end CHARACTERISTIC
        /begin CHARACTERISTIC far "" VALUE 0x40 rl 0 NO_COMPU_METHOD 0 10 /end CHARACTERISTIC
        /begin AXIS_PTS ax "" 0x50 NO_INPUT_QUANTITY rl 0 NO_COMPU_METHOD 4 0 10 /end AXIS_PTS
      /end MODULE
    /end PROJECT"#;

    fn symbols() -> Symbols {
        Symbols(HashMap::from([
            ("speed", 0x1000),
            ("ctrl", 0x2000),
            ("far", 0x1_0000_0000),
            ("ax", 0x3000),
        ]))
    }

    #[test]
    fn update_ignore() {
        let (mut database, _) = crate::load_from_string(A2L, true).unwrap();
        let summary = update_addresses(&mut database, &symbols(), UpdateMode::Ignore);
        assert_eq!(summary.measurement_updated, 1);
        assert_eq!(summary.measurement_not_updated, 1);
        assert_eq!(summary.characteristic_updated, 1);
        assert_eq!(summary.characteristic_not_updated, 1);
        assert_eq!(summary.axis_pts_updated, 1);

        let module = database.module();
        assert_eq!(module.measurements.get("speed").unwrap().ecu_address, Some(0x1000));
        assert_eq!(module.measurements.get("lost").unwrap().ecu_address, Some(0x20));
        // SYMBOL_LINK offset
        assert_eq!(module.characteristics.get("gain").unwrap().address, 0x2004);
        assert_eq!(module.characteristics.get("far").unwrap().address, 0x40);
        assert_eq!(module.axis_pts.get("ax").unwrap().address, 0x3000);
    }

    #[test]
    fn update_zero() {
        let (mut database, _) = crate::load_from_string(A2L, true).unwrap();
        assert_eq!(
            UpdateMode::from_flags(LinkFlags::UPDATE | LinkFlags::UPDATE_ZERO),
            UpdateMode::Zero
        );
        update_addresses(&mut database, &symbols(), UpdateMode::Zero);
        let module = database.module();
        assert_eq!(module.measurements.get("lost").unwrap().ecu_address, None);
        assert_eq!(module.characteristics.get("far").unwrap().address, 0);
    }
}
