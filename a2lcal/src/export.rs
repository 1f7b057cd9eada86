use crate::convert::ConversionKind;
use crate::database::Database;
use crate::ini::IniFile;
use crate::query::{LabelTypeMask, NameFilter, ValueInfos};
use crate::specification::DataType;
use std::io::Write;
use std::path::Path;

/// the protocol of the generated configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Xcp,
    Ccp,
}

impl ExportFormat {
    pub fn section(self) -> &'static str {
        match self {
            ExportFormat::Xcp => "XCP Configuration",
            ExportFormat::Ccp => "CCP Configuration for Target",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// list measurements with READ_WRITE a second time as parameters
    pub writable_measurements_as_parameters: bool,
}

/**
Write the measurements and the VALUE characteristics of a database as an XCP or CCP
configuration.

Each measurement becomes an entry `v<n>=TYPE,name,0xADDRESS,unit,conversion,min,max` and each
characteristic an entry `p<n>` with the same fields. Arrays are split into one entry per element.
The conversion is written as `factor:offset` for linear conversions, all other conversions are
written as `#`.

# Errors

Only errors of the writer are reported. Objects that can not be described, e.g. measurements
without ECU_ADDRESS, are skipped.
 */
pub fn export_ini<W: Write>(
    database: &Database,
    options: &ExportOptions,
    writer: &mut W,
) -> Result<(), std::io::Error> {
    let all = NameFilter::all();
    let mut variables = Vec::new();
    let mut parameters = Vec::new();

    let mut previous = None;
    while let Some((index, name)) =
        database.next_measurement(previous, &all, LabelTypeMask::MEASUREMENT, None)
    {
        previous = Some(index);
        match database.measurement_infos(index) {
            Ok(infos) => {
                let lines = entry_lines(&infos);
                if infos.writable && options.writable_measurements_as_parameters {
                    parameters.extend(lines.iter().cloned());
                }
                variables.extend(lines);
            }
            Err(error) => log::debug!("measurement {name} is not exported: {error}"),
        }
    }

    let mut previous = None;
    while let Some((index, name)) =
        database.next_characteristic(previous, &all, LabelTypeMask::VALUE, None)
    {
        previous = Some(index);
        match database.value_characteristic_infos(index) {
            Ok(infos) => parameters.extend(entry_lines(&infos)),
            Err(error) => log::debug!("characteristic {name} is not exported: {error}"),
        }
    }

    log::info!(
        "exporting {} variables and {} parameters",
        variables.len(),
        parameters.len()
    );
    let entries = numbered("v", variables)
        .chain(numbered("p", parameters))
        .collect();
    let mut ini = IniFile::new();
    ini.set_section(options.format.section(), entries);
    ini.write(writer)
}

/// write the configuration to a file, see [`export_ini`]
pub fn export_ini_file<P: AsRef<Path>>(
    database: &Database,
    options: &ExportOptions,
    path: P,
) -> Result<(), std::io::Error> {
    let mut buffer = Vec::new();
    export_ini(database, options, &mut buffer)?;
    std::fs::write(path, buffer)
}

fn numbered(prefix: &'static str, lines: Vec<String>) -> impl Iterator<Item = (String, String)> {
    lines
        .into_iter()
        .enumerate()
        .map(move |(n, line)| (format!("{prefix}{n}"), line))
}

// the type names of the configuration differ from the a2l names
fn type_name(datatype: DataType) -> Option<&'static str> {
    match datatype {
        DataType::Sbyte => Some("BYTE"),
        DataType::Ubyte => Some("UBYTE"),
        DataType::Sword => Some("WORD"),
        DataType::Uword => Some("UWORD"),
        DataType::Slong => Some("DWORD"),
        DataType::Ulong => Some("UDWORD"),
        DataType::AInt64 => Some("QWORD"),
        DataType::AUint64 => Some("UQWORD"),
        DataType::Float32Ieee => Some("FLOAT"),
        DataType::Float64Ieee => Some("DOUBLE"),
        DataType::Float16Ieee => None,
    }
}

// one line per element; x varies fastest in memory
fn entry_lines(infos: &ValueInfos) -> Vec<String> {
    let Some(type_name) = type_name(infos.datatype) else {
        log::debug!("{}: {} can not be exported", infos.name, infos.datatype);
        return Vec::new();
    };
    let conversion = match infos.conversion.kind {
        ConversionKind::FactorOffset => infos.conversion.text.as_str(),
        _ => "#",
    };
    let size = infos.datatype.size() as u64;
    let line = |name: &str, element: u64| {
        format!(
            "{type_name},{name},0x{:X},{},{conversion},{},{}",
            infos.address + element * size,
            infos.conversion.unit,
            infos.min,
            infos.max
        )
    };

    let (x_dim, y_dim, z_dim) = (
        u64::from(infos.x_dim),
        u64::from(infos.y_dim),
        u64::from(infos.z_dim),
    );
    if z_dim > 1 {
        log::debug!("{}: three dimensional arrays are not exported", infos.name);
        Vec::new()
    } else if y_dim > 1 {
        (0..y_dim)
            .flat_map(|y| (0..x_dim).map(move |x| (x, y)))
            .map(|(x, y)| line(&format!("{}[{x}][{y}]", infos.name), y * x_dim + x))
            .collect()
    } else if x_dim > 1 {
        (0..x_dim)
            .map(|x| line(&format!("{}[{x}]", infos.name), x))
            .collect()
    } else {
        vec![line(&infos.name, 0)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORTED: &str = r#"ASAP2_VERSION 1 71
    /begin PROJECT p ""
      /begin MODULE m ""
        /begin COMPU_METHOD cm_lin "" RAT_FUNC "%6.2" "km/h" COEFFS 0 1 0 0 0 2 /end COMPU_METHOD
        /begin COMPU_METHOD cm_form "" FORM "%6.2" "" /begin FORMULA "X*X" /end FORMULA /end COMPU_METHOD
        /begin RECORD_LAYOUT rl_long FNC_VALUES 1 SLONG ROW_DIR DIRECT /end RECORD_LAYOUT
        /begin MEASUREMENT speed "" UWORD cm_lin 1 0 0 1000 ECU_ADDRESS 0x1000 /end MEASUREMENT
        /begin MEASUREMENT squares "" FLOAT32_IEEE cm_form 1 0 0 100 ECU_ADDRESS 0x2000 ARRAY_SIZE 2 /end MEASUREMENT
        /begin MEASUREMENT grid "" UBYTE NO_COMPU_METHOD 1 0 0 255 ECU_ADDRESS 0x3000
          MATRIX_DIM 2 2 1 READ_WRITE /end MEASUREMENT
        /begin MEASUREMENT unplaced "" UBYTE NO_COMPU_METHOD 1 0 0 255 /end MEASUREMENT
        /begin CHARACTERISTIC offset "" VALUE 0x4000 rl_long 0 NO_COMPU_METHOD -100 100 /end CHARACTERISTIC
      /end MODULE
    /end PROJECT"#;

    fn export(options: &ExportOptions) -> String {
        let (database, _) = crate::load_from_string(EXPORTED, true).unwrap();
        let mut output = Vec::new();
        export_ini(&database, options, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn export_xcp() {
        let text = export(&ExportOptions::default());
        let ini = IniFile::parse(&text);
        let section = "XCP Configuration";
        assert!(text.starts_with("[XCP Configuration]\n"));
        // sorted by name: grid, speed, squares
        assert_eq!(ini.get(section, "v0"), Some("UBYTE,grid[0][0],0x3000,,#,0,255"));
        assert_eq!(ini.get(section, "v1"), Some("UBYTE,grid[1][0],0x3001,,#,0,255"));
        assert_eq!(ini.get(section, "v3"), Some("UBYTE,grid[1][1],0x3003,,#,0,255"));
        assert_eq!(ini.get(section, "v4"), Some("UWORD,speed,0x1000,km/h,2:0,0,1000"));
        assert_eq!(ini.get(section, "v5"), Some("FLOAT,squares[0],0x2000,,#,0,100"));
        assert_eq!(ini.get(section, "v6"), Some("FLOAT,squares[1],0x2004,,#,0,100"));
        assert_eq!(ini.get(section, "v7"), None);
        assert_eq!(ini.get(section, "p0"), Some("DWORD,offset,0x4000,,#,-100,100"));
        assert_eq!(ini.get(section, "p1"), None);
    }

    #[test]
    fn export_ccp_with_writable_measurements() {
        let options = ExportOptions {
            format: ExportFormat::Ccp,
            writable_measurements_as_parameters: true,
        };
        let ini = IniFile::parse(&export(&options));
        let section = "CCP Configuration for Target";
        assert_eq!(ini.get(section, "p0"), Some("UBYTE,grid[0][0],0x3000,,#,0,255"));
        assert_eq!(ini.get(section, "p3"), Some("UBYTE,grid[1][1],0x3003,,#,0,255"));
        assert_eq!(ini.get(section, "p4"), Some("DWORD,offset,0x4000,,#,-100,100"));
        assert!(ini.section("XCP Configuration").is_none());
    }

    #[test]
    fn export_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.ini");
        let (database, _) = crate::load_from_string(EXPORTED, true).unwrap();
        export_ini_file(&database, &ExportOptions::default(), &path).unwrap();
        let ini = IniFile::load(&path).unwrap();
        assert_eq!(ini.section("XCP Configuration").map(<[_]>::len), Some(8));
    }
}
