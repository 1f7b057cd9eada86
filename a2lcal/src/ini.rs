use std::io::Write;
use std::path::Path;

/// An ini file: named sections of `key=value` entries.
///
/// Sections and entries keep the order in which they were read or added. Comment lines (`;` or
/// `#`) are dropped when a file is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniFile {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl IniFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an ini file. A file that does not exist yet is loaded as an empty ini file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(error) => Err(error),
        }
    }

    /// parse ini text; entries in front of the first section header belong to the section ""
    pub fn parse(text: &str) -> Self {
        let mut ini = Self::new();
        let mut current: Option<usize> = None;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
                current = Some(ini.section_index(name.trim()));
                continue;
            }
            let (key, value) = line.split_once('=').unwrap_or((line, ""));
            let index = *current.get_or_insert_with(|| ini.section_index(""));
            ini.sections[index]
                .1
                .push((key.trim().to_string(), value.trim().to_string()));
        }
        ini
    }

    // the index of the named section, which is created if necessary
    fn section_index(&mut self, name: &str) -> usize {
        match self.sections.iter().position(|(section, _)| section == name) {
            Some(index) => index,
            None => {
                self.sections.push((name.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        }
    }

    pub fn section(&self, name: &str) -> Option<&[(String, String)]> {
        self.sections
            .iter()
            .find(|(section, _)| section == name)
            .map(|(_, entries)| entries.as_slice())
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?
            .iter()
            .find(|(entry, _)| entry == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(name, _)| name.as_str())
    }

    /// replace all entries of a section; a new section is appended at the end
    pub fn set_section(&mut self, name: &str, entries: Vec<(String, String)>) {
        let index = self.section_index(name);
        self.sections[index].1 = entries;
    }

    /// set one entry, replacing an existing entry with the same key
    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let index = self.section_index(section);
        let entries = &mut self.sections[index].1;
        match entries.iter_mut().find(|(entry, _)| entry == key) {
            Some((_, old)) => *old = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove_section(&mut self, name: &str) -> bool {
        let len = self.sections.len();
        self.sections.retain(|(section, _)| section != name);
        self.sections.len() != len
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), std::io::Error> {
        for (position, (name, entries)) in self.sections.iter().enumerate() {
            if position > 0 {
                writeln!(writer)?;
            }
            if !name.is_empty() || position > 0 {
                writeln!(writer, "[{name}]")?;
            }
            for (key, value) in entries {
                writeln!(writer, "{key}={value}")?;
            }
        }
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let mut buffer = Vec::new();
        self.write(&mut buffer)?;
        std::fs::write(path, buffer)
    }
}
