//! Parsers for the text that `VBoxManage` prints.
//!
//! Both formats are reduced to [`Record`]s, ordered lists of key/value
//! fields, so that the lookups done on top of them can be tested against
//! plain fixture text.

use std::sync::LazyLock;

use regex::Regex;

/// `key="value"` or `"key"="value"` lines from `--machinereadable` output.
static MACHINE_READABLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:"([^"]*)"|([^=\s]+))=(.*?)\s*$"#).expect("valid regex")
});

/// An ordered set of fields scraped from one tool response or one block of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    /// The value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// All fields in the order they were printed.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field was parsed.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn push(&mut self, key: &str, value: &str) {
        self.fields.push((key.to_owned(), value.to_owned()));
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Parse `VBoxManage showvminfo --machinereadable` output.
///
/// Values wrapped in double quotes are unquoted; bare values are kept as is.
/// Lines that are not assignments are skipped.
pub fn parse_machine_readable(text: &str) -> Record {
    let mut record = Record::default();
    for line in text.lines() {
        let Some(caps) = MACHINE_READABLE_LINE.captures(line) else {
            continue;
        };
        let key = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        let raw = caps.get(3).map_or("", |m| m.as_str());
        let value = raw
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(raw);
        record.push(key, value);
    }
    record
}

/// Parse `Key: value` blocks separated by blank lines, as printed by
/// `VBoxManage list hostonlyifs`.
///
/// Blocks keep the tool's order. The key runs up to the first colon, so
/// values such as IPv6 addresses survive intact.
pub fn parse_colon_blocks(text: &str) -> Vec<Record> {
    let mut blocks = Vec::new();
    let mut current = Record::default();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            current.push(key.trim(), value.trim());
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}
