//! Validated interface/label configuration.
//!
//! Built once at startup from either `-ext <iface> -if <name>@<label> ...`
//! or the legacy `<iface> <file>` form, where the file holds one
//! `name@label` per line.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::label::{Label, MAX_LABEL};
use crate::tun;

/// Maximum number of managed interfaces.
pub const MAX_INTERFACES: usize = 16;

/// Configuration errors. All of them are usage errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("external interface is required")]
    MissingExternal,

    #[error("at least one interface-label pair is required")]
    NoInterfaces,

    #[error("maximum {MAX_INTERFACES} interface-label pairs allowed, got {0}")]
    TooManyInterfaces(usize),

    #[error("invalid format '{0}'. Expected 'interface@label'")]
    MalformedPair(String),

    #[error("label must be a number from 0 to {MAX_LABEL}, got '{0}'")]
    InvalidLabel(String),

    #[error("invalid interface name '{0}': {1}")]
    InvalidName(String, String),

    #[error("interface '{0}' configured more than once")]
    DuplicateName(String),

    #[error("label {0} assigned to more than one interface")]
    DuplicateLabel(Label),

    #[error("failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}:{line}: {source}")]
    InFile {
        path: PathBuf,
        line: usize,
        #[source]
        source: Box<ConfigError>,
    },
}

/// One managed interface to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagedSpec {
    pub name: String,
    pub label: Label,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub external_interface: String,
    pub managed: Vec<ManagedSpec>,
    pub max_label: u8,
}

/// Parse `name@label`.
pub fn parse_pair(pair: &str) -> Result<ManagedSpec, ConfigError> {
    let mut parts = pair.trim().split('@');
    let (name, label) = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(label), None) if !name.is_empty() => (name, label),
        _ => return Err(ConfigError::MalformedPair(pair.to_string())),
    };

    let label = label
        .parse::<i64>()
        .ok()
        .and_then(|v| Label::new(v).ok())
        .ok_or_else(|| ConfigError::InvalidLabel(label.to_string()))?;

    Ok(ManagedSpec {
        name: name.to_string(),
        label,
    })
}

impl Config {
    /// Build from the `-ext` / `-if` flag values.
    pub fn from_flags<S: AsRef<str>>(
        external: Option<&str>,
        pairs: &[S],
    ) -> Result<Self, ConfigError> {
        let external = external.ok_or(ConfigError::MissingExternal)?;
        let managed = pairs
            .iter()
            .map(|p| parse_pair(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(external, managed)
    }

    /// Build from the legacy `<external> <file>` form.
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_file(external: &str, path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

        let mut managed = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let spec = parse_pair(line).map_err(|e| ConfigError::InFile {
                path: path.to_path_buf(),
                line: i + 1,
                source: Box::new(e),
            })?;
            managed.push(spec);
        }

        Self::new(external, managed)
    }

    /// Validate and assemble a configuration.
    pub fn new(external: &str, managed: Vec<ManagedSpec>) -> Result<Self, ConfigError> {
        if external.trim().is_empty() {
            return Err(ConfigError::MissingExternal);
        }
        if managed.is_empty() {
            return Err(ConfigError::NoInterfaces);
        }
        if managed.len() > MAX_INTERFACES {
            return Err(ConfigError::TooManyInterfaces(managed.len()));
        }

        let mut names = HashSet::new();
        let mut labels = HashSet::new();
        for spec in &managed {
            tun::validate_name(&spec.name)
                .map_err(|e| ConfigError::InvalidName(spec.name.clone(), e.to_string()))?;
            if spec.name == external {
                return Err(ConfigError::DuplicateName(spec.name.clone()));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateName(spec.name.clone()));
            }
            if !labels.insert(spec.label) {
                return Err(ConfigError::DuplicateLabel(spec.label));
            }
        }

        Ok(Self {
            external_interface: external.to_string(),
            managed,
            max_label: MAX_LABEL,
        })
    }
}

/// Rewrite single-dash long flags (`-ext`, `-if`) to `--ext` / `--if`.
pub fn normalize_flags<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            for flag in ["ext", "if"] {
                let single = format!("-{flag}");
                if arg == single || arg.starts_with(&format!("{single}=")) {
                    return format!("-{arg}");
                }
            }
            arg
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_pair() {
        let spec = parse_pair("mp1@1").unwrap();
        assert_eq!(spec.name, "mp1");
        assert_eq!(spec.label.get(), 1);

        assert!(matches!(parse_pair("mp1"), Err(ConfigError::MalformedPair(_))));
        assert!(matches!(parse_pair("a@1@2"), Err(ConfigError::MalformedPair(_))));
        assert!(matches!(parse_pair("@3"), Err(ConfigError::MalformedPair(_))));
        assert!(matches!(parse_pair("mp1@17"), Err(ConfigError::InvalidLabel(_))));
        assert!(matches!(parse_pair("mp1@-1"), Err(ConfigError::InvalidLabel(_))));
        assert!(matches!(parse_pair("mp1@x"), Err(ConfigError::InvalidLabel(_))));
    }

    #[test]
    fn test_from_flags() {
        let config = Config::from_flags(Some("eth0"), &["mp1@1", "mp2@2"]).unwrap();
        assert_eq!(config.external_interface, "eth0");
        assert_eq!(config.managed.len(), 2);
        assert_eq!(config.max_label, 16);
    }

    #[test]
    fn test_missing_external() {
        let result = Config::from_flags(None, &["mp1@1"]);
        assert!(matches!(result, Err(ConfigError::MissingExternal)));
    }

    #[test]
    fn test_interface_count_bounds() {
        let none: [&str; 0] = [];
        assert!(matches!(
            Config::from_flags(Some("eth0"), &none),
            Err(ConfigError::NoInterfaces)
        ));

        let sixteen: Vec<String> = (0..16).map(|i| format!("mp{i}@{i}")).collect();
        assert!(Config::from_flags(Some("eth0"), &sixteen).is_ok());

        let seventeen: Vec<String> = (0..17).map(|i| format!("mp{i}@{i}")).collect();
        assert!(matches!(
            Config::from_flags(Some("eth0"), &seventeen),
            Err(ConfigError::TooManyInterfaces(17))
        ));
    }

    #[test]
    fn test_duplicates_rejected() {
        assert!(matches!(
            Config::from_flags(Some("eth0"), &["mp1@1", "mp1@2"]),
            Err(ConfigError::DuplicateName(_))
        ));
        assert!(matches!(
            Config::from_flags(Some("eth0"), &["mp1@1", "mp2@1"]),
            Err(ConfigError::DuplicateLabel(_))
        ));
        assert!(matches!(
            Config::from_flags(Some("eth0"), &["eth0@1"]),
            Err(ConfigError::DuplicateName(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# managed interfaces").unwrap();
        writeln!(file, "mp1@1").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  mp2@2  ").unwrap();

        let config = Config::from_file("eth0", file.path()).unwrap();
        assert_eq!(config.managed[1].name, "mp2");
        assert_eq!(config.managed[1].label.get(), 2);
    }

    #[test]
    fn test_from_file_reports_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mp1@1").unwrap();
        writeln!(file, "mp2-2").unwrap();

        match Config::from_file("eth0", file.path()) {
            Err(ConfigError::InFile { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_normalize_flags() {
        let args = normalize_flags(["l3mp", "-ext", "eth0", "-if=mp1@1", "--if", "mp2@2"]);
        assert_eq!(
            args,
            ["l3mp", "--ext", "eth0", "--if=mp1@1", "--if", "mp2@2"]
        );
    }
}
