//! INI file configuration adapter with command-line overrides.

use std::collections::BTreeMap;
use std::path::Path;

use configparser::ini::Ini;

use crate::domain::error::BotsimError;
use crate::ports::config_port::ConfigPort;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
    /// `(section, key)` pairs from `--set`, consulted before the file.
    overrides: BTreeMap<(String, String), String>,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BotsimError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| BotsimError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self {
            config,
            overrides: BTreeMap::new(),
        })
    }

    pub fn from_string(content: &str) -> Result<Self, BotsimError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| BotsimError::ConfigParse {
                file: "<inline>".to_string(),
                reason,
            })?;
        Ok(Self {
            config,
            overrides: BTreeMap::new(),
        })
    }

    /// Applies one `section.key=value` assignment. Section and key are
    /// lowercased to match the INI parser.
    pub fn set_override(&mut self, assignment: &str) -> Result<(), BotsimError> {
        let invalid = || BotsimError::ConfigInvalid {
            section: "cli".to_string(),
            key: "set".to_string(),
            reason: format!("expected section.key=value, got {assignment:?}"),
        };
        let (path, value) = assignment.split_once('=').ok_or_else(invalid)?;
        let (section, key) = path.trim().split_once('.').ok_or_else(invalid)?;
        let (section, key) = (section.trim(), key.trim());
        if section.is_empty() || key.is_empty() {
            return Err(invalid());
        }
        self.overrides.insert(
            (section.to_lowercase(), key.to_lowercase()),
            value.trim().to_string(),
        );
        Ok(())
    }

    pub fn with_overrides<I, S>(mut self, assignments: I) -> Result<Self, BotsimError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for assignment in assignments {
            self.set_override(assignment.as_ref())?;
        }
        Ok(self)
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.overrides
            .get(&(section.to_lowercase(), key.to_lowercase()))
            .cloned()
            .or_else(|| self.config.get(section, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const SAMPLE: &str = r#"
[backtest]
end_date = 2024-03-10
horizon_days = 7
initial_capital = 1000.0

[strategy]
name = volume_spike
risk_pct = 15

[data]
source = synthetic
"#;

    #[test]
    fn from_string_parses_config() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("strategy", "name"),
            Some("volume_spike".to_string())
        );
        assert_eq!(adapter.get_int("backtest", "horizon_days", 0), 7);
        assert_eq!(adapter.get_double("backtest", "initial_capital", 0.0), 1000.0);
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
        assert!(!adapter.has_key("backtest", "missing"));
    }

    #[test]
    fn numeric_accessors_fall_back_on_bad_values() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nhorizon_days = abc\ntop_k = 4\n").unwrap();
        assert_eq!(adapter.get_int("backtest", "horizon_days", 42), 42);
        assert!(matches!(adapter.try_int("backtest", "horizon_days"), Some(Err(_))));
        assert_eq!(adapter.try_int("backtest", "top_k"), Some(Ok(4)));
        assert_eq!(adapter.try_double("backtest", "missing"), None);
    }

    #[test]
    fn get_bool_values() {
        let adapter =
            FileConfigAdapter::from_string("[x]\na = true\nb = no\nc = On\nd = maybe\n").unwrap();
        assert!(adapter.get_bool("x", "a", false));
        assert!(!adapter.get_bool("x", "b", true));
        assert!(adapter.get_bool("x", "c", false));
        assert!(adapter.get_bool("x", "d", true));
    }

    #[test]
    fn overrides_take_precedence() {
        let adapter = FileConfigAdapter::from_string(SAMPLE)
            .unwrap()
            .with_overrides(["backtest.horizon_days=3", "Strategy.Risk_Pct = 20", "data.dir=/tmp/x"])
            .unwrap();
        assert_eq!(adapter.get_int("backtest", "horizon_days", 0), 3);
        assert_eq!(adapter.get_double("strategy", "risk_pct", 0.0), 20.0);
        assert_eq!(adapter.get_string("data", "dir"), Some("/tmp/x".to_string()));
        assert_eq!(adapter.get_string("backtest", "end_date"), Some("2024-03-10".to_string()));
    }

    #[test]
    fn malformed_override_rejected() {
        let mut adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert!(adapter.set_override("horizon_days=3").is_err());
        assert!(adapter.set_override("backtest.horizon_days").is_err());
        assert!(adapter.set_override(".key=1").is_err());
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config(SAMPLE);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_string("data", "source"), Some("synthetic".to_string()));
    }

    #[test]
    fn from_file_missing_is_parse_error() {
        let err = FileConfigAdapter::from_file("/nonexistent/path/config.ini").unwrap_err();
        assert!(matches!(err, BotsimError::ConfigParse { .. }));
    }
}
