//! INI file configuration adapter.

use crate::domain::error::BarbotError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BarbotError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(|reason| BarbotError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, BarbotError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| BarbotError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
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
[trader]
instrument = EUR_USD
venue = fx
strategy = ichimoku
period_minutes = 15
can_trade = no

[backtest]
data = candles.csv
initial_balance = 1000.0

[instrument]
pip_location = -4
min_trailing_stop_distance = 0.0005
"#;

    #[test]
    fn from_string_parses_config() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("trader", "instrument"),
            Some("EUR_USD".to_string())
        );
        assert_eq!(
            adapter.get_string("backtest", "data"),
            Some("candles.csv".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("trader", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_int_handles_negative_and_default() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_int("instrument", "pip_location", 0), -4);
        assert_eq!(adapter.get_int("instrument", "missing", 42), 42);
        assert_eq!(adapter.get_int("trader", "instrument", 42), 42);
    }

    #[test]
    fn get_double_returns_value_or_default() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert!((adapter.get_double("trader", "period_minutes", 0.0) - 15.0).abs() < f64::EPSILON);
        assert!(
            (adapter.get_double("instrument", "min_trailing_stop_distance", 0.0) - 0.0005).abs()
                < f64::EPSILON
        );
        assert!((adapter.get_double("trader", "venue", 99.9) - 99.9).abs() < f64::EPSILON);
    }

    #[test]
    fn get_bool_variants() {
        let adapter =
            FileConfigAdapter::from_string("[trader]\na = true\nb = YES\nc = off\n").unwrap();
        assert!(adapter.get_bool("trader", "a", false));
        assert!(adapter.get_bool("trader", "b", false));
        assert!(!adapter.get_bool("trader", "c", true));
        assert!(adapter.get_bool("trader", "missing", true));
        let sample = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert!(!sample.get_bool("trader", "can_trade", true));
    }

    #[test]
    fn require_string_reports_section_and_key() {
        let adapter = FileConfigAdapter::from_string("[trader]\ninstrument =\n").unwrap();
        match adapter.require_string("trader", "instrument") {
            Err(BarbotError::ConfigMissing { section, key }) => {
                assert_eq!(section, "trader");
                assert_eq!(key, "instrument");
            }
            other => panic!("expected ConfigMissing, got {:?}", other),
        }
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config(SAMPLE);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("trader", "strategy"),
            Some("ichimoku".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/barbot.ini");
        assert!(matches!(result, Err(BarbotError::ConfigParse { .. })));
    }
}
