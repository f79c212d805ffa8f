//! Configuration access port trait.

use crate::domain::error::BarbotError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// A key that has no sensible default.
    fn require_string(&self, section: &str, key: &str) -> Result<String, BarbotError> {
        self.get_string(section, key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| BarbotError::ConfigMissing {
                section: section.to_string(),
                key: key.to_string(),
            })
    }
}
