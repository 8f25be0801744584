//! Configuration access port trait.

/// Typed lookups over a sectioned key/value source. The `try_` accessors return
/// `None` for an absent key and `Some(Err(_))` for a value that fails to parse,
/// so callers can report the offending key.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    fn has_key(&self, section: &str, key: &str) -> bool {
        self.get_string(section, key).is_some()
    }

    fn try_int(&self, section: &str, key: &str) -> Option<Result<i64, String>> {
        self.get_string(section, key)
            .map(|raw| raw.trim().parse::<i64>().map_err(|e| format!("{raw:?}: {e}")))
    }

    fn try_double(&self, section: &str, key: &str) -> Option<Result<f64, String>> {
        self.get_string(section, key)
            .map(|raw| raw.trim().parse::<f64>().map_err(|e| format!("{raw:?}: {e}")))
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.try_int(section, key) {
            Some(Ok(v)) => v,
            _ => default,
        }
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.try_double(section, key) {
            Some(Ok(v)) => v,
            _ => default,
        }
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self
            .get_string(section, key)
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("true" | "yes" | "1" | "on") => true,
            Some("false" | "no" | "0" | "off") => false,
            _ => default,
        }
    }
}
