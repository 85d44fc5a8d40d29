//! INI configuration for the error subsystem.
//!
//! Implements php.ini parsing, `-d` style system settings and
//! ini_get()/ini_set()/ini_restore() for the directives that govern fault
//! reporting.
//!
//! Reference: php-src/main/php_ini.c, php-src/Zend/zend_ini.h

use std::collections::HashMap;

/// A single INI entry.
#[derive(Debug, Clone)]
struct IniEntry {
    value: String,
    default_value: String,
    /// Whether this entry has been modified at runtime.
    modified: bool,
}

impl IniEntry {
    fn new(default: impl Into<String>) -> Self {
        let default = default.into();
        Self {
            value: default.clone(),
            default_value: default,
            modified: false,
        }
    }
}

/// The INI directive store.
#[derive(Debug, Clone)]
pub struct IniSystem {
    entries: HashMap<String, IniEntry>,
}

impl IniSystem {
    /// Create a store with the error directives registered.
    pub fn new() -> Self {
        let mut sys = Self {
            entries: HashMap::new(),
        };
        sys.register_error_directives();
        sys
    }

    fn register_error_directives(&mut self) {
        let directives = [
            ("error_reporting", "E_ALL"),
            ("display_errors", "1"),
            ("log_errors", "0"),
        ];

        for (name, default) in directives {
            self.entries.insert(name.to_string(), IniEntry::new(default));
        }
    }

    /// Get the value of a directive. Returns empty string if not found.
    pub fn get(&self, name: &str) -> &str {
        self.entries
            .get(name)
            .map(|e| e.value.as_str())
            .unwrap_or("")
    }

    /// Whether the directive was changed at runtime and not yet restored.
    pub fn is_modified(&self, name: &str) -> bool {
        self.entries.get(name).is_some_and(|e| e.modified)
    }

    /// Set a directive at system level (php.ini, `-d`).
    ///
    /// The value becomes the directive's default; unknown names are added.
    pub fn define(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.value = value.clone();
                entry.default_value = value;
                entry.modified = false;
            }
            None => {
                self.entries.insert(name.to_string(), IniEntry::new(value));
            }
        }
    }

    /// Set a directive at runtime (ini_set).
    ///
    /// Returns the old value, or None if the directive doesn't exist.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        let entry = self.entries.get_mut(name)?;
        let old = std::mem::replace(&mut entry.value, value.into());
        entry.modified = true;
        Some(old)
    }

    /// Restore a directive to its default value (ini_restore).
    pub fn restore(&mut self, name: &str) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.value = entry.default_value.clone();
            entry.modified = false;
        }
    }

    /// Parse php.ini text and apply the settings at system level.
    pub fn parse_ini_string(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            // [section] headers carry no meaning here
            if line.starts_with('[') && line.ends_with(']') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let mut value = value.trim();

                if !value.starts_with('"') && !value.starts_with('\'') {
                    if let Some(comment_pos) = value.find(';') {
                        value = value[..comment_pos].trim();
                    }
                }

                if value.len() >= 2
                    && ((value.starts_with('"') && value.ends_with('"'))
                        || (value.starts_with('\'') && value.ends_with('\'')))
                {
                    value = &value[1..value.len() - 1];
                }

                self.define(key, value);
            }
        }
    }

    /// Get a value as a boolean (handles "On", "Off", "1", "0", etc.).
    pub fn get_bool(&self, name: &str) -> bool {
        let val = self.get(name);
        matches!(val.to_lowercase().as_str(), "1" | "on" | "yes" | "true")
    }

    /// Reset all modified entries to defaults.
    pub fn reset(&mut self) {
        for entry in self.entries.values_mut() {
            if entry.modified {
                entry.value = entry.default_value.clone();
                entry.modified = false;
            }
        }
    }
}

impl Default for IniSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ini_system_defaults() {
        let ini = IniSystem::new();
        assert_eq!(ini.get("error_reporting"), "E_ALL");
        assert_eq!(ini.get("display_errors"), "1");
        assert_eq!(ini.get("log_errors"), "0");
        assert_eq!(ini.get("nonexistent"), "");
    }

    #[test]
    fn test_ini_set_user() {
        let mut ini = IniSystem::new();
        let old = ini.set("error_reporting", "0");
        assert_eq!(old, Some("E_ALL".to_string()));
        assert_eq!(ini.get("error_reporting"), "0");
        assert!(ini.is_modified("error_reporting"));
        assert!(ini.set("no_such_directive", "1").is_none());
    }

    #[test]
    fn test_define_keeps_value_verbatim() {
        let mut ini = IniSystem::new();
        ini.define("error_prepend", r#"say "hi"; bye"#);
        assert_eq!(ini.get("error_prepend"), r#"say "hi"; bye"#);

        ini.set("display_errors", "0");
        ini.define("display_errors", "stderr");
        assert!(!ini.is_modified("display_errors"));
        assert_eq!(ini.get("display_errors"), "stderr");
    }

    #[test]
    fn test_ini_restore_and_reset() {
        let mut ini = IniSystem::new();
        ini.set("display_errors", "0");
        ini.restore("display_errors");
        assert_eq!(ini.get("display_errors"), "1");

        ini.set("error_reporting", "0");
        ini.set("log_errors", "1");
        ini.reset();
        assert_eq!(ini.get("error_reporting"), "E_ALL");
        assert_eq!(ini.get("log_errors"), "0");
    }

    #[test]
    fn test_ini_parse_string() {
        let mut ini = IniSystem::new();
        ini.parse_ini_string(
            r#"
; development settings
error_reporting = E_ALL & ~E_DEPRECATED ; keep deprecations quiet
display_errors = Off
custom_setting = "hello; world"

[errors]
log_errors = 'On'
"#,
        );

        assert_eq!(ini.get("error_reporting"), "E_ALL & ~E_DEPRECATED");
        assert_eq!(ini.get("display_errors"), "Off");
        assert_eq!(ini.get("custom_setting"), "hello; world");
        assert!(ini.get_bool("log_errors"));
    }

    #[test]
    fn test_parsed_values_become_defaults() {
        let mut ini = IniSystem::new();
        ini.parse_ini_string("display_errors = stderr");
        ini.set("display_errors", "0");
        ini.restore("display_errors");
        assert_eq!(ini.get("display_errors"), "stderr");
    }

    #[test]
    fn test_ini_get_bool() {
        let mut ini = IniSystem::new();
        assert!(ini.get_bool("display_errors"));
        ini.set("display_errors", "Off");
        assert!(!ini.get_bool("display_errors"));
        ini.set("display_errors", "yes");
        assert!(ini.get_bool("display_errors"));
    }
}
