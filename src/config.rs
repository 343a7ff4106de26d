//! Compilation settings.
//!
//! A [`Config`] is a plain value handed to every pass. Defaults target Java 21;
//! `Config::from_env` overlays the `JPATC_*` environment switches the same way
//! the debug switches are read elsewhere in the crate.

use crate::codegen::defs::major_versions;
use crate::error::{Error, Result};

/// How synthetic lambda body methods are numbered inside one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LambdaNaming {
    /// `lambda$0`, `lambda$1`, ... continuing across all members of the class.
    PerClass,
    /// `lambda$<member>$0`, restarting for every declaring member.
    PerMember,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Class-file major version to emit.
    pub target: u16,
    /// Emit LineNumberTable and LocalVariableTable.
    pub debug_info: bool,
    pub lambda_naming: LambdaNaming,
    /// Report a non-exhaustive enhanced switch statement as an error instead of a warning.
    pub strict_statement_exhaustiveness: bool,
    /// Report classic switch statements without a `default` label.
    pub report_missing_default: bool,
    /// Value of the SourceFile attribute; derived from the class name when absent.
    pub source_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target: major_versions::JAVA_21,
            debug_info: true,
            lambda_naming: LambdaNaming::PerClass,
            strict_statement_exhaustiveness: false,
            report_missing_default: false,
            source_file: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `JPATC_TARGET`, `JPATC_DEBUG_INFO`,
    /// `JPATC_LAMBDA_NAMING` and `JPATC_STRICT_EXHAUSTIVE`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("JPATC_TARGET") {
            config.target = parse_target(&value)?;
        }
        if let Ok(value) = std::env::var("JPATC_DEBUG_INFO") {
            config.debug_info = parse_flag("JPATC_DEBUG_INFO", &value)?;
        }
        if let Ok(value) = std::env::var("JPATC_LAMBDA_NAMING") {
            config.lambda_naming = match value.as_str() {
                "class" | "per-class" => LambdaNaming::PerClass,
                "member" | "per-member" => LambdaNaming::PerMember,
                other => {
                    return Err(Error::config_error(format!(
                        "JPATC_LAMBDA_NAMING: unknown policy '{}'",
                        other
                    )))
                }
            };
        }
        if std::env::var("JPATC_STRICT_EXHAUSTIVE").is_ok() {
            config.strict_statement_exhaustiveness = true;
        }
        log::debug!("config from env: {:?}", config);
        Ok(config)
    }

    pub fn with_target(mut self, target: u16) -> Self {
        self.target = target;
        self
    }

    pub fn with_lambda_naming(mut self, naming: LambdaNaming) -> Self {
        self.lambda_naming = naming;
        self
    }

    pub fn with_debug_info(mut self, debug_info: bool) -> Self {
        self.debug_info = debug_info;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict_statement_exhaustiveness = true;
        self
    }

    /// `typeSwitch`/`enumSwitch` bootstraps and `MatchException` exist from Java 21.
    pub fn supports_switch_bootstraps(&self) -> bool {
        self.target >= major_versions::JAVA_21
    }

    /// `StringConcatFactory` exists from Java 9.
    pub fn supports_indy_string_concat(&self) -> bool {
        self.target >= major_versions::JAVA_9
    }
}

/// Accepts a Java release (`8`, `17`, `21`) or a raw major version (`52`, `65`).
fn parse_target(value: &str) -> Result<u16> {
    let number: u16 = value
        .trim()
        .parse()
        .map_err(|_| Error::config_error(format!("JPATC_TARGET: '{}' is not a number", value)))?;
    let major = match number {
        8..=21 => number + 44,
        major_versions::JAVA_8..=major_versions::JAVA_21 => number,
        _ => {
            return Err(Error::config_error(format!(
                "JPATC_TARGET: unsupported release {}",
                number
            )))
        }
    };
    Ok(major)
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        other => Err(Error::config_error(format!("{}: expected a boolean, found '{}'", name, other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_accepts_release_and_major() {
        assert_eq!(parse_target("17").unwrap(), major_versions::JAVA_17);
        assert_eq!(parse_target("65").unwrap(), major_versions::JAVA_21);
        assert!(parse_target("7").is_err());
        assert!(parse_target("java").is_err());
    }

    #[test]
    fn default_targets_java_21() {
        let config = Config::default();
        assert!(config.supports_switch_bootstraps());
        assert!(config.supports_indy_string_concat());
        assert_eq!(config.lambda_naming, LambdaNaming::PerClass);
        let old = Config::default().with_target(major_versions::JAVA_8);
        assert!(!old.supports_switch_bootstraps());
        assert!(!old.supports_indy_string_concat());
    }

    #[test]
    fn flags_parse() {
        assert!(parse_flag("X", "on").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }
}
