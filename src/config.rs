//! Facilities for reading runtime configuration values
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, warn};

use crate::{ParserLimits, ParserOptions};

#[derive(Deserialize)]
/// Process-wide parser configuration, loaded once and shared by every
/// [`crate::Parser`] instance.
pub struct Config {
    /// A single logical header's cap, in bytes.
    pub header_limit: u32,
    /// Maximum multipart nesting depth.
    pub max_depth: u32,
    /// Stored boundary string truncation length.
    pub max_boundary_len: u32,
    /// Whether to report a header exceeding `header_limit`.
    #[serde(default)]
    pub report_trunc_header: bool,
    /// Whether to report an 8-bit byte in a header.
    #[serde(default)]
    pub report_8bit_in_header: bool,
    /// Whether to report an 8-bit byte in a nominally 7-bit body.
    #[serde(default)]
    pub report_8bit_in_7bit_body: bool,
    /// Whether to report inconsistent composite encodings.
    #[serde(default)]
    pub report_encoding_domain: bool,
    /// Whether to recurse into any `message/*`, not just `message/rfc822`.
    #[serde(default)]
    pub recurse_all_message: bool,
    /// Whether to downgrade 8-bit leaf bodies to quoted-printable.
    #[serde(default)]
    pub downgrade: bool,
}

impl Config {
    /// Loads the configuration from a `backend.toml` file and environment
    /// overrides prefixed `BACKEND__`.
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let config: Self = Figment::new()
            .merge(Toml::file("backend.toml"))
            .merge(Env::prefixed("BACKEND__").split("__"))
            .extract()
            .map_err(|err| {
                error!("Failed to validate configuration: {}", err);
                err
            })?;
        if config.header_limit == 0 {
            error!("Value of header_limit must be nonzero");
            return Err("Value of header_limit must be nonzero".into());
        }
        if config.max_depth == 0 {
            error!("Value of max_depth must be nonzero");
            return Err("Value of max_depth must be nonzero".into());
        }
        if config.max_boundary_len == 0 {
            error!("Value of max_boundary_len must be nonzero");
            return Err("Value of max_boundary_len must be nonzero".into());
        }
        Ok(config)
    }

    /// Converts the loaded knobs into [`ParserLimits`].
    pub fn limits(&self) -> ParserLimits {
        ParserLimits {
            header_limit: self.header_limit as usize,
            max_depth: self.max_depth as usize,
            max_boundary_len: self.max_boundary_len as usize,
        }
    }

    /// Converts the loaded report/behavior switches into [`ParserOptions`].
    pub fn options(&self) -> ParserOptions {
        let mut options = ParserOptions::empty();
        options.set(ParserOptions::REPORT_TRUNC_HEADER, self.report_trunc_header);
        options.set(ParserOptions::REPORT_8BIT_IN_HEADER, self.report_8bit_in_header);
        options.set(
            ParserOptions::REPORT_8BIT_IN_7BIT_BODY,
            self.report_8bit_in_7bit_body,
        );
        options.set(ParserOptions::REPORT_ENCODING_DOMAIN, self.report_encoding_domain);
        options.set(ParserOptions::RECURSE_ALL_MESSAGE, self.recurse_all_message);
        options.set(ParserOptions::DOWNGRADE, self.downgrade);
        options
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_limits_conversion() {
        let config = Config {
            header_limit: 65536,
            max_depth: 100,
            max_boundary_len: 70,
            report_trunc_header: true,
            report_8bit_in_header: false,
            report_8bit_in_7bit_body: false,
            report_encoding_domain: false,
            recurse_all_message: false,
            downgrade: false,
        };
        let limits = config.limits();
        assert_eq!(limits.header_limit, 65536);
        assert_eq!(limits.max_depth, 100);
        assert_eq!(limits.max_boundary_len, 70);
        assert!(config.options().contains(ParserOptions::REPORT_TRUNC_HEADER));
        assert!(!config.options().contains(ParserOptions::DOWNGRADE));
    }
}
