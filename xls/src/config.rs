//! Facilities for reading runtime configuration values
use crate::ExcelError;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::path::Path;
use tracing::trace;

/// Parser limits
///
/// The defaults accept any workbook Excel itself can produce
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Maximum number of sheets in a workbook
    #[serde(default = "Config::default_max_sheets")]
    pub max_sheets: usize,

    /// Maximum number of cells stored for each sheet
    #[serde(default = "Config::default_max_cells_per_sheet")]
    pub max_cells_per_sheet: usize,

    /// Maximum number of strings in the shared string table
    #[serde(default = "Config::default_max_shared_strings")]
    pub max_shared_strings: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_sheets: Self::default_max_sheets(),
            max_cells_per_sheet: Self::default_max_cells_per_sheet(),
            max_shared_strings: Self::default_max_shared_strings(),
        }
    }
}

impl Config {
    /// Constructs `Config` from `xlsdump.toml` and `XLSDUMP__` environment variables
    pub fn load() -> Result<Self, ExcelError> {
        Self::load_from("xlsdump.toml")
    }

    /// Constructs `Config` from the given `toml` file and `XLSDUMP__` environment variables
    ///
    /// A missing file is not an error: unset values take their defaults
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ExcelError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("XLSDUMP__").split("__"))
            .extract()?;
        config.validate()?;
        trace!("final config: {config:#?}");
        Ok(config)
    }

    /// Checks the parameter bounds
    pub fn validate(&self) -> Result<(), ExcelError> {
        macro_rules! check_lower_bound {
            ($parent:ident.$var:ident, $limit:expr) => {
                if $parent.$var < $limit {
                    Err(ExcelError::ConfigParameterValue {
                        parameter: stringify!($var),
                        message: format!(
                            "parameter value should be equal or larger than {}",
                            $limit
                        ),
                    })?
                }
            };
        }
        check_lower_bound!(self.max_sheets, 1);
        check_lower_bound!(self.max_cells_per_sheet, 1);
        Ok(())
    }

    fn default_max_sheets() -> usize {
        0xffff
    }

    fn default_max_cells_per_sheet() -> usize {
        // 65536 rows by 256 columns
        0x100_0000
    }

    fn default_max_shared_strings() -> usize {
        0x100_0000
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.max_sheets, 65535);
        assert_eq!(config.max_cells_per_sheet, 65536 * 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_file() -> Result<(), ExcelError> {
        let mut file = tempfile::NamedTempFile::new().map_err(ExcelError::Io)?;
        writeln!(file, "max_sheets = 3\nmax_shared_strings = 0").map_err(ExcelError::Io)?;
        let config = Config::load_from(file.path())?;
        assert_eq!(config.max_sheets, 3);
        assert_eq!(config.max_shared_strings, 0);
        assert_eq!(config.max_cells_per_sheet, Config::default().max_cells_per_sheet);

        let mut file = tempfile::NamedTempFile::new().map_err(ExcelError::Io)?;
        writeln!(file, "max_sheets = 0").map_err(ExcelError::Io)?;
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ExcelError::ConfigParameterValue {
                parameter: "max_sheets",
                ..
            }
        ));

        let mut file = tempfile::NamedTempFile::new().map_err(ExcelError::Io)?;
        writeln!(file, "max_sheets = \"many\"").map_err(ExcelError::Io)?;
        assert!(matches!(
            Config::load_from(file.path()),
            Err(ExcelError::ConfigDeserialization(_))
        ));
        Ok(())
    }
}
