use toml::{Table, Value};

use crate::config::Config;
use crate::error::ConfigError;

fn parse_error(e: impl std::fmt::Display) -> ConfigError {
    ConfigError::Parse(e.to_string())
}

/// Layer the TOML fragment `overlay_toml` over `base`.
///
/// Sections and `[targets.<name>]` entries merge key by key, so a project
/// file can change one setting without restating its section. Arrays such
/// as `adapter.args` or `session.function_breakpoints` are scalars for this
/// purpose: an overlay array replaces the base array instead of extending it.
pub fn merge_configs(base: &Config, overlay_toml: &str) -> Result<Config, ConfigError> {
    let mut merged = Table::try_from(base).map_err(parse_error)?;
    let overlay: Table = overlay_toml.parse().map_err(parse_error)?;
    overlay_table(&mut merged, overlay);
    merged.try_into().map_err(parse_error)
}

fn overlay_table(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match value {
            Value::Table(over) => match base.get_mut(&key) {
                Some(Value::Table(inner)) => overlay_table(inner, over),
                _ => {
                    base.insert(key, Value::Table(over));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}
