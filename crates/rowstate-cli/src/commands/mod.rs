pub mod state;

use std::path::Path;

use rowstate::StateConfig;

/// Merge the config file (if any) with command-line overrides.
pub fn resolve_config(
    path: Option<&Path>,
    connection_string: Option<String>,
    table: Option<String>,
) -> anyhow::Result<StateConfig> {
    let mut config = match (path, connection_string.as_deref()) {
        (Some(path), _) => StateConfig::from_file(path)?,
        (None, Some(url)) => StateConfig::new(url),
        (None, None) => anyhow::bail!("missing connection string: pass --config or --connection-string"),
    };
    if let Some(url) = connection_string {
        config.connection_string = url;
    }
    if let Some(table) = table {
        config.table_name = table;
    }
    config.validate()?;
    Ok(config)
}
