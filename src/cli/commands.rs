//! CLI command implementations

use crate::api;
use crate::config;
use crate::db;
use crate::error::{Error, Result};
use std::path::Path;

/// Write the default configuration file into the current directory
pub async fn init() -> Result<()> {
    let path = Path::new("classpix.toml");
    if path.exists() {
        return Err(Error::Config("classpix.toml already exists".to_string()));
    }
    std::fs::write(path, config::default_config_content())?;
    println!("Created classpix.toml - set CLASSPIX_SECRET before serving");
    Ok(())
}

/// Create the schema and optionally seed demo data
pub async fn init_db(no_seed: bool) -> Result<()> {
    let config = config::load_config()?;
    let pool = db::Pool::new(&config.database);

    db::init_schema(&pool).await?;
    if !no_seed {
        db::seed_demo_data(&pool).await?;
    }

    println!("Database ready");
    Ok(())
}

/// Run the HTTP server
pub async fn serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = config::load_config()?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    api::run_server(config, &host, port).await
}
