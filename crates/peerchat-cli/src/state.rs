//! Application state shared by every command.
//!
//! Resolves the data directory, loads `config.toml`, and orders the roster
//! for the visitor's country. The message log is opened lazily, only by
//! commands that need it.

use std::path::PathBuf;

use peerchat_core::roster::{Roster, StaticCountryLookup, order_roster};
use peerchat_infra::config::{load_session_config, resolve_data_dir};
use peerchat_infra::geo::HttpCountryLookup;
use peerchat_infra::sqlite::{DatabasePool, SqliteMessageLog};
use peerchat_types::config::SessionConfig;

pub struct AppState {
    pub data_dir: PathBuf,
    pub config: SessionConfig,
    pub roster: Roster,
}

impl AppState {
    /// Load configuration and the roster.
    ///
    /// With `detect_country` the roster is ordered by the visitor's detected
    /// country; detection failures fall back to the default order.
    pub async fn init(detect_country: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_session_config(&data_dir).await;

        let roster = if detect_country {
            order_roster(Roster::builtin(), &HttpCountryLookup::new()).await
        } else {
            order_roster(Roster::builtin(), &StaticCountryLookup::default()).await
        };

        Ok(Self {
            data_dir,
            config,
            roster,
        })
    }

    /// Open the SQLite message log in the data directory.
    pub async fn open_message_log(&self) -> anyhow::Result<SqliteMessageLog> {
        let pool = DatabasePool::open_in(&self.data_dir).await?;
        Ok(SqliteMessageLog::new(pool))
    }
}
