use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::basic::{BasicDb, BasicDbConfig};
use crate::db::Db;
use crate::delay::CancelSignal;
use crate::properties::Properties;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Database {
    /// Stores nothing; simulates latency and prints each call
    Basic,
}

impl Database {
    /// Build one adapter instance. The driver calls this once per client.
    pub fn create(self, properties: &Properties, cancel: &CancelSignal) -> Result<Box<dyn Db>> {
        match self {
            Database::Basic => {
                let config = BasicDbConfig::from_properties(properties)
                    .context("invalid basicdb configuration")?;
                Ok(Box::new(BasicDb::new(config, cancel.clone())))
            }
        }
    }
}
