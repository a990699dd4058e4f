pub mod settings;

pub use settings::{Api, Database, Logger, PollerSettings, Serial, Server, Settings};
