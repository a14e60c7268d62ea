mod settings;

pub use settings::{Command, Config, FetchSettings, Settings};
