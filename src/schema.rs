// src/schema.rs

use std::{fs, path::Path};

use anyhow::{Context, Error};
use schemars::schema_for;
use serde_json::Value;

use crate::channel::ChannelsConfig;

pub const CHANNELS_SCHEMA_FILE: &str = "channels.schema.json";

/// JSON Schema of the channels file, including every registered node type.
pub fn channels_schema() -> Result<Value, Error> {
    let schema = schema_for!(ChannelsConfig);
    Ok(serde_json::to_value(&schema)?)
}

/// The entry point invoked by `main.rs` for `Commands::Schema`.
///
/// With an output directory the schema lands in `<dir>/channels.schema.json`,
/// otherwise it is printed to stdout.
pub fn write_schema(out_dir: Option<&Path>) -> Result<(), Error> {
    let text = serde_json::to_string_pretty(&channels_schema()?)?;
    match out_dir {
        Some(dir) => {
            fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
            let path = dir.join(CHANNELS_SCHEMA_FILE);
            fs::write(&path, text).with_context(|| format!("cannot write {}", path.display()))?;
            println!("Schema written to {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}
