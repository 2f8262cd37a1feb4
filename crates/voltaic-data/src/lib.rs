//! File loading for Voltaic: simulator configuration and saved circuits in
//! RON, TOML, or JSON.

pub mod loader;

pub use loader::{
    DataLoadError, Format, deserialize_file, detect_format, find_data_file, load_circuit,
    load_config, save_circuit, serialize_file,
};
