//! Persistence module
//!
//! Patch save/load functionality using serde and JSON.

pub mod patch;

pub use patch::{
    from_json, load_from_file, save_to_file, ComponentData, Patch, PatchError, PATCH_VERSION,
};
