//! Small shared helpers.

use std::io::ErrorKind;
use std::path::Path;
use std::fs;

use serde::Serialize;
use uuid::Uuid;

/// Serialize a serde-backed enum into its wire name (e.g. "MUY MALA").
pub fn serde_enum_name<T: Serialize>(val: &T) -> Option<String> {
    serde_json::to_value(val).ok()?.as_str().map(|s| s.to_string())
}

/// Load the client's stable device identifier, generating and persisting a
/// fresh UUID on first run. This identifier keys every persisted row and must
/// survive restarts; the device itself never reports one.
pub fn load_or_create_device_id(path: &Path) -> Result<Uuid, String> {
    match fs::read_to_string(path) {
        Ok(contents) => Uuid::parse_str(contents.trim())
            .map_err(|e| format!("invalid device id in {}: {}", path.display(), e)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let id = Uuid::new_v4();
            fs::write(path, format!("{}\n", id)).map_err(|e| format!("writing {} failed: {}", path.display(), e))?;
            Ok(id)
        }
        Err(e) => Err(format!("reading {} failed: {}", path.display(), e)),
    }
}
