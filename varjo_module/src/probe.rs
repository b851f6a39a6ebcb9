use std::path::Path;

/// Named pipe the Varjo runtime publishes while a headset is connected.
pub const INFO_SERVICE_PIPE: &str = r"\\.\pipe\Varjo\InfoService";

/// True if the Varjo runtime is up. Same check the official client does
/// before it tries to talk to the service.
pub fn is_available() -> bool {
    endpoint_exists(Path::new(INFO_SERVICE_PIPE))
}

pub fn endpoint_exists(path: &Path) -> bool {
    path.exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_endpoint_is_not_available() {
        let path = std::env::temp_dir().join("varjo_probe_definitely_missing");
        assert!(!endpoint_exists(&path));
    }

    #[test]
    fn test_existing_endpoint() {
        let path = std::env::temp_dir().join(format!("varjo_probe_{}", std::process::id()));
        std::fs::write(&path, b"").unwrap();
        assert!(endpoint_exists(&path));
        std::fs::remove_file(&path).unwrap();
    }
}
