use std::path::Path;

use super::ContainerID;

/// Resolves the human readable service name of a container.
///
/// Reads the `Name` field from the container's metadata file and strips the leading
/// `/` the container runtime prefixes names with. Falls back to the raw container id
/// if the file is missing, unreadable, malformed, or the field is absent or empty.
///
/// # Arguments
///
/// * `config_path` - Path to the container's `config.v2.json`.
/// * `container_id` - Id used as the fallback name.
pub async fn resolve_service_name(config_path: &Path, container_id: &ContainerID) -> String {
    let content = match tokio::fs::read_to_string(config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::debug!(
                "no metadata file `{}`, using container id as service name",
                config_path.display()
            );
            return container_id.to_string();
        }
        Err(err) => {
            log::warn!(
                "failed to read metadata file `{}`: {}",
                config_path.display(),
                err
            );
            return container_id.to_string();
        }
    };

    match name_from_metadata(&content) {
        Some(name) => name,
        None => {
            log::warn!(
                "metadata file `{}` has no usable `Name`, using container id `{}`",
                config_path.display(),
                container_id
            );
            container_id.to_string()
        }
    }
}

fn name_from_metadata(content: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(content).ok()?;
    let name = value.get("Name")?.as_str()?.trim_start_matches('/');
    if name.is_empty() {
        return None;
    }
    Some(name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ContainerID {
        ContainerID::new("0123abcd").unwrap()
    }

    #[tokio::test]
    async fn test_name_strips_leading_slash() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), r#"{"ID":"0123abcd","Name":"/billing-api"}"#).unwrap();

        assert_eq!(resolve_service_name(tmp.path(), &id()).await, "billing-api");
    }

    #[tokio::test]
    async fn test_missing_file_falls_back_to_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.v2.json");

        assert_eq!(resolve_service_name(&path, &id()).await, "0123abcd");
    }

    #[tokio::test]
    async fn test_missing_field_falls_back_to_id() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), r#"{"ID":"0123abcd"}"#).unwrap();

        assert_eq!(resolve_service_name(tmp.path(), &id()).await, "0123abcd");
    }

    #[tokio::test]
    async fn test_malformed_file_falls_back_to_id() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "{not json").unwrap();

        assert_eq!(resolve_service_name(tmp.path(), &id()).await, "0123abcd");
    }

    #[test]
    fn test_name_from_metadata() {
        assert_eq!(name_from_metadata(r#"{"Name":"web"}"#).as_deref(), Some("web"));
        assert_eq!(name_from_metadata(r#"{"Name":"/"}"#), None);
        assert_eq!(name_from_metadata(r#"{"Name":42}"#), None);
    }
}
