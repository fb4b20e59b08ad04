//! Loads the library registry: one YAML document per [`LibrarySystem`]
//! (spec §6), discovered from a directory of `*.yml`/`*.yaml` files.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use libfed_domain::LibrarySystem;
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Read every `*.yml`/`*.yaml` file directly under `dir`, parse each as one
/// [`LibrarySystem`] document, and validate its spec §3 invariants.
///
/// Systems are returned in file-name sorted order for determinism; a
/// duplicate `id` across two files is a hard error rather than a silent
/// override, since the coordinator keys everything by `SystemId`.
pub fn discover(dir: &Utf8Path) -> Result<Vec<LibrarySystem>, ConfigError> {
    let mut paths: Vec<Utf8PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| Utf8PathBuf::from_path_buf(entry.path()).unwrap_or_default())
        .filter(|p| matches!(p.extension(), Some("yml") | Some("yaml")))
        .collect();
    paths.sort();

    let mut systems = Vec::with_capacity(paths.len());
    let mut seen_ids: HashMap<String, Utf8PathBuf> = HashMap::new();

    for path in paths {
        let system = load_one(&path)?;
        if let Some(first) = seen_ids.get(system.id.as_ref()) {
            return Err(ConfigError::DuplicateSystemId {
                id: system.id.0.clone(),
                first: first.clone(),
                second: path,
            });
        }
        seen_ids.insert(system.id.0.clone(), path.clone());

        if !system.enabled {
            debug!(system = %system.id, path = %path, "system disabled, loaded but will be skipped at fan-out");
        }
        systems.push(system);
    }

    if systems.is_empty() {
        warn!(dir = %dir, "no library-system documents found in registry directory");
    }

    Ok(systems)
}

/// Parse and validate a single library-system YAML document.
pub fn load_one(path: &Utf8Path) -> Result<LibrarySystem, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let system: LibrarySystem = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    system.validate().map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(system)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_system(dir: &tempfile::TempDir, filename: &str, yaml: &str) -> Utf8PathBuf {
        let path = Utf8PathBuf::from_path_buf(dir.path().join(filename)).unwrap();
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        path
    }

    const SAMPLE: &str = r#"
id: houston-public
name: Houston Public Library
vendor: sierra
region: us-tx
catalog_url: https://catalog.houstonlibrary.org
enabled: true
branches:
  - id: "houston-public:main"
    code: main
    name: Central Library
adapters:
  - protocol: sierra_rest
    base_url: https://catalog.houstonlibrary.org/iii/sierra-api
    timeout_ms: 5000
    max_concurrency: 4
"#;

    #[test]
    fn discovers_and_validates_systems() {
        let dir = tempfile::tempdir().unwrap();
        write_system(&dir, "houston.yaml", SAMPLE);
        let utf8_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let systems = discover(&utf8_dir).unwrap();
        assert_eq!(systems.len(), 1);
        assert_eq!(systems[0].id.0, "houston-public");
    }

    #[test]
    fn rejects_duplicate_system_ids() {
        let dir = tempfile::tempdir().unwrap();
        write_system(&dir, "a.yaml", SAMPLE);
        write_system(&dir, "b.yaml", SAMPLE);
        let utf8_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let err = discover(&utf8_dir).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateSystemId { .. }));
    }

    #[test]
    fn rejects_system_with_no_adapters() {
        let dir = tempfile::tempdir().unwrap();
        write_system(
            &dir,
            "bad.yaml",
            r#"
id: sys-bad
name: Bad System
vendor: unknown
region: us
catalog_url: https://example.org
enabled: true
branches: []
adapters: []
"#,
        );
        let utf8_dir = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        let err = discover(&utf8_dir).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
