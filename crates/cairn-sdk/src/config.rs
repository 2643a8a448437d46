use std::path::{Path, PathBuf};

use cairn_chunk::TreeOptions;
use cairn_dir::{DEFAULT_EXPORT_CONCURRENCY, DEFAULT_IMPORT_WRITERS};
use cairn_gc::GcConfig;
use cairn_tree::cache::DEFAULT_NODE_CAPACITY;
use cairn_types::NamespaceId;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

pub const DEFAULT_NAMESPACE: &str = "default";

/// Everything a [`StorageClient`](crate::StorageClient) needs, loadable from
/// TOML. Missing sections and keys take their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the file-backed store.
    pub store_root: PathBuf,
    pub namespace: String,
    pub tree: TreeOptions,
    pub gc: GcConfig,
    pub import: ImportConfig,
    pub export: ExportConfig,
    pub cache: CacheConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from(".cairn"),
            namespace: DEFAULT_NAMESPACE.into(),
            tree: TreeOptions::default(),
            gc: GcConfig::default(),
            import: ImportConfig::default(),
            export: ExportConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Concurrent writers a bulk import is sharded across.
    pub writers: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            writers: DEFAULT_IMPORT_WRITERS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Files written concurrently by a bulk export.
    pub max_concurrency: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_EXPORT_CONCURRENCY,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub node_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            node_capacity: DEFAULT_NODE_CAPACITY,
        }
    }
}

impl StorageConfig {
    /// Read and validate a TOML file.
    pub fn load(path: &Path) -> SdkResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as pretty TOML.
    pub fn to_toml_string(&self) -> SdkResult<String> {
        toml::to_string_pretty(self).map_err(|e| SdkError::InvalidConfig(e.to_string()))
    }

    /// The configured namespace, validated.
    pub fn namespace_id(&self) -> SdkResult<NamespaceId> {
        Ok(NamespaceId::new(self.namespace.as_str())?)
    }

    /// Check every section; the first problem found is returned.
    pub fn validate(&self) -> SdkResult<()> {
        self.namespace_id()?;
        self.tree
            .validate()
            .map_err(|e| SdkError::InvalidConfig(format!("tree: {e}")))?;
        self.gc.validate()?;
        if self.import.writers == 0 {
            return Err(SdkError::InvalidConfig("import.writers must be at least 1".into()));
        }
        if self.export.max_concurrency == 0 {
            return Err(SdkError::InvalidConfig(
                "export.max_concurrency must be at least 1".into(),
            ));
        }
        if self.cache.node_capacity == 0 {
            return Err(SdkError::InvalidConfig("cache.node_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cairn_chunk::ChunkingOptions;

    use super::*;

    #[test]
    fn default_config() {
        let c = StorageConfig::default();
        assert_eq!(c.namespace, "default");
        assert_eq!(c.import.writers, DEFAULT_IMPORT_WRITERS);
        assert_eq!(c.cache.node_capacity, DEFAULT_NODE_CAPACITY);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn parses_partial_toml() {
        let c = StorageConfig::from_toml_str(
            r#"
            store_root = "/var/lib/cairn"
            namespace = "builds"

            [tree.leaf]
            min_size = 1024
            max_size = 8192
            target_size = 2048

            [gc]
            max_namespace_bytes = 1048576
            grace_period_secs = 0
            "#,
        )
        .unwrap();
        assert_eq!(c.store_root, PathBuf::from("/var/lib/cairn"));
        assert_eq!(c.tree.leaf, ChunkingOptions::new(1024, 8192, 2048));
        assert_eq!(c.tree.interior, TreeOptions::default().interior);
        assert_eq!(c.gc.max_namespace_bytes, 1 << 20);
        assert_eq!(c.gc.batch_size, GcConfig::default().batch_size);
        assert_eq!(c.export.max_concurrency, DEFAULT_EXPORT_CONCURRENCY);
    }

    #[test]
    fn toml_roundtrip() {
        let c = StorageConfig::default();
        let text = c.to_toml_string().unwrap();
        assert_eq!(StorageConfig::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn rejects_bad_namespace() {
        let err = StorageConfig::from_toml_str(r#"namespace = "../etc""#).unwrap_err();
        assert!(matches!(err, SdkError::Type(_)));
    }

    #[test]
    fn rejects_inverted_chunk_bounds() {
        let err = StorageConfig::from_toml_str(
            "[tree.leaf]\nmin_size = 100\nmax_size = 10\ntarget_size = 50\n",
        )
        .unwrap_err();
        assert!(matches!(err, SdkError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_zero_writers() {
        let c = StorageConfig {
            import: ImportConfig { writers: 0 },
            ..StorageConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cairn.toml");
        std::fs::write(&path, "namespace = \"files\"\n").unwrap();
        assert_eq!(StorageConfig::load(&path).unwrap().namespace, "files");
    }
}
