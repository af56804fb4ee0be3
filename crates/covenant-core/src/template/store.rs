//! Template folder loading.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::parser::Template;
use super::TemplateError;

/// Optional manifest declaring template keys explicitly.
pub const MANIFEST_FILE: &str = "manifest.yaml";

#[derive(Debug, Deserialize)]
struct Manifest {
    templates: BTreeMap<String, PathBuf>,
}

/// Templates keyed by contract-type identifier.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: BTreeMap<String, Template>,
}

impl TemplateStore {
    /// Load templates from `dir`.
    ///
    /// With a `manifest.yaml`, keys are exactly the manifest keys. Without one,
    /// every `*.txt` file is registered under its exact file stem.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let dir = dir.as_ref();
        let manifest_path = dir.join(MANIFEST_FILE);

        let store = if manifest_path.is_file() {
            Self::load_manifest(dir, &manifest_path)?
        } else {
            Self::load_stems(dir)?
        };

        if store.is_empty() {
            return Err(TemplateError::Empty(dir.to_path_buf()));
        }
        tracing::info!(
            dir = %dir.display(),
            keys = ?store.keys(),
            "Loaded templates"
        );
        Ok(store)
    }

    fn load_manifest(dir: &Path, manifest_path: &Path) -> Result<Self, TemplateError> {
        let raw = fs::read_to_string(manifest_path).map_err(|source| TemplateError::Io {
            path: manifest_path.to_path_buf(),
            source,
        })?;
        let manifest: Manifest = serde_yaml::from_str(&raw)?;

        let mut store = Self::default();
        for (key, file) in manifest.templates {
            let path = dir.join(&file);
            if !path.is_file() {
                return Err(TemplateError::MissingFile { key, path });
            }
            store.insert(Template::from_file(key, &path)?);
        }
        Ok(store)
    }

    fn load_stems(dir: &Path) -> Result<Self, TemplateError> {
        let io_err = |source| TemplateError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut store = Self::default();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_txt = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
            if !path.is_file() || !is_txt {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                store.insert(Template::from_file(stem, &path)?);
            }
        }
        Ok(store)
    }

    pub fn from_templates(templates: impl IntoIterator<Item = Template>) -> Self {
        let mut store = Self::default();
        for template in templates {
            store.insert(template);
        }
        store
    }

    pub fn insert(&mut self, template: Template) {
        self.templates.insert(template.key.clone(), template);
    }

    /// Template keys in sorted order; these are the contract-type candidates.
    pub fn keys(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }

    pub fn get(&self, key: &str) -> Option<&Template> {
        self.templates.get(key)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
