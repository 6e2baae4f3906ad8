// SPDX-License-Identifier: Apache-2.0

//! Model inventory
//!
//! Named template environments a connection can be created from. Built-in
//! models ship inside the binary; a models directory can add more. Only
//! `entrypoint.preql` files register, named after their directory:
//! `<dir>/a/b/entrypoint.preql` becomes `a.b`. Other `.preql` files are
//! left alone.
//!
//! Entrypoints that fail to parse are skipped with a warning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::model::environment::Environment;
use crate::model::types::{DataType, Lineage, Purpose, DEFAULT_NAMESPACE};

const ENTRYPOINT_FILE: &str = "entrypoint.preql";

const BUILTIN_MODELS: &[(&str, &str)] = &[("duckdb.demo", include_str!("builtin/duckdb_demo.preql"))];

/// Concept entry in the model listing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelConcept {
    pub name: String,
    pub datatype: DataType,
    pub purpose: Purpose,
    pub description: Option<String>,
    pub namespace: String,
    pub key: String,
    pub lineage: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelListing {
    pub name: String,
    pub concepts: Vec<ModelConcept>,
}

#[derive(Debug, Clone, Default)]
pub struct ModelInventory {
    models: BTreeMap<String, Environment>,
}

impl ModelInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inventory holding only the models compiled into the binary.
    pub fn with_builtins() -> Self {
        let mut inventory = Self::new();
        for (name, source) in BUILTIN_MODELS {
            let mut environment = Environment::new();
            match environment.parse(source, None) {
                Ok(_) => inventory.insert(*name, environment),
                Err(e) => tracing::error!(model = %name, error = %e, "Built-in model failed to parse"),
            }
        }
        inventory
    }

    pub fn insert(&mut self, name: impl Into<String>, environment: Environment) {
        self.models.insert(name.into(), environment);
    }

    /// Loads every entrypoint under `dir`. Returns how many were added.
    pub fn load_dir(&mut self, dir: &Path) -> std::io::Result<usize> {
        let mut files = Vec::new();
        collect_entrypoints(dir, &mut files)?;
        files.sort();

        let mut loaded = 0;
        for file in files {
            let Some(name) = model_name(dir, &file) else {
                continue;
            };
            let source = match std::fs::read_to_string(&file) {
                Ok(source) => source,
                Err(e) => {
                    tracing::warn!(path = %file.display(), error = %e, "Skipping unreadable model file");
                    continue;
                }
            };
            let mut environment = Environment::new();
            if let Err(e) = environment.parse(&source, None) {
                tracing::warn!(path = %file.display(), error = %e, "Skipping model that failed to parse");
                continue;
            }
            tracing::debug!(model = %name, path = %file.display(), "Model loaded");
            self.models.insert(name, environment);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Deep copy of a named template.
    pub fn get(&self, name: &str) -> Option<Environment> {
        self.models.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Public concepts of every model, for browsing.
    pub fn list(&self) -> Vec<ModelListing> {
        self.models
            .iter()
            .map(|(name, environment)| {
                let mut concepts: Vec<ModelConcept> = environment
                    .concepts()
                    .filter(|(_, concept)| !concept.is_private())
                    .map(|(key, concept)| ModelConcept {
                        name: if concept.namespace == DEFAULT_NAMESPACE {
                            concept.name.clone()
                        } else {
                            concept.address()
                        },
                        datatype: concept.datatype,
                        purpose: concept.purpose,
                        description: None,
                        namespace: concept.namespace.clone(),
                        key: key.to_string(),
                        lineage: match &concept.lineage {
                            Lineage::Aggregate { input, .. } => vec![input.clone()],
                            _ => Vec::new(),
                        },
                    })
                    .collect();
                concepts.sort_by_cached_key(|c| format!("{}{}", c.namespace, c.key));
                ModelListing {
                    name: name.clone(),
                    concepts,
                }
            })
            .collect()
    }
}

fn collect_entrypoints(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_entrypoints(&path, out)?;
        } else if path.file_name().is_some_and(|f| f == ENTRYPOINT_FILE) {
            out.push(path);
        }
    }
    Ok(())
}

fn model_name(root: &Path, entrypoint: &Path) -> Option<String> {
    let name = entrypoint
        .strip_prefix(root)
        .ok()?
        .parent()?
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".");
    (!name.is_empty()).then_some(name)
}
