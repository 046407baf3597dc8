// src/encoder/mod.rs

mod definition;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::{CensusError, Result};

const HOUSING_YAML: &str = include_str!("housing.yaml");

/// A resolved alias: the raw column and the name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodedItem {
    pub id: String,
    pub label: String,
}

impl EncodedItem {
    fn new(id: &str, label: String) -> Self {
        Self {
            id: id.to_string(),
            label,
        }
    }
}

/// An ordered set of human keys, each naming one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsLeaf {
    options: Vec<(String, String)>,
    default: Option<String>,
}

impl OptionsLeaf {
    pub fn new(options: Vec<(String, String)>, default: Option<String>) -> Self {
        Self { options, default }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.options.iter().map(|(k, _)| k.as_str())
    }

    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, id)| id.as_str())
    }

    /// The default names a key when it matches one, otherwise a column id.
    fn default_id(&self) -> Option<&str> {
        self.default
            .as_deref()
            .map(|d| self.lookup(d).unwrap_or(d))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasNode {
    Static(String),
    Options(OptionsLeaf),
    /// Named children; a `default` column makes the node itself callable.
    Internal {
        children: BTreeMap<String, AliasNode>,
        default: Option<String>,
    },
}

impl AliasNode {
    pub fn leaf(id: impl Into<String>) -> Self {
        AliasNode::Static(id.into())
    }

    pub fn options<K, V>(pairs: impl IntoIterator<Item = (K, V)>, default: Option<&str>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        AliasNode::Options(OptionsLeaf::new(
            pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            default.map(str::to_string),
        ))
    }

    pub fn internal<K: Into<String>>(children: impl IntoIterator<Item = (K, AliasNode)>) -> Self {
        AliasNode::Internal {
            children: children.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            default: None,
        }
    }

    /// Give an internal node its own column. No effect on leaves.
    pub fn with_default(mut self, id: impl Into<String>) -> Self {
        if let AliasNode::Internal { default, .. } = &mut self {
            *default = Some(id.into());
        }
        self
    }
}

/// Read-only namespace of human-readable column names.
///
/// Paths are dot separated from the root (`housing.units.occupied`). Labels
/// are the camel-joined path down to the resolved key, so the raw column
/// codes never have to appear at call sites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoder {
    root: BTreeMap<String, AliasNode>,
}

impl Encoder {
    pub fn new<K: Into<String>>(children: impl IntoIterator<Item = (K, AliasNode)>) -> Self {
        Self {
            root: children.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(Self {
            root: definition::parse(yaml)?,
        })
    }

    /// The bundled housing aliases, rooted at `housing`.
    pub fn housing() -> Result<Self> {
        Self::from_yaml(HOUSING_YAML)
    }

    /// The node at a dot separated `path`. Segments are borrowed from the
    /// tree, so the resolver does not depend on `path` outliving it.
    pub fn at(&self, path: &str) -> Result<Resolver<'_>> {
        let mut segments = Vec::new();
        let mut children = &self.root;
        let mut node = None;

        for segment in path.split('.') {
            let (name, child) = children
                .get_key_value(segment)
                .ok_or_else(|| CensusError::UnknownAliasPath(path.to_string()))?;
            segments.push(name.as_str());
            node = Some(child);
            match child {
                AliasNode::Internal { children: c, .. } => children = c,
                _ => children = &EMPTY,
            }
        }

        let node = node.ok_or_else(|| CensusError::UnknownAliasPath(path.to_string()))?;
        Ok(Resolver {
            path: segments,
            node,
        })
    }

    /// `at(path)?.call(keys)`.
    pub fn resolve(&self, path: &str, keys: &[&str]) -> Result<Vec<EncodedItem>> {
        self.at(path)?.call(keys)
    }

    /// Every callable path, depth first in name order.
    pub fn paths(&self) -> Vec<String> {
        fn walk(children: &BTreeMap<String, AliasNode>, prefix: &str, out: &mut Vec<String>) {
            for (name, node) in children {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                match node {
                    AliasNode::Internal { children, default } => {
                        if default.is_some() {
                            out.push(path.clone());
                        }
                        walk(children, &path, out);
                    }
                    _ => out.push(path),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out
    }
}

static EMPTY: BTreeMap<String, AliasNode> = BTreeMap::new();

/// One addressed node plus the path that reached it.
#[derive(Debug, Clone)]
pub struct Resolver<'a> {
    path: Vec<&'a str>,
    node: &'a AliasNode,
}

impl Resolver<'_> {
    pub fn path(&self) -> String {
        self.path.join(".")
    }

    pub fn label(&self) -> String {
        to_camel_case(self.path.iter().copied())
    }

    /// Resolve with zero or more option keys.
    ///
    /// Without keys a static leaf or defaulted node yields its one column,
    /// an options leaf yields its default or nothing. With keys only an
    /// options leaf answers: repeated keys collapse to their first
    /// occurrence and an unknown key is an error.
    pub fn call(&self, keys: &[&str]) -> Result<Vec<EncodedItem>> {
        match self.node {
            AliasNode::Static(id)
            | AliasNode::Internal {
                default: Some(id), ..
            } => {
                if keys.is_empty() {
                    Ok(vec![EncodedItem::new(id, self.label())])
                } else {
                    Err(CensusError::UnexpectedKeys(self.path()))
                }
            }
            AliasNode::Internal { default: None, .. } => Err(CensusError::NotCallable(self.path())),
            AliasNode::Options(leaf) => {
                if keys.is_empty() {
                    return Ok(leaf
                        .default_id()
                        .map(|id| vec![EncodedItem::new(id, self.label())])
                        .unwrap_or_default());
                }
                let mut seen = HashSet::new();
                keys.iter()
                    .filter(|k| seen.insert(**k))
                    .map(|key| -> Result<EncodedItem> {
                        let id = leaf.lookup(key).ok_or_else(|| CensusError::UnknownAliasKey {
                            key: key.to_string(),
                            leaf: self.path(),
                        })?;
                        let label = to_camel_case(self.path.iter().copied().chain([*key]));
                        Ok(EncodedItem::new(id, label))
                    })
                    .collect()
            }
        }
    }

    /// Every key of an options leaf in definition order; otherwise the
    /// same as a call without keys.
    pub fn all(&self) -> Result<Vec<EncodedItem>> {
        match self.node {
            AliasNode::Options(leaf) => self.call(&leaf.keys().collect::<Vec<_>>()),
            _ => self.call(&[]),
        }
    }
}

/// First part verbatim, every later part with its first character uppercased.
pub fn to_camel_case<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for (i, part) in parts.into_iter().enumerate() {
        if i == 0 {
            out.push_str(part);
            continue;
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
