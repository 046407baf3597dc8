//! YAML form of an alias tree.
//!
//! ```yaml
//! housing:
//!   units:
//!     default: B25001_001E          # makes `housing.units` callable
//!     occupied:
//!       options: [[byOwner, B25003_002E], [byRenter, B25003_003E]]
//!       default: B25003_001E
//!   median:
//!     rent: B25064_001E             # static leaf
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

use super::{AliasNode, OptionsLeaf};
use crate::error::{CensusError, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Definition {
    Static(String),
    Options(OptionsDefinition),
    Map(BTreeMap<String, Definition>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OptionsDefinition {
    options: Vec<(String, String)>,
    #[serde(default)]
    default: Option<String>,
}

/// Parse a definition document into the root's children.
pub(super) fn parse(yaml: &str) -> Result<BTreeMap<String, AliasNode>> {
    match serde_yaml::from_str::<Definition>(yaml)? {
        Definition::Map(children) => build_children(children, ""),
        _ => Err(CensusError::InvalidDefinition(
            "top level must be a mapping of names".into(),
        )),
    }
}

fn build_children(
    children: BTreeMap<String, Definition>,
    path: &str,
) -> Result<BTreeMap<String, AliasNode>> {
    children
        .into_iter()
        .map(|(name, def)| {
            let child_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{path}.{name}")
            };
            Ok((name, build(def, &child_path)?))
        })
        .collect()
}

fn build(def: Definition, path: &str) -> Result<AliasNode> {
    match def {
        Definition::Static(id) => Ok(AliasNode::Static(id)),
        Definition::Options(opts) => {
            if opts.options.is_empty() {
                return Err(CensusError::InvalidDefinition(format!(
                    "options leaf \"{path}\" has no options"
                )));
            }
            if let Some(key) = first_repeat(&opts.options) {
                return Err(CensusError::InvalidDefinition(format!(
                    "options leaf \"{path}\" repeats key \"{key}\""
                )));
            }
            Ok(AliasNode::Options(OptionsLeaf::new(opts.options, opts.default)))
        }
        Definition::Map(mut children) => {
            let default = match children.remove("default") {
                None => None,
                Some(Definition::Static(id)) => Some(id),
                Some(_) => {
                    return Err(CensusError::InvalidDefinition(format!(
                        "\"{path}.default\" must be a single column id"
                    )))
                }
            };
            Ok(AliasNode::Internal {
                children: build_children(children, path)?,
                default,
            })
        }
    }
}

fn first_repeat(options: &[(String, String)]) -> Option<String> {
    let mut seen = HashSet::new();
    options
        .iter()
        .find(|(k, _)| !seen.insert(k.as_str()))
        .map(|(k, _)| k.clone())
}
