//! Contact attribute sources for the binary.

use async_trait::async_trait;
use broadcast_outbox::{AttributeLookup, AttributeMap, LookupError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// One entry of a recipients file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RecipientEntry {
    Mobile(String),
    Contact {
        mobile: String,
        #[serde(default)]
        attributes: HashMap<String, String>,
    },
}

/// Split a recipients file into the mobile list and the attributes it
/// carries.
pub fn parse_recipients(json: &str) -> serde_json::Result<(Vec<String>, AttributeMap)> {
    let entries: Vec<RecipientEntry> = serde_json::from_str(json)?;
    let mut mobiles = Vec::with_capacity(entries.len());
    let mut attributes = AttributeMap::new();

    for entry in entries {
        match entry {
            RecipientEntry::Mobile(mobile) => mobiles.push(mobile),
            RecipientEntry::Contact {
                mobile,
                attributes: values,
            } => {
                if !values.is_empty() {
                    attributes.insert(mobile.clone(), values);
                }
                mobiles.push(mobile);
            }
        }
    }
    Ok((mobiles, attributes))
}

/// Attributes known up front, shared by every user.
pub struct StaticAttributes {
    attributes: AttributeMap,
}

impl StaticAttributes {
    pub fn new(attributes: AttributeMap) -> Self {
        Self { attributes }
    }
}

#[async_trait]
impl AttributeLookup for StaticAttributes {
    async fn lookup(
        &self,
        _user_id: &str,
        mobiles: &[String],
        keys: &[String],
    ) -> Result<AttributeMap, LookupError> {
        Ok(select(&self.attributes, mobiles, keys))
    }
}

/// Per-user attribute files: `<dir>/<user_id>.json`, each an object of
/// mobile to attribute map. A user without a file has no attributes.
pub struct ContactDirectory {
    dir: PathBuf,
}

impl ContactDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl AttributeLookup for ContactDirectory {
    async fn lookup(
        &self,
        user_id: &str,
        mobiles: &[String],
        keys: &[String],
    ) -> Result<AttributeMap, LookupError> {
        if user_id.is_empty() || user_id.contains(['/', '\\']) || user_id.starts_with('.') {
            return Err(LookupError(format!("invalid user id: {user_id:?}")));
        }

        let path = self.dir.join(format!("{user_id}.json"));
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AttributeMap::new()),
            Err(e) => return Err(LookupError(format!("{}: {e}", path.display()))),
        };
        let all: AttributeMap = serde_json::from_str(&content)
            .map_err(|e| LookupError(format!("{}: {e}", path.display())))?;

        Ok(select(&all, mobiles, keys))
    }
}

/// The requested keys of the requested mobiles.
fn select(all: &AttributeMap, mobiles: &[String], keys: &[String]) -> AttributeMap {
    mobiles
        .iter()
        .filter_map(|mobile| {
            let values = all.get(mobile)?;
            let picked: HashMap<String, String> = keys
                .iter()
                .filter_map(|key| Some((key.clone(), values.get(key)?.clone())))
                .collect();
            Some((mobile.clone(), picked))
        })
        .collect()
}
