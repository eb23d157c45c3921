//! Canvas positions of patchbay groups.

use crate::{Error, Result};
use hostgraph_core::PluginId;
use serde::{Deserialize, Serialize};

/// Saved box of one group on the patchbay canvas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPosition {
    pub name: String,
    /// Set when the group belongs to a plugin hosted by this engine.
    pub plugin: Option<PluginId>,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl GroupPosition {
    pub fn new(name: impl Into<String>, x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self {
            name: name.into(),
            plugin: None,
            x1,
            y1,
            x2,
            y2,
        }
    }

    pub fn with_plugin(mut self, plugin: PluginId) -> Self {
        self.plugin = Some(plugin);
        self
    }

    /// `"x1:y1:x2:y2"`.
    pub fn coordinates(&self) -> String {
        format!("{}:{}:{}:{}", self.x1, self.y1, self.x2, self.y2)
    }

    pub fn set_coordinates(&mut self, value: &str) -> Result<()> {
        let [x1, y1, x2, y2] = parse_coordinates(value)?;
        self.x1 = x1;
        self.y1 = y1;
        self.x2 = x2;
        self.y2 = y2;
        Ok(())
    }

    /// Group name to look up when restoring this record.
    ///
    /// Plugin-owned records drop any existing client prefix (everything up to
    /// the first `/` after the first `.`) and take `prefix` instead.
    pub fn restore_name(&self, prefix: &str) -> String {
        if self.plugin.is_none() {
            return self.name.clone();
        }
        let bare = self
            .name
            .find('.')
            .and_then(|dot| {
                self.name[dot + 1..]
                    .find('/')
                    .map(|slash| &self.name[dot + 1 + slash + 1..])
            })
            .unwrap_or(&self.name);
        format!("{prefix}{bare}")
    }
}

/// Parse `"x1:y1:x2:y2"`.
pub fn parse_coordinates(value: &str) -> Result<[i32; 4]> {
    let mut out = [0i32; 4];
    let mut parts = value.split(':');
    for slot in out.iter_mut() {
        *slot = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(|| Error::InvalidPosition(value.to_owned()))?;
    }
    if parts.next().is_some() {
        return Err(Error::InvalidPosition(value.to_owned()));
    }
    Ok(out)
}
