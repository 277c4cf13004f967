//! Tier-vector files: whitespace-separated group ids, one per feature.

use crate::{DataError, Result};
use canopy_verify::Tier;
use std::path::Path;

pub fn read_tiers(text: &str) -> Result<Tier> {
    let mut groups = Vec::new();
    for (i, line) in text.lines().enumerate() {
        for token in line.split_whitespace() {
            let group: u32 = token.parse().map_err(|_| {
                DataError::parse(i + 1, format!("expected a group id, got `{token}`"))
            })?;
            groups.push(group);
        }
    }
    Ok(Tier::new(groups))
}

pub fn read_tiers_from_path(path: &Path) -> Result<Tier> {
    read_tiers(&std::fs::read_to_string(path)?)
}
