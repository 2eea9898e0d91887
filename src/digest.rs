//! Usage digest computation
//!
//! The digest covers everything a module can say about an extension: which
//! modules use it, in traversal order, with which tag calls and which
//! `use_repo` imports. It is a pure function of its inputs.

use crate::checksum;
use crate::extension::ExtensionId;
use crate::module::{ExtensionUsage, ModuleKey, TagCall};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable content hash of merged extension usages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageDigest(String);

impl UsageDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UsageDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UsageDigest {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Serialize)]
struct DigestInput<'a> {
    extension: String,
    usages: Vec<UsageInput<'a>>,
}

#[derive(Serialize)]
struct UsageInput<'a> {
    module: &'a ModuleKey,
    tags: &'a [TagCall],
    use_repo: &'a [String],
}

/// Compute the usage digest of one extension identity.
///
/// Tag attributes are `BTreeMap`s, so attribute order within a tag call
/// never matters; the order of usages and of tag calls does.
pub fn usage_digest(
    id: &ExtensionId,
    usages: &[ExtensionUsage],
) -> Result<UsageDigest, serde_json::Error> {
    let input = DigestInput {
        extension: id.to_string(),
        usages: usages
            .iter()
            .map(|u| UsageInput {
                module: &u.module,
                tags: &u.tags,
                use_repo: &u.use_repo,
            })
            .collect(),
    };

    checksum::canonical_json_checksum(&input).map(UsageDigest)
}
