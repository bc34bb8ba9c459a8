//! Utility functions

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Version information for the runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Short form of a commit reference: its first 7 characters, or `latest`
pub fn short_commit(commit: &str) -> String {
    let short: String = sanitize_name(commit).chars().take(7).collect();
    if short.is_empty() {
        "latest".to_string()
    } else {
        short
    }
}

/// Lowercase a value and replace anything outside `[a-z0-9_.-]` with `-`,
/// so it can be used in image, container and directory names
pub fn sanitize_name(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Name stem for everything owned by a deployment: image, container,
/// checkout directory.
///
/// Ids that are already valid names are kept as they are. Any other id gets
/// a digest of the raw id appended, so `Team/A` and `team-a` stay apart.
pub fn deployment_name(deployment_id: &str) -> String {
    let name = sanitize_name(deployment_id);
    if name == deployment_id && !name.is_empty() {
        return name;
    }

    let digest = Sha256::digest(deployment_id.as_bytes());
    let suffix: String = digest[..5].iter().map(|b| format!("{:02x}", b)).collect();
    if name.is_empty() {
        suffix
    } else {
        format!("{}-{}", name, suffix)
    }
}

/// Public URL for a project, from a template containing `{project}`
pub fn external_url(template: &str, project_id: &str) -> String {
    template.replace("{project}", &sanitize_name(project_id))
}
