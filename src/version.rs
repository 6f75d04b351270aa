//! Client version information and API version selection.

use crate::types::VersionInfo;

/// Current client version.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse an API version string into `(major, minor)`.
///
/// Accepts `36.0` as well as the `v36.0` form used in URLs.
pub fn parse_version(version: &str) -> (u32, u32) {
    let version = version.trim().trim_start_matches(['v', 'V']);
    let nums: Vec<u32> = version.split('.').filter_map(|s| s.parse().ok()).collect();

    (
        nums.first().copied().unwrap_or(0),
        nums.get(1).copied().unwrap_or(0),
    )
}

/// Compare two API versions numerically.
///
/// `"9.0" < "36.0"` even though the strings sort the other way.
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    parse_version(a).cmp(&parse_version(b))
}

/// Render a version number in URL form, e.g. `36.0` -> `v36.0`.
pub fn url_version(version: &str) -> String {
    let version = version.trim();
    if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{}", version)
    }
}

/// Pick the numerically highest version offered by the server.
pub fn select_highest(versions: &[VersionInfo]) -> Option<&VersionInfo> {
    versions
        .iter()
        .max_by(|a, b| compare_versions(&a.version, &b.version))
}

/// Find a specific version in the offered list.
pub fn find_version<'a>(versions: &'a [VersionInfo], wanted: &str) -> Option<&'a VersionInfo> {
    let wanted = parse_version(wanted);
    versions.iter().find(|v| parse_version(&v.version) == wanted)
}

/// Build the User-Agent string for client requests.
pub fn build_user_agent(suffix: Option<&str>) -> String {
    let mut ua = format!(
        "sforce-rust/{} ({}; {})",
        SDK_VERSION,
        std::env::consts::OS,
        std::env::consts::ARCH
    );

    if let Some(s) = suffix {
        ua.push(' ');
        ua.push_str(s);
    }

    ua
}
