use semver::Version;

/// Strip any leading non-numeric prefix such as `v` or `release-`.
///
/// Returns the input unchanged when it contains no digit.
pub fn normalize_version(version: &str) -> &str {
    let trimmed = version.trim();
    trimmed
        .find(|c: char| c.is_ascii_digit())
        .map(|start| &trimmed[start..])
        .unwrap_or(trimmed)
}

/// Parse a version string into a semver::Version, tolerating prefixes and
/// partial versions.
///
/// Examples:
/// - "v1" -> Version(1, 0, 0)
/// - "1.2" -> Version(1, 2, 0)
/// - "release-1.2.3" -> Version(1, 2, 3)
pub fn parse_version(version: &str) -> Option<Version> {
    let version = normalize_version(version);
    let parts: Vec<&str> = version.split('.').collect();
    let normalized = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => version.to_string(),
    };
    Version::parse(&normalized).ok()
}
