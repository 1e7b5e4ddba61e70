//! Protocol version negotiation (spec §6; supplemented per SPEC_FULL.md).

use mcp_core::constants::SUPPORTED_VERSIONS;

/// Return the highest mutually supported version, or the client's own
/// value if we happen to already recognize it verbatim. Falls back to the
/// oldest version we support if there is no overlap, mirroring the
/// teacher's "accept the client's value if known" rule (spec §6).
pub fn negotiate_version(client_version: &str) -> String {
    if SUPPORTED_VERSIONS.contains(&client_version) {
        return client_version.to_owned();
    }
    SUPPORTED_VERSIONS
        .first()
        .copied()
        .unwrap_or(client_version)
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_version_echoed() {
        assert_eq!(negotiate_version("2024-11-05"), "2024-11-05");
    }

    #[test]
    fn unknown_version_falls_back_to_latest_supported() {
        assert_eq!(negotiate_version("1999-01-01"), SUPPORTED_VERSIONS[0]);
    }
}
