use macaddr::MacAddr6;

/// Parse a MAC address from a URL path segment, accepting colon- or
/// hyphen-separated and bare hex forms (spec §4.C.1 "canonicalizing
/// separators").
pub fn parse_mac(raw: &str) -> Option<MacAddr6> {
    let normalized = normalize_mac(raw).replace('-', ":");
    normalized.parse().ok()
}

/// Normalize MAC address to lowercase with hyphens (aa-bb-cc-dd-ee-ff)
pub fn normalize_mac(mac: &str) -> String {
    mac.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF"), "aa-bb-cc-dd-ee-ff");
        assert_eq!(normalize_mac("aa-bb-cc-dd-ee-ff"), "aa-bb-cc-dd-ee-ff");
        assert_eq!(normalize_mac("AABBCCDDEEFF"), "aa-bb-cc-dd-ee-ff");
        assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF"), "aa-bb-cc-dd-ee-ff");
    }

    #[test]
    fn test_parse_mac_accepts_any_separator() {
        let expected: MacAddr6 = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(parse_mac("AA:BB:CC:DD:EE:FF"), Some(expected));
        assert_eq!(parse_mac("aa-bb-cc-dd-ee-ff"), Some(expected));
        assert_eq!(parse_mac("not-a-mac"), None);
    }
}
