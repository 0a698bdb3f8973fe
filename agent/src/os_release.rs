//! Minimal `/etc/os-release` reader, grounding the `os_data` dict plugins
//! and the driver-selection ladder key off.

use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Debian,
    RedHat,
    ArchLinux,
    Alpine,
    NixOs,
    Qubes,
    Other,
}

#[derive(Debug, Clone, Default)]
pub struct OsData {
    pub id: String,
    pub id_like: Vec<String>,
    pub version_codename: String,
    pub version_id: String,
}

impl OsData {
    pub fn read() -> std::io::Result<Self> {
        Self::parse_file(Path::new("/etc/os-release"))
    }

    pub fn parse_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let map = parse_kv(content);
        let id = map.get("ID").cloned().unwrap_or_default();
        let id_like = map
            .get("ID_LIKE")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        let version_codename = map.get("VERSION_CODENAME").cloned().unwrap_or_default();
        let version_id = map.get("VERSION_ID").cloned().unwrap_or_default();
        Self {
            id,
            id_like,
            version_codename,
            version_id,
        }
    }

    pub fn family(&self) -> OsFamily {
        if self.id == "qubes" {
            return OsFamily::Qubes;
        }
        let ids: Vec<&str> = std::iter::once(self.id.as_str())
            .chain(self.id_like.iter().map(String::as_str))
            .collect();
        if ids.iter().any(|i| matches!(*i, "debian" | "ubuntu")) {
            OsFamily::Debian
        } else if ids
            .iter()
            .any(|i| matches!(*i, "fedora" | "rhel" | "centos"))
        {
            OsFamily::RedHat
        } else if ids.contains(&"arch") {
            OsFamily::ArchLinux
        } else if ids.contains(&"alpine") {
            OsFamily::Alpine
        } else if ids.contains(&"nixos") {
            OsFamily::NixOs
        } else {
            OsFamily::Other
        }
    }
}

fn parse_kv(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim_matches('"').to_string();
            map.insert(key.to_string(), value);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_debian() {
        let data = OsData::parse("ID=debian\nVERSION_CODENAME=bookworm\nVERSION_ID=\"12\"\n");
        assert_eq!(data.family(), OsFamily::Debian);
        assert_eq!(data.version_codename, "bookworm");
    }

    #[test]
    fn parses_fedora_via_id_like() {
        let data = OsData::parse("ID=fedora\nVERSION_ID=41\n");
        assert_eq!(data.family(), OsFamily::RedHat);
    }

    #[test]
    fn parses_arch() {
        let data = OsData::parse("ID=arch\n");
        assert_eq!(data.family(), OsFamily::ArchLinux);
    }

    #[test]
    fn qubes_id_wins_over_id_like() {
        let data = OsData::parse("ID=qubes\nID_LIKE=fedora\n");
        assert_eq!(data.family(), OsFamily::Qubes);
    }
}
