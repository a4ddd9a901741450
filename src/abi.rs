use std::collections::BTreeMap;

/// Android ABI names and the native toolchain triple each one builds with.
#[derive(Debug, Clone)]
pub struct AbiMapping {
    abi_to_triple: BTreeMap<String, String>,
}

impl AbiMapping {
    pub fn new() -> Self {
        let mut mapping = BTreeMap::new();

        // 64-bit
        mapping.insert("arm64-v8a".to_string(), "aarch64-linux-android".to_string());
        mapping.insert("x86_64".to_string(), "x86_64-linux-android".to_string());

        // 32-bit
        mapping.insert("armeabi-v7a".to_string(), "armv7a-linux-androideabi".to_string());
        mapping.insert("x86".to_string(), "i686-linux-android".to_string());

        Self {
            abi_to_triple: mapping,
        }
    }

    pub fn toolchain_triple(&self, abi: &str) -> Option<&str> {
        self.abi_to_triple.get(abi).map(|s| s.as_str())
    }

    pub fn is_known(&self, abi: &str) -> bool {
        self.abi_to_triple.contains_key(abi)
    }

    pub fn supported_abis(&self) -> Vec<&str> {
        self.abi_to_triple.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for AbiMapping {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_mappings() {
        let mapping = AbiMapping::new();

        assert_eq!(
            mapping.toolchain_triple("arm64-v8a"),
            Some("aarch64-linux-android")
        );

        assert_eq!(
            mapping.toolchain_triple("x86_64"),
            Some("x86_64-linux-android")
        );

        assert_eq!(
            mapping.toolchain_triple("armeabi-v7a"),
            Some("armv7a-linux-androideabi")
        );
    }

    #[test]
    fn test_unknown_abi() {
        let mapping = AbiMapping::new();
        assert_eq!(mapping.toolchain_triple("mips"), None);
        assert!(!mapping.is_known("mips"));
        assert!(mapping.is_known("x86"));
    }

    #[test]
    fn test_supported_abis_sorted() {
        let mapping = AbiMapping::new();
        assert_eq!(
            mapping.supported_abis(),
            vec!["arm64-v8a", "armeabi-v7a", "x86", "x86_64"]
        );
    }
}
