use std::collections::HashMap;

/// Sanitized tool name -> original function name, for one catalog compilation
///
/// Lookups are exact. Names absent from the map resolve to themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMap {
    entries: HashMap<String, String>,
}

impl NameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sanitized -> original`. The first mapping for a sanitized name
    /// wins; returns false when `sanitized` was already taken.
    pub fn insert(&mut self, sanitized: impl Into<String>, original: impl Into<String>) -> bool {
        let sanitized = sanitized.into();
        if self.entries.contains_key(&sanitized) {
            return false;
        }
        self.entries.insert(sanitized, original.into());
        true
    }

    /// Original name for `sanitized`, or `sanitized` itself when unmapped
    pub fn resolve<'a>(&'a self, sanitized: &'a str) -> &'a str {
        self.entries
            .get(sanitized)
            .map(String::as_str)
            .unwrap_or(sanitized)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>, O: Into<String>> FromIterator<(S, O)> for NameMap {
    fn from_iter<I: IntoIterator<Item = (S, O)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (sanitized, original) in iter {
            map.insert(sanitized, original);
        }
        map
    }
}

/// Provider-safe rewrite of a function name: dots become underscores
pub fn sanitize_name(name: &str) -> String {
    name.replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_mapped_name() {
        let map: NameMap = [("get_weather_city", "get.weather.city")].into_iter().collect();
        assert_eq!(map.resolve("get_weather_city"), "get.weather.city");
    }

    #[test]
    fn test_resolve_falls_back_to_identity() {
        let map = NameMap::new();
        assert_eq!(map.resolve("unknown_tool"), "unknown_tool");
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let map: NameMap = [("math_add", "math.add")].into_iter().collect();
        assert_eq!(map.resolve("Math_Add"), "Math_Add");
    }

    #[test]
    fn test_first_insert_wins() {
        let mut map = NameMap::new();
        assert!(map.insert("a_b", "a.b"));
        assert!(!map.insert("a_b", "a_b"));
        assert_eq!(map.resolve("a_b"), "a.b");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_sanitize_then_resolve_is_identity() {
        let names = ["math.factorial", "plain", "a.b.c.d", "under_score"];
        let map: NameMap = names.iter().map(|n| (sanitize_name(n), *n)).collect();
        for name in names {
            assert_eq!(map.resolve(&sanitize_name(name)), name);
        }
    }
}
