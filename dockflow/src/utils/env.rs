//! Environment variable mappings.

use std::collections::BTreeMap;

/// Mapping from variable name to value.
///
/// Ordered so that generated command lines and reports are deterministic.
pub type EnvMap = BTreeMap<String, String>;

/// Combines a default mapping with a stage-specific one.
///
/// Every key of `defaults` is kept unless `overrides` redefines it; keys only
/// present in `overrides` are added as-is. Neither input is modified. Build
/// and run variables are merged independently and never mixed.
#[must_use]
pub fn merge_env(defaults: &EnvMap, overrides: &EnvMap) -> EnvMap {
    let mut merged = defaults.clone();
    merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn env(pairs: &[(&str, &str)]) -> EnvMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_override_wins() {
        let defaults = env(&[("MONTH", "01"), ("YEAR", "2020")]);
        let overrides = env(&[("MONTH", "04"), ("OUTPUT_FOLDER", "/output")]);

        let merged = merge_env(&defaults, &overrides);

        assert_eq!(
            merged,
            env(&[("MONTH", "04"), ("OUTPUT_FOLDER", "/output"), ("YEAR", "2020")])
        );
    }

    #[test]
    fn test_empty_sides() {
        let d = env(&[("A", "1"), ("B", "2")]);
        let o = env(&[("C", "3")]);

        assert_eq!(merge_env(&d, &EnvMap::new()), d);
        assert_eq!(merge_env(&EnvMap::new(), &o), o);
        assert!(merge_env(&EnvMap::new(), &EnvMap::new()).is_empty());
    }

    #[test]
    fn test_key_set_is_union() {
        let d = env(&[("A", "1"), ("B", "2"), ("C", "3")]);
        let o = env(&[("B", "x"), ("D", "y")]);

        let merged = merge_env(&d, &o);

        for key in o.keys() {
            assert_eq!(merged.get(key), o.get(key));
        }
        for key in d.keys().filter(|k| !o.contains_key(*k)) {
            assert_eq!(merged.get(key), d.get(key));
        }
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_inputs_untouched() {
        let d = env(&[("A", "1")]);
        let o = env(&[("A", "2")]);
        let _ = merge_env(&d, &o);
        assert_eq!(d["A"], "1");
        assert_eq!(o["A"], "2");
    }
}
