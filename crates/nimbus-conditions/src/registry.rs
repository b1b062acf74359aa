//! Named conditions and operations.

use std::collections::BTreeMap;

use nimbus_nws::CANONICAL_PHRASES;

use crate::error::ConditionError;
use crate::evaluator::Comparison;

/// Lookup table from name to a tagged value plus its help text.
///
/// Names are unique; iteration is in name order.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: BTreeMap<String, Registered<T>>,
}

#[derive(Debug, Clone)]
struct Registered<T> {
    value: T,
    help: String,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `value` under `name`, failing if the name is taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        value: T,
        help: impl Into<String>,
    ) -> Result<(), ConditionError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(ConditionError::DuplicateName(name));
        }
        self.entries.insert(
            name,
            Registered {
                value,
                help: help.into(),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name).map(|e| &e.value)
    }

    pub fn help(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|e| e.help.as_str())
    }

    /// `(name, value, help)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T, &str)> {
        self.entries
            .iter()
            .map(|(name, e)| (name.as_str(), &e.value, e.help.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a named condition does when evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    /// Compare against the single phrase supplied by the caller.
    Compare(Comparison),
    /// Compare against a fixed phrase; caller arguments are ignored.
    Preset {
        comparison: Comparison,
        phrase: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Write the full classified forecast as indented JSON.
    Forecast,
}

/// The standard cloud cover conditions.
pub fn conditions() -> Result<Registry<ConditionKind>, ConditionError> {
    let phrases = CANONICAL_PHRASES.join(", ");
    let mut registry = Registry::new();

    registry.register(
        "cloud-cover",
        ConditionKind::Compare(Comparison::Equal),
        format!("returns true if the cloud coverage is exactly one of {}", phrases),
    )?;
    registry.register(
        "max-cloud-cover",
        ConditionKind::Compare(Comparison::AtMost),
        format!("returns true if the cloud coverage is at most one of {}", phrases),
    )?;
    registry.register(
        "min-cloud-cover",
        ConditionKind::Compare(Comparison::AtLeast),
        format!("returns true if the cloud coverage is at least one of {}", phrases),
    )?;
    registry.register(
        "mostly-sunny",
        ConditionKind::Preset {
            comparison: Comparison::AtMost,
            phrase: "Mostly Sunny",
        },
        "returns true if the cloud coverage is at most mostly sunny",
    )?;

    let partly = ConditionKind::Preset {
        comparison: Comparison::Equal,
        phrase: "Partly Sunny",
    };
    let partly_help = "returns true if the cloud coverage is exactly partly sunny/cloudy";
    registry.register("partly-cloudy", partly, partly_help)?;
    registry.register("partly-sunny", partly, partly_help)?;

    registry.register(
        "mostly-cloudy",
        ConditionKind::Preset {
            comparison: Comparison::AtLeast,
            phrase: "Mostly Cloudy",
        },
        "returns true if the cloud coverage is at least mostly cloudy",
    )?;

    Ok(registry)
}

/// The standard service operations.
pub fn operations() -> Result<Registry<OperationKind>, ConditionError> {
    let mut registry = Registry::new();
    registry.register(
        "forecast",
        OperationKind::Forecast,
        "get the weather forecast for the configured location",
    )?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = Registry::new();
        registry.register("a", 1, "first").unwrap();
        let err = registry.register("a", 2, "second").unwrap_err();
        assert!(matches!(err, ConditionError::DuplicateName(ref n) if n == "a"));
        assert_eq!(registry.get("a"), Some(&1));
        assert_eq!(registry.help("a"), Some("first"));
    }

    #[test]
    fn test_standard_conditions() {
        let registry = conditions().unwrap();
        let names: Vec<_> = registry.names().collect();
        assert_eq!(
            names,
            vec![
                "cloud-cover",
                "max-cloud-cover",
                "min-cloud-cover",
                "mostly-cloudy",
                "mostly-sunny",
                "partly-cloudy",
                "partly-sunny",
            ]
        );
        assert_eq!(registry.get("partly-cloudy"), registry.get("partly-sunny"));
        assert!(registry.get("sunny").is_none());
        assert!(registry
            .help("max-cloud-cover")
            .unwrap()
            .contains("Mostly Cloudy"));
    }

    #[test]
    fn test_standard_operations() {
        let registry = operations().unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("forecast"), Some(&OperationKind::Forecast));
    }

    #[test]
    fn test_iter_in_name_order() {
        let mut registry = Registry::new();
        registry.register("b", (), "B").unwrap();
        registry.register("a", (), "A").unwrap();
        let helps: Vec<_> = registry.iter().map(|(_, _, h)| h).collect();
        assert_eq!(helps, vec!["A", "B"]);
        assert!(!registry.is_empty());
    }
}
