//! Replication policy: choosing which storage drivers back a datastore.
//!
//! Drivers advertise capability classes; a replication strategy demands a
//! replica count per concern. Selection walks the stable driver enumeration
//! and picks the smallest prefix-greedy set that satisfies every concern.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{DatastoreError, Result};

/// Capability classes a storage driver can declare
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    ReadPublic,
    WritePublic,
    ReadPrivate,
    WritePrivate,
    ReadLocal,
    WriteLocal,
}

impl StorageClass {
    /// Declaration order; drives the stable driver enumeration
    pub const ALL: [StorageClass; 6] = [
        StorageClass::ReadPublic,
        StorageClass::WritePublic,
        StorageClass::ReadPrivate,
        StorageClass::WritePrivate,
        StorageClass::ReadLocal,
        StorageClass::WriteLocal,
    ];
}

/// Replication concerns a strategy can demand counts for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concern {
    Local,
    Publish,
    Public,
    Private,
}

impl Concern {
    pub const ALL: [Concern; 4] = [
        Concern::Local,
        Concern::Publish,
        Concern::Public,
        Concern::Private,
    ];

    /// The fixed class pair a concern binds to
    pub fn classes(&self) -> &'static [StorageClass] {
        match self {
            Concern::Local => &[StorageClass::ReadLocal, StorageClass::WriteLocal],
            Concern::Publish => &[StorageClass::ReadPublic, StorageClass::WritePrivate],
            Concern::Public => &[StorageClass::ReadPublic, StorageClass::WritePublic],
            Concern::Private => &[StorageClass::ReadPrivate, StorageClass::WritePrivate],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Concern::Local => "local",
            Concern::Publish => "publish",
            Concern::Public => "public",
            Concern::Private => "private",
        }
    }
}

/// Required replica count per concern. Absent concerns demand nothing.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ReplicationStrategy {
    #[serde(default)]
    pub local: u32,

    #[serde(default)]
    pub publish: u32,

    #[serde(default)]
    pub public: u32,

    #[serde(default)]
    pub private: u32,

    /// Explicit driver override; when set, selection is skipped entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drivers: Option<Vec<String>>,
}

impl ReplicationStrategy {
    pub fn required(&self, concern: Concern) -> u32 {
        match concern {
            Concern::Local => self.local,
            Concern::Publish => self.publish,
            Concern::Public => self.public,
            Concern::Private => self.private,
        }
    }
}

/// Driver capability classification: class -> driver names, as advertised
/// by the gateway session
pub type DriverClassification = BTreeMap<StorageClass, Vec<String>>;

fn driver_matches(
    driver: &str,
    concern: Concern,
    classification: &DriverClassification,
) -> bool {
    concern.classes().iter().any(|class| {
        classification
            .get(class)
            .map(|drivers| drivers.iter().any(|d| d == driver))
            .unwrap_or(false)
    })
}

/// The stable enumeration: classes in declaration order, drivers in listed
/// order, first occurrence wins.
fn enumerate_drivers(classification: &DriverClassification) -> Vec<String> {
    let mut enumeration = Vec::new();
    for class in StorageClass::ALL {
        if let Some(drivers) = classification.get(&class) {
            for driver in drivers {
                if !enumeration.contains(driver) {
                    enumeration.push(driver.clone());
                }
            }
        }
    }
    enumeration
}

/// Select the smallest greedy list of drivers that meets every concern's
/// replica count.
///
/// A driver is picked at most once but counts toward every still-unsatisfied
/// concern it matches. Concerns left unsatisfied after the full enumeration
/// fail with `UnsatisfiableReplicationStrategy`.
pub fn select_drivers(
    strategy: &ReplicationStrategy,
    classification: &DriverClassification,
) -> Result<Vec<String>> {
    let mut fulfilled = [0u32; Concern::ALL.len()];
    let mut selected = Vec::new();

    let satisfied = |fulfilled: &[u32]| {
        Concern::ALL
            .iter()
            .enumerate()
            .all(|(i, c)| fulfilled[i] >= strategy.required(*c))
    };

    for driver in enumerate_drivers(classification) {
        if satisfied(&fulfilled) {
            break;
        }
        let mut picked = false;
        for (i, concern) in Concern::ALL.iter().enumerate() {
            if fulfilled[i] < strategy.required(*concern)
                && driver_matches(&driver, *concern, classification)
            {
                fulfilled[i] += 1;
                picked = true;
            }
        }
        if picked {
            selected.push(driver);
        }
    }

    if !satisfied(&fulfilled) {
        let missing: Vec<&str> = Concern::ALL
            .iter()
            .enumerate()
            .filter(|(i, c)| fulfilled[*i] < strategy.required(**c))
            .map(|(_, c)| c.as_str())
            .collect();
        return Err(DatastoreError::UnsatisfiableReplicationStrategy(format!(
            "No driver assignment covers: {}",
            missing.join(", ")
        )));
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(pairs: &[(StorageClass, &[&str])]) -> DriverClassification {
        pairs
            .iter()
            .map(|(class, drivers)| {
                (*class, drivers.iter().map(|d| d.to_string()).collect())
            })
            .collect()
    }

    #[test]
    fn test_class_wire_names() {
        assert_eq!(
            serde_json::to_string(&StorageClass::ReadPublic).unwrap(),
            r#""read_public""#
        );
        let classification: DriverClassification =
            serde_json::from_str(r#"{"read_local":["disk"],"write_local":["disk"]}"#).unwrap();
        assert_eq!(
            classification.get(&StorageClass::ReadLocal),
            Some(&vec!["disk".to_string()])
        );
    }

    #[test]
    fn test_local_plus_public_selects_both() {
        let classification = classify(&[
            (StorageClass::ReadLocal, &["disk"]),
            (StorageClass::WriteLocal, &["disk"]),
            (StorageClass::ReadPublic, &["cloud"]),
            (StorageClass::WritePublic, &["cloud"]),
        ]);
        let strategy = ReplicationStrategy {
            local: 1,
            public: 1,
            ..Default::default()
        };
        let mut selected = select_drivers(&strategy, &classification).unwrap();
        selected.sort();
        assert_eq!(selected, vec!["cloud".to_string(), "disk".to_string()]);
    }

    #[test]
    fn test_no_duplicate_driver_in_selection() {
        // One driver covers both concerns
        let classification = classify(&[
            (StorageClass::ReadPublic, &["omni"]),
            (StorageClass::WritePublic, &["omni"]),
            (StorageClass::ReadLocal, &["omni"]),
            (StorageClass::WriteLocal, &["omni"]),
        ]);
        let strategy = ReplicationStrategy {
            local: 1,
            public: 1,
            ..Default::default()
        };
        assert_eq!(
            select_drivers(&strategy, &classification).unwrap(),
            vec!["omni".to_string()]
        );
    }

    #[test]
    fn test_replica_counts_respected() {
        let classification = classify(&[
            (StorageClass::ReadPublic, &["a", "b", "c"]),
            (StorageClass::WritePublic, &["a", "b", "c"]),
        ]);
        let strategy = ReplicationStrategy {
            public: 2,
            ..Default::default()
        };
        let selected = select_drivers(&strategy, &classification).unwrap();
        assert_eq!(selected, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_publish_spans_class_pair() {
        // publish = read_public OR write_private
        let classification = classify(&[(StorageClass::WritePrivate, &["vaulted"])]);
        let strategy = ReplicationStrategy {
            publish: 1,
            ..Default::default()
        };
        assert_eq!(
            select_drivers(&strategy, &classification).unwrap(),
            vec!["vaulted".to_string()]
        );
    }

    #[test]
    fn test_unsatisfiable_strategy_fails() {
        let classification = classify(&[
            (StorageClass::ReadLocal, &["disk"]),
            (StorageClass::WriteLocal, &["disk"]),
        ]);
        let strategy = ReplicationStrategy {
            private: 1,
            ..Default::default()
        };
        let err = select_drivers(&strategy, &classification).unwrap_err();
        assert!(matches!(
            err,
            DatastoreError::UnsatisfiableReplicationStrategy(_)
        ));
    }

    #[test]
    fn test_counts_beyond_supply_fail() {
        let classification = classify(&[
            (StorageClass::ReadPublic, &["only"]),
            (StorageClass::WritePublic, &["only"]),
        ]);
        let strategy = ReplicationStrategy {
            public: 2,
            ..Default::default()
        };
        assert!(select_drivers(&strategy, &classification).is_err());
    }

    #[test]
    fn test_empty_strategy_selects_nothing() {
        let classification = classify(&[(StorageClass::ReadPublic, &["cloud"])]);
        let strategy = ReplicationStrategy::default();
        assert!(select_drivers(&strategy, &classification)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_selection_is_sublist_of_enumeration() {
        let classification = classify(&[
            (StorageClass::ReadPublic, &["b", "a"]),
            (StorageClass::WritePublic, &["b", "a"]),
            (StorageClass::ReadLocal, &["z"]),
            (StorageClass::WriteLocal, &["z"]),
        ]);
        let strategy = ReplicationStrategy {
            public: 2,
            local: 1,
            ..Default::default()
        };
        // Enumeration order: read_public first, so b before a, then z
        assert_eq!(
            select_drivers(&strategy, &classification).unwrap(),
            vec!["b".to_string(), "a".to_string(), "z".to_string()]
        );
    }
}
