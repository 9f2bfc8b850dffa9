//! FaultInjector - Probabilistic Fault Injection
//!
//! TigerStyle: the substrate's failure paths (read-only fallback, stage
//! termination on planner loss) are reachable only through injected faults,
//! so every fault type is explicit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::rng::DeterministicRng;
use crate::constants::SIM_FAULT_PROBABILITY_MAX;

/// Types of faults that can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultType {
    /// Record content or snapshot write fails
    StoreWriteFail,
    /// Record content read fails
    StoreReadFail,
    /// Record delete fails
    StoreDeleteFail,
    /// Graph node write fails
    GraphWriteFail,
    /// Journal append fails
    JournalWriteFail,
    /// Planner call times out
    PlannerTimeout,
    /// Planner returns malformed output
    PlannerProtocolFail,
    /// Planner temporarily unavailable
    PlannerUnavailable,
}

impl FaultType {
    /// Get the fault type name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StoreWriteFail => "store_write_fail",
            Self::StoreReadFail => "store_read_fail",
            Self::StoreDeleteFail => "store_delete_fail",
            Self::GraphWriteFail => "graph_write_fail",
            Self::JournalWriteFail => "journal_write_fail",
            Self::PlannerTimeout => "planner_timeout",
            Self::PlannerProtocolFail => "planner_protocol_fail",
            Self::PlannerUnavailable => "planner_unavailable",
        }
    }
}

/// Configuration for a specific fault.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    /// The type of fault
    pub fault_type: FaultType,
    /// Probability of injection (0.0 to 1.0)
    pub probability: f64,
    /// Optional operation filter (substring match)
    pub operation_filter: Option<String>,
    /// Maximum number of injections (None = unlimited)
    pub max_injections: Option<u64>,
}

impl FaultConfig {
    /// Create a new fault configuration.
    ///
    /// # Panics
    /// Panics if probability is not in [0, 1].
    #[must_use]
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        assert!(
            (0.0..=SIM_FAULT_PROBABILITY_MAX).contains(&probability),
            "probability must be in [0, {SIM_FAULT_PROBABILITY_MAX}], got {probability}"
        );

        Self {
            fault_type,
            probability,
            operation_filter: None,
            max_injections: None,
        }
    }

    /// Restrict the fault to operations whose name contains `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    /// Set maximum number of injections.
    ///
    /// # Panics
    /// Panics if `max` is zero.
    #[must_use]
    pub fn with_max_injections(mut self, max: u64) -> Self {
        assert!(max > 0, "max_injections must be positive");
        self.max_injections = Some(max);
        self
    }
}

#[derive(Debug, Default)]
struct FaultStats {
    injection_count: AtomicU64,
}

/// Fault injector for simulation testing.
///
/// Registration happens before sharing via `Arc`; `should_inject` uses
/// interior mutability so shared clones draw from the same deterministic
/// stream.
#[derive(Debug)]
pub struct FaultInjector {
    rng: Mutex<DeterministicRng>,
    configs: Vec<FaultConfig>,
    stats: HashMap<FaultType, FaultStats>,
    injection_counts: Mutex<HashMap<FaultType, u64>>,
}

impl FaultInjector {
    /// Create a new fault injector with the given RNG.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            configs: Vec::new(),
            stats: HashMap::new(),
            injection_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Register a fault configuration.
    pub fn register(&mut self, config: FaultConfig) {
        self.stats.entry(config.fault_type).or_default();
        self.injection_counts
            .lock()
            .unwrap()
            .entry(config.fault_type)
            .or_insert(0);
        self.configs.push(config);
    }

    /// Check whether a fault should be injected for the given operation.
    pub fn should_inject(&self, operation: &str) -> Option<FaultType> {
        for config in &self.configs {
            if let Some(ref filter) = config.operation_filter {
                if !operation.contains(filter.as_str()) {
                    continue;
                }
            }

            if let Some(max) = config.max_injections {
                let counts = self.injection_counts.lock().unwrap();
                if counts.get(&config.fault_type).copied().unwrap_or(0) >= max {
                    continue;
                }
            }

            let roll = {
                let mut rng = self.rng.lock().unwrap();
                rng.next_bool(config.probability)
            };

            if roll {
                if let Some(stats) = self.stats.get(&config.fault_type) {
                    stats.injection_count.fetch_add(1, Ordering::Relaxed);
                }
                if let Some(count) = self
                    .injection_counts
                    .lock()
                    .unwrap()
                    .get_mut(&config.fault_type)
                {
                    *count += 1;
                }
                return Some(config.fault_type);
            }
        }

        None
    }

    /// Get injection counts by fault name.
    #[must_use]
    pub fn injection_stats(&self) -> HashMap<String, u64> {
        self.stats
            .iter()
            .map(|(fault_type, stats)| {
                (
                    fault_type.as_str().to_string(),
                    stats.injection_count.load(Ordering::Relaxed),
                )
            })
            .collect()
    }

    /// Get total number of injections.
    #[must_use]
    pub fn total_injections(&self) -> u64 {
        self.stats
            .values()
            .map(|s| s.injection_count.load(Ordering::Relaxed))
            .sum()
    }
}

/// Builder for `FaultInjector`.
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    configs: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    /// Create a new builder with the given RNG.
    #[must_use]
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            configs: Vec::new(),
        }
    }

    /// Add a fault configuration.
    #[must_use]
    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Add read and write faults for the record store.
    #[must_use]
    pub fn with_store_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::StoreWriteFail, probability))
            .with_fault(FaultConfig::new(FaultType::StoreReadFail, probability))
    }

    /// Add timeout and protocol faults for the planner.
    #[must_use]
    pub fn with_planner_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::PlannerTimeout, probability))
            .with_fault(FaultConfig::new(FaultType::PlannerProtocolFail, probability))
    }

    /// Build the `FaultInjector`.
    #[must_use]
    pub fn build(self) -> FaultInjector {
        let mut injector = FaultInjector::new(self.rng);
        for config in self.configs {
            injector.register(config);
        }
        injector
    }
}
