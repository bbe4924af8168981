//! # Job identity and per-job recovery settings.
//!
//! [`JobBaseInfo`] identifies a managed job and is immutable for the life of
//! its controller. [`RecoverConfig`] is parsed once from the job's labels when
//! the controller is created.
//!
//! The durable reset-info record lives in [`reset_info`].

mod reset_info;

pub use reset_info::{RankEntry, RankStatus, ResetInfo, ResetOperation, StoredResetInfo};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::store;
use crate::strategy::{self, Strategy};

const SWITCH_ON: &str = "on";
const PLATFORM_MODE: &str = "platform";

/// Recovery settings read from the job's labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverConfig {
    /// Process-level recovery is enabled for the job.
    pub process_recover_enable: bool,
    /// An external platform also votes on strategies and confirms UCE faults.
    pub platform_mode: bool,
    /// Try a checkpoint dump before exiting.
    pub grace_exit: bool,
    /// Configured strategies, deduplicated and in priority order.
    pub strategies: Vec<Strategy>,
}

impl RecoverConfig {
    /// Parses the recovery settings from job labels.
    ///
    /// Unknown strategy names are ignored with a warning.
    ///
    /// # Example
    /// ```
    /// use std::collections::HashMap;
    /// use faultvisor::{RecoverConfig, Strategy};
    ///
    /// let labels = HashMap::from([
    ///     ("process-recover-enable".to_string(), "on".to_string()),
    ///     ("recover-strategy".to_string(), "dump,retry,bogus,retry".to_string()),
    /// ]);
    /// let cfg = RecoverConfig::from_labels(&labels);
    /// assert!(cfg.process_recover_enable);
    /// assert_eq!(cfg.strategies, vec![Strategy::Retry, Strategy::Dump]);
    /// ```
    pub fn from_labels(labels: &HashMap<String, String>) -> Self {
        let is = |key: &str, want: &str| labels.get(key).is_some_and(|v| v.trim() == want);

        let strategies = labels
            .get(store::RECOVER_STRATEGY)
            .map(|raw| strategy::parse_strategy_list(raw))
            .unwrap_or_default();

        Self {
            process_recover_enable: is(store::PROCESS_RECOVER_ENABLE, SWITCH_ON),
            platform_mode: is(store::PROCESS_RECOVER_MODE, PLATFORM_MODE),
            grace_exit: is(store::GRACEFUL_EXIT, SWITCH_ON),
            strategies,
        }
    }

    /// Whether `s` is configured for the job.
    #[inline]
    pub fn allows(&self, s: Strategy) -> bool {
        self.strategies.contains(&s)
    }
}

/// Identity of a managed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobBaseInfo {
    pub job_id: String,
    pub job_name: String,
    pub pg_name: String,
    pub namespace: String,
    pub recover_config: RecoverConfig,
}

impl JobBaseInfo {
    pub fn new(
        job_id: impl Into<String>,
        job_name: impl Into<String>,
        pg_name: impl Into<String>,
        namespace: impl Into<String>,
        recover_config: RecoverConfig,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            job_name: job_name.into(),
            pg_name: pg_name.into(),
            namespace: namespace.into(),
            recover_config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_labels_missing() {
        let cfg = RecoverConfig::from_labels(&HashMap::new());
        assert_eq!(cfg, RecoverConfig::default());
    }

    #[test]
    fn test_switches_parsed() {
        let cfg = RecoverConfig::from_labels(&labels(&[
            ("process-recover-enable", "on"),
            ("process-recover-mode", "platform"),
            ("graceful-exit", "on"),
            ("recover-strategy", "exit, recover ,dump"),
        ]));
        assert!(cfg.process_recover_enable);
        assert!(cfg.platform_mode);
        assert!(cfg.grace_exit);
        assert_eq!(
            cfg.strategies,
            vec![Strategy::Recover, Strategy::Dump, Strategy::Exit]
        );
        assert!(cfg.allows(Strategy::Dump));
        assert!(!cfg.allows(Strategy::Retry));
    }

    #[test]
    fn test_other_values_are_off() {
        let cfg = RecoverConfig::from_labels(&labels(&[
            ("process-recover-enable", "off"),
            ("process-recover-mode", "local"),
        ]));
        assert!(!cfg.process_recover_enable);
        assert!(!cfg.platform_mode);
    }
}
