use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::code::RespCode;

/// Recovery action applied to a faulted job.
///
/// Variants are declared in priority order: `Retry` is preferred, `Exit` is
/// the fallback that is always applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Re-run the failed step in place (UCE faults only).
    Retry,
    /// Reschedule faulty pods and recover the processes in place.
    Recover,
    /// Save a checkpoint, then exit.
    Dump,
    /// Kill the job.
    Exit,
}

/// Name did not match any [`Strategy`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown strategy {0:?}")]
pub struct UnknownStrategy(pub String);

impl Strategy {
    /// All strategies, highest priority first.
    pub const ALL: [Strategy; 4] = [
        Strategy::Retry,
        Strategy::Recover,
        Strategy::Dump,
        Strategy::Exit,
    ];

    /// Position in the priority order (`0` = highest).
    #[inline]
    pub const fn priority(self) -> u8 {
        match self {
            Strategy::Retry => 0,
            Strategy::Recover => 1,
            Strategy::Dump => 2,
            Strategy::Exit => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Strategy::Retry => "retry",
            Strategy::Recover => "recover",
            Strategy::Dump => "dump",
            Strategy::Exit => "exit",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Strategy::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownStrategy(name.to_string()))
    }
}

/// Outcome of one applied strategy, as reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverResult {
    pub strategy: Strategy,
    pub code: RespCode,
}

impl RecoverResult {
    pub fn new(strategy: Strategy, code: RespCode) -> Self {
        Self { strategy, code }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        self.code.is_ok()
    }
}

/// Sorts strategy names by priority. Unknown names go last, keeping their relative order.
///
/// # Example
/// ```
/// use faultvisor::sort_strategy_names;
///
/// let mut names = vec!["unknown", "exit", "retry", "dump", "recover"];
/// sort_strategy_names(&mut names);
/// assert_eq!(names, ["retry", "recover", "dump", "exit", "unknown"]);
/// ```
pub fn sort_strategy_names<S: AsRef<str>>(names: &mut [S]) {
    names.sort_by_key(|n| {
        n.as_ref()
            .parse::<Strategy>()
            .map_or(u8::MAX, Strategy::priority)
    });
}

/// Parses a comma-separated list into deduplicated strategies in priority order.
///
/// Unknown names are dropped with a warning.
pub fn parse_strategy_list(raw: &str) -> Vec<Strategy> {
    let mut out: Vec<Strategy> = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| match s.parse::<Strategy>() {
            Ok(st) => Some(st),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring strategy");
                None
            }
        })
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Same as [`parse_strategy_list`] for names that arrive already split.
pub fn parse_strategy_names<S: AsRef<str>>(names: &[S]) -> Vec<Strategy> {
    let joined = names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",");
    parse_strategy_list(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_permutation_sorts_the_same() {
        let base = ["retry", "recover", "dump", "exit", "unknown"];
        let mut idx = [0usize, 1, 2, 3, 4];
        // Heap's algorithm over all 120 orderings.
        let mut c = [0usize; 5];
        let check = |order: &[usize; 5]| {
            let mut names: Vec<&str> = order.iter().map(|&i| base[i]).collect();
            sort_strategy_names(&mut names);
            assert_eq!(names, base);
        };
        check(&idx);
        let mut i = 0;
        while i < 5 {
            if c[i] < i {
                if i % 2 == 0 {
                    idx.swap(0, i);
                } else {
                    idx.swap(c[i], i);
                }
                check(&idx);
                c[i] += 1;
                i = 0;
            } else {
                c[i] = 0;
                i += 1;
            }
        }
    }

    #[test]
    fn test_unknown_names_keep_relative_order() {
        let mut names = vec!["zeta", "dump", "alpha", "retry"];
        sort_strategy_names(&mut names);
        assert_eq!(names, ["retry", "dump", "zeta", "alpha"]);
    }

    #[test]
    fn test_parse_roundtrip_and_case() {
        for s in Strategy::ALL {
            assert_eq!(s.to_string().parse::<Strategy>(), Ok(s));
        }
        assert_eq!(" Dump ".parse::<Strategy>(), Ok(Strategy::Dump));
        assert!("reboot".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_parse_list_dedups_in_priority_order() {
        assert_eq!(
            parse_strategy_list("exit,dump,,retry,dump,nope"),
            vec![Strategy::Retry, Strategy::Dump, Strategy::Exit]
        );
        assert_eq!(
            parse_strategy_names(&["recover", "retry"]),
            vec![Strategy::Retry, Strategy::Recover]
        );
    }
}
