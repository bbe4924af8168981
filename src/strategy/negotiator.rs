use crate::job::RecoverConfig;

use super::kind::{RecoverResult, Strategy};

/// Picks the next strategy from the three capability sources.
///
/// - `config`: strategies configured on the job (and whether platform mode is on);
/// - `agent`: capabilities reported by the agent for this cycle;
/// - `platform`: strategies allowed by the platform (only consulted in platform mode).
///
/// `Retry` is not subject to the agent's report: it only re-runs a step.
#[derive(Debug, Clone, Copy)]
pub struct Negotiator<'a> {
    pub config: &'a RecoverConfig,
    pub agent: &'a [Strategy],
    pub platform: &'a [Strategy],
}

impl<'a> Negotiator<'a> {
    pub fn new(config: &'a RecoverConfig, agent: &'a [Strategy], platform: &'a [Strategy]) -> Self {
        Self {
            config,
            agent,
            platform,
        }
    }

    fn platform_allows(&self, s: Strategy) -> bool {
        !self.config.platform_mode || self.platform.contains(&s)
    }

    pub fn support_retry(&self) -> bool {
        self.config.allows(Strategy::Retry) && self.platform_allows(Strategy::Retry)
    }

    pub fn support_recover(&self) -> bool {
        self.supported_everywhere(Strategy::Recover)
    }

    pub fn support_dump(&self) -> bool {
        self.supported_everywhere(Strategy::Dump)
    }

    fn supported_everywhere(&self, s: Strategy) -> bool {
        self.config.allows(s) && self.agent.contains(&s) && self.platform_allows(s)
    }

    /// First strategy of a cycle. Retry is only chosen when no fault needs rescheduling.
    pub fn first_choose(&self, has_normal_fault: bool) -> Strategy {
        if !has_normal_fault && self.support_retry() {
            Strategy::Retry
        } else {
            self.choose_for_retry_fail()
        }
    }

    pub fn choose_for_retry_fail(&self) -> Strategy {
        if self.support_recover() {
            Strategy::Recover
        } else {
            self.choose_for_recover_fail()
        }
    }

    pub fn choose_for_recover_fail(&self) -> Strategy {
        if self.support_dump() {
            Strategy::Dump
        } else {
            Strategy::Exit
        }
    }

    /// Next strategy given the outcomes recorded so far in this cycle.
    ///
    /// A failed level is never chosen again; anything after a Dump or an Exit is Exit.
    pub fn choose(&self, history: &[RecoverResult], has_normal_fault: bool) -> Strategy {
        match history.last().map(|r| r.strategy) {
            None => self.first_choose(has_normal_fault),
            Some(Strategy::Retry) => self.choose_for_retry_fail(),
            Some(Strategy::Recover) => self.choose_for_recover_fail(),
            Some(Strategy::Dump | Strategy::Exit) => Strategy::Exit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::RespCode;

    fn config(strategies: &[Strategy], platform_mode: bool) -> RecoverConfig {
        RecoverConfig {
            process_recover_enable: true,
            platform_mode,
            grace_exit: false,
            strategies: strategies.to_vec(),
        }
    }

    const ALL: [Strategy; 4] = Strategy::ALL;

    #[test]
    fn test_retry_excluded_by_normal_fault() {
        let cfg = config(&[Strategy::Retry, Strategy::Dump], false);
        let n = Negotiator::new(&cfg, &ALL, &[]);
        assert_eq!(n.first_choose(false), Strategy::Retry);
        assert_eq!(n.first_choose(true), Strategy::Dump);
    }

    #[test]
    fn test_agent_must_report_recover_and_dump() {
        let cfg = config(&ALL, false);
        let n = Negotiator::new(&cfg, &[Strategy::Dump], &[]);
        assert!(n.support_retry());
        assert!(!n.support_recover());
        assert!(n.support_dump());
        assert_eq!(n.first_choose(true), Strategy::Dump);

        let none = Negotiator::new(&cfg, &[], &[]);
        assert_eq!(none.first_choose(true), Strategy::Exit);
    }

    #[test]
    fn test_platform_mode_filters() {
        let cfg = config(&ALL, true);
        let n = Negotiator::new(&cfg, &ALL, &[Strategy::Recover]);
        assert!(!n.support_retry());
        assert!(n.support_recover());
        assert!(!n.support_dump());
        assert_eq!(n.first_choose(false), Strategy::Recover);
        assert_eq!(n.choose_for_recover_fail(), Strategy::Exit);
    }

    #[test]
    fn test_steps_down_one_level_per_failure() {
        let cfg = config(&ALL, false);
        let n = Negotiator::new(&cfg, &ALL, &[]);
        let fail = |s| RecoverResult::new(s, RespCode::WaitReportTimeout);

        assert_eq!(n.choose(&[], false), Strategy::Retry);
        assert_eq!(n.choose(&[fail(Strategy::Retry)], false), Strategy::Recover);
        assert_eq!(
            n.choose(&[fail(Strategy::Retry), fail(Strategy::Recover)], false),
            Strategy::Dump
        );
        assert_eq!(n.choose(&[fail(Strategy::Dump)], false), Strategy::Exit);
        assert_eq!(n.choose(&[fail(Strategy::Exit)], false), Strategy::Exit);
    }

    #[test]
    fn test_choice_is_always_a_known_strategy() {
        let cfg = config(&[], true);
        let n = Negotiator::new(&cfg, &[], &[]);
        for s in ALL {
            let h = [RecoverResult::new(s, RespCode::Ok)];
            assert!(ALL.contains(&n.choose(&h, true)));
        }
        assert_eq!(n.choose(&[], false), Strategy::Exit);
    }
}
