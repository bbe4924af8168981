use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! named_enum {
    ($(#[$meta:meta])* $vis:vis enum $name:ident { $($variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        $vis enum $name { $($variant),+ }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn as_str(self) -> &'static str {
                match self { $($name::$variant => stringify!($variant)),+ }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use named_enum;

named_enum! {
    /// Recovery protocol state. `Init` is the initial state; there is no terminal one.
    pub enum State {
        Init,
        NotifyWaitFaultFlushing,
        NotifyStopTrain,
        WaitReportStopComplete,
        WaitFaultFlushFinished,
        NotifyGlobalFault,
        WaitReportRecoverStrategy,
        NotifyDecidedStrategy,
        WaitReportStepRetryStatus,
        WaitReportProcessRecoverStatus,
        WaitReportDumpStatus,
        WaitProcessRestartResult,
        FaultClear,
        FaultRetry,
        CheckRecoverResult,
        ListenScheduleResult,
        NotifyRestartAllProcess,
        WaitRestartAllProcess,
        NotifyKillJob,
        KillPodForUnrecoverableRetry,
        NotifyDump,
        WaitContinueTrain,
        NotifySwitchNic,
        WaitSwitchNicFinished,
        NotifyPauseTrain,
        WaitReportPauseComplete,
        NotifyContinueTrain,
    }
}

impl Default for State {
    fn default() -> Self {
        State::Init
    }
}
