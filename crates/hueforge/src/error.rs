use hueforge_config::time::TilingError;
use hueforge_config::Code;

use crate::hub::HubError;
use crate::hub::ObjectKind;
use crate::sync::ConfigureReport;

/// A room configuration that cannot be compiled or linked.
///
/// Raised before any write to the bridge, so a failing `configure()` call
/// leaves the bridge untouched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("block '{name}' is defined in both '{first}' and '{second}'")]
    DuplicateBlock {
        name: String,
        first: String,
        second: String,
    },

    #[error("{block}: binding '{code}' is an alias of unknown binding '{target}'")]
    UnknownAlias {
        block: String,
        code: Code,
        target: Code,
    },

    #[error("{block}: alias cycle {}", .chain.join(" -> "))]
    AliasCycle { block: String, chain: Vec<String> },

    #[error("external code {code} is bound by both '{first}' and '{second}'")]
    DuplicateExternalCode {
        code: Code,
        first: String,
        second: String,
    },

    #[error("{block}: external code '{code}' is not an integer")]
    InvalidExternalCode { block: String, code: Code },

    #[error("{block}/{code}: redirect to unknown external binding '{target}'")]
    UnknownRedirectTarget {
        block: String,
        code: Code,
        target: String,
    },

    #[error("{block}/{code}: redirect target '{target}' is not an action")]
    NotRedirectable {
        block: String,
        code: Code,
        target: String,
    },

    #[error("{block}/{code}: redirect cycle {}", .chain.join(" -> "))]
    RedirectCycle {
        block: String,
        code: Code,
        chain: Vec<String>,
    },

    #[error("{block}/{code}: {action} action needs a group, but neither the action nor the block names one")]
    MissingGroup {
        block: String,
        code: Code,
        action: &'static str,
    },

    #[error("{block}/{code}: scene action names neither a value nor configs")]
    EmptyScene { block: String, code: Code },

    #[error("{block}/{code}: time table does not tile the day: {source}")]
    InvalidTimes {
        block: String,
        code: Code,
        #[source]
        source: TilingError,
    },

    #[error("{block}/{code}: time table selects config {index}, but only {len} configs exist")]
    TimeIndexOutOfRange {
        block: String,
        code: Code,
        index: usize,
        len: usize,
    },

    #[error("{block}/{code}: scene configs without a state need a time table")]
    StatelessCycleWithoutTimes { block: String, code: Code },

    #[error("{block}/{code}: config timeouts need a cycling scene with a state")]
    RevertWithoutState { block: String, code: Code },

    #[error("{block}: unknown state '{state}'")]
    UnknownState { block: String, state: String },

    #[error("state '{state}' must have 1 or 2 uses, not {uses}")]
    InvalidUses { state: String, uses: u8 },

    #[error("{block}/{code}: state '{state}' has no secondary use")]
    NoSecondarySlot {
        block: String,
        code: Code,
        state: String,
    },

    #[error("counter '{counter}' is cycled by both '{first}' and '{second}'")]
    SharedSlot {
        counter: String,
        first: String,
        second: String,
    },

    #[error("{block}: unknown motion sensor block '{sensor}'")]
    UnknownMotion { block: String, sensor: String },

    #[error("{block}: unknown contact block '{contact}'")]
    UnknownContact { block: String, contact: String },

    #[error("{block}: unknown button '{code}'")]
    UnknownButton { block: String, code: Code },

    #[error("{block}: motion sensors bind on, recover, dim and off, not '{code}'")]
    UnknownMotionEvent { block: String, code: Code },

    #[error("{block}: missing '{code}' binding")]
    MissingBinding { block: String, code: &'static str },

    #[error("rule '{rule}' has {conditions} conditions and {actions} actions; the bridge allows 8 of each")]
    RuleTooLarge {
        rule: String,
        conditions: usize,
        actions: usize,
    },

    #[error("{label}: {kind} '{name}' does not exist on the bridge")]
    UnknownReference {
        label: String,
        kind: ObjectKind,
        name: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{}: writing {kind} '{name}' failed: {source}", .report.label)]
    Remote {
        kind: ObjectKind,
        name: String,
        #[source]
        source: HubError,
        /// Objects written before the failure
        report: Box<ConfigureReport>,
    },

    #[error("failed to read bridge state: {0}")]
    Fetch(#[source] HubError),
}
