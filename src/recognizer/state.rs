//! Engine state flags and the transition table.
//!
//! The engine state is a set of orthogonal flag groups:
//!
//! ```text
//! allocation  DEALLOCATED | ALLOCATING_RESOURCES | ALLOCATED | DEALLOCATING_RESOURCES
//! pause       PAUSED | RESUMED                       (while allocated)
//! run         LISTENING | PROCESSING | SUSPENDED     (while allocated)
//! focus       FOCUS_ON | FOCUS_OFF                   (while allocated)
//! ```
//!
//! State only changes through a named [`Transition`]. Each transition has a row
//! in the table below: the flags that must all be set, the flags of which at
//! least one must be set, and the `(clear, set)` masks applied when the
//! preconditions hold. `Transition::rule` matches exhaustively, so a new
//! transition cannot be added without its row.

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EngineState: u32 {
        const DEALLOCATED            = 1 << 0;
        const ALLOCATING_RESOURCES   = 1 << 1;
        const ALLOCATED              = 1 << 2;
        const DEALLOCATING_RESOURCES = 1 << 3;
        const PAUSED                 = 1 << 4;
        const RESUMED                = 1 << 5;
        const LISTENING              = 1 << 6;
        const PROCESSING             = 1 << 7;
        const SUSPENDED              = 1 << 8;
        const FOCUS_ON               = 1 << 9;
        const FOCUS_OFF              = 1 << 10;
    }
}

impl EngineState {
    /// True when every flag of `flags` is set.
    pub fn test(self, flags: EngineState) -> bool {
        self.contains(flags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    BeginAllocation,
    CompleteAllocation,
    BeginDeallocation,
    CompleteDeallocation,
    Pause,
    Resume,
    Suspend,
    Listen,
    StartProcessing,
    GainFocus,
    LoseFocus,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub requires_all: EngineState,
    pub requires_any: EngineState,
    pub clear: EngineState,
    pub set: EngineState,
}

const fn row(requires_all: EngineState, requires_any: EngineState, clear: EngineState, set: EngineState) -> TransitionRule {
    TransitionRule { requires_all, requires_any, clear, set }
}

impl Transition {
    pub fn rule(self) -> TransitionRule {
        type S = EngineState;
        let none = S::empty();
        match self {
            Transition::BeginAllocation => row(S::DEALLOCATED, none, S::DEALLOCATED, S::ALLOCATING_RESOURCES),
            Transition::CompleteAllocation => row(
                S::ALLOCATING_RESOURCES,
                none,
                S::ALLOCATING_RESOURCES,
                S::ALLOCATED.union(S::RESUMED).union(S::LISTENING).union(S::FOCUS_ON),
            ),
            Transition::BeginDeallocation => row(S::ALLOCATED, none, S::ALLOCATED, S::DEALLOCATING_RESOURCES),
            Transition::CompleteDeallocation => row(S::DEALLOCATING_RESOURCES, none, S::all(), S::DEALLOCATED),
            Transition::Pause => row(S::ALLOCATED.union(S::RESUMED), none, S::RESUMED, S::PAUSED),
            Transition::Resume => row(S::ALLOCATED.union(S::PAUSED), none, S::PAUSED, S::RESUMED),
            Transition::Suspend => row(
                S::ALLOCATED,
                S::LISTENING.union(S::PROCESSING),
                S::LISTENING.union(S::PROCESSING),
                S::SUSPENDED,
            ),
            Transition::Listen => row(
                S::ALLOCATED,
                S::SUSPENDED.union(S::PROCESSING),
                S::SUSPENDED.union(S::PROCESSING),
                S::LISTENING,
            ),
            Transition::StartProcessing => row(S::ALLOCATED.union(S::LISTENING), none, S::LISTENING, S::PROCESSING),
            Transition::GainFocus => row(S::ALLOCATED.union(S::FOCUS_OFF), none, S::FOCUS_OFF, S::FOCUS_ON),
            Transition::LoseFocus => row(S::ALLOCATED.union(S::FOCUS_ON), none, S::FOCUS_ON, S::FOCUS_OFF),
        }
    }

    /// The state after applying `self` to `current`, or `None` if the
    /// preconditions do not hold.
    pub fn apply(self, current: EngineState) -> Option<EngineState> {
        let rule = self.rule();
        let all_ok = current.contains(rule.requires_all);
        let any_ok = rule.requires_any.is_empty() || current.intersects(rule.requires_any);
        (all_ok && any_ok).then(|| current.difference(rule.clear).union(rule.set))
    }
}
