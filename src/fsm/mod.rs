//! Function-pointer finite state machine engine for the feeding cycle.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  StateTable                                               │
//! │  ┌────────────┬──────────┬──────────┬───────────────────┐ │
//! │  │ StateId    │ on_enter │ on_exit  │ on_update         │ │
//! │  ├────────────┼──────────┼──────────┼───────────────────┤ │
//! │  │ Init       │ fn(ctx)  │    -     │ fn(ctx)->Option<> │ │
//! │  │ Feeding    │ fn(ctx)  │    -     │ fn(ctx)->Option<> │ │
//! │  │ Evaluating │ fn(ctx)  │    -     │ fn(ctx)->Option<> │ │
//! │  │ Settling   │ fn(ctx)  │    -     │ fn(ctx)->Option<> │ │
//! │  │ Anomaly    │ fn(ctx)  │ fn(ctx)  │ fn(ctx)->Option<> │ │
//! │  └────────────┴──────────┴──────────┴───────────────────┘ │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.  If it
//! returns `Some(next_id)`, the engine runs `on_exit` for the current state,
//! stamps the new entry time, then runs `on_enter` for the next.  Phase
//! durations are measured on the wall clock carried in the context, so the
//! cycle is independent of how many frames arrive per second.

pub mod context;
pub mod states;

use std::fmt;

use context::FsmContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Init = 0,
    Feeding = 1,
    Evaluating = 2,
    Settling = 3,
    Anomaly = 4,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 5;

    /// Convert an index back to `StateId`.  Returns `Anomaly` (the safe
    /// state) for out-of-range indices in release builds.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Init,
            1 => Self::Feeding,
            2 => Self::Evaluating,
            3 => Self::Settling,
            4 => Self::Anomaly,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Anomaly
            }
        }
    }

    /// Upper-case name as written to the cycle log.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Feeding => "FEEDING",
            Self::Evaluating => "EVALUATING",
            Self::Settling => "SETTLING",
            Self::Anomaly => "ANOMALY",
        }
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut FsmContext);

/// Per-update handler.  Returns `Some(next)` to trigger a transition.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

/// A completed state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: StateId,
    pub to: StateId,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    /// Number of updates processed (wraps at u64::MAX).
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        ctx.state_entry = ctx.now;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one update.  At most one transition happens per
    /// call.
    pub fn tick(&mut self, ctx: &mut FsmContext) -> Option<Transition> {
        self.tick_count = self.tick_count.wrapping_add(1);
        ctx.scheduled_entry = None;

        let next = (self.table[self.current].on_update)(ctx)?;
        (next as usize != self.current).then(|| self.transition(next, ctx))
    }

    /// Jump to `next` regardless of what `on_update` would return.  No-op
    /// when already there.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) -> Option<Transition> {
        ctx.scheduled_entry = None;
        (next as usize != self.current).then(|| self.transition(next, ctx))
    }

    /// Put the machine back into `initial` without running exit actions.
    pub fn restart(&mut self, initial: StateId, ctx: &mut FsmContext) {
        self.current = initial as usize;
        self.state_entry_tick = self.tick_count;
        self.start(ctx);
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count.wrapping_sub(self.state_entry_tick)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) -> Transition {
        let next_idx = next_id as usize;
        let from = self.current_state();

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.state_entry = ctx.scheduled_entry.take().unwrap_or(ctx.now);

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }

        Transition { from, to: next_id }
    }
}
