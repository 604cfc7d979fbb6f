//! Concrete state handler functions and table builder.
//!
//! ```text
//!  INIT ──[first update]──▶ FEEDING ──[t_feed]──▶ EVALUATING
//!                              ▲                      │
//!                              │                   [t_eval]
//!                              │                      ▼
//!                              └─────[t_settle]─── SETTLING
//!
//!  Any state ──[anomaly fault]──▶ ANOMALY ──[faults cleared]──▶ EVALUATING
//! ```
//!
//! Only EVALUATING lets the PI loop move the output.  Activity above
//! `H_hi` or below `H_lo` never changes the phase sequence; it only moves
//! the PI target.

use super::context::{DriveMode, FsmContext};
use super::{StateDescriptor, StateId};
use log::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Init
        StateDescriptor {
            id: StateId::Init,
            name: "INIT",
            on_enter: Some(init_enter),
            on_exit: None,
            on_update: init_update,
        },
        // Index 1: Feeding
        StateDescriptor {
            id: StateId::Feeding,
            name: "FEEDING",
            on_enter: Some(feeding_enter),
            on_exit: None,
            on_update: feeding_update,
        },
        // Index 2: Evaluating
        StateDescriptor {
            id: StateId::Evaluating,
            name: "EVALUATING",
            on_enter: Some(evaluating_enter),
            on_exit: None,
            on_update: evaluating_update,
        },
        // Index 3: Settling
        StateDescriptor {
            id: StateId::Settling,
            name: "SETTLING",
            on_enter: Some(settling_enter),
            on_exit: None,
            on_update: settling_update,
        },
        // Index 4: Anomaly
        StateDescriptor {
            id: StateId::Anomaly,
            name: "ANOMALY",
            on_enter: Some(anomaly_enter),
            on_exit: Some(anomaly_exit),
            on_update: anomaly_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  INIT state
// ═══════════════════════════════════════════════════════════════════════════

fn init_enter(ctx: &mut FsmContext) {
    ctx.drive = DriveMode::Hold;
    info!("INIT: controller ready, output held");
}

fn init_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Anomaly);
    }
    Some(StateId::Feeding)
}

// ═══════════════════════════════════════════════════════════════════════════
//  FEEDING state: dispensing at the current command
// ═══════════════════════════════════════════════════════════════════════════

fn feeding_enter(ctx: &mut FsmContext) {
    ctx.drive = DriveMode::Hold;
    debug!("FEEDING: dispensing for {:.2}s", ctx.timing.t_feed);
}

fn feeding_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Anomaly);
    }
    let t_feed = ctx.timing.t_feed;
    ctx.phase_elapsed(t_feed).then_some(StateId::Evaluating)
}

// ═══════════════════════════════════════════════════════════════════════════
//  EVALUATING state: PI loop acts on the activity index
// ═══════════════════════════════════════════════════════════════════════════

fn evaluating_enter(ctx: &mut FsmContext) {
    ctx.drive = DriveMode::Regulate;
    debug!("EVALUATING: regulating for {:.2}s", ctx.timing.t_eval);
}

fn evaluating_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Anomaly);
    }
    let t_eval = ctx.timing.t_eval;
    ctx.phase_elapsed(t_eval).then_some(StateId::Settling)
}

// ═══════════════════════════════════════════════════════════════════════════
//  SETTLING state: let the water calm before the next feed
// ═══════════════════════════════════════════════════════════════════════════

fn settling_enter(ctx: &mut FsmContext) {
    ctx.drive = DriveMode::Hold;
    debug!("SETTLING: H={:.3}, waiting {:.2}s", ctx.activity, ctx.timing.t_settle);
}

fn settling_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.has_faults() {
        return Some(StateId::Anomaly);
    }
    let t_settle = ctx.timing.t_settle;
    ctx.phase_elapsed(t_settle).then_some(StateId::Feeding)
}

// ═══════════════════════════════════════════════════════════════════════════
//  ANOMALY state: sensing unreliable, safe output held
// ═══════════════════════════════════════════════════════════════════════════

fn anomaly_enter(ctx: &mut FsmContext) {
    ctx.drive = DriveMode::Safe;
    warn!(
        "ANOMALY: safe output engaged, fault_flags=0b{:08b}",
        ctx.fault_flags
    );
}

fn anomaly_exit(ctx: &mut FsmContext) {
    ctx.pi_reset_requested = true;
    info!("ANOMALY: faults cleared, resuming evaluation");
}

fn anomaly_update(ctx: &mut FsmContext) -> Option<StateId> {
    // Stay until every fault has cleared.
    (!ctx.has_faults()).then_some(StateId::Evaluating)
}
