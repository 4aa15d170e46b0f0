//! Case numbering and the reified state machine of a flattened function.
//!
//! While a flattened body is translated, [`CaseBuilder`] hands out symbolic
//! [`CaseTarget`]s for every jump destination. A target receives its number
//! only when its case is opened, so numbers grow strictly in emission order
//! no matter how many forward jumps were issued first. Jump sites emit a
//! placeholder that [`CaseBuilder::patch`] rewrites once every target is
//! bound, the same way a bytecode emitter patches forward jump offsets.
//!
//! Alongside the text, every jump, suspension and return is recorded as an
//! [`Exit`] of the case it leaves, which yields a [`StateMachine`] that can
//! be stepped and driven by a [`Fiber`] without a Lua VM.

use rustc_hash::FxHashSet;
use thiserror::Error;

use moonlift_core::CompilationError;

/// Case number of the entry case.
pub const ENTRY_CASE: i32 = 0;
/// Case number reserved for unwinding after a failure or cancellation.
pub const TERMINAL_CASE: i32 = -1;

const PLACEHOLDER: char = '\0';
const STEP_LIMIT: usize = 100_000;

/// A jump destination whose case number may not be known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaseTarget(u32);

/// What an exit does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer<T> {
    /// Continue at another case.
    Goto(T),
    /// Suspend the fiber; resumption enters `resume_at`.
    Suspend { resume_at: T },
    /// Leave the function.
    Return,
}

/// One way out of a case. Exits are ordered; the first whose guard holds is
/// taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exit<T> {
    /// Target-code condition that must hold, `None` when unconditional.
    pub guard: Option<String>,
    pub transfer: Transfer<T>,
}

/// A case of a finished machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Case {
    pub id: i32,
    pub exits: Vec<Exit<i32>>,
}

/// Errors from driving a [`StateMachine`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MachineError {
    #[error("no case {0}")]
    UnknownCase(i32),

    #[error("case {0} has no exit whose guard holds")]
    NoExit(i32),

    #[error("gave up after {0} steps without suspending or returning")]
    StepLimit(usize),

    #[error("fiber is {0}")]
    InvalidState(&'static str),
}

// ============================================================================
// CaseBuilder
// ============================================================================

/// Allocates case numbers and records exits during translation.
///
/// Only the cases a body opens count as its cases: a body with one
/// suspension has exactly two, `0` and the resume case. [`TERMINAL_CASE`]
/// is not one of them. It is appended by [`finish`](Self::finish) because
/// the scheduler can cancel any suspended frame by storing `-1` into it,
/// so every flattened body dispatches on it even when no case jumps there.
#[derive(Debug)]
pub struct CaseBuilder {
    bindings: Vec<Option<i32>>,
    next_case: i32,
    cases: Vec<(i32, Vec<Exit<CaseTarget>>)>,
    guards: Vec<String>,
    terminated: bool,
}

impl Default for CaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseBuilder {
    /// A builder with the entry case open.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            next_case: 1,
            cases: vec![(ENTRY_CASE, Vec::new())],
            guards: Vec::new(),
            terminated: false,
        }
    }

    /// Allocate an unbound target.
    pub fn new_target(&mut self) -> CaseTarget {
        self.bindings.push(None);
        CaseTarget(self.bindings.len() as u32 - 1)
    }

    /// Open the case for `target`, giving it the next number.
    pub fn open(&mut self, target: CaseTarget) -> Result<i32, CompilationError> {
        let slot = self
            .bindings
            .get_mut(target.0 as usize)
            .ok_or_else(|| CompilationError::internal("case target out of range"))?;
        if slot.is_some() {
            return Err(CompilationError::internal("case target opened twice"));
        }
        let number = self.next_case;
        self.next_case += 1;
        *slot = Some(number);
        self.cases.push((number, Vec::new()));
        self.terminated = false;
        Ok(number)
    }

    /// Number of the case currently being filled.
    pub fn current(&self) -> i32 {
        self.cases.last().map(|(id, _)| *id).unwrap_or(ENTRY_CASE)
    }

    /// Text standing in for `target`'s number until [`patch`](Self::patch).
    pub fn placeholder(&self, target: CaseTarget) -> String {
        format!("{PLACEHOLDER}{}{PLACEHOLDER}", target.0)
    }

    /// Whether the current case already left unconditionally.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Enter a region only reached when `condition` holds.
    pub fn push_guard(&mut self, condition: impl Into<String>) {
        self.guards.push(condition.into());
    }

    pub fn pop_guard(&mut self) {
        self.guards.pop();
    }

    /// Record an exit from the current case under the active guards.
    pub fn record(&mut self, transfer: Transfer<CaseTarget>) {
        let guard = if self.guards.is_empty() {
            None
        } else {
            Some(self.guards.join(" and "))
        };
        if guard.is_none() {
            self.terminated = true;
        }
        if let Some((_, exits)) = self.cases.last_mut() {
            exits.push(Exit { guard, transfer });
        }
    }

    fn resolve(&self, target: CaseTarget) -> Result<i32, CompilationError> {
        self.bindings
            .get(target.0 as usize)
            .copied()
            .flatten()
            .ok_or_else(|| CompilationError::internal(format!("case target {} never opened", target.0)))
    }

    /// Replace every placeholder in `text` with its case number.
    pub fn patch(&self, text: &str) -> Result<String, CompilationError> {
        let mut out = String::with_capacity(text.len());
        let mut parts = text.split(PLACEHOLDER);
        if let Some(first) = parts.next() {
            out.push_str(first);
        }
        while let Some(index) = parts.next() {
            let index: u32 = index
                .parse()
                .map_err(|_| CompilationError::internal("malformed case placeholder"))?;
            out.push_str(&self.resolve(CaseTarget(index))?.to_string());
            if let Some(rest) = parts.next() {
                out.push_str(rest);
            }
        }
        Ok(out)
    }

    /// Resolve all exits into a [`StateMachine`].
    pub fn finish(&self, with_terminal: bool) -> Result<StateMachine, CompilationError> {
        let mut cases = Vec::with_capacity(self.cases.len() + 1);
        for (id, exits) in &self.cases {
            let mut resolved = Vec::with_capacity(exits.len());
            for exit in exits {
                let transfer = match exit.transfer {
                    Transfer::Goto(t) => Transfer::Goto(self.resolve(t)?),
                    Transfer::Suspend { resume_at } => Transfer::Suspend {
                        resume_at: self.resolve(resume_at)?,
                    },
                    Transfer::Return => Transfer::Return,
                };
                resolved.push(Exit {
                    guard: exit.guard.clone(),
                    transfer,
                });
            }
            cases.push(Case {
                id: *id,
                exits: resolved,
            });
        }
        if with_terminal {
            cases.push(Case {
                id: TERMINAL_CASE,
                exits: vec![Exit {
                    guard: None,
                    transfer: Transfer::Return,
                }],
            });
        }
        Ok(StateMachine { cases })
    }
}

// ============================================================================
// StateMachine
// ============================================================================

/// A suspension reported by [`StateMachine::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Suspension {
    /// Case that issued the blocking operation.
    pub at: i32,
    /// Case that binds the resumption value.
    pub resume_at: i32,
}

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition<R> {
    /// Case to enter next.
    pub state: i32,
    pub suspend: Option<Suspension>,
    /// The function returned.
    pub finished: bool,
    /// Resumption value, when the starting case is a resume point.
    pub delivered: Option<R>,
    /// Cases entered during the step, in order.
    pub path: Vec<i32>,
}

/// The case graph of one flattened function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine {
    cases: Vec<Case>,
}

impl StateMachine {
    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn case(&self, id: i32) -> Option<&Case> {
        self.cases.iter().find(|c| c.id == id)
    }

    /// Case numbers in emission order (the terminal case last, if present).
    pub fn case_ids(&self) -> Vec<i32> {
        self.cases.iter().map(|c| c.id).collect()
    }

    /// Case numbers the body itself opened, without the terminal case.
    pub fn body_cases(&self) -> Vec<i32> {
        self.cases
            .iter()
            .map(|c| c.id)
            .filter(|id| *id != TERMINAL_CASE)
            .collect()
    }

    pub fn has_terminal(&self) -> bool {
        self.case(TERMINAL_CASE).is_some()
    }

    /// Cases entered on resumption.
    pub fn resume_points(&self) -> FxHashSet<i32> {
        self.cases
            .iter()
            .flat_map(|c| c.exits.iter())
            .filter_map(|e| match e.transfer {
                Transfer::Suspend { resume_at } => Some(resume_at),
                _ => None,
            })
            .collect()
    }

    /// Number of suspending exits.
    pub fn suspension_count(&self) -> usize {
        self.cases
            .iter()
            .flat_map(|c| c.exits.iter())
            .filter(|e| matches!(e.transfer, Transfer::Suspend { .. }))
            .count()
    }

    /// Run from `state` until the function suspends or returns.
    ///
    /// `guard` decides guarded exits: it receives the case number and the
    /// condition text.
    pub fn step<R>(
        &self,
        state: i32,
        resume: Option<R>,
        mut guard: impl FnMut(i32, &str) -> bool,
    ) -> Result<Transition<R>, MachineError> {
        let delivered = if self.resume_points().contains(&state) {
            resume
        } else {
            None
        };
        let mut current = state;
        let mut path = Vec::new();
        for _ in 0..STEP_LIMIT {
            path.push(current);
            let case = self.case(current).ok_or(MachineError::UnknownCase(current))?;
            let exit = case
                .exits
                .iter()
                .find(|exit| match &exit.guard {
                    None => true,
                    Some(condition) => guard(current, condition),
                })
                .ok_or(MachineError::NoExit(current))?;
            match exit.transfer {
                Transfer::Goto(next) => current = next,
                Transfer::Suspend { resume_at } => {
                    return Ok(Transition {
                        state: resume_at,
                        suspend: Some(Suspension {
                            at: current,
                            resume_at,
                        }),
                        finished: false,
                        delivered,
                        path,
                    });
                }
                Transfer::Return => {
                    return Ok(Transition {
                        state: current,
                        suspend: None,
                        finished: true,
                        delivered,
                        path,
                    });
                }
            }
        }
        Err(MachineError::StepLimit(STEP_LIMIT))
    }
}

// ============================================================================
// Fiber
// ============================================================================

/// Where a fiber stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberStatus {
    Ready,
    Suspended { resume_at: i32 },
    Finished,
}

/// Drives a [`StateMachine`] the way the host scheduler drives generated
/// code: run to the first suspension, resume with values, or cancel.
#[derive(Debug)]
pub struct Fiber<'m, R> {
    machine: &'m StateMachine,
    status: FiberStatus,
    trace: Vec<i32>,
    received: Vec<(i32, R)>,
}

impl<'m, R> Fiber<'m, R> {
    pub fn new(machine: &'m StateMachine) -> Self {
        Self {
            machine,
            status: FiberStatus::Ready,
            trace: Vec::new(),
            received: Vec::new(),
        }
    }

    pub fn status(&self) -> FiberStatus {
        self.status
    }

    /// Every case entered so far.
    pub fn trace(&self) -> &[i32] {
        &self.trace
    }

    /// Resumption values with the case each was delivered to.
    pub fn received(&self) -> &[(i32, R)] {
        &self.received
    }

    fn apply(&mut self, transition: Transition<R>) -> FiberStatus {
        if let Some(value) = transition.delivered {
            if let Some(first) = transition.path.first() {
                self.received.push((*first, value));
            }
        }
        self.trace.extend(transition.path);
        self.status = match transition.suspend {
            Some(s) => FiberStatus::Suspended {
                resume_at: s.resume_at,
            },
            None => FiberStatus::Finished,
        };
        self.status
    }

    /// Start from the entry case.
    pub fn run(&mut self, guard: impl FnMut(i32, &str) -> bool) -> Result<FiberStatus, MachineError> {
        if self.status != FiberStatus::Ready {
            return Err(MachineError::InvalidState("already started"));
        }
        let transition = self.machine.step(ENTRY_CASE, None, guard)?;
        Ok(self.apply(transition))
    }

    /// Resume a suspended fiber with the value of its blocking operation.
    pub fn resume(
        &mut self,
        value: R,
        guard: impl FnMut(i32, &str) -> bool,
    ) -> Result<FiberStatus, MachineError> {
        let FiberStatus::Suspended { resume_at } = self.status else {
            return Err(MachineError::InvalidState("not suspended"));
        };
        let transition = self.machine.step(resume_at, Some(value), guard)?;
        Ok(self.apply(transition))
    }

    /// Force the terminal case. Functions without one simply finish.
    pub fn cancel(&mut self) -> Result<FiberStatus, MachineError> {
        if self.status == FiberStatus::Finished {
            return Err(MachineError::InvalidState("finished"));
        }
        if self.machine.has_terminal() {
            let transition = self.machine.step::<R>(TERMINAL_CASE, None, |_, _| false)?;
            return Ok(self.apply(transition));
        }
        self.status = FiberStatus::Finished;
        Ok(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// case 0 suspends into 1, case 1 loops back to 0 while `more`.
    fn loop_machine() -> StateMachine {
        let mut b = CaseBuilder::new();
        let resume = b.new_target();
        b.record(Transfer::Suspend { resume_at: resume });
        b.open(resume).unwrap();
        let head = b.new_target();
        b.push_guard("more");
        b.record(Transfer::Goto(head));
        b.pop_guard();
        b.record(Transfer::Return);
        b.open(head).unwrap();
        b.record(Transfer::Return);
        b.finish(true).unwrap()
    }

    #[test]
    fn numbers_follow_open_order() {
        let mut b = CaseBuilder::new();
        let later = b.new_target();
        let sooner = b.new_target();
        assert_eq!(b.open(sooner).unwrap(), 1);
        assert_eq!(b.open(later).unwrap(), 2);
        let text = format!("__s = {}; __s = {}", b.placeholder(later), b.placeholder(sooner));
        assert_eq!(b.patch(&text).unwrap(), "__s = 2; __s = 1");
    }

    #[test]
    fn unbound_target_is_internal_error() {
        let mut b = CaseBuilder::new();
        let t = b.new_target();
        let err = b.patch(&b.placeholder(t)).unwrap_err();
        assert!(matches!(err, CompilationError::InternalInvariantViolation { .. }));
    }

    #[test]
    fn opening_twice_fails() {
        let mut b = CaseBuilder::new();
        let t = b.new_target();
        b.open(t).unwrap();
        assert!(b.open(t).is_err());
    }

    #[test]
    fn guarded_exit_does_not_terminate() {
        let mut b = CaseBuilder::new();
        let t = b.new_target();
        b.push_guard("x > 0");
        b.record(Transfer::Goto(t));
        assert!(!b.is_terminated());
        b.pop_guard();
        b.record(Transfer::Goto(t));
        assert!(b.is_terminated());
    }

    #[test]
    fn step_suspends_and_resumes() {
        let machine = loop_machine();
        assert_eq!(machine.case_ids(), vec![0, 1, 2, -1]);
        let t = machine.step::<i32>(0, None, |_, _| false).unwrap();
        assert_eq!(t.suspend, Some(Suspension { at: 0, resume_at: 1 }));

        let t = machine.step(1, Some(7), |_, _| false).unwrap();
        assert!(t.finished);
        assert_eq!(t.delivered, Some(7));
        assert_eq!(t.path, vec![1]);
    }

    #[test]
    fn fiber_drives_machine() {
        let machine = loop_machine();
        let mut fiber = Fiber::new(&machine);
        assert_eq!(
            fiber.run(|_, _| false).unwrap(),
            FiberStatus::Suspended { resume_at: 1 }
        );
        assert_eq!(fiber.resume("v", |_, c| c == "more").unwrap(), FiberStatus::Finished);
        assert_eq!(fiber.trace(), &[0, 1, 2]);
        assert_eq!(fiber.received(), &[(1, "v")]);
        assert!(fiber.resume("again", |_, _| false).is_err());
    }

    #[test]
    fn cancel_enters_terminal_case() {
        let machine = loop_machine();
        let mut fiber: Fiber<'_, ()> = Fiber::new(&machine);
        fiber.run(|_, _| false).unwrap();
        assert_eq!(fiber.cancel().unwrap(), FiberStatus::Finished);
        assert_eq!(fiber.trace().last(), Some(&TERMINAL_CASE));
    }
}
