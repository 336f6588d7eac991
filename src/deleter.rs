//! Confirmation-gated delete with a minimum visible progress duration. The
//! flow is a pure state machine: key handling feeds it request/confirm/
//! cancel/retry, spawned tasks feed it the call result and the timer, and
//! every async input carries the attempt number it belongs to so stragglers
//! from an abandoned attempt change nothing.

use std::time::Duration;

/// Progress stays on screen at least this long, even when the store answers
/// immediately.
pub const MIN_WAIT: Duration = Duration::from_millis(750);

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteState {
    Idle,
    /// Waiting for y/n at the confirmation prompt.
    ConfirmPending,
    /// Call issued. `timer_elapsed` remembers whether the minimum wait ran
    /// out while the call was still outstanding.
    InFlight { timer_elapsed: bool },
    /// The call finished first; sitting out the rest of the minimum wait.
    MinWaitPending,
    /// The call failed; the row offers retry or cancel.
    Failed(String),
    /// Both the call and the timer are done. The owner dismisses the flow
    /// and refreshes the list.
    Done,
}

#[derive(Debug)]
pub struct DeleteFlow {
    state: DeleteState,
    attempt: u32,
}

impl Default for DeleteFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl DeleteFlow {
    pub fn new() -> Self {
        Self { state: DeleteState::Idle, attempt: 0 }
    }

    pub fn state(&self) -> &DeleteState {
        &self.state
    }

    /// `d` on a committed row. True when the prompt was raised.
    pub fn request(&mut self) -> bool {
        if self.state == DeleteState::Idle {
            self.state = DeleteState::ConfirmPending;
            true
        } else {
            false
        }
    }

    /// `n` or Escape at the prompt, or dismissing a failure. Nothing was or
    /// will be deleted.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            DeleteState::ConfirmPending | DeleteState::Failed(_) => {
                self.state = DeleteState::Idle;
                true
            }
            _ => false,
        }
    }

    /// `y` at the prompt. Returns the attempt number the caller must tag the
    /// spawned call and timer with.
    pub fn confirm(&mut self) -> Option<u32> {
        if self.state == DeleteState::ConfirmPending {
            Some(self.launch())
        } else {
            None
        }
    }

    /// `r` at a failure: a fresh call and a fresh timer.
    pub fn retry(&mut self) -> Option<u32> {
        if matches!(self.state, DeleteState::Failed(_)) {
            Some(self.launch())
        } else {
            None
        }
    }

    fn launch(&mut self) -> u32 {
        self.attempt += 1;
        self.state = DeleteState::InFlight { timer_elapsed: false };
        self.attempt
    }

    pub fn call_succeeded(&mut self, attempt: u32) {
        if attempt != self.attempt {
            return;
        }
        match self.state {
            DeleteState::InFlight { timer_elapsed: true } => self.state = DeleteState::Done,
            DeleteState::InFlight { timer_elapsed: false } => {
                self.state = DeleteState::MinWaitPending
            }
            _ => {}
        }
    }

    pub fn call_failed(&mut self, attempt: u32, reason: String) {
        if attempt != self.attempt {
            return;
        }
        if matches!(self.state, DeleteState::InFlight { .. }) {
            self.state = DeleteState::Failed(reason);
        }
    }

    pub fn timer_elapsed(&mut self, attempt: u32) {
        if attempt != self.attempt {
            return;
        }
        match self.state {
            DeleteState::InFlight { timer_elapsed: false } => {
                self.state = DeleteState::InFlight { timer_elapsed: true }
            }
            DeleteState::MinWaitPending => self.state = DeleteState::Done,
            _ => {}
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == DeleteState::Done
    }

    /// True while a spinner should show for this row.
    pub fn in_progress(&self) -> bool {
        matches!(
            self.state,
            DeleteState::InFlight { .. } | DeleteState::MinWaitPending
        )
    }
}
