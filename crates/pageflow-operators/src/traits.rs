//! Operator trait + the shared state machine of 1:1 intermediate operators.
//!
//! A driver owns a chain of operators and moves pages between neighbours on a
//! single thread. Operators are therefore `Send` (a chain may be moved to a
//! worker thread) but never shared; none of them are internally synchronized.

use pageflow_core::error::{Error, Result};
use pageflow_data::Page;

/// Coarse lifecycle of an operator as seen by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    /// Ready to accept a page through `add_input`.
    NeedsInput,
    /// Has, or is producing, output; not accepting input right now.
    HasOutput,
    /// Will never produce another page.
    Finished,
}

/// A pipeline stage.
///
/// Invariants:
/// - `is_finished` is monotonic; once it is true `get_output` fails with
///   `IllegalState`.
/// - `add_input` takes ownership of the page; calling it while
///   `needs_input()` is false fails with `IllegalState`.
/// - `get_output` returning `Ok(None)` means "nothing yet", never "done".
/// - `close` releases every block the operator still holds, is idempotent and
///   is safe on every exit path, including after an error.
pub trait Operator: Send {
    /// Stable operator name, used in logs and stats.
    fn name(&self) -> &'static str;

    /// Back-pressure query: may the driver call `add_input` now?
    fn needs_input(&self) -> bool;

    fn add_input(&mut self, page: Page) -> Result<()>;

    /// No more input will arrive; buffered results must still be emitted.
    fn finish(&mut self);

    fn is_finished(&self) -> bool;

    fn get_output(&mut self) -> Result<Option<Page>>;

    fn close(&mut self);

    fn boxed(self) -> Box<dyn Operator>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }

    fn state(&self) -> OperatorState {
        if self.is_finished() {
            OperatorState::Finished
        } else if self.needs_input() {
            OperatorState::NeedsInput
        } else {
            OperatorState::HasOutput
        }
    }
}

#[derive(Debug)]
enum PipeState {
    NeedsInput,
    HasOutput(Page),
    Finished,
    Closed,
}

/// State machine shared by operators that turn one input page into at most
/// one output page (filter, project, limit).
#[derive(Debug)]
pub(crate) struct Pipe {
    name: &'static str,
    state: PipeState,
    /// `finish` arrived while an output page was still buffered.
    finishing: bool,
}

impl Pipe {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            state: PipeState::NeedsInput,
            finishing: false,
        }
    }

    pub(crate) fn needs_input(&self) -> bool {
        matches!(self.state, PipeState::NeedsInput) && !self.finishing
    }

    /// Check that `add_input` is allowed right now.
    pub(crate) fn check_accepting(&self) -> Result<()> {
        if self.needs_input() {
            Ok(())
        } else {
            Err(Error::IllegalState(format!(
                "{} cannot accept input in state {:?}",
                self.name,
                self.state_name()
            )))
        }
    }

    /// Buffer the page produced from the last input. Empty pages are dropped.
    pub(crate) fn push_output(&mut self, page: Page) {
        if page.is_empty() {
            return;
        }
        self.state = PipeState::HasOutput(page);
    }

    pub(crate) fn take_output(&mut self) -> Result<Option<Page>> {
        match std::mem::replace(&mut self.state, PipeState::NeedsInput) {
            PipeState::HasOutput(page) => {
                if self.finishing {
                    self.state = PipeState::Finished;
                }
                Ok(Some(page))
            }
            PipeState::NeedsInput => Ok(None),
            other @ (PipeState::Finished | PipeState::Closed) => {
                self.state = other;
                Err(Error::IllegalState(format!(
                    "get_output called on finished {}",
                    self.name
                )))
            }
        }
    }

    pub(crate) fn finish(&mut self) {
        match self.state {
            PipeState::NeedsInput => self.state = PipeState::Finished,
            PipeState::HasOutput(_) => self.finishing = true,
            PipeState::Finished | PipeState::Closed => {}
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(self.state, PipeState::Finished | PipeState::Closed)
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(self.state, PipeState::Closed)
    }

    /// Drops any buffered page.
    pub(crate) fn close(&mut self) {
        self.state = PipeState::Closed;
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            PipeState::NeedsInput => "needs_input",
            PipeState::HasOutput(_) => "has_output",
            PipeState::Finished => "finished",
            PipeState::Closed => "closed",
        }
    }
}
