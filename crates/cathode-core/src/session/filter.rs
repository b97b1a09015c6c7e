use std::time::Duration;

use cathode_common::types::Size;
use cathode_parser::Token;

use crate::term::AppliedToken;

/// A tap on the byte streams flowing through the mediator.
///
/// Filters sit in two chains: the workload-output chain sees plain tokens
/// before they reach the emulator, the presentation chains see input
/// tokens and applied output (token + cell impacts + cursor change).
/// Every hook may mutate its token list; later filters in the chain see
/// the transformed stream. All hooks default to no-ops.
#[allow(unused_variables)]
pub trait SessionFilter: Send {
    fn on_session_start(&mut self, size: Size, title: &str) {}

    /// Workload output, tokenized, before the emulator applies it.
    fn on_output(&mut self, tokens: &mut Vec<Token>, elapsed: Duration) {}

    /// Output after application, with per-token impacts. Only
    /// presentation-output filters receive this richer form.
    fn on_applied_output(&mut self, applied: &mut Vec<AppliedToken>, elapsed: Duration) {}

    /// Presentation input, tokenized, before event conversion.
    fn on_input(&mut self, tokens: &mut Vec<Token>, elapsed: Duration) {}

    fn on_resize(&mut self, size: Size, elapsed: Duration) {}

    /// The workload signalled a frame boundary (empty output read).
    fn on_frame_complete(&mut self, elapsed: Duration) {}

    fn on_session_end(&mut self, elapsed: Duration) {}
}

/// The three filter chains a mediator runs.
#[derive(Default)]
pub struct FilterChains {
    pub workload_output: Vec<Box<dyn SessionFilter>>,
    pub presentation_output: Vec<Box<dyn SessionFilter>>,
    pub presentation_input: Vec<Box<dyn SessionFilter>>,
}

impl FilterChains {
    pub fn is_empty(&self) -> bool {
        self.workload_output.is_empty()
            && self.presentation_output.is_empty()
            && self.presentation_input.is_empty()
    }

    pub fn for_each(&mut self, mut f: impl FnMut(&mut dyn SessionFilter)) {
        for filter in self
            .workload_output
            .iter_mut()
            .chain(self.presentation_output.iter_mut())
            .chain(self.presentation_input.iter_mut())
        {
            f(filter.as_mut());
        }
    }
}
