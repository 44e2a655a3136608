//! Scripted executor for tests: answers from rules and records every call.

use crate::exec::{CommandOutput, Executor, Invocation};
use std::sync::{Mutex, PoisonError};

/// Executor that answers from a script and records every call.
///
/// Rules are matched in insertion order against the rendered command line
/// (substring match); unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedExecutor {
    /// Create an executor with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands whose line contains `pattern` with `output`.
    pub fn on(self, pattern: &str, output: CommandOutput) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((pattern.to_string(), output));
        self
    }

    /// Rendered command lines of every call so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Invocation::display)
            .collect()
    }

    /// Number of calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Forget recorded calls, keeping the rules.
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, invocation: &Invocation) -> std::io::Result<CommandOutput> {
        let line = invocation.display();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.clone());

        let rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rules
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}
