//! Pending push operands and the output they are coalesced into.
//!
//! VTT assembly lists the operands of each instruction next to it, but the
//! instruction stream wants them pushed ahead of time in as few `PUSH[]`
//! instructions as possible. Operands therefore accumulate in a *scope*;
//! the root scope is rendered before the first instruction, and nested
//! scopes opened with `#BEGIN` are rendered at the position where they
//! were opened once the matching `#END` is seen.

use std::collections::VecDeque;

use thiserror::Error;

/// Whether ordinary instructions have their operands pushed for them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PushMode {
    /// `#PUSHON`, the default.
    #[default]
    On,
    /// `#PUSHOFF`: instructions must not have operands.
    Off,
}

/// `#BEGIN` and `#END` markers that do not pair up.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScopeImbalance {
    #[error("missing #END: {open} scopes open at end of input, expected 1")]
    Unterminated { open: usize },
    #[error("#END without a matching #BEGIN")]
    UnmatchedEnd,
}

/// Operands waiting to be pushed, and the output slot they will occupy.
#[derive(Clone, Debug, Default)]
struct Scope {
    slot: usize,
    operands: VecDeque<i32>,
}

/// The output lines of one transformation, with slots reserved for the
/// push instructions of still open scopes.
#[derive(Clone, Debug)]
pub struct OutputBuffer {
    /// `None` marks a slot that is reserved by an open scope or that was
    /// left empty when its scope closed without operands.
    slots: Vec<Option<String>>,
    root: Scope,
    nested: Vec<Scope>,
    mode: PushMode,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        OutputBuffer {
            slots: vec![None],
            root: Scope::default(),
            nested: Vec::new(),
            mode: PushMode::default(),
        }
    }
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> PushMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: PushMode) {
        self.mode = mode;
    }

    /// The number of open scopes, including the root.
    pub fn open_scopes(&self) -> usize {
        self.nested.len() + 1
    }

    /// Opens a nested scope, reserving the next output slot for its push.
    pub fn begin(&mut self) {
        let slot = self.slots.len();
        self.slots.push(None);
        self.nested.push(Scope {
            slot,
            ..Default::default()
        });
    }

    /// Closes the innermost nested scope, filling in its reserved slot.
    pub fn end(&mut self) -> Result<(), ScopeImbalance> {
        let scope = self.nested.pop().ok_or(ScopeImbalance::UnmatchedEnd)?;
        self.slots[scope.slot] = render_push(&scope.operands);
        Ok(())
    }

    /// Adds a push of exactly these values at the current position.
    pub fn push_explicit(&mut self, values: &[i32]) {
        self.slots.push(render_push(values));
    }

    /// Adds values in front of the operands of the innermost open scope,
    /// keeping their relative order.
    pub fn prepend(&mut self, values: &[i32]) {
        let operands = &mut self.current_mut().operands;
        for value in values.iter().rev() {
            operands.push_front(*value);
        }
    }

    /// Appends an instruction line.
    pub fn emit(&mut self, mnemonic: &str, flags: &str) {
        self.slots.push(Some(format!("{mnemonic}[{flags}]")));
    }

    fn current_mut(&mut self) -> &mut Scope {
        self.nested.last_mut().unwrap_or(&mut self.root)
    }

    /// Renders the root scope and joins all non-empty lines.
    pub fn finish(mut self) -> Result<String, ScopeImbalance> {
        if !self.nested.is_empty() {
            return Err(ScopeImbalance::Unterminated {
                open: self.open_scopes(),
            });
        }
        self.slots[self.root.slot] = render_push(&self.root.operands);
        let lines: Vec<_> = self.slots.into_iter().flatten().collect();
        Ok(lines.join("\n"))
    }
}

fn render_push<'a>(values: impl IntoIterator<Item = &'a i32>) -> Option<String> {
    let values: Vec<_> = values.into_iter().map(i32::to_string).collect();
    (!values.is_empty()).then(|| format!("PUSH[] {}", values.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn empty_buffer() {
        assert_eq!(OutputBuffer::new().finish().unwrap(), "");
    }

    #[test]
    fn root_push_precedes_instructions() {
        let mut output = OutputBuffer::new();
        output.prepend(&[1, 2]);
        output.emit("SRP0", "");
        output.prepend(&[3]);
        output.emit("MDRP", "10000");
        assert_eq!(
            output.finish().unwrap(),
            "PUSH[] 3 1 2\nSRP0[]\nMDRP[10000]"
        );
    }

    #[test]
    fn nested_scope_fills_reserved_slot() {
        let mut output = OutputBuffer::new();
        output.prepend(&[7]);
        output.emit("CALL", "");
        output.begin();
        assert_eq!(output.open_scopes(), 2);
        output.prepend(&[5]);
        output.emit("SRP0", "");
        output.prepend(&[6]);
        output.emit("SRP1", "");
        output.end().unwrap();
        output.emit("IUP", "1");
        assert_eq!(output.open_scopes(), 1);
        assert_eq!(
            output.finish().unwrap(),
            "PUSH[] 7\nCALL[]\nPUSH[] 6 5\nSRP0[]\nSRP1[]\nIUP[1]"
        );
    }

    #[test]
    fn empty_scope_leaves_no_line() {
        let mut output = OutputBuffer::new();
        output.begin();
        output.emit("RTG", "");
        output.end().unwrap();
        assert_eq!(output.finish().unwrap(), "RTG[]");
    }

    #[test]
    fn explicit_push_is_placed_immediately() {
        let mut output = OutputBuffer::new();
        output.set_mode(PushMode::Off);
        output.push_explicit(&[4, 5]);
        output.emit("SRP0", "");
        assert_eq!(output.mode(), PushMode::Off);
        assert_eq!(output.finish().unwrap(), "PUSH[] 4 5\nSRP0[]");
    }

    #[test]
    fn unbalanced_scopes() {
        let mut output = OutputBuffer::new();
        assert_eq!(output.end(), Err(ScopeImbalance::UnmatchedEnd));
        output.begin();
        output.begin();
        output.end().unwrap();
        assert_eq!(
            output.finish(),
            Err(ScopeImbalance::Unterminated { open: 2 })
        );
    }
}
