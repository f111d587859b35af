//! Lowering VTT assembly to the plain instruction stream.
//!
//! The output has one instruction per line, with all operands moved into
//! `PUSH[]` lines, delta instructions spelled out in their long form and
//! composite component declarations removed. Components declared along the
//! way are collected for the caller.

use crate::{
    composite::{AnchorComponent, Component, OffsetComponent},
    delta::DeltaInstruction,
    error::Error,
    parse::{self, ParseError, ParseErrorKind, Token},
    scope::{OutputBuffer, PushMode},
};

/// Transforms VTT assembly into instruction stream assembly.
///
/// Component declarations found in `text` are appended to `components`.
/// Whitespace-only input produces an empty string.
pub fn transform_assembly(text: &str, components: &mut Vec<Component>) -> Result<String, Error> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }
    let tokens = parse::tokenize(text)?;
    let mut emitter = Emitter::new(text, components);
    for token in &tokens {
        emitter.token(token)?;
    }
    Ok(emitter.output.finish()?)
}

/// Markers waiting for the next component declaration.
#[derive(Clone, Copy, Debug, Default)]
struct PendingFlags {
    use_my_metrics: bool,
    scaled_offset: Option<bool>,
}

struct Emitter<'a> {
    text: &'a str,
    output: OutputBuffer,
    pending: PendingFlags,
    components: &'a mut Vec<Component>,
}

impl<'a> Emitter<'a> {
    fn new(text: &'a str, components: &'a mut Vec<Component>) -> Self {
        Emitter {
            text,
            output: OutputBuffer::new(),
            pending: PendingFlags::default(),
            components,
        }
    }

    fn error(&self, token: &Token, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.text, token.pos, kind)
    }

    fn token(&mut self, token: &Token) -> Result<(), Error> {
        let operands = &token.stack_items;
        match token.mnemonic.as_str() {
            "OVERLAP" => (),
            "USEMYMETRICS" => self.pending.use_my_metrics = true,
            "SCALEDCOMPONENTOFFSET" => self.pending.scaled_offset = Some(true),
            "UNSCALEDCOMPONENTOFFSET" => self.pending.scaled_offset = Some(false),
            "OFFSET" => {
                let pending = std::mem::take(&mut self.pending);
                self.components.push(Component::Offset(OffsetComponent {
                    index: operands[0],
                    x: operands[1],
                    y: operands[2],
                    round_to_grid: token.flags == "1",
                    use_my_metrics: pending.use_my_metrics,
                    scaled_offset: pending.scaled_offset,
                }));
            }
            "ANCHOR" => {
                let pending = std::mem::take(&mut self.pending);
                self.components.push(Component::Anchor(AnchorComponent {
                    index: operands[0],
                    first: operands[1],
                    second: operands[2],
                    use_my_metrics: pending.use_my_metrics,
                    scaled_offset: pending.scaled_offset,
                }));
                self.output.emit(&token.mnemonic, &token.flags);
            }
            "#PUSHON" => self.output.set_mode(PushMode::On),
            "#PUSHOFF" => self.output.set_mode(PushMode::Off),
            "#BEGIN" => self.output.begin(),
            "#END" => self.output.end()?,
            "#PUSH" => self.output.push_explicit(operands),
            mnemonic => match DeltaInstruction::from_mnemonic(mnemonic) {
                Some(delta) => self.delta(token, delta)?,
                None => {
                    if !operands.is_empty() {
                        if self.output.mode() == PushMode::Off {
                            return Err(self
                                .error(token, ParseErrorKind::OperandsInPushOff(mnemonic.into()))
                                .into());
                        }
                        self.output.prepend(operands);
                    }
                    self.output.emit(mnemonic, &token.flags);
                }
            },
        }
        Ok(())
    }

    fn delta(&mut self, token: &Token, delta: DeltaInstruction) -> Result<(), Error> {
        if self.output.mode() == PushMode::Off {
            return Err(self
                .error(token, ParseErrorKind::DeltaInPushOff(token.mnemonic.clone()))
                .into());
        }
        if token.deltas.is_empty() {
            return Err(self
                .error(token, ParseErrorKind::MissingDeltas(token.mnemonic.clone()))
                .into());
        }
        let operands = delta
            .encode(&token.deltas)
            .map_err(|kind| self.error(token, kind))?;
        self.output.prepend(&operands);
        self.output.emit(delta.mnemonic(), "");
        Ok(())
    }
}
