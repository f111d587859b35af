//! Assembling the instruction stream into TrueType bytecode, and listing
//! bytecode for inspection.

use std::fmt::Write;

use read_fonts::tables::glyf::bytecode::{decode_all, DecodeError};
use thiserror::Error;

use crate::instructions::{self, NPUSHB, NPUSHW, PUSHB, PUSHW};

/// The most values a single `NPUSHB`/`NPUSHW` can push.
const MAX_NPUSH: usize = 255;
/// The most values a short `PUSHB`/`PUSHW` can push.
const MAX_SHORT_PUSH: usize = 8;
/// Byte runs at most this long are pushed as words when surrounded by words.
const MAX_FOLDED_BYTES: usize = 2;
/// Pushed values per line when listing bytecode.
const VALUES_PER_LINE: usize = 25;

/// The ways a line of instruction stream assembly can be malformed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AssembleErrorKind {
    #[error("expected an instruction of the form 'NAME[flags]'")]
    Malformed,
    #[error("unknown instruction '{0}'")]
    UnknownInstruction(String),
    #[error("'{0}' has no TrueType opcode")]
    NoOpcode(String),
    #[error("invalid flags for {mnemonic}: '{flags}'")]
    InvalidFlags { mnemonic: String, flags: String },
    #[error("invalid push value '{0}'")]
    InvalidValue(String),
    #[error("push value {0} does not fit in 16 bits")]
    ValueOutOfRange(i64),
}

/// An error encountered while assembling the instruction stream.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind} (line {line})")]
pub struct AssembleError {
    /// 1-based line number.
    pub line: usize,
    pub kind: AssembleErrorKind,
}

/// Assembles instruction stream text into bytecode.
///
/// Every non-blank line holds either `MNEMONIC[bits]` or `PUSH[]` followed
/// by the values to push.
pub fn assemble(text: &str) -> Result<Vec<u8>, AssembleError> {
    let mut bytecode = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        assemble_line(line, &mut bytecode).map_err(|kind| AssembleError { line: i + 1, kind })?;
    }
    Ok(bytecode)
}

fn assemble_line(line: &str, bytecode: &mut Vec<u8>) -> Result<(), AssembleErrorKind> {
    if let Some(values) = line.strip_prefix("PUSH[]") {
        let values = values
            .split_whitespace()
            .map(parse_value)
            .collect::<Result<Vec<_>, _>>()?;
        encode_push(&values, bytecode);
        return Ok(());
    }

    let (mnemonic, flags) = line
        .strip_suffix(']')
        .and_then(|line| line.split_once('['))
        .ok_or(AssembleErrorKind::Malformed)?;
    let def = instructions::lookup(mnemonic)
        .ok_or_else(|| AssembleErrorKind::UnknownInstruction(mnemonic.into()))?;
    let Some(opcode) = def.opcode else {
        // anchors are resolved when the glyph is loaded
        if mnemonic == "ANCHOR" {
            return Ok(());
        }
        return Err(AssembleErrorKind::NoOpcode(mnemonic.into()));
    };
    let invalid_flags = || AssembleErrorKind::InvalidFlags {
        mnemonic: mnemonic.into(),
        flags: flags.into(),
    };
    let bits = def.flags.translate(flags).ok_or_else(invalid_flags)?;
    let bits = if bits.is_empty() {
        0
    } else {
        u8::from_str_radix(&bits, 2).map_err(|_| invalid_flags())?
    };
    bytecode.push(opcode + bits);
    Ok(())
}

fn parse_value(value: &str) -> Result<i16, AssembleErrorKind> {
    let wide: i64 = value
        .parse()
        .map_err(|_| AssembleErrorKind::InvalidValue(value.into()))?;
    i16::try_from(wide).map_err(|_| AssembleErrorKind::ValueOutOfRange(wide))
}

/// Emits the shortest reasonable sequence of push instructions for `values`.
fn encode_push(values: &[i16], bytecode: &mut Vec<u8>) {
    for (words, run) in push_runs(values) {
        for chunk in run.chunks(MAX_NPUSH) {
            let len = chunk.len();
            match (words, len <= MAX_SHORT_PUSH) {
                (false, true) => bytecode.push(PUSHB + len as u8 - 1),
                (true, true) => bytecode.push(PUSHW + len as u8 - 1),
                (false, false) => bytecode.extend([NPUSHB, len as u8]),
                (true, false) => bytecode.extend([NPUSHW, len as u8]),
            }
            for value in chunk {
                if words {
                    bytecode.extend(value.to_be_bytes());
                } else {
                    bytecode.push(*value as u8);
                }
            }
        }
    }
}

fn is_byte(value: i16) -> bool {
    (0..=u8::MAX as i16).contains(&value)
}

/// Splits values into runs of bytes and words, returned as
/// `(is_words, values)`.
fn push_runs(values: &[i16]) -> Vec<(bool, &[i16])> {
    let mut runs: Vec<(bool, &[i16])> = Vec::new();
    let mut start = 0;
    for end in 1..=values.len() {
        if end == values.len() || is_byte(values[end]) != is_byte(values[start]) {
            runs.push((!is_byte(values[start]), &values[start..end]));
            start = end;
        }
    }

    // switching to bytes and back costs more than a couple of words
    for i in 1..runs.len().saturating_sub(1) {
        let (words, run) = runs[i];
        if !words && run.len() <= MAX_FOLDED_BYTES && runs[i - 1].0 && runs[i + 1].0 {
            runs[i].0 = true;
        }
    }

    let mut merged: Vec<(bool, &[i16])> = Vec::with_capacity(runs.len());
    let mut offset = 0;
    for (words, run) in runs {
        match merged.last_mut() {
            Some((prev_words, prev)) if *prev_words == words => {
                let prev_start = offset - prev.len();
                *prev = &values[prev_start..offset + run.len()];
            }
            _ => merged.push((words, run)),
        }
        offset += run.len();
    }
    merged
}

/// Lists bytecode one instruction per line.
///
/// Values pushed by an instruction follow it on lines of their own.
pub fn format_bytecode(bytecode: &[u8]) -> Result<String, DecodeError> {
    let mut out = String::new();
    for instruction in decode_all(bytecode, 0) {
        let instruction = instruction?;
        let name = instruction.opcode.name();
        if !instruction.opcode.is_push() {
            let _ = writeln!(out, "{name}");
            continue;
        }
        let values: Vec<_> = instruction
            .inline_operands
            .values()
            .map(|value| value.to_string())
            .collect();
        let _ = writeln!(out, "{name}\t/* {} values pushed */", values.len());
        for line in values.chunks(VALUES_PER_LINE) {
            let _ = writeln!(out, "{}", line.join(" "));
        }
    }
    Ok(out)
}
