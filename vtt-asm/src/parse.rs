//! Tokenizing VTT assembly.
//!
//! VTT assembly is a sequence of statements of the form
//! `MNEMONIC[flags], operand, operand, ...`. Delta instructions carry
//! `(point @ppem step)` triples between their brackets instead of flags, and
//! the `#`-prefixed push directives need no brackets at all. Whitespace and
//! `/* ... */` comments may appear anywhere between tokens.

use std::fmt;

use thiserror::Error;

use crate::instructions::{self, FlagKind, Operands, RAW_PUSHES};

/// A position in the source text; both fields are 1-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourcePos {
    pub line: usize,
    pub column: usize,
}

/// A single delta hint: move `point_index` by `step_no` eighths of a pixel
/// at the given size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeltaSpec {
    pub point_index: i32,
    pub rel_ppem: i32,
    pub step_no: i32,
}

/// One statement of VTT assembly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Token {
    pub mnemonic: String,
    /// The flags as binary digits, most significant bit first.
    pub flags: String,
    pub stack_items: Vec<i32>,
    pub deltas: Vec<DeltaSpec>,
    pub pos: SourcePos,
}

/// The ways a statement can be malformed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unterminated comment")]
    UnterminatedComment,
    #[error("expected an instruction")]
    ExpectedMnemonic,
    #[error("unknown instruction '{0}'")]
    UnknownMnemonic(String),
    #[error("'{0}' is not supported, use #PUSH instead")]
    RawPush(String),
    #[error("expected '[' after '{0}'")]
    ExpectedFlags(String),
    #[error("missing ']'")]
    UnterminatedFlags,
    #[error("invalid flags for {mnemonic}: '{flags}'")]
    InvalidFlags { mnemonic: String, flags: String },
    #[error("expected an integer")]
    ExpectedInteger,
    #[error("integer out of range: {0}")]
    IntegerOverflow(String),
    #[error("{mnemonic} takes {expected} operands, found {found}")]
    OperandCount {
        mnemonic: String,
        expected: Operands,
        found: usize,
    },
    #[error("expected '(' to start a delta")]
    ExpectedDelta,
    #[error("unterminated delta, expected ')'")]
    UnterminatedDelta,
    #[error("delta step must be between -8 and 8 and not 0, found {0}")]
    InvalidDeltaStep(i32),
    #[error("{mnemonic} cannot encode a delta at ppem {ppem}")]
    DeltaPpemOutOfRange { mnemonic: String, ppem: i32 },
    #[error("{0} has no deltas")]
    MissingDeltas(String),
    #[error("{0} cannot take operands in #PUSHOFF mode")]
    OperandsInPushOff(String),
    #[error("{0} cannot be used in #PUSHOFF mode")]
    DeltaInPushOff(String),
}

/// An error encountered while parsing VTT assembly.
///
/// The `Display` implementation prints the offending source line with a
/// marker under the column where the error was detected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub kind: ParseErrorKind,
    pub source_line: String,
}

impl ParseError {
    pub(crate) fn new(text: &str, pos: SourcePos, kind: ParseErrorKind) -> Self {
        ParseError {
            line: pos.line,
            column: pos.column,
            kind,
            source_line: line_text(text, pos.line).to_owned(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} (line {}, column {})",
            self.kind, self.line, self.column
        )?;
        writeln!(f, "{}", self.source_line)?;
        // tabs are kept so the marker lines up however they are displayed
        let padding: String = self
            .source_line
            .chars()
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .chain(std::iter::repeat(' '))
            .take(self.column.saturating_sub(1))
            .collect();
        write!(f, "{padding}^")
    }
}

impl std::error::Error for ParseError {}

/// Returns the text of the given 1-based line, without its line terminator.
///
/// `\n`, `\r` and `\r\n` all end a line.
fn line_text(text: &str, line: usize) -> &str {
    let mut rest = text;
    for _ in 1..line {
        match rest.find(['\r', '\n']) {
            Some(end) => {
                let skip = if rest[end..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[end + skip..];
            }
            None => return "",
        }
    }
    let end = rest.find(['\r', '\n']).unwrap_or(rest.len());
    &rest[..end]
}

/// Parses VTT assembly into a sequence of tokens.
///
/// Empty or whitespace-only input produces no tokens.
pub fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let mut scanner = Scanner::new(text);
    let mut tokens = Vec::new();
    loop {
        scanner.skip_trivia()?;
        if scanner.peek().is_none() {
            break;
        }
        tokens.push(scanner.statement()?);
    }
    Ok(tokens)
}

#[derive(Clone, Copy)]
struct Scanner<'a> {
    text: &'a str,
    pos: usize,
    line: usize,
    line_start: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Scanner {
            text,
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        let newline = match c {
            '\n' => true,
            // a '\r' directly followed by '\n' is counted once, at the '\n'
            '\r' => self.peek() != Some('\n'),
            _ => false,
        };
        if newline {
            self.line += 1;
            self.line_start = self.pos;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn location(&self) -> SourcePos {
        SourcePos {
            line: self.line,
            column: self.text[self.line_start..self.pos].chars().count() + 1,
        }
    }

    fn error(&self, pos: SourcePos, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.text, pos, kind)
    }

    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.text[self.pos..].starts_with("/*") => {
                    let start = self.location();
                    self.bump();
                    self.bump();
                    loop {
                        if self.text[self.pos..].starts_with("*/") {
                            self.bump();
                            self.bump();
                            break;
                        }
                        if self.bump().is_none() {
                            return Err(self.error(start, ParseErrorKind::UnterminatedComment));
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn statement(&mut self) -> Result<Token, ParseError> {
        let pos = self.location();
        let mnemonic = self.mnemonic();
        if mnemonic.is_empty() {
            return Err(self.error(pos, ParseErrorKind::ExpectedMnemonic));
        }
        let Some(def) = instructions::lookup(&mnemonic) else {
            let kind = if RAW_PUSHES.contains(&mnemonic.as_str()) {
                ParseErrorKind::RawPush(mnemonic)
            } else {
                ParseErrorKind::UnknownMnemonic(mnemonic)
            };
            return Err(self.error(pos, kind));
        };

        let mut token = Token {
            mnemonic,
            pos,
            ..Default::default()
        };

        let checkpoint = *self;
        self.skip_trivia()?;
        if self.eat('[') {
            if def.flags == FlagKind::Delta {
                token.deltas = self.deltas()?;
            } else {
                let flags_pos = self.location();
                let raw = self.raw_flags()?;
                token.flags = def.flags.translate(raw).ok_or_else(|| {
                    self.error(
                        flags_pos,
                        ParseErrorKind::InvalidFlags {
                            mnemonic: token.mnemonic.clone(),
                            flags: raw.to_owned(),
                        },
                    )
                })?;
            }
        } else if def.is_directive() {
            *self = checkpoint;
        } else {
            let here = self.location();
            return Err(self.error(here, ParseErrorKind::ExpectedFlags(token.mnemonic)));
        }

        token.stack_items = self.operands()?;
        if !def.operands.accepts(token.stack_items.len()) {
            return Err(self.error(
                pos,
                ParseErrorKind::OperandCount {
                    mnemonic: token.mnemonic,
                    expected: def.operands,
                    found: token.stack_items.len(),
                },
            ));
        }
        Ok(token)
    }

    fn mnemonic(&mut self) -> String {
        let start = self.pos;
        if self.peek() == Some('#') {
            self.bump();
        }
        if matches!(self.peek(), Some(c) if c.is_ascii_uppercase()) {
            while matches!(self.peek(), Some(c) if c.is_ascii_uppercase() || c.is_ascii_digit()) {
                self.bump();
            }
        }
        self.text[start..self.pos].to_owned()
    }

    /// Everything up to the closing bracket, which is consumed.
    fn raw_flags(&mut self) -> Result<&'a str, ParseError> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(']') => break,
                Some('\r' | '\n') | None => {
                    let here = self.location();
                    return Err(self.error(here, ParseErrorKind::UnterminatedFlags));
                }
                Some(_) => {
                    self.bump();
                }
            }
        }
        let raw = self.text[start..self.pos].trim();
        self.bump();
        Ok(raw)
    }

    /// Comma-prefixed operands following a statement.
    fn operands(&mut self) -> Result<Vec<i32>, ParseError> {
        let mut operands = Vec::new();
        loop {
            let checkpoint = *self;
            self.skip_trivia()?;
            if !self.eat(',') {
                *self = checkpoint;
                return Ok(operands);
            }
            self.skip_trivia()?;
            operands.push(self.integer()?);
        }
    }

    fn integer(&mut self) -> Result<i32, ParseError> {
        let pos = self.location();
        let start = self.pos;
        if matches!(self.peek(), Some('+' | '-')) {
            self.bump();
        }
        let digits_start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.pos == digits_start {
            return Err(self.error(pos, ParseErrorKind::ExpectedInteger));
        }
        let literal = &self.text[start..self.pos];
        literal
            .parse()
            .map_err(|_| self.error(pos, ParseErrorKind::IntegerOverflow(literal.to_owned())))
    }

    /// Delta triples up to and including the closing bracket.
    fn deltas(&mut self) -> Result<Vec<DeltaSpec>, ParseError> {
        let mut deltas = Vec::new();
        loop {
            self.skip_trivia()?;
            let pos = self.location();
            match self.peek() {
                Some(']') => {
                    self.bump();
                    return Ok(deltas);
                }
                Some(',') => {
                    self.bump();
                }
                Some('(') => {
                    self.bump();
                    deltas.push(self.delta(pos)?);
                }
                None => return Err(self.error(pos, ParseErrorKind::UnterminatedDelta)),
                Some(_) => return Err(self.error(pos, ParseErrorKind::ExpectedDelta)),
            }
        }
    }

    fn delta(&mut self, start: SourcePos) -> Result<DeltaSpec, ParseError> {
        self.skip_trivia()?;
        let point_index = self.integer()?;
        self.delta_separator()?;
        let rel_ppem = self.integer()?;
        self.delta_separator()?;
        let step_no = self.integer()?;
        self.skip_trivia()?;
        if !self.eat(')') {
            let here = self.location();
            return Err(self.error(here, ParseErrorKind::UnterminatedDelta));
        }
        if step_no == 0 || !(-8..=8).contains(&step_no) {
            return Err(self.error(start, ParseErrorKind::InvalidDeltaStep(step_no)));
        }
        Ok(DeltaSpec {
            point_index,
            rel_ppem,
            step_no,
        })
    }

    fn delta_separator(&mut self) -> Result<(), ParseError> {
        self.skip_trivia()?;
        if !self.eat('@') {
            self.eat(',');
        }
        self.skip_trivia()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn token(mnemonic: &str, flags: &str, stack_items: &[i32]) -> (String, String, Vec<i32>) {
        (mnemonic.into(), flags.into(), stack_items.to_vec())
    }

    fn simplify(tokens: &[Token]) -> Vec<(String, String, Vec<i32>)> {
        tokens
            .iter()
            .map(|t| (t.mnemonic.clone(), t.flags.clone(), t.stack_items.clone()))
            .collect()
    }

    #[test]
    fn empty_input() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("  \r\n\t ").unwrap().is_empty());
        assert!(tokenize("/* VTT 6.01 compiler */\n").unwrap().is_empty());
    }

    #[test]
    fn plain_instructions() {
        let text = "SVTCA[Y]\nMIAP[R], 3, 12\r\nMIRP[m>RBl], 5, 14\nIUP[X]\nCALL[], 10, -2, 3";
        let tokens = tokenize(text).unwrap();
        assert_eq!(
            simplify(&tokens),
            vec![
                token("SVTCA", "0", &[]),
                token("MIAP", "1", &[3, 12]),
                token("MIRP", "01101", &[5, 14]),
                token("IUP", "1", &[]),
                token("CALL", "", &[10, -2, 3]),
            ]
        );
        assert_eq!(tokens[2].pos, SourcePos { line: 3, column: 1 });
    }

    #[test]
    fn comments_and_whitespace() {
        let text = "/* Y direction */ SVTCA[Y] /* x */\n  SRP0[] , 4 /* point */ , 5\n";
        let tokens = tokenize(text).unwrap();
        assert_eq!(
            simplify(&tokens),
            vec![token("SVTCA", "0", &[]), token("SRP0", "", &[4, 5])]
        );
        assert_eq!(tokens[1].pos, SourcePos { line: 2, column: 3 });
    }

    #[test]
    fn directives() {
        let text = "#PUSHOFF\n#PUSH, 1, 2\n#BEGIN\n#END\n#PUSHON[]";
        let tokens = tokenize(text).unwrap();
        assert_eq!(
            simplify(&tokens),
            vec![
                token("#PUSHOFF", "", &[]),
                token("#PUSH", "", &[1, 2]),
                token("#BEGIN", "", &[]),
                token("#END", "", &[]),
                token("#PUSHON", "", &[]),
            ]
        );
    }

    #[test]
    fn component_declarations() {
        let text = "USEMYMETRICS[]\nOFFSET[R], 2, 10, -20\nOFFSET[r], 3, 0, 0\nANCHOR[], 1, 5, 7";
        let tokens = tokenize(text).unwrap();
        assert_eq!(
            simplify(&tokens),
            vec![
                token("USEMYMETRICS", "", &[]),
                token("OFFSET", "1", &[2, 10, -20]),
                token("OFFSET", "0", &[3, 0, 0]),
                token("ANCHOR", "", &[1, 5, 7]),
            ]
        );
    }

    #[test]
    fn delta_triples() {
        let text = "DLTP1[(14 @5 8)(15 @6 -2)]\nDELTAC2[(3, 30, 1), (4 @ 31 -8)]";
        let tokens = tokenize(text).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(
            tokens[0].deltas,
            vec![
                DeltaSpec {
                    point_index: 14,
                    rel_ppem: 5,
                    step_no: 8
                },
                DeltaSpec {
                    point_index: 15,
                    rel_ppem: 6,
                    step_no: -2
                },
            ]
        );
        assert_eq!(tokens[1].mnemonic, "DELTAC2");
        assert_eq!(tokens[1].deltas.len(), 2);
        assert_eq!(tokens[1].deltas[1].step_no, -8);
    }

    #[test]
    fn unknown_mnemonic() {
        let err = tokenize("SVTCA[X]\n  FOO[]").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownMnemonic("FOO".into()));
        assert_eq!((err.line, err.column), (2, 3));
        assert_eq!(err.source_line, "  FOO[]");
        assert_eq!(
            err.to_string(),
            "unknown instruction 'FOO' (line 2, column 3)\n  FOO[]\n  ^"
        );
    }

    #[test]
    fn error_marker_follows_tabs() {
        let err = tokenize("\t\tMDAP[R],\t3\n\tSRP0[], x").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedInteger);
        assert_eq!((err.line, err.column), (2, 10));
        assert_eq!(
            err.to_string(),
            "expected an integer (line 2, column 10)\n\tSRP0[], x\n\t        ^"
        );
    }

    #[test]
    fn raw_push_rejected() {
        let err = tokenize("NPUSHB[], 1, 2").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::RawPush("NPUSHB".into()));
    }

    #[test]
    fn bad_flags() {
        let err = tokenize("MIRP[m>RXx], 1, 2").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::InvalidFlags {
                mnemonic: "MIRP".into(),
                flags: "m>RXx".into()
            }
        );
        assert_eq!(err.column, 6);
        let err = tokenize("SVTCA[X\nIUP[Y]").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedFlags);
        let err = tokenize("SVTCA, 1").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedFlags("SVTCA".into()));
    }

    #[test]
    fn operand_arity() {
        let err = tokenize("OFFSET[R], 1, 2").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::OperandCount {
                mnemonic: "OFFSET".into(),
                expected: Operands::Exactly(3),
                found: 2
            }
        );
        assert_eq!(
            err.kind.to_string(),
            "OFFSET takes exactly 3 operands, found 2"
        );
        let err = tokenize("#PUSH").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::OperandCount { .. }));
        let err = tokenize("#BEGIN, 4").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::OperandCount { .. }));
    }

    #[test]
    fn bad_operands() {
        let err = tokenize("CALL[], x").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedInteger);
        let err = tokenize("CALL[], 99999999999").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::IntegerOverflow("99999999999".into())
        );
    }

    #[test]
    fn bad_deltas() {
        let err = tokenize("DLTP1[(14 @5 0)]").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidDeltaStep(0));
        let err = tokenize("DLTP1[(14 @5 9)]").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidDeltaStep(9));
        let err = tokenize("DLTP1[(14 @5 8]").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedDelta);
        let err = tokenize("DLTP1[(14 @5 8)").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedDelta);
        let err = tokenize("DLTP1[14]").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectedDelta);
    }

    #[test]
    fn unterminated_comment() {
        let err = tokenize("SVTCA[X]\n/* oops").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedComment);
        assert_eq!((err.line, err.column), (2, 1));
    }

    #[test]
    fn lines_with_carriage_returns() {
        assert_eq!(line_text("a\rb\r\nc\nd", 1), "a");
        assert_eq!(line_text("a\rb\r\nc\nd", 2), "b");
        assert_eq!(line_text("a\rb\r\nc\nd", 3), "c");
        assert_eq!(line_text("a\rb\r\nc\nd", 4), "d");
        assert_eq!(line_text("a\rb\r\nc\nd", 5), "");
        let err = tokenize("SVTCA[X]\rSVTCA[Q]").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.source_line, "SVTCA[Q]");
    }
}
