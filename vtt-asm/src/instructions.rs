//! The TrueType instruction set as it is spelled in VTT assembly.
//!
//! Besides the real TrueType instructions, VTT assembly contains a handful of
//! pseudo instructions describing composite glyph components and `#`-prefixed
//! directives that control how stack operands are pushed. All of them are
//! listed here so that the tokenizer can reject unknown mnemonics early.
//!
//! See [the TrueType instruction set](https://learn.microsoft.com/en-us/typography/opentype/spec/tt_instructions)
//! for the meaning of the individual flag bits.

/// The kind of flag operand an instruction carries between its brackets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlagKind {
    /// No flags; the brackets must be empty.
    None,
    /// `X` (1) or `Y` (0).
    Axis,
    /// `R` (perpendicular, 1) or `r` (parallel, 0).
    Line,
    /// `R` (round, 1) or `r` (0).
    Round,
    /// `O` (original outline, 1) or `N` (current outline, 0).
    Outline,
    /// `1` (use rp1, 1) or `2` (use rp2, 0).
    RefPoint,
    /// `M` (set rp0, 1) or `m` (0).
    SetRp0,
    /// Distance type: `Gr` (00), `Bl` (01) or `Wh` (10).
    Distance,
    /// `[mM][<>][rR](Gr|Bl|Wh)`, used by MDRP and MIRP.
    Move,
    /// The brackets hold `(point @ppem step)` delta triples.
    Delta,
}

impl FlagKind {
    /// The number of bits this flag operand occupies in the opcode.
    pub fn bits(self) -> usize {
        match self {
            FlagKind::None | FlagKind::Delta => 0,
            FlagKind::Axis
            | FlagKind::Line
            | FlagKind::Round
            | FlagKind::Outline
            | FlagKind::RefPoint
            | FlagKind::SetRp0 => 1,
            FlagKind::Distance => 2,
            FlagKind::Move => 5,
        }
    }

    /// Translates flags as written in VTT assembly into a string of binary
    /// digits, most significant bit first.
    ///
    /// Flags that are already spelled in binary are accepted as long as they
    /// have the right width. Returns `None` if the flags are not valid for
    /// this kind of instruction.
    pub fn translate(self, flags: &str) -> Option<String> {
        let bits = self.bits();
        if bits == 0 {
            return flags.is_empty().then(String::new);
        }
        if flags.len() == bits && flags.bytes().all(|b| b == b'0' || b == b'1') {
            return Some(flags.to_owned());
        }
        let translated = match (self, flags) {
            (FlagKind::Axis, "X") => "1",
            (FlagKind::Axis, "Y") => "0",
            (FlagKind::Line | FlagKind::Round, "R") => "1",
            (FlagKind::Line | FlagKind::Round, "r") => "0",
            (FlagKind::Outline, "O") => "1",
            (FlagKind::Outline, "N") => "0",
            (FlagKind::RefPoint, "2") => "0",
            (FlagKind::SetRp0, "M") => "1",
            (FlagKind::SetRp0, "m") => "0",
            (FlagKind::Distance, distance) => distance_bits(distance)?,
            (FlagKind::Move, _) => return translate_move(flags),
            _ => return None,
        };
        Some(translated.to_owned())
    }
}

fn distance_bits(flags: &str) -> Option<&'static str> {
    match flags {
        "Gr" => Some("00"),
        "Bl" => Some("01"),
        "Wh" => Some("10"),
        _ => None,
    }
}

fn translate_move(flags: &str) -> Option<String> {
    let mut chars = flags.chars();
    let set_rp0 = match chars.next()? {
        'M' => '1',
        'm' => '0',
        _ => return None,
    };
    let min_distance = match chars.next()? {
        '>' => '1',
        '<' => '0',
        _ => return None,
    };
    let round = match chars.next()? {
        'R' => '1',
        'r' => '0',
        _ => return None,
    };
    let distance = distance_bits(chars.as_str())?;
    let mut result = String::with_capacity(5);
    result.extend([set_rp0, min_distance, round]);
    result.push_str(distance);
    Some(result)
}

/// The number of stack operands a statement may be followed by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operands {
    /// Any number, including none.
    Any,
    /// Exactly this many.
    Exactly(usize),
    /// At least this many.
    AtLeast(usize),
}

impl Operands {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Operands::Any => true,
            Operands::Exactly(n) => count == n,
            Operands::AtLeast(n) => count >= n,
        }
    }
}

impl std::fmt::Display for Operands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operands::Any => f.write_str("any number of"),
            Operands::Exactly(0) => f.write_str("no"),
            Operands::Exactly(n) => write!(f, "exactly {n}"),
            Operands::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// A single entry in the instruction table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstructionDef {
    pub mnemonic: &'static str,
    /// The opcode with all flag bits cleared, or `None` for pseudo
    /// instructions and directives that have no bytecode representation.
    pub opcode: Option<u8>,
    pub flags: FlagKind,
    pub operands: Operands,
}

impl InstructionDef {
    /// Returns `true` for `#`-prefixed push directives.
    pub fn is_directive(&self) -> bool {
        self.mnemonic.starts_with('#')
    }
}

const fn op(mnemonic: &'static str, opcode: u8) -> InstructionDef {
    flagged(mnemonic, opcode, FlagKind::None)
}

const fn flagged(mnemonic: &'static str, opcode: u8, flags: FlagKind) -> InstructionDef {
    InstructionDef {
        mnemonic,
        opcode: Some(opcode),
        flags,
        operands: Operands::Any,
    }
}

const fn delta(mnemonic: &'static str, opcode: u8) -> InstructionDef {
    InstructionDef {
        mnemonic,
        opcode: Some(opcode),
        flags: FlagKind::Delta,
        operands: Operands::Exactly(0),
    }
}

const fn pseudo(mnemonic: &'static str, flags: FlagKind, operands: Operands) -> InstructionDef {
    InstructionDef {
        mnemonic,
        opcode: None,
        flags,
        operands,
    }
}

/// Mnemonics of the raw push instructions. VTT assembly uses `#PUSH` instead.
pub const RAW_PUSHES: [&str; 4] = ["PUSHB", "PUSHW", "NPUSHB", "NPUSHW"];

pub const NPUSHB: u8 = 0x40;
pub const NPUSHW: u8 = 0x41;
pub const PUSHB: u8 = 0xB0;
pub const PUSHW: u8 = 0xB8;

static INSTRUCTIONS: &[InstructionDef] = &[
    flagged("SVTCA", 0x00, FlagKind::Axis),
    flagged("SPVTCA", 0x02, FlagKind::Axis),
    flagged("SFVTCA", 0x04, FlagKind::Axis),
    flagged("SPVTL", 0x06, FlagKind::Line),
    flagged("SFVTL", 0x08, FlagKind::Line),
    op("SPVFS", 0x0A),
    op("SFVFS", 0x0B),
    op("GPV", 0x0C),
    op("GFV", 0x0D),
    op("SFVTPV", 0x0E),
    op("ISECT", 0x0F),
    op("SRP0", 0x10),
    op("SRP1", 0x11),
    op("SRP2", 0x12),
    op("SZP0", 0x13),
    op("SZP1", 0x14),
    op("SZP2", 0x15),
    op("SZPS", 0x16),
    op("SLOOP", 0x17),
    op("RTG", 0x18),
    op("RTHG", 0x19),
    op("SMD", 0x1A),
    op("ELSE", 0x1B),
    op("JMPR", 0x1C),
    op("SCVTCI", 0x1D),
    op("SSWCI", 0x1E),
    op("SSW", 0x1F),
    op("DUP", 0x20),
    op("POP", 0x21),
    op("CLEAR", 0x22),
    op("SWAP", 0x23),
    op("DEPTH", 0x24),
    op("CINDEX", 0x25),
    op("MINDEX", 0x26),
    op("ALIGNPTS", 0x27),
    op("UTP", 0x29),
    op("LOOPCALL", 0x2A),
    op("CALL", 0x2B),
    op("FDEF", 0x2C),
    op("ENDF", 0x2D),
    flagged("MDAP", 0x2E, FlagKind::Round),
    flagged("IUP", 0x30, FlagKind::Axis),
    flagged("SHP", 0x32, FlagKind::RefPoint),
    flagged("SHC", 0x34, FlagKind::RefPoint),
    flagged("SHZ", 0x36, FlagKind::RefPoint),
    op("SHPIX", 0x38),
    op("IP", 0x39),
    flagged("MSIRP", 0x3A, FlagKind::SetRp0),
    op("ALIGNRP", 0x3C),
    op("RTDG", 0x3D),
    flagged("MIAP", 0x3E, FlagKind::Round),
    op("WS", 0x42),
    op("RS", 0x43),
    op("WCVTP", 0x44),
    op("RCVT", 0x45),
    flagged("GC", 0x46, FlagKind::Outline),
    op("SCFS", 0x48),
    flagged("MD", 0x49, FlagKind::Outline),
    op("MPPEM", 0x4B),
    op("MPS", 0x4C),
    op("FLIPON", 0x4D),
    op("FLIPOFF", 0x4E),
    op("DEBUG", 0x4F),
    op("LT", 0x50),
    op("LTEQ", 0x51),
    op("GT", 0x52),
    op("GTEQ", 0x53),
    op("EQ", 0x54),
    op("NEQ", 0x55),
    op("ODD", 0x56),
    op("EVEN", 0x57),
    op("IF", 0x58),
    op("EIF", 0x59),
    op("AND", 0x5A),
    op("OR", 0x5B),
    op("NOT", 0x5C),
    delta("DELTAP1", 0x5D),
    op("SDB", 0x5E),
    op("SDS", 0x5F),
    op("ADD", 0x60),
    op("SUB", 0x61),
    op("DIV", 0x62),
    op("MUL", 0x63),
    op("ABS", 0x64),
    op("NEG", 0x65),
    op("FLOOR", 0x66),
    op("CEILING", 0x67),
    flagged("ROUND", 0x68, FlagKind::Distance),
    flagged("NROUND", 0x6C, FlagKind::Distance),
    op("WCVTF", 0x70),
    delta("DELTAP2", 0x71),
    delta("DELTAP3", 0x72),
    delta("DELTAC1", 0x73),
    delta("DELTAC2", 0x74),
    delta("DELTAC3", 0x75),
    op("SROUND", 0x76),
    op("S45ROUND", 0x77),
    op("JROT", 0x78),
    op("JROF", 0x79),
    op("ROFF", 0x7A),
    op("RUTG", 0x7C),
    op("RDTG", 0x7D),
    op("SANGW", 0x7E),
    op("AA", 0x7F),
    op("FLIPPT", 0x80),
    op("FLIPRGON", 0x81),
    op("FLIPRGOFF", 0x82),
    op("SCANCTRL", 0x85),
    flagged("SDPVTL", 0x86, FlagKind::Line),
    op("GETINFO", 0x88),
    op("IDEF", 0x89),
    op("ROLL", 0x8A),
    op("MAX", 0x8B),
    op("MIN", 0x8C),
    op("SCANTYPE", 0x8D),
    op("INSTCTRL", 0x8E),
    op("GETVARIATION", 0x91),
    op("GETDATA", 0x92),
    flagged("MDRP", 0xC0, FlagKind::Move),
    flagged("MIRP", 0xE0, FlagKind::Move),
    // short spellings of the delta instructions, with ppem relative to
    // the delta base
    delta("DLTP1", 0x5D),
    delta("DLTP2", 0x71),
    delta("DLTP3", 0x72),
    delta("DLTC1", 0x73),
    delta("DLTC2", 0x74),
    delta("DLTC3", 0x75),
    // composite glyph component declarations
    pseudo("OFFSET", FlagKind::Round, Operands::Exactly(3)),
    pseudo("ANCHOR", FlagKind::None, Operands::Exactly(3)),
    pseudo("USEMYMETRICS", FlagKind::None, Operands::Exactly(0)),
    pseudo("OVERLAP", FlagKind::None, Operands::Exactly(0)),
    pseudo("SCALEDCOMPONENTOFFSET", FlagKind::None, Operands::Exactly(0)),
    pseudo("UNSCALEDCOMPONENTOFFSET", FlagKind::None, Operands::Exactly(0)),
    // push directives
    pseudo("#PUSHON", FlagKind::None, Operands::Exactly(0)),
    pseudo("#PUSHOFF", FlagKind::None, Operands::Exactly(0)),
    pseudo("#BEGIN", FlagKind::None, Operands::Exactly(0)),
    pseudo("#END", FlagKind::None, Operands::Exactly(0)),
    pseudo("#PUSH", FlagKind::None, Operands::AtLeast(1)),
];

/// Looks up the definition of the instruction with the given mnemonic.
pub fn lookup(mnemonic: &str) -> Option<&'static InstructionDef> {
    INSTRUCTIONS.iter().find(|def| def.mnemonic == mnemonic)
}
