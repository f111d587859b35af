//! Encoding delta hints as stack operands.
//!
//! Each delta is pushed as a pair of values: the point (or CVT) number and
//! an argument byte whose high nibble is the ppem relative to the delta base
//! and whose low nibble selects the magnitude of the move. The pairs are
//! followed by their count.
//!
//! See <https://learn.microsoft.com/en-us/typography/opentype/spec/tt_instructions#managing-exceptions>

use std::ops::RangeInclusive;

use indexmap::IndexMap;

use crate::parse::{DeltaSpec, ParseErrorKind};

/// The default delta base assumed for the absolute `DELTAP`/`DELTAC` spelling.
const DELTA_BASE: i32 = 9;

/// Relative ppem values whose packed argument still fits in a pushed word.
const PACKABLE_PPEM: RangeInclusive<i32> = (i16::MIN as i32 >> 4)..=(i16::MAX as i32 >> 4);

/// What a delta instruction moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeltaTarget {
    Point,
    Cvt,
}

/// One of the six delta instructions, in either of its VTT spellings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DeltaInstruction {
    pub target: DeltaTarget,
    /// 1, 2 or 3; each generation covers 16 consecutive sizes.
    pub generation: u8,
    /// `true` for the short `DLTP`/`DLTC` spelling, whose ppem values are
    /// already relative to the start of the generation.
    pub relative: bool,
}

impl DeltaInstruction {
    /// Recognizes `DLTP1`..`DLTP3`, `DLTC1`..`DLTC3` and their long
    /// `DELTAP`/`DELTAC` forms.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        let (relative, rest) = match mnemonic.strip_prefix("DLT") {
            Some(rest) => (true, rest),
            None => (false, mnemonic.strip_prefix("DELTA")?),
        };
        let target = match rest.as_bytes().first()? {
            b'P' => DeltaTarget::Point,
            b'C' => DeltaTarget::Cvt,
            _ => return None,
        };
        let generation = match &rest[1..] {
            "1" => 1,
            "2" => 2,
            "3" => 3,
            _ => return None,
        };
        Some(DeltaInstruction {
            target,
            generation,
            relative,
        })
    }

    /// The long form of the mnemonic, as used in the instruction stream.
    pub fn mnemonic(self) -> &'static str {
        match (self.target, self.generation) {
            (DeltaTarget::Point, 1) => "DELTAP1",
            (DeltaTarget::Point, 2) => "DELTAP2",
            (DeltaTarget::Point, _) => "DELTAP3",
            (DeltaTarget::Cvt, 1) => "DELTAC1",
            (DeltaTarget::Cvt, 2) => "DELTAC2",
            (DeltaTarget::Cvt, _) => "DELTAC3",
        }
    }

    /// The amount subtracted from the ppem values of this instruction
    /// before packing.
    pub fn ppem_base(self) -> i32 {
        if self.relative {
            0
        } else {
            DELTA_BASE + 16 * (self.generation as i32 - 1)
        }
    }

    /// Returns the operands for these deltas, bottom of the stack first.
    ///
    /// Deltas are grouped by point, with points ordered by where they first
    /// appear when reading the deltas backwards, and each group is sorted by
    /// size and step in descending order. The delta count ends up on top.
    ///
    /// A ppem outside of the 16 sizes the instruction covers is still
    /// encoded, with a warning; one too far off to be pushed at all is an
    /// error.
    pub fn encode(self, deltas: &[DeltaSpec]) -> Result<Vec<i32>, ParseErrorKind> {
        let mut by_point: IndexMap<i32, Vec<(i32, i32)>> = IndexMap::new();
        for delta in deltas.iter().rev() {
            by_point
                .entry(delta.point_index)
                .or_default()
                .push((delta.rel_ppem, delta.step_no));
        }

        let base = self.ppem_base();
        let mut pairs = Vec::with_capacity(deltas.len());
        for (point_index, mut specs) in by_point {
            specs.sort_by(|a, b| b.cmp(a));
            for (ppem, step_no) in specs {
                let rel_ppem = ppem
                    .checked_sub(base)
                    .filter(|rel| PACKABLE_PPEM.contains(rel))
                    .ok_or_else(|| ParseErrorKind::DeltaPpemOutOfRange {
                        mnemonic: self.mnemonic().into(),
                        ppem,
                    })?;
                if !(0..16).contains(&rel_ppem) {
                    log::warn!(
                        "{} ppem {ppem} for point {point_index} is outside of its range",
                        self.mnemonic()
                    );
                }
                pairs.push((point_index, pack_selector(rel_ppem, step_no)));
            }
        }

        // the first pair is popped first, so it must sit right below the count
        let mut operands: Vec<i32> = pairs
            .into_iter()
            .rev()
            .flat_map(|(point_index, arg)| [arg, point_index])
            .collect();
        operands.push(deltas.len() as i32);
        Ok(operands)
    }
}

/// Packs a relative ppem and a step into a delta argument.
///
/// Steps -8..=-1 map to selectors 0..=7 and steps 1..=8 to 8..=15.
pub fn pack_selector(rel_ppem: i32, step_no: i32) -> i32 {
    let selector = if step_no > 0 { step_no + 7 } else { step_no + 8 };
    (rel_ppem << 4) | selector
}

/// The inverse of [`pack_selector`], returning `(rel_ppem, step_no)`.
pub fn unpack_selector(arg: i32) -> (i32, i32) {
    let selector = arg & 0xF;
    let step_no = if selector >= 8 {
        selector - 7
    } else {
        selector - 8
    };
    (arg >> 4, step_no)
}
