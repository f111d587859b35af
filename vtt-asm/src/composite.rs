//! Component declarations of composite glyphs.
//!
//! A composite glyph's VTT program starts with one `OFFSET[]` or `ANCHOR[]`
//! declaration per component, optionally preceded by marker statements
//! such as `USEMYMETRICS[]`. These declarations mirror the component
//! records of the `glyf` table and are kept in sync with them.

use read_fonts::{
    tables::glyf::{self, Anchor, CompositeGlyphFlags},
    types::GlyphId16,
};
use thiserror::Error;
use write_fonts::tables::glyf::ComponentFlags;

/// A component positioned by an x/y offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OffsetComponent {
    /// The glyph id of the component.
    pub index: i32,
    pub x: i32,
    pub y: i32,
    pub round_to_grid: bool,
    pub use_my_metrics: bool,
    /// `Some(true)` for `SCALEDCOMPONENTOFFSET[]`, `Some(false)` for
    /// `UNSCALEDCOMPONENTOFFSET[]`.
    pub scaled_offset: Option<bool>,
}

/// A component positioned by matching a point of the glyph built so far
/// with a point of the component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnchorComponent {
    pub index: i32,
    /// The point in the composite glyph.
    pub first: i32,
    /// The point in the component.
    pub second: i32,
    pub use_my_metrics: bool,
    pub scaled_offset: Option<bool>,
}

/// A component declared in VTT assembly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Component {
    Offset(OffsetComponent),
    Anchor(AnchorComponent),
}

impl Component {
    pub fn index(&self) -> i32 {
        match self {
            Component::Offset(offset) => offset.index,
            Component::Anchor(anchor) => anchor.index,
        }
    }

    pub fn use_my_metrics(&self) -> bool {
        match self {
            Component::Offset(offset) => offset.use_my_metrics,
            Component::Anchor(anchor) => anchor.use_my_metrics,
        }
    }

    pub fn scaled_offset(&self) -> Option<bool> {
        match self {
            Component::Offset(offset) => offset.scaled_offset,
            Component::Anchor(anchor) => anchor.scaled_offset,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Component::Offset(_) => "OFFSET",
            Component::Anchor(_) => "ANCHOR",
        }
    }
}

/// A component record as stored in the glyph outline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutlineComponent {
    pub glyph: GlyphId16,
    pub anchor: Anchor,
    pub flags: CompositeGlyphFlags,
}

impl OutlineComponent {
    fn kind(&self) -> &'static str {
        match self.anchor {
            Anchor::Offset { .. } => "OFFSET",
            Anchor::Point { .. } => "ANCHOR",
        }
    }

    /// Replaces the flags that can be set by hand, keeping those that
    /// describe the record's encoding.
    pub fn set_flags(&mut self, flags: ComponentFlags) {
        self.flags.remove(
            CompositeGlyphFlags::ROUND_XY_TO_GRID
                | CompositeGlyphFlags::USE_MY_METRICS
                | CompositeGlyphFlags::OVERLAP_COMPOUND
                | CompositeGlyphFlags::SCALED_COMPONENT_OFFSET
                | CompositeGlyphFlags::UNSCALED_COMPONENT_OFFSET,
        );
        self.flags.insert(flags.into());
    }
}

impl From<glyf::Component> for OutlineComponent {
    fn from(src: glyf::Component) -> Self {
        OutlineComponent {
            glyph: src.glyph,
            anchor: src.anchor,
            flags: src.flags,
        }
    }
}

impl From<&write_fonts::tables::glyf::Component> for OutlineComponent {
    fn from(src: &write_fonts::tables::glyf::Component) -> Self {
        OutlineComponent {
            glyph: src.glyph,
            anchor: src.anchor,
            flags: src.flags.into(),
        }
    }
}

/// A mismatch between the declared and the actual components of a glyph.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvalidComposite {
    #[error("'{glyph}' has incorrect number of components: expected {expected}, found {found}")]
    ComponentCount {
        glyph: String,
        expected: usize,
        found: usize,
    },
    #[error("component {component} of '{glyph}' has incorrect index: expected {expected}, found {found}")]
    Index {
        glyph: String,
        component: usize,
        expected: i32,
        found: i32,
    },
    #[error("component {component} of '{glyph}' has incorrect type: expected {expected}, found {found}")]
    Kind {
        glyph: String,
        component: usize,
        expected: &'static str,
        found: &'static str,
    },
    #[error("component {component} of '{glyph}' has wrong {axis} offset: expected {expected}, found {found}")]
    Offset {
        glyph: String,
        component: usize,
        axis: char,
        expected: i32,
        found: i32,
    },
    #[error("component {component} of '{glyph}' has wrong {which} anchor point: expected {expected}, found {found}")]
    AnchorPoint {
        glyph: String,
        component: usize,
        which: &'static str,
        expected: i32,
        found: i32,
    },
    #[error("component {component} of '{glyph}' has wrong {flag} flag")]
    Flag {
        glyph: String,
        component: usize,
        flag: &'static str,
    },
}

/// A glyph program split around its component declarations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompositeInfo {
    /// Text up to the last declaration, with the declarations removed.
    pub head: String,
    /// The declarations, regenerated from the outline.
    pub declarations: String,
    /// Text after the last declaration.
    pub tail: String,
}

impl std::fmt::Display for CompositeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.head, self.declarations, self.tail)
    }
}

/// Splits a glyph program into the text before and after its component
/// declarations, dropping the declarations themselves.
///
/// A declaration is only recognized at the start of a line. It is removed
/// along with a single line terminator following it.
pub fn split_composite_info(text: &str) -> (String, String) {
    let mut head = String::new();
    let mut consumed = 0;
    let line_starts =
        std::iter::once(0).chain(text.match_indices('\n').map(|(pos, _)| pos + 1));
    for start in line_starts {
        if start < consumed {
            continue;
        }
        if let Some(len) = declaration_len(&text[start..]) {
            head.push_str(&text[consumed..start]);
            consumed = start + len;
        }
    }
    (head, text[consumed..].to_owned())
}

const MARKERS: [&str; 4] = [
    "USEMYMETRICS[]",
    "OVERLAP[]",
    "SCALEDCOMPONENTOFFSET[]",
    "UNSCALEDCOMPONENTOFFSET[]",
];

/// The length of the declaration at the start of `line`, if any.
fn declaration_len(line: &str) -> Option<usize> {
    let len = MARKERS
        .iter()
        .find(|marker| line.starts_with(*marker))
        .map(|marker| marker.len())
        .or_else(|| {
            ["ANCHOR[]", "OFFSET[R]", "OFFSET[r]"]
                .iter()
                .find_map(|prefix| {
                    let rest = line.strip_prefix(prefix)?;
                    Some(prefix.len() + operands_len(rest, 3)?)
                })
        })?;
    let terminator = matches!(line.as_bytes().get(len), Some(b'\r' | b'\n'));
    Some(len + terminator as usize)
}

/// The length of exactly `count` operands of the form `, -12`.
fn operands_len(text: &str, count: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut pos = 0;
    for _ in 0..count {
        if bytes.get(pos) != Some(&b',') {
            return None;
        }
        pos += 1;
        while bytes.get(pos) == Some(&b' ') {
            pos += 1;
        }
        if bytes.get(pos) == Some(&b'-') {
            pos += 1;
        }
        let digits = pos;
        while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
            pos += 1;
        }
        if pos == digits {
            return None;
        }
    }
    Some(pos)
}

/// Writes the declarations matching the given outline components.
///
/// The scaled offset markers are only understood by VTT 6 and later.
pub fn composite_declarations(components: &[OutlineComponent], vtt_version: u16) -> String {
    let mut out = String::new();
    for component in components {
        let flags = component.flags;
        if flags.contains(CompositeGlyphFlags::USE_MY_METRICS) {
            out.push_str("USEMYMETRICS[]\n");
        }
        if vtt_version >= 6 {
            if flags.contains(CompositeGlyphFlags::SCALED_COMPONENT_OFFSET) {
                out.push_str("SCALEDCOMPONENTOFFSET[]\n");
            }
            if flags.contains(CompositeGlyphFlags::UNSCALED_COMPONENT_OFFSET) {
                out.push_str("UNSCALEDCOMPONENTOFFSET[]\n");
            }
        }
        let index = component.glyph.to_u16();
        match component.anchor {
            Anchor::Point { base, component } => {
                out.push_str(&format!("ANCHOR[], {index}, {base}, {component}\n"));
            }
            Anchor::Offset { x, y } => {
                let round = if flags.contains(CompositeGlyphFlags::ROUND_XY_TO_GRID) {
                    'R'
                } else {
                    'r'
                };
                out.push_str(&format!("OFFSET[{round}], {index}, {x}, {y}\n"));
            }
        }
    }
    out
}

/// Replaces the component declarations of a glyph program with ones
/// generated from the outline.
pub fn write_composite_info(
    components: &[OutlineComponent],
    text: &str,
    vtt_version: u16,
) -> CompositeInfo {
    let (head, tail) = split_composite_info(text);
    CompositeInfo {
        head,
        declarations: composite_declarations(components, vtt_version),
        tail,
    }
}

/// Checks that the declared components agree with the outline.
///
/// Flags are only compared when `check_flags` is set.
pub fn check_composite_info(
    glyph: &str,
    outline: &[OutlineComponent],
    declared: &[Component],
    check_flags: bool,
) -> Result<(), InvalidComposite> {
    check_count(glyph, outline, declared)?;
    for (i, (actual, declared)) in outline.iter().zip(declared).enumerate() {
        let expected = actual.glyph.to_u16() as i32;
        if declared.index() != expected {
            return Err(InvalidComposite::Index {
                glyph: glyph.into(),
                component: i,
                expected,
                found: declared.index(),
            });
        }
        match (actual.anchor, declared) {
            (Anchor::Offset { x, y }, Component::Offset(offset)) => {
                for (axis, expected, found) in [('x', x, offset.x), ('y', y, offset.y)] {
                    if expected as i32 != found {
                        return Err(InvalidComposite::Offset {
                            glyph: glyph.into(),
                            component: i,
                            axis,
                            expected: expected as i32,
                            found,
                        });
                    }
                }
                if check_flags
                    && actual.flags.contains(CompositeGlyphFlags::ROUND_XY_TO_GRID)
                        != offset.round_to_grid
                {
                    return Err(flag_error(glyph, i, "ROUND_XY_TO_GRID"));
                }
            }
            (Anchor::Point { base, component }, Component::Anchor(anchor)) => {
                for (which, expected, found) in [
                    ("first", base, anchor.first),
                    ("second", component, anchor.second),
                ] {
                    if expected as i32 != found {
                        return Err(InvalidComposite::AnchorPoint {
                            glyph: glyph.into(),
                            component: i,
                            which,
                            expected: expected as i32,
                            found,
                        });
                    }
                }
            }
            _ => {
                return Err(InvalidComposite::Kind {
                    glyph: glyph.into(),
                    component: i,
                    expected: actual.kind(),
                    found: declared.kind(),
                })
            }
        }
        if check_flags {
            check_flags_match(glyph, i, actual.flags, declared)?;
        }
    }
    Ok(())
}

fn check_count(
    glyph: &str,
    outline: &[OutlineComponent],
    declared: &[Component],
) -> Result<(), InvalidComposite> {
    if outline.len() != declared.len() {
        return Err(InvalidComposite::ComponentCount {
            glyph: glyph.into(),
            expected: outline.len(),
            found: declared.len(),
        });
    }
    Ok(())
}

fn check_flags_match(
    glyph: &str,
    component: usize,
    flags: CompositeGlyphFlags,
    declared: &Component,
) -> Result<(), InvalidComposite> {
    let scaled = declared.scaled_offset();
    let checks = [
        (
            CompositeGlyphFlags::USE_MY_METRICS,
            declared.use_my_metrics(),
            "USE_MY_METRICS",
        ),
        (
            CompositeGlyphFlags::SCALED_COMPONENT_OFFSET,
            scaled == Some(true),
            "SCALED_COMPONENT_OFFSET",
        ),
        (
            CompositeGlyphFlags::UNSCALED_COMPONENT_OFFSET,
            scaled == Some(false),
            "UNSCALED_COMPONENT_OFFSET",
        ),
    ];
    for (flag, expected, name) in checks {
        if flags.contains(flag) != expected {
            return Err(flag_error(glyph, component, name));
        }
    }
    Ok(())
}

fn flag_error(glyph: &str, component: usize, flag: &'static str) -> InvalidComposite {
    InvalidComposite::Flag {
        glyph: glyph.into(),
        component,
        flag,
    }
}

/// Computes the outline flags requested by the declarations.
///
/// Only the flags a declaration can express are changed: use-my-metrics,
/// rounding of offsets and, for VTT 6 and later, the scaled offset choice.
/// Anchored components keep their rounding flag.
pub fn set_components_flags(
    glyph: &str,
    outline: &[OutlineComponent],
    declared: &[Component],
    vtt_version: u16,
) -> Result<Vec<ComponentFlags>, InvalidComposite> {
    check_count(glyph, outline, declared)?;
    Ok(outline
        .iter()
        .zip(declared)
        .map(|(actual, declared)| {
            let mut flags = ComponentFlags::from(actual.flags);
            flags.use_my_metrics = declared.use_my_metrics();
            if let Component::Offset(offset) = declared {
                flags.round_xy_to_grid = offset.round_to_grid;
            }
            if vtt_version >= 6 {
                if let Some(scaled) = declared.scaled_offset() {
                    flags.scaled_component_offset = scaled;
                    flags.unscaled_component_offset = !scaled;
                }
            }
            flags
        })
        .collect())
}
