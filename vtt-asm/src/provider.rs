//! Access to the programs and outlines of a font.
//!
//! The compilation drivers only see a font through [`FontProvider`]; reading
//! and writing the actual font tables is left to the implementor.
//! [`MemoryFont`] keeps everything in memory.

use std::str::FromStr;

use indexmap::IndexMap;
use read_fonts::{tables::glyf::CompositeGlyph, types::Tag, FontData, FontRead, ReadError};
use write_fonts::tables::glyf::ComponentFlags;

use crate::{composite::OutlineComponent, error::Error};

/// A program that is not attached to a glyph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtraProgram {
    /// The control program, listing control values.
    Cvt,
    /// The pre-program, stored as `ppgm`.
    Prep,
    /// The font program.
    Fpgm,
}

impl ExtraProgram {
    /// Resolves one of the names a program is known by.
    ///
    /// `cvt` and `cvt ` name the control program, `prep` and `ppgm` the
    /// pre-program, and `fpgm` the font program.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "cvt" | "cvt " => Ok(ExtraProgram::Cvt),
            "prep" | "ppgm" => Ok(ExtraProgram::Prep),
            "fpgm" => Ok(ExtraProgram::Fpgm),
            _ => Err(Error::Argument(format!("invalid program name '{name}'"))),
        }
    }

    /// The name the program's source is stored under.
    pub fn name(self) -> &'static str {
        match self {
            ExtraProgram::Cvt => "cvt",
            ExtraProgram::Prep => "ppgm",
            ExtraProgram::Fpgm => "fpgm",
        }
    }

    /// The table that receives the compiled program.
    pub fn table_tag(self) -> Tag {
        match self {
            ExtraProgram::Cvt => Tag::new(b"cvt "),
            ExtraProgram::Prep => Tag::new(b"prep"),
            ExtraProgram::Fpgm => Tag::new(b"fpgm"),
        }
    }
}

impl FromStr for ExtraProgram {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExtraProgram::from_name(s)
    }
}

/// Where compiled bytecode goes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstructionTarget<'a> {
    Program(ExtraProgram),
    Glyph(&'a str),
}

/// The parts of a font that VTT programs are compiled against.
pub trait FontProvider {
    /// The source of an extra program, with `\n` line endings.
    fn program(&self, program: ExtraProgram) -> Option<String>;

    fn set_program(&mut self, program: ExtraProgram, text: &str);

    /// The source of a glyph's program, with `\n` line endings.
    fn glyph_program(&self, glyph: &str) -> Option<String>;

    fn set_glyph_program(&mut self, glyph: &str, text: &str);

    fn glyph_order(&self) -> Vec<String>;

    /// The components of a composite glyph.
    ///
    /// Returns `None` for simple glyphs and glyphs not in the font.
    fn outline_components(&self, glyph: &str) -> Option<Vec<OutlineComponent>>;

    /// Updates the flags of a composite glyph's components, in order.
    fn apply_component_flags(&mut self, glyph: &str, flags: &[ComponentFlags]);

    fn set_instructions(&mut self, target: InstructionTarget<'_>, bytecode: Vec<u8>);
}

/// A font held in memory.
///
/// Program sources are stored the way VTT stores them: lines separated by
/// `\r`, without trailing whitespace, and with a single final `\r`.
#[derive(Clone, Debug, Default)]
pub struct MemoryFont {
    glyph_order: Vec<String>,
    programs: IndexMap<ExtraProgram, String>,
    glyph_programs: IndexMap<String, String>,
    composites: IndexMap<String, Vec<OutlineComponent>>,
    program_instructions: IndexMap<ExtraProgram, Vec<u8>>,
    glyph_instructions: IndexMap<String, Vec<u8>>,
}

impl MemoryFont {
    pub fn new<S: Into<String>>(glyph_order: impl IntoIterator<Item = S>) -> Self {
        MemoryFont {
            glyph_order: glyph_order.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Marks `glyph` as a composite made of these components.
    pub fn add_composite(&mut self, glyph: &str, components: Vec<OutlineComponent>) {
        self.composites.insert(glyph.to_owned(), components);
    }

    /// Marks `glyph` as a composite, reading its components from `glyf`
    /// glyph data.
    pub fn add_composite_data(&mut self, glyph: &str, data: &[u8]) -> Result<(), ReadError> {
        let composite = CompositeGlyph::read(FontData::new(data))?;
        let components = composite.components().map(Into::into).collect();
        self.add_composite(glyph, components);
        Ok(())
    }

    /// The program as stored, with `\r` line endings.
    pub fn stored_glyph_program(&self, glyph: &str) -> Option<&str> {
        self.glyph_programs.get(glyph).map(String::as_str)
    }

    pub fn instructions(&self, target: InstructionTarget<'_>) -> Option<&[u8]> {
        let bytecode = match target {
            InstructionTarget::Program(program) => self.program_instructions.get(&program),
            InstructionTarget::Glyph(glyph) => self.glyph_instructions.get(glyph),
        };
        bytecode.map(Vec::as_slice)
    }
}

impl FontProvider for MemoryFont {
    fn program(&self, program: ExtraProgram) -> Option<String> {
        self.programs.get(&program).map(|text| load_text(text))
    }

    fn set_program(&mut self, program: ExtraProgram, text: &str) {
        self.programs.insert(program, store_text(text));
    }

    fn glyph_program(&self, glyph: &str) -> Option<String> {
        self.glyph_programs.get(glyph).map(|text| load_text(text))
    }

    fn set_glyph_program(&mut self, glyph: &str, text: &str) {
        self.glyph_programs.insert(glyph.to_owned(), store_text(text));
    }

    fn glyph_order(&self) -> Vec<String> {
        self.glyph_order.clone()
    }

    fn outline_components(&self, glyph: &str) -> Option<Vec<OutlineComponent>> {
        self.composites.get(glyph).cloned()
    }

    fn apply_component_flags(&mut self, glyph: &str, flags: &[ComponentFlags]) {
        if let Some(components) = self.composites.get_mut(glyph) {
            for (component, flags) in components.iter_mut().zip(flags) {
                component.set_flags(*flags);
            }
        }
    }

    fn set_instructions(&mut self, target: InstructionTarget<'_>, bytecode: Vec<u8>) {
        match target {
            InstructionTarget::Program(program) => {
                self.program_instructions.insert(program, bytecode);
            }
            InstructionTarget::Glyph(glyph) => {
                self.glyph_instructions.insert(glyph.to_owned(), bytecode);
            }
        }
    }
}

fn store_text(text: &str) -> String {
    let lines: Vec<_> = split_lines(text).collect();
    let mut stored = lines.join("\r").trim_end().to_owned();
    stored.push('\r');
    stored
}

fn load_text(text: &str) -> String {
    text.replace('\r', "\n")
}

/// Splits on `\n`, `\r` and `\r\n`, without a trailing empty line.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(text).filter(|text| !text.is_empty());
    std::iter::from_fn(move || {
        let text = rest?;
        match text.find(['\r', '\n']) {
            Some(end) => {
                let skip = if text[end..].starts_with("\r\n") { 2 } else { 1 };
                rest = Some(&text[end + skip..]).filter(|rest| !rest.is_empty());
                Some(&text[..end])
            }
            None => {
                rest = None;
                Some(text)
            }
        }
    })
}
