//! Compiling VTT hinting assembly
//!
//! Visual TrueType stores hand-written hinting programs in a friendlier
//! dialect of TrueType assembly: operands are written next to the
//! instructions that consume them, flags can be spelled with letters,
//! delta hints are written as `(point @ppem step)` triples, and composite
//! glyphs declare their components in their programs.
//!
//! This crate lowers that dialect to plain instruction stream assembly
//! ([`transform_assembly`]), assembles the result into TrueType bytecode
//! ([`assemble`]) and keeps the component declarations of composite glyphs
//! in sync with their outlines ([`check_composite_info`],
//! [`write_composite_info`]). The drivers in [`compile`] do all of this for
//! a whole font, accessed through the [`FontProvider`] trait.
//!
//! # Example
//!
//! ```
//! let mut components = Vec::new();
//! let assembly =
//!     vtt_asm::transform_assembly("SVTCA[Y]\nMIAP[R], 3, 12", &mut components).unwrap();
//! assert_eq!(assembly, "PUSH[] 3 12\nSVTCA[0]\nMIAP[1]");
//! let bytecode = vtt_asm::assemble(&assembly).unwrap();
//! assert_eq!(bytecode, [0xB1, 3, 12, 0x00, 0x3F]);
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![forbid(unsafe_code)]

pub mod bytecode;
pub mod compile;
pub mod composite;
pub mod delta;
mod error;
pub mod instructions;
pub mod parse;
pub mod provider;
pub mod scope;
pub mod transform;

pub use bytecode::{assemble, format_bytecode, AssembleError};
pub use compile::{
    compile_instructions, make_glyph_program, make_program, normalize_glyph_program,
    normalize_programs, update_composites, CompileOptions, CompileSummary,
};
pub use composite::{
    check_composite_info, set_components_flags, split_composite_info, write_composite_info,
    AnchorComponent, Component, CompositeInfo, InvalidComposite, OffsetComponent,
    OutlineComponent,
};
pub use error::Error;
pub use parse::{tokenize, ParseError, Token};
pub use provider::{ExtraProgram, FontProvider, InstructionTarget, MemoryFont};
pub use scope::ScopeImbalance;
pub use transform::transform_assembly;
