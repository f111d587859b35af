//! Compiling the VTT programs of a font.

use std::sync::LazyLock;

use regex::Regex;

use crate::{
    bytecode::assemble,
    composite::{
        check_composite_info, set_components_flags, write_composite_info, Component,
        InvalidComposite,
    },
    error::Error,
    provider::{ExtraProgram, FontProvider, InstructionTarget},
    transform::transform_assembly,
};

/// Options for compiling a font.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompileOptions {
    /// The major version of VTT the sources were written with.
    pub vtt_version: u16,
    /// Also require the component flags declared in glyph programs to
    /// match the outline.
    pub check_flags: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            vtt_version: 6,
            check_flags: false,
        }
    }
}

/// What happened while compiling a font.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompileSummary {
    /// Glyphs that received instructions.
    pub compiled: Vec<String>,
    /// Glyphs declaring components without being composites; their
    /// programs were cleared.
    pub dropped: Vec<String>,
    /// Composite glyphs whose declarations do not match the outline.
    pub invalid_composites: Vec<InvalidComposite>,
}

/// Compiles a single program to bytecode.
///
/// Components declared in the program are appended to `components`.
pub fn make_program(
    text: &str,
    name: &str,
    components: &mut Vec<Component>,
) -> Result<Vec<u8>, Error> {
    let assembly = transform_assembly(text, components).map_err(|err| {
        if let Error::Parse(parse_err) = &err {
            log::error!("an error occurred while parsing '{name}' program:\n{parse_err}");
        }
        err.in_program(name)
    })?;
    log::debug!("assembling '{name}'");
    assemble(&assembly).map_err(|err| Error::from(err).in_program(name))
}

/// Compiles a glyph program, returning its bytecode and the components it
/// declares.
pub fn make_glyph_program(text: &str, name: &str) -> Result<(Vec<u8>, Vec<Component>), Error> {
    let mut components = Vec::new();
    let bytecode = make_program(text, name, &mut components)?;
    Ok((bytecode, components))
}

/// Compiles the pre-program, the font program and every glyph program.
///
/// Glyphs whose component declarations do not match their outline are
/// reported in the summary and left uncompiled; other errors abort.
pub fn compile_instructions(
    font: &mut impl FontProvider,
    options: &CompileOptions,
) -> Result<CompileSummary, Error> {
    for program in [ExtraProgram::Prep, ExtraProgram::Fpgm] {
        let text = font.program(program).ok_or_else(|| Error::MissingProgram {
            kind: "extra",
            name: program.name().to_owned(),
        })?;
        let bytecode = make_program(&text, program.name(), &mut Vec::new())?;
        log::debug!("'{}': {} bytes", program.table_tag(), bytecode.len());
        font.set_instructions(InstructionTarget::Program(program), bytecode);
    }

    let mut summary = CompileSummary::default();
    for glyph in font.glyph_order() {
        let Some(text) = font.glyph_program(&glyph) else {
            continue;
        };
        let (bytecode, components) = make_glyph_program(&text, &glyph)?;
        if !components.is_empty() {
            let Some(outline) = font.outline_components(&glyph) else {
                log::warn!(
                    "glyph '{glyph}' declares components but is not a composite; \
                     dropping its assembly"
                );
                font.set_glyph_program(&glyph, "");
                summary.dropped.push(glyph);
                continue;
            };
            let flags = check_composite_info(&glyph, &outline, &components, options.check_flags)
                .and_then(|_| {
                    set_components_flags(&glyph, &outline, &components, options.vtt_version)
                });
            match flags {
                Ok(flags) => font.apply_component_flags(&glyph, &flags),
                Err(err) => {
                    log::error!("skipping '{glyph}': {err}");
                    summary.invalid_composites.push(err);
                    continue;
                }
            }
        }
        if !bytecode.is_empty() {
            font.set_instructions(InstructionTarget::Glyph(&glyph), bytecode);
            summary.compiled.push(glyph);
        }
    }
    Ok(summary)
}

/// Rewrites the component declarations of glyph programs from the outline.
///
/// Only the named glyphs are updated, or all of them if `glyphs` is `None`.
/// Composites without a program get one; simple glyphs whose programs
/// declare components have them cleared.
pub fn update_composites(
    font: &mut impl FontProvider,
    glyphs: Option<&[String]>,
    vtt_version: u16,
) -> Result<(), Error> {
    let glyphs = match glyphs {
        Some(glyphs) => glyphs.to_vec(),
        None => font.glyph_order(),
    };
    for glyph in glyphs {
        let mut declared = Vec::new();
        let text = match font.glyph_program(&glyph) {
            Some(text) => {
                transform_assembly(&text, &mut declared).map_err(|err| err.in_program(&glyph))?;
                text
            }
            None => String::new(),
        };
        let Some(outline) = font.outline_components(&glyph) else {
            if !declared.is_empty() {
                log::warn!(
                    "glyph '{glyph}' declares components but is not a composite; \
                     dropping its assembly"
                );
                font.set_glyph_program(&glyph, "");
            }
            continue;
        };
        let info = write_composite_info(&outline, &text, vtt_version);
        font.set_glyph_program(&glyph, &info.to_string());
    }
    Ok(())
}

/// Matches a whole `/* ... */` comment with the given body, along with the
/// line breaks after it.
fn comment_regex(body: &str) -> Regex {
    Regex::new(&format!(r"/\*{body}\*/[\r\n]*")).expect("valid comment pattern")
}

/// `/* VTT 6.35 compiler Fri Jun 10 15:22:01 2022 */`, keeping the version.
static VTT_COMPILER: LazyLock<Regex> =
    LazyLock::new(|| comment_regex(r" (VTT [0-9]+\.[0-9][0-9A-Z]* compiler) .*?"));

/// `/* TT glyph 3, char 0x61 (a) */`
static GLYPH_INDEX: LazyLock<Regex> =
    LazyLock::new(|| comment_regex(r" (?:TT|VTTTalk) glyph [0-9]+.*?"));

/// Strips the comments VTT stamps into a glyph program.
///
/// The compiler comment loses its timestamp and the glyph index comment is
/// removed, so that the program only changes when its instructions do.
pub fn normalize_glyph_program(text: &str) -> String {
    let text = VTT_COMPILER.replace_all(text, "/* $1 */\n");
    GLYPH_INDEX.replace_all(&text, "").into_owned()
}

/// Normalizes the comments of the cvt, prep and fpgm programs and of every
/// glyph program in the font.
///
/// Returns the number of programs that changed.
pub fn normalize_programs(font: &mut impl FontProvider) -> usize {
    let mut changed = 0;
    for program in [ExtraProgram::Cvt, ExtraProgram::Prep, ExtraProgram::Fpgm] {
        let Some(text) = font.program(program) else {
            continue;
        };
        let normalized = VTT_COMPILER.replace_all(&text, "/* $1 */\n");
        if normalized != text {
            font.set_program(program, &normalized);
            changed += 1;
        }
    }
    for glyph in font.glyph_order() {
        let Some(text) = font.glyph_program(&glyph) else {
            continue;
        };
        let normalized = normalize_glyph_program(&text);
        if normalized != text {
            font.set_glyph_program(&glyph, &normalized);
            changed += 1;
        }
    }
    log::debug!("normalized {changed} programs");
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use read_fonts::{
        tables::glyf::{Anchor, CompositeGlyphFlags},
        types::GlyphId16,
    };

    use crate::{
        composite::OutlineComponent,
        parse::ParseErrorKind,
        provider::MemoryFont,
    };

    fn font_with_programs() -> MemoryFont {
        let mut font = MemoryFont::new([".notdef", "a", "acute", "aacute"]);
        font.set_program(ExtraProgram::Prep, "SVTCA[Y]\nCALL[], 0");
        font.set_program(ExtraProgram::Fpgm, "FDEF[], 0\nRTG[]\nENDF[]");
        font
    }

    #[test]
    fn program_errors_carry_the_name() {
        let err = make_program("SVTCA[Y]\nFOO[]", "a", &mut Vec::new()).unwrap_err();
        assert!(err.to_string().starts_with("failed to compile 'a': "));
        match err.root() {
            Error::Parse(err) => {
                assert_eq!(err.kind, ParseErrorKind::UnknownMnemonic("FOO".into()))
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn glyph_program_with_components() {
        let (bytecode, components) =
            make_glyph_program("OFFSET[R], 1, 0, 0\nSVTCA[Y]\nMDAP[R], 3", "aacute").unwrap();
        assert_eq!(bytecode, [0xB0, 3, 0x00, 0x2F]);
        assert_eq!(components.len(), 1);
    }

    #[test]
    fn missing_programs() {
        let mut font = MemoryFont::new(["a"]);
        font.set_program(ExtraProgram::Prep, "");
        let err = compile_instructions(&mut font, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingProgram { kind: "extra", ref name } if name == "fpgm"));
    }

    #[test]
    fn compiles_programs_and_glyphs() {
        let mut font = font_with_programs();
        font.set_glyph_program("a", "SVTCA[Y]\nMDAP[R], 3\n");
        font.set_glyph_program("acute", "");
        let summary = compile_instructions(&mut font, &CompileOptions::default()).unwrap();
        assert_eq!(summary.compiled, ["a"]);
        assert_eq!(
            font.instructions(InstructionTarget::Program(ExtraProgram::Prep)),
            Some(&[0xB0, 0, 0x00, 0x2B][..])
        );
        assert_eq!(
            font.instructions(InstructionTarget::Program(ExtraProgram::Fpgm)),
            Some(&[0xB0, 0, 0x2C, 0x18, 0x2D][..])
        );
        assert_eq!(
            font.instructions(InstructionTarget::Glyph("a")),
            Some(&[0xB0, 3, 0x00, 0x2F][..])
        );
        assert_eq!(font.instructions(InstructionTarget::Glyph("acute")), None);
    }

    #[test]
    fn components_on_simple_glyph_are_dropped() {
        let mut font = font_with_programs();
        font.set_glyph_program("a", "OFFSET[R], 2, 0, 0\nRTG[]");
        let summary = compile_instructions(&mut font, &CompileOptions::default()).unwrap();
        assert_eq!(summary.dropped, ["a"]);
        assert_eq!(font.stored_glyph_program("a"), Some("\r"));
        assert_eq!(font.instructions(InstructionTarget::Glyph("a")), None);
    }

    #[test]
    fn invalid_composites_do_not_stop_compilation() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut font = font_with_programs();
        let component = |glyph| OutlineComponent {
            glyph: GlyphId16::new(glyph),
            anchor: Anchor::Offset { x: 0, y: 0 },
            flags: CompositeGlyphFlags::ARGS_ARE_XY_VALUES,
        };
        font.add_composite("acute", vec![component(1)]);
        font.add_composite("aacute", vec![component(1), component(2)]);
        font.set_glyph_program("acute", "USEMYMETRICS[]\nOFFSET[R], 1, 0, 0\nRTG[]");
        font.set_glyph_program("aacute", "OFFSET[R], 1, 0, 0\nRTG[]");

        let summary = compile_instructions(&mut font, &CompileOptions::default()).unwrap();
        assert_eq!(summary.compiled, ["acute"]);
        assert_eq!(
            summary.invalid_composites,
            [InvalidComposite::ComponentCount {
                glyph: "aacute".into(),
                expected: 2,
                found: 1,
            }]
        );
        let flags = font.outline_components("acute").unwrap()[0].flags;
        assert!(flags.contains(
            CompositeGlyphFlags::USE_MY_METRICS | CompositeGlyphFlags::ROUND_XY_TO_GRID
        ));
        assert_eq!(font.instructions(InstructionTarget::Glyph("aacute")), None);
    }

    #[test]
    fn parse_errors_abort() {
        let mut font = font_with_programs();
        font.set_glyph_program("a", "SVTCA[Q]");
        let err = compile_instructions(&mut font, &CompileOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Program { ref name, .. } if name == "a"));
    }

    #[test]
    fn composites_are_updated() {
        let mut font = font_with_programs();
        font.add_composite(
            "aacute",
            vec![
                OutlineComponent {
                    glyph: GlyphId16::new(1),
                    anchor: Anchor::Offset { x: 0, y: 0 },
                    flags: CompositeGlyphFlags::ROUND_XY_TO_GRID
                        | CompositeGlyphFlags::USE_MY_METRICS,
                },
                OutlineComponent {
                    glyph: GlyphId16::new(2),
                    anchor: Anchor::Point {
                        base: 4,
                        component: 0,
                    },
                    flags: CompositeGlyphFlags::empty(),
                },
            ],
        );
        font.add_composite("acute", Vec::new());
        font.set_glyph_program("a", "OFFSET[R], 2, 0, 0\nRTG[]");
        font.set_glyph_program("aacute", "/* kept */\nOFFSET[r], 1, 5, 5\nSVTCA[Y]\n");

        update_composites(&mut font, None, 6).unwrap();
        assert_eq!(
            font.glyph_program("aacute").unwrap(),
            "/* kept */\nUSEMYMETRICS[]\nOFFSET[R], 1, 0, 0\nANCHOR[], 2, 4, 0\nSVTCA[Y]\n"
        );
        assert_eq!(font.stored_glyph_program("a"), Some("\r"));
        // composites without a program get one
        assert_eq!(font.glyph_program("acute").unwrap(), "\n");
    }

    #[test]
    fn update_selected_glyphs() {
        let mut font = font_with_programs();
        font.add_composite(
            "aacute",
            vec![OutlineComponent {
                glyph: GlyphId16::new(1),
                anchor: Anchor::Offset { x: 3, y: 4 },
                flags: CompositeGlyphFlags::empty(),
            }],
        );
        font.set_glyph_program("a", "OFFSET[R], 2, 0, 0");
        update_composites(&mut font, Some(&["aacute".to_string()]), 6).unwrap();
        assert_eq!(font.glyph_program("aacute").unwrap(), "OFFSET[r], 1, 3, 4\n");
        assert_eq!(font.glyph_program("a").unwrap(), "OFFSET[R], 2, 0, 0\n");
    }

    #[test]
    fn glyph_program_comments() {
        let text = "/* TT glyph 3, char 0x61 (a) */\n\
                    /* VTT 6.35 compiler Fri Jun 10 15:22:01 2022 */\n\n\
                    SVTCA[Y]\n\
                    /* other */\n\
                    MDAP[R], 5\n";
        let expected = "/* VTT 6.35 compiler */\nSVTCA[Y]\n/* other */\nMDAP[R], 5\n";
        assert_eq!(normalize_glyph_program(text), expected);
        assert_eq!(normalize_glyph_program(expected), expected);
        assert_eq!(
            normalize_glyph_program("/* VTTTalk glyph 12, char 0xe1 */\r\nRTG[]"),
            "RTG[]"
        );
    }

    #[test]
    fn programs_are_normalized() {
        let mut font = font_with_programs();
        font.set_program(
            ExtraProgram::Fpgm,
            "/* VTT 6.01 compiler Mon Jan 2 10:00:00 2006 */\n\
             /* TT glyph 0 */\nFDEF[], 0\nENDF[]",
        );
        font.set_glyph_program("a", "/* TT glyph 1, char 0x61 (a) */\nSVTCA[Y]");
        font.set_glyph_program("acute", "SVTCA[X]");

        assert_eq!(normalize_programs(&mut font), 2);
        // glyph index comments are only stripped from glyph programs
        assert_eq!(
            font.program(ExtraProgram::Fpgm).unwrap(),
            "/* VTT 6.01 compiler */\n/* TT glyph 0 */\nFDEF[], 0\nENDF[]\n"
        );
        assert_eq!(font.glyph_program("a").unwrap(), "SVTCA[Y]\n");
        assert_eq!(font.glyph_program("acute").unwrap(), "SVTCA[X]\n");
        assert_eq!(normalize_programs(&mut font), 0);
    }
}
