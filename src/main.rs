//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, Context};
use bitflags::bitflags;
use clap::{self, crate_version, Arg, Command};
use rayc::{codegen, lex::Lexer, parse, source::Source, CompileError};

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    rc::Rc,
};

bitflags! {
    /// Representaciones intermedias a volcar en stderr.
    struct Dump: u32 {
        /// Flujo de tokens.
        const TOKENS = 0x01;

        /// Árbol sintáctico.
        const AST = 0x02;
    }
}

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("Ray compiler")
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .required(true)
                .value_name("INPUT")
                .help("Source file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .help("Output file ('-' for stdout), defaults to INPUT with .asm extension"),
        )
        .arg(
            Arg::new("dump")
                .long("dump")
                .takes_value(true)
                .multiple_occurrences(true)
                .value_name("IR")
                .possible_values(["tokens", "ast"])
                .help("Print an intermediate representation to stderr"),
        )
        .get_matches();

    let input = PathBuf::from(args.value_of("input").context("Missing input file")?);
    let output = match args.value_of("output") {
        Some(path) => path.to_owned(),
        None => default_output(&input)?,
    };

    let mut dump = Dump::empty();
    for ir in args.values_of("dump").into_iter().flatten() {
        dump |= match ir {
            "tokens" => Dump::TOKENS,
            _ => Dump::AST,
        };
    }

    let text = fs::read_to_string(&input)
        .with_context(|| format!("Failed to read source file: {}", input.display()))?;

    let source = Source::new(input.display().to_string(), text);

    // Cada fase aborta en su primer error
    let tokens = Lexer::new(&source)
        .tokenize()
        .unwrap_or_else(|error| fail(&source, error.into()));

    if dump.contains(Dump::TOKENS) {
        eprintln!("{:#?}", tokens);
    }

    let ast = parse::parse(&tokens).unwrap_or_else(|error| fail(&source, error.into()));
    if dump.contains(Dump::AST) {
        eprintln!("{:#?}", ast);
    }

    let asm = codegen::generate(&ast).unwrap_or_else(|error| fail(&source, error.into()));

    match output.as_str() {
        "-" => io::stdout()
            .write_all(asm.as_bytes())
            .context("Failed to emit to stdout")?,

        path => fs::write(path, asm)
            .with_context(|| format!("Failed to emit to file: {}", path))?,
    }

    Ok(())
}

fn default_output(input: &Path) -> anyhow::Result<String> {
    let output = input.with_extension("asm");
    match output.to_str() {
        Some(output) => Ok(output.to_owned()),
        None => anyhow::bail!("Output path is not valid UTF-8: {}", output.display()),
    }
}

fn fail(source: &Rc<Source>, error: CompileError) -> ! {
    eprint!("{}", error.into_diagnostics(source));
    process::exit(1)
}
