//! Reading and writing automata.
//!
//! | format | read | write |
//! |--------|------|-------|
//! | binary (`bin`) | yes | yes |
//! | AT&T text (`att`) | yes | yes |
//! | XML (`xml`) | yes | yes |
//! | graphviz (`dot`) | no | yes |
//! | linear (`lin`) | yes | yes |
//!
//! File names may be qualified with a format, e.g. `att:lexicon.txt`. Unqualified names are read
//! and written in the binary format.
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::automaton::Automaton;
use crate::error::{Error, Result};
use crate::semiring::ConstSemiringRef;
use crate::storage::StaticAutomaton;

mod binary;
pub use binary::{
    read_alphabet, read_binary, read_binary_with, write_alphabet, write_binary, STORE_ALL,
    STORE_INPUT_ALPHABET, STORE_OUTPUT_ALPHABET, STORE_STATES,
};

mod att;
pub use att::{read_att, write_att};

mod xml;
pub use xml::{read_xml, write_xml};

mod dot;
#[cfg(feature = "graphviz")]
pub use dot::{render, render_to_file};
pub use dot::{
    dot_representation, write_dot, DotOptions, DotStateAttribute, DotTransitionAttribute,
};

mod linear;
pub use linear::{read_linear, write_linear};

/// The formats automata can be stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// The `RWTHFSA` binary format.
    Binary,
    /// AT&T text format.
    Att,
    /// XML.
    Xml,
    /// Graphviz, write only.
    Dot,
    /// A single line of symbols.
    Linear,
}

impl Format {
    /// The qualifier of the format in file names.
    pub fn name(self) -> &'static str {
        match self {
            Format::Binary => "bin",
            Format::Att => "att",
            Format::Xml => "xml",
            Format::Dot => "dot",
            Format::Linear => "lin",
        }
    }

    /// Inverse of [`Format::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        [Format::Binary, Format::Att, Format::Xml, Format::Dot, Format::Linear]
            .into_iter()
            .find(|format| format.name() == name)
    }
}

/// Splits `format:file` into format and file name. Names without a known qualifier are binary.
pub fn split_qualified_filename(name: &str) -> (Format, &str) {
    match name.split_once(':') {
        Some((qualifier, file)) => match Format::from_name(qualifier) {
            Some(format) => (format, file),
            None => (Format::Binary, name),
        },
        None => (Format::Binary, name),
    }
}

/// Reads an automaton from a qualified file name. `semiring` is used by the text formats, binary
/// files name their semiring themselves.
pub fn read_file(name: &str, semiring: ConstSemiringRef) -> Result<StaticAutomaton> {
    let (format, file) = split_qualified_filename(name);
    tracing::debug!("reading {} file \"{file}\"", format.name());
    let mut input = BufReader::new(File::open(Path::new(file))?);
    match format {
        Format::Binary => read_binary(&mut input),
        Format::Att => read_att(input, semiring),
        Format::Linear => {
            let mut line = String::new();
            std::io::BufRead::read_line(&mut input, &mut line)?;
            read_linear(&line, None, semiring)
        }
        Format::Xml => read_xml(input, semiring),
        Format::Dot => {
            tracing::error!("format \"{}\" does not support reading", format.name());
            Err(Error::UnsupportedFormat(format.name()))
        }
    }
}

/// Writes an automaton to a qualified file name.
pub fn write_file(f: &dyn Automaton, name: &str) -> Result<()> {
    let (format, file) = split_qualified_filename(name);
    tracing::debug!("writing {} to {} file \"{file}\"", f.describe(), format.name());
    let mut out = BufWriter::new(File::create(Path::new(file))?);
    match format {
        Format::Binary => write_binary(f, STORE_ALL, &mut out)?,
        Format::Att => write_att(f, &mut out)?,
        Format::Xml => write_xml(f, &mut out)?,
        Format::Dot => write_dot(f, &DotOptions::default(), &mut out)?,
        Format::Linear => write_linear(f, &mut out)?,
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;

    #[test]
    fn qualified_filenames() {
        assert_eq!(split_qualified_filename("att:a.txt"), (Format::Att, "a.txt"));
        assert_eq!(split_qualified_filename("a.binfsa"), (Format::Binary, "a.binfsa"));
        assert_eq!(split_qualified_filename("c:/x.fsa"), (Format::Binary, "c:/x.fsa"));
        assert_eq!(Format::from_name("xml"), Some(Format::Xml));
    }

    #[test_log::test]
    fn files_in_every_readable_format() {
        let dir = tempfile::tempdir().unwrap();
        let f = fixtures::linear_ab();
        for format in [Format::Binary, Format::Att, Format::Xml, Format::Linear] {
            let path = dir.path().join(format!("fsa.{}", format.name()));
            let name = format!("{}:{}", format.name(), path.display());
            write_file(&f, &name).unwrap();
            let read = read_file(&name, tropical()).unwrap();
            assert_eq!(count(&read).n_arcs, 2, "{name}");
        }
        let dot = dir.path().join("fsa.dot");
        write_file(&f, &format!("dot:{}", dot.display())).unwrap();
        assert!(matches!(
            read_file(&format!("dot:{}", dot.display()), tropical()),
            Err(Error::UnsupportedFormat("dot"))
        ));
    }
}
