//! Container for several automata sharing one set of alphabets.
//!
//! An archive is a zip file with an entry `alphabets.binfsa.gz` holding the shared alphabets and
//! one entry `<id>.binfsa.gz` per automaton holding its states only. The entries keep the `.gz`
//! suffix of the archive layout, but they are plain binary automata compressed by the zip
//! container with deflate, not gzip streams. Unpacking an entry with a zip tool yields a file
//! that [`crate::io::read_binary`] reads directly.
//!
//! ```no_run
//! # use wfst::prelude::*;
//! # use wfst::archive::{ArchiveReader, ArchiveWriter};
//! # fn store(lexicon: ConstAutomatonRef) -> wfst::error::Result<()> {
//! let mut writer = ArchiveWriter::create("models.zip")?;
//! writer.store("lexicon", lexicon)?;
//! writer.finish()?;
//!
//! let mut reader = ArchiveReader::open("models.zip")?;
//! let lexicon = reader.read("lexicon")?;
//! # Ok(())
//! # }
//! ```
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::Path;
use std::rc::Rc;

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::alphabet::{equal_alphabets, ConstAlphabetRef};
use crate::automaton::{Automaton, ConstAutomatonRef};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::io::{
    read_binary, read_binary_with, write_binary, STORE_INPUT_ALPHABET, STORE_OUTPUT_ALPHABET,
    STORE_STATES,
};
use crate::semiring::tropical;
use crate::storage::StaticAutomaton;
use crate::types::*;
use crate::views::{map_input_with, map_output_with};

const ALPHABETS_ENTRY: &str = "alphabets.binfsa.gz";
const SUFFIX: &str = ".binfsa.gz";

fn entry_name(id: &str) -> String {
    format!("{id}{SUFFIX}")
}

/// Writes automata into an archive. The alphabets are those given by
/// [`ArchiveWriter::with_alphabets`] or else those of the first stored automaton; automata over
/// other alphabets are mapped onto them before storing.
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    input: Option<ConstAlphabetRef>,
    output: Option<ConstAlphabetRef>,
    config: Config,
    n_stored: usize,
}

impl ArchiveWriter<File> {
    /// Creates the archive file at `path`, replacing an existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Writes an archive to `out`.
    pub fn new(out: W) -> Self {
        Self {
            zip: ZipWriter::new(out),
            input: None,
            output: None,
            config: Config::default(),
            n_stored: 0,
        }
    }

    /// Fixes the shared alphabets.
    pub fn with_alphabets(
        mut self,
        input: Option<ConstAlphabetRef>,
        output: Option<ConstAlphabetRef>,
    ) -> Self {
        self.input = input;
        self.output = output;
        self
    }

    /// Uses `config` when mapping automata onto the shared alphabets.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    fn options() -> FileOptions {
        FileOptions::default().compression_method(CompressionMethod::Deflated)
    }

    /// Stores `f` under `id`.
    pub fn store(&mut self, id: &str, f: ConstAutomatonRef) -> Result<()> {
        if self.n_stored == 0 && self.input.is_none() && self.output.is_none() {
            self.input = f.input_alphabet();
            if f.kind() == Type::Transducer {
                self.output = f.output_alphabet();
            }
        }
        let mut f = f;
        if let (Some(own), Some(shared)) = (f.input_alphabet(), &self.input) {
            if !equal_alphabets(&own, shared) {
                tracing::debug!("mapping input of \"{id}\" onto the archive alphabet");
                f = map_input_with(f, shared.clone(), &self.config);
            }
        }
        if f.kind() == Type::Transducer {
            if let (Some(own), Some(shared)) = (f.output_alphabet(), &self.output) {
                if !equal_alphabets(&own, shared) {
                    tracing::debug!("mapping output of \"{id}\" onto the archive alphabet");
                    f = map_output_with(f, shared.clone(), &self.config);
                }
            }
        }

        self.zip.start_file(entry_name(id), Self::options())?;
        write_binary(f.as_ref(), STORE_STATES, &mut self.zip)?;
        self.n_stored += 1;
        tracing::debug!("stored \"{id}\": {}", f.describe());
        Ok(())
    }

    /// Writes the shared alphabets and completes the archive.
    pub fn finish(mut self) -> Result<W> {
        let kind = if self.output.is_some() {
            Type::Transducer
        } else {
            Type::Acceptor
        };
        let mut alphabets = StaticAutomaton::new(kind, tropical());
        alphabets.set_input_alphabet(self.input.clone());
        alphabets.set_output_alphabet(self.output.clone());
        self.zip.start_file(ALPHABETS_ENTRY, Self::options())?;
        write_binary(
            &alphabets,
            STORE_INPUT_ALPHABET | STORE_OUTPUT_ALPHABET,
            &mut self.zip,
        )?;
        Ok(self.zip.finish()?)
    }
}

/// Reads automata from an archive. Automata come with the shared alphabets of the archive, or
/// are mapped onto the target alphabets set with [`ArchiveReader::map_input`] and
/// [`ArchiveReader::map_output`]. Mapping is lazy and drops arcs with symbols missing in the
/// target alphabet, the first [`Config::report_unknowns`] of them are logged.
pub struct ArchiveReader<R: Read + Seek> {
    zip: ZipArchive<R>,
    ids: Vec<String>,
    input: Option<ConstAlphabetRef>,
    output: Option<ConstAlphabetRef>,
    target_input: Option<ConstAlphabetRef>,
    target_output: Option<ConstAlphabetRef>,
    config: Config,
}

impl ArchiveReader<BufReader<File>> {
    /// Opens the archive file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Reads an archive from `input` and loads its alphabets.
    pub fn new(input: R) -> Result<Self> {
        let mut zip = ZipArchive::new(input)?;
        let mut ids = vec![];
        for i in 0..zip.len() {
            let entry = zip.by_index(i)?;
            if let Some(id) = entry.name().strip_suffix(SUFFIX) {
                if entry.name() != ALPHABETS_ENTRY {
                    ids.push(id.to_string());
                }
            }
        }
        let alphabets = match zip.by_name(ALPHABETS_ENTRY) {
            Ok(mut entry) => read_binary(&mut entry)?,
            Err(zip::result::ZipError::FileNotFound) => {
                tracing::error!("archive has no \"{ALPHABETS_ENTRY}\"");
                return Err(Error::MissingFile(ALPHABETS_ENTRY.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        tracing::debug!("opened archive with {} automata", ids.len());
        Ok(Self {
            zip,
            ids,
            input: alphabets.input_alphabet(),
            output: match alphabets.kind() {
                Type::Transducer => alphabets.output_alphabet(),
                _ => None,
            },
            target_input: None,
            target_output: None,
            config: Config::default(),
        })
    }

    /// Maps input labels of read automata onto `alphabet`.
    pub fn map_input(mut self, alphabet: ConstAlphabetRef) -> Self {
        self.target_input = Some(alphabet);
        self
    }

    /// Maps output labels of read transducers onto `alphabet`.
    pub fn map_output(mut self, alphabet: ConstAlphabetRef) -> Self {
        self.target_output = Some(alphabet);
        self
    }

    /// Uses `config` for the mapping.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// The shared input alphabet.
    pub fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.input.clone()
    }

    /// The shared output alphabet.
    pub fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.output.clone()
    }

    /// Ids of the stored automata in archive order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Whether an automaton is stored under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|stored| stored == id)
    }

    /// Reads the automaton stored under `id`.
    pub fn read(&mut self, id: &str) -> Result<ConstAutomatonRef> {
        let name = entry_name(id);
        let fsa = match self.zip.by_name(&name) {
            Ok(mut entry) => read_binary_with(&mut entry, self.input.clone(), self.output.clone())?,
            Err(zip::result::ZipError::FileNotFound) => {
                tracing::error!("archive has no \"{name}\"");
                return Err(Error::MissingFile(name));
            }
            Err(err) => return Err(err.into()),
        };
        let mut f: ConstAutomatonRef = Rc::new(fsa);
        if let Some(target) = &self.target_input {
            if f.input_alphabet().is_none() {
                tracing::error!("\"{id}\" has no input alphabet to map");
                return Err(Error::MissingAlphabet);
            }
            f = map_input_with(f, target.clone(), &self.config);
        }
        if let (Some(target), Type::Transducer) = (&self.target_output, f.kind()) {
            if f.output_alphabet().is_none() {
                tracing::error!("\"{id}\" has no output alphabet to map");
                return Err(Error::MissingAlphabet);
            }
            f = map_output_with(f, target.clone(), &self.config);
        }
        Ok(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;

    fn archive_of(automata: &[(&str, ConstAutomatonRef)]) -> std::io::Cursor<Vec<u8>> {
        let mut writer = ArchiveWriter::new(std::io::Cursor::new(vec![]));
        for (id, f) in automata {
            writer.store(id, f.clone()).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test_log::test]
    fn automata_share_the_stored_alphabet() {
        let diamond = fixtures::diamond().into_ref();
        let mut writer = ArchiveWriter::new(std::io::Cursor::new(vec![]))
            .with_alphabets(diamond.input_alphabet(), None);
        writer.store("ab", fixtures::linear_ab().into_ref()).unwrap();
        writer.store("diamond", diamond).unwrap();
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);

        let mut reader = ArchiveReader::new(cursor).unwrap();
        assert_eq!(reader.ids(), ["ab", "diamond"]);
        assert!(reader.contains("diamond"));
        assert!(reader.output_alphabet().is_none());
        let ab = reader.read("ab").unwrap();
        let diamond = reader.read("diamond").unwrap();
        let shared = reader.input_alphabet().unwrap();
        assert_eq!(shared.symbol(2).as_deref(), Some("c"));
        assert!(Rc::ptr_eq(&ab.input_alphabet().unwrap(), &shared));
        assert!(Rc::ptr_eq(&diamond.input_alphabet().unwrap(), &shared));
        assert_eq!(count(ab.as_ref()).n_arcs, 2);
        assert_eq!(bestscore(diamond), Weight::Real(3.0));
    }

    #[test]
    fn stored_automata_are_mapped_onto_the_archive_alphabet() {
        let other = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_alphabet(fixtures::alphabet(&["c", "b", "a"]))
            .with_arcs([(0, 1, 2, 0.0)])
            .with_finals([(1, 0.0)])
            .build();
        let cursor = archive_of(&[
            ("ab", fixtures::linear_ab().into_ref()),
            ("a", other.into_ref()),
        ]);
        let mut reader = ArchiveReader::new(cursor).unwrap();
        let a = reader.read("a").unwrap();
        assert_eq!(a.get_state(0).unwrap().arcs()[0].input, 0);
    }

    #[test]
    fn reading_onto_target_alphabets() {
        let cursor = archive_of(&[("ab", fixtures::linear_ab().into_ref())]);
        let target = fixtures::alphabet(&["b", "x"]);
        let mut reader = ArchiveReader::new(cursor).unwrap().map_input(target.clone());
        let ab = reader.read("ab").unwrap();
        assert!(Rc::ptr_eq(&ab.input_alphabet().unwrap(), &target));
        // "a" is unknown to the target
        assert_eq!(ab.get_state(0).unwrap().n_arcs(), 0);
        assert_eq!(ab.get_state(1).unwrap().arcs()[0].input, 0);
    }

    #[test]
    fn missing_entries() {
        let cursor = archive_of(&[("ab", fixtures::linear_ab().into_ref())]);
        let mut reader = ArchiveReader::new(cursor).unwrap();
        let missing = reader.read("cd");
        assert!(matches!(missing, Err(Error::MissingFile(name)) if name == "cd.binfsa.gz"));

        let mut empty = ZipWriter::new(std::io::Cursor::new(vec![]));
        empty.start_file("readme", FileOptions::default()).unwrap();
        let mut cursor = empty.finish().unwrap();
        cursor.set_position(0);
        assert!(matches!(
            ArchiveReader::new(cursor),
            Err(Error::MissingFile(_))
        ));
    }

    #[test]
    fn entries_are_zip_deflated_binary_automata() {
        let cursor = archive_of(&[("ab", fixtures::linear_ab().into_ref())]);
        let mut zip = ZipArchive::new(cursor).unwrap();
        for name in [ALPHABETS_ENTRY, "ab.binfsa.gz"] {
            let mut entry = zip.by_name(name).unwrap();
            assert_eq!(entry.compression(), CompressionMethod::Deflated, "{name}");
            let mut magic = [0u8; 8];
            entry.read_exact(&mut magic).unwrap();
            assert_eq!(&magic, b"RWTHFSA\0", "{name}");
        }
    }

    #[test]
    fn archive_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsa.zip");
        let mut writer = ArchiveWriter::create(&path).unwrap();
        writer.store("ab", fixtures::linear_ab().into_ref()).unwrap();
        writer.finish().unwrap();
        let mut reader = ArchiveReader::open(&path).unwrap();
        let ab = reader.read("ab").unwrap();
        assert_eq!(bestscore(ab), Weight::Real(3.0));
    }
}
