use std::io::{self, Read, Write};
use std::rc::Rc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::alphabet::{Alphabet, ConstAlphabetRef, StaticAlphabet};
use crate::automaton::{Automaton, State};
use crate::error::{Error, Result};
use crate::info::for_each_reachable;
use crate::semiring::{tropical, ConstSemiringRef, SemiringType, Weight};
use crate::storage::StaticAutomaton;
use crate::types::*;

/// Store the states.
pub const STORE_STATES: u32 = 0x1;
/// Store the input alphabet.
pub const STORE_INPUT_ALPHABET: u32 = 0x2;
/// Store the output alphabet, transducers only.
pub const STORE_OUTPUT_ALPHABET: u32 = 0x4;
/// Store everything.
pub const STORE_ALL: u32 = STORE_STATES | STORE_INPUT_ALPHABET | STORE_OUTPUT_ALPHABET;

const MAGIC: &[u8; 8] = b"RWTHFSA\0";
const FORMAT_VERSION: u32 = 2;
const VERSION_SHIFT: u32 = 24;
const COMPONENTS_MASK: u32 = (1 << VERSION_SHIFT) - 1;

fn corrupt<S: Into<String>>(message: S) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, message.into()))
}

/// Writes the regular symbols of `alphabet` as `u32` count, then `i32` label, `u32` byte length
/// and UTF-8 bytes per symbol, followed by the `u32` number of disambiguators.
pub fn write_alphabet<W: Write>(alphabet: &dyn Alphabet, out: &mut W) -> Result<()> {
    let symbols: Vec<(LabelId, String)> = alphabet
        .labels()
        .into_iter()
        .filter_map(|label| alphabet.symbol(label).map(|symbol| (label, symbol)))
        .collect();
    out.write_u32::<LittleEndian>(symbols.len() as u32)?;
    for (label, symbol) in symbols {
        out.write_i32::<LittleEndian>(label)?;
        out.write_u32::<LittleEndian>(symbol.len() as u32)?;
        out.write_all(symbol.as_bytes())?;
    }
    out.write_u32::<LittleEndian>(alphabet.n_disambiguators())?;
    Ok(())
}

/// Reads an alphabet written by [`write_alphabet`].
pub fn read_alphabet<R: Read>(input: &mut R) -> Result<StaticAlphabet> {
    let mut alphabet = StaticAlphabet::new();
    let n_symbols = input.read_u32::<LittleEndian>()?;
    for _ in 0..n_symbols {
        let label = input.read_i32::<LittleEndian>()?;
        if !(FIRST_LABEL_ID..=LAST_LABEL_ID).contains(&label) {
            return Err(corrupt(format!("label {label} out of range")));
        }
        let length = input.read_u32::<LittleEndian>()?;
        let mut bytes = vec![0u8; length as usize];
        input.read_exact(&mut bytes)?;
        let symbol = String::from_utf8(bytes)
            .map_err(|_| corrupt(format!("symbol of label {label} is not UTF-8")))?;
        alphabet.add_indexed_symbol(&symbol, label);
    }
    let n_disambiguators = input.read_u32::<LittleEndian>()?;
    if n_disambiguators > 0 {
        alphabet.disambiguator(n_disambiguators - 1);
    }
    Ok(alphabet)
}

fn write_weight<W: Write>(semiring: ConstSemiringRef, w: Weight, out: &mut W) -> Result<()> {
    let mut bytes = Vec::with_capacity(semiring.compressed_size());
    semiring.compress(w, &mut bytes);
    out.write_all(&bytes)?;
    Ok(())
}

fn read_weight<R: Read>(semiring: ConstSemiringRef, input: &mut R) -> Result<Weight> {
    let mut bytes = vec![0u8; semiring.compressed_size()];
    input.read_exact(&mut bytes)?;
    Ok(semiring.uncompress(&bytes))
}

/// Writes the components `what` (a combination of the `STORE_*` flags) of `f` in the binary
/// format. Alphabets that `f` does not have are left out. Only states reachable from the
/// initial state are written.
pub fn write_binary<W: Write>(f: &dyn Automaton, what: u32, out: &mut W) -> Result<()> {
    let mut can_store = STORE_STATES;
    if f.input_alphabet().is_some() {
        can_store |= STORE_INPUT_ALPHABET;
    }
    if f.kind() == Type::Transducer && f.output_alphabet().is_some() {
        can_store |= STORE_OUTPUT_ALPHABET;
    }
    let what = what & can_store;
    let semiring = f.semiring();

    out.write_all(MAGIC)?;
    out.write_u32::<LittleEndian>(what | (FORMAT_VERSION << VERSION_SHIFT))?;
    out.write_u32::<LittleEndian>(f.kind().tag())?;
    if what & STORE_STATES != 0 {
        let properties = f.properties();
        out.write_u32::<LittleEndian>(properties.values() & properties.known())?;
        out.write_u32::<LittleEndian>(properties.known())?;
        out.write_u32::<LittleEndian>(semiring.kind().tag())?;
    }
    if let (true, Some(alphabet)) = (what & STORE_INPUT_ALPHABET != 0, f.input_alphabet()) {
        write_alphabet(alphabet.as_ref(), out)?;
    }
    if let (true, Some(alphabet)) = (what & STORE_OUTPUT_ALPHABET != 0, f.output_alphabet()) {
        write_alphabet(alphabet.as_ref(), out)?;
    }
    if what & STORE_STATES == 0 {
        return Ok(());
    }

    out.write_u32::<LittleEndian>(f.initial_state_id())?;
    let transducer = f.kind() == Type::Transducer;
    let mut states = Vec::new();
    for_each_reachable(f, |sp| states.push(sp.clone()));
    for sp in &states {
        out.write_u32::<LittleEndian>(sp.id() | sp.tags())?;
        if sp.is_final() {
            write_weight(semiring, sp.weight, out)?;
        }
        out.write_u32::<LittleEndian>(sp.n_arcs() as u32)?;
        for a in sp.iter() {
            out.write_u32::<LittleEndian>(a.target)?;
            write_weight(semiring, a.weight, out)?;
            out.write_i32::<LittleEndian>(a.input)?;
            if transducer {
                out.write_i32::<LittleEndian>(a.output)?;
            }
        }
    }
    out.write_u32::<LittleEndian>(INVALID_STATE_ID)?;
    tracing::debug!("wrote {} states of {}", states.len(), f.describe());
    Ok(())
}

/// Reads an automaton in the binary format. Format versions 0 to 2 are understood.
pub fn read_binary<R: Read>(input: &mut R) -> Result<StaticAutomaton> {
    read_binary_with(input, None, None)
}

/// Like [`read_binary`], but uses the given alphabets instead of the stored ones. This is how
/// automata that share their alphabets with others are read.
pub fn read_binary_with<R: Read>(
    input: &mut R,
    input_alphabet: Option<ConstAlphabetRef>,
    output_alphabet: Option<ConstAlphabetRef>,
) -> Result<StaticAutomaton> {
    let mut magic = [0u8; 8];
    input.read_exact(&mut magic)?;
    if &magic != MAGIC {
        tracing::error!("input does not start with the binary magic");
        return Err(Error::BadMagic);
    }
    let header = input.read_u32::<LittleEndian>()?;
    let version = header >> VERSION_SHIFT;
    let (what, kind_tag) = match version {
        0 => (STORE_ALL, header),
        1 | 2 => (header & COMPONENTS_MASK, input.read_u32::<LittleEndian>()?),
        _ => return Err(Error::UnsupportedVersion(version)),
    };
    let kind = Type::from_tag(kind_tag).ok_or(Error::UnknownType(kind_tag))?;

    let mut semiring = tropical();
    let mut properties = (PROPERTY_NONE, PROPERTY_NONE);
    if what & STORE_STATES != 0 {
        let values = input.read_u32::<LittleEndian>()?;
        let known = if version >= 2 {
            input.read_u32::<LittleEndian>()?
        } else {
            values
        };
        properties = (known, values);
        let tag = input.read_u32::<LittleEndian>()?;
        semiring = SemiringType::from_tag(tag)
            .and_then(SemiringType::semiring)
            .ok_or_else(|| Error::UnknownSemiring(tag.to_string()))?;
    }

    let mut fsa = StaticAutomaton::new(kind, semiring);
    let mut read_stored = |stored: bool| -> Result<Option<ConstAlphabetRef>> {
        if !stored {
            return Ok(None);
        }
        let alphabet: ConstAlphabetRef = Rc::new(read_alphabet(input)?);
        Ok(Some(alphabet))
    };
    let stored_input = read_stored(what & STORE_INPUT_ALPHABET != 0)?;
    let stored_output =
        read_stored(what & STORE_OUTPUT_ALPHABET != 0 && kind == Type::Transducer)?;
    fsa.set_input_alphabet(input_alphabet.or(stored_input));
    fsa.set_output_alphabet(output_alphabet.or(stored_output));
    if what & STORE_STATES == 0 {
        return Ok(fsa);
    }

    fsa.set_initial_state_id(input.read_u32::<LittleEndian>()?);
    loop {
        let id_and_tags = match input.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if id_and_tags == INVALID_STATE_ID {
            break;
        }
        let tags = id_and_tags & STATE_TAG_MASK;
        let weight = if tags & STATE_TAG_FINAL != 0 {
            read_weight(semiring, input)?
        } else {
            Weight::Invalid
        };
        let mut sp = State::with_tags(id_and_tags & STATE_ID_MASK, tags, weight);
        let n_arcs = input.read_u32::<LittleEndian>()?;
        for _ in 0..n_arcs {
            let target = input.read_u32::<LittleEndian>()?;
            if target > MAX_STATE_ID {
                return Err(corrupt(format!("arc target {target} out of range")));
            }
            let weight = read_weight(semiring, input)?;
            let label = input.read_i32::<LittleEndian>()?;
            let output = match kind {
                Type::Transducer => input.read_i32::<LittleEndian>()?,
                _ => label,
            };
            sp.new_arc(target, weight, label, output);
        }
        fsa.set_state(sp);
    }
    let (known, values) = properties;
    let known = known & !(PROPERTY_CACHED | PROPERTY_STORAGE);
    fsa.properties().set(known, values & known);
    fsa.properties().add(PROPERTY_STORAGE);
    tracing::debug!("read {} states", fsa.states().count());
    Ok(fsa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::equal_alphabets;
    use crate::fixtures;
    use crate::prelude::*;

    fn transducer() -> StaticAutomaton {
        StaticAutomaton::builder(Type::Transducer, log())
            .with_alphabets(
                fixtures::alphabet(&["a", "b"]),
                fixtures::alphabet(&["x", "y", "z"]),
            )
            .with_transducer_arcs([
                (0, 1, 0, 2, 0.5),
                (0, 2, 1, EPSILON, 0.0),
                (1, 2, EPSILON, 1, 1.25),
                (2, 0, ANY, 0, 3.0),
            ])
            .with_finals([(2, 0.75)])
            .build()
    }

    #[test_log::test]
    fn round_trip_keeps_states_and_alphabets() {
        let f = transducer();
        f.input_alphabet().unwrap().disambiguator(1);
        let mut bytes = vec![];
        write_binary(&f, STORE_ALL, &mut bytes).unwrap();
        assert_eq!(&bytes[..8], b"RWTHFSA\0");
        let read = read_binary(&mut bytes.as_slice()).unwrap();
        assert_eq!(read.kind(), Type::Transducer);
        assert_eq!(read.semiring().kind(), SemiringType::Log);
        assert_eq!(read.initial_state_id(), 0);
        for s in 0..3 {
            assert_eq!(read.get_state(s), f.get_state(s), "state {s}");
        }
        assert!(equal_alphabets(
            &read.input_alphabet().unwrap(),
            &f.input_alphabet().unwrap()
        ));
        assert!(equal_alphabets(
            &read.output_alphabet().unwrap(),
            &f.output_alphabet().unwrap()
        ));
        assert_eq!(read.input_alphabet().unwrap().n_disambiguators(), 2);
        assert!(read.has_property(PROPERTY_STORAGE));
    }

    #[test]
    fn acceptors_store_one_label_per_arc() {
        let f = fixtures::linear_ab();
        let mut with_alphabet = vec![];
        write_binary(&f, STORE_ALL, &mut with_alphabet).unwrap();
        let mut states_only = vec![];
        write_binary(&f, STORE_STATES, &mut states_only).unwrap();
        // magic, six header fields, three states, terminator
        let state_bytes = (4 + 4 + 12) * 2 + (4 + 4 + 4);
        assert_eq!(states_only.len(), 8 + 4 * 6 + state_bytes + 4);
        assert!(with_alphabet.len() > states_only.len());

        let alphabet = fixtures::alphabet(&["a", "b"]);
        let read = read_binary_with(&mut states_only.as_slice(), Some(alphabet.clone()), None)
            .unwrap();
        assert!(Rc::ptr_eq(&read.input_alphabet().unwrap(), &alphabet));
        assert_eq!(read.get_state(0), f.get_state(0));
        assert_eq!(bestscore(read.into_ref()), Weight::Real(3.0));
    }

    #[test]
    fn empty_automaton() {
        let f = StaticAutomaton::new(Type::Acceptor, tropical());
        let mut bytes = vec![];
        write_binary(&f, STORE_ALL, &mut bytes).unwrap();
        let read = read_binary(&mut bytes.as_slice()).unwrap();
        assert_eq!(read.initial_state_id(), INVALID_STATE_ID);
        assert_eq!(read.states().count(), 0);
    }

    #[test]
    fn version_zero_header() {
        let mut bytes = MAGIC.to_vec();
        for v in [Type::Acceptor.tag(), 0, SemiringType::Tropical.tag(), 0, 0, 0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&(STATE_TAG_FINAL).to_le_bytes());
        bytes.extend_from_slice(&2.5f32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let read = read_binary(&mut bytes.as_slice()).unwrap();
        let state = read.get_state(0).unwrap();
        assert!(state.is_final());
        assert_eq!(state.weight, Weight::Real(2.5));
        assert_eq!(read.input_alphabet().unwrap().end(), 0);
    }

    #[test]
    fn malformed_input() {
        let mut bytes = b"NOTANFSA".to_vec();
        assert!(matches!(read_binary(&mut bytes.as_slice()), Err(Error::BadMagic)));

        bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&(3u32 << VERSION_SHIFT).to_le_bytes());
        assert!(matches!(
            read_binary(&mut bytes.as_slice()),
            Err(Error::UnsupportedVersion(3))
        ));

        bytes = MAGIC.to_vec();
        for v in [STORE_STATES | (2 << VERSION_SHIFT), 1, 0, 0, 99] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(
            read_binary(&mut bytes.as_slice()),
            Err(Error::UnknownSemiring(_))
        ));

        let mut truncated = vec![];
        write_binary(&fixtures::linear_ab(), STORE_ALL, &mut truncated).unwrap();
        truncated.truncate(truncated.len() - 10);
        assert!(matches!(read_binary(&mut truncated.as_slice()), Err(Error::Io(_))));
    }
}
