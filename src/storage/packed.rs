use std::collections::VecDeque;
use std::rc::Rc;

use crate::alphabet::ConstAlphabetRef;
use crate::automaton::{Arc, Automaton, ConstStateRef, Properties, State};
use crate::semiring::{ConstSemiringRef, Weight};
use crate::types::*;

const HEADER_FINAL: u8 = 0x01;
const HEADER_WEIGHT: u8 = 0x02;
const HEADER_TARGET_WIDTH: u8 = 0x0c;
const HEADER_TARGET_WIDTH_SHIFT: u8 = 2;
const HEADER_ARC_WEIGHTS: u8 = 0x10;
const HEADER_OUTPUTS: u8 = 0x20;
const HEADER_USER_TAG: u8 = 0x40;

const NO_STATE: u32 = u32::MAX;

/// An automaton that keeps each state as a variable length byte record.
///
/// A record starts with a header byte which tells whether the state is final, whether a weight
/// follows, how many bytes each arc target occupies (1 to 4, chosen by the largest target of the
/// state), whether arcs carry weights and whether they carry output labels different from their
/// inputs. Weights that equal `one` are left out, labels and the arc count are stored as
/// variable length integers. Decoding a record reproduces the encoded state exactly.
#[derive(Debug, Clone)]
pub struct PackedAutomaton {
    kind: Type,
    semiring: ConstSemiringRef,
    properties: Properties,
    initial: StateId,
    input_alphabet: Option<ConstAlphabetRef>,
    output_alphabet: Option<ConstAlphabetRef>,
    offsets: Vec<u32>,
    data: Vec<u8>,
}

/// Bitwise equality, `-0.0` is not `0.0`.
fn identical(a: Weight, b: Weight) -> bool {
    match (a, b) {
        (Weight::Real(a), Weight::Real(b)) => a.to_bits() == b.to_bits(),
        (Weight::Pair { score: sa, risk: ra }, Weight::Pair { score: sb, risk: rb }) => {
            sa.to_bits() == sb.to_bits() && ra.to_bits() == rb.to_bits()
        }
        (a, b) => a == b,
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_varint(data: &[u8], pos: &mut usize) -> u32 {
    let mut value = 0u32;
    let mut shift = 0;
    loop {
        let byte = data[*pos];
        *pos += 1;
        value |= ((byte & 0x7f) as u32) << shift;
        if byte & 0x80 == 0 {
            return value;
        }
        shift += 7;
        assert!(shift < 35, "corrupt variable length integer");
    }
}

fn zigzag(label: LabelId) -> u32 {
    ((label << 1) ^ (label >> 31)) as u32
}

fn unzigzag(value: u32) -> LabelId {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

fn target_width(max_target: StateId) -> u8 {
    match max_target {
        0..=0xff => 1,
        0x100..=0xffff => 2,
        0x1_0000..=0xff_ffff => 3,
        _ => 4,
    }
}

impl PackedAutomaton {
    /// Creates an automaton without states.
    pub fn new(kind: Type, semiring: ConstSemiringRef) -> Self {
        Self {
            kind,
            semiring,
            properties: Properties::with(PROPERTY_STORAGE, PROPERTY_STORAGE),
            initial: INVALID_STATE_ID,
            input_alphabet: None,
            output_alphabet: None,
            offsets: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Sets the initial state.
    pub fn set_initial_state_id(&mut self, s: StateId) {
        self.initial = s;
    }

    /// Sets the alphabets.
    pub fn set_alphabets(
        &mut self,
        input: Option<ConstAlphabetRef>,
        output: Option<ConstAlphabetRef>,
    ) {
        self.input_alphabet = input;
        self.output_alphabet = output;
    }

    /// Encodes `state` and stores it under its id. A state stored before under the same id is
    /// replaced.
    pub fn set_state(&mut self, state: &State) {
        let id = state.id() as usize;
        if id >= self.offsets.len() {
            self.offsets.resize(id + 1, NO_STATE);
        }
        self.offsets[id] = self.data.len() as u32;
        self.encode(state);
        self.properties.unset(PROPERTY_SORTED | PROPERTY_ACYCLIC | PROPERTY_LINEAR);
    }

    /// Size of the encoded states in bytes.
    pub fn n_bytes(&self) -> usize {
        self.data.len()
    }

    fn encode(&mut self, state: &State) {
        let sr = self.semiring;
        let one = sr.one();
        let mut header = 0u8;
        if state.is_final() {
            header |= HEADER_FINAL;
        }
        if state.has_tags(STATE_TAG_USER) {
            header |= HEADER_USER_TAG;
        }
        let store_weight =
            state.weight.is_valid() && !(state.is_final() && identical(state.weight, one));
        if store_weight {
            header |= HEADER_WEIGHT;
        }
        let max_target = state.iter().map(|a| a.target).max().unwrap_or(0);
        let width = target_width(max_target);
        header |= (width - 1) << HEADER_TARGET_WIDTH_SHIFT;
        if state.iter().any(|a| !identical(a.weight, one)) {
            header |= HEADER_ARC_WEIGHTS;
        }
        if state.iter().any(|a| a.input != a.output) {
            header |= HEADER_OUTPUTS;
        }

        self.data.push(header);
        if store_weight {
            sr.compress(state.weight, &mut self.data);
        }
        write_varint(&mut self.data, state.n_arcs() as u32);
        for arc in state.iter() {
            self.data
                .extend_from_slice(&arc.target.to_le_bytes()[..width as usize]);
            write_varint(&mut self.data, zigzag(arc.input));
            if header & HEADER_OUTPUTS != 0 {
                write_varint(&mut self.data, zigzag(arc.output));
            }
            if header & HEADER_ARC_WEIGHTS != 0 {
                sr.compress(arc.weight, &mut self.data);
            }
        }
    }

    fn decode(&self, id: StateId, mut pos: usize) -> State {
        let sr = self.semiring;
        let data = &self.data;
        let header = data[pos];
        pos += 1;
        let mut tags = STATE_TAG_NONE;
        if header & HEADER_FINAL != 0 {
            tags |= STATE_TAG_FINAL;
        }
        if header & HEADER_USER_TAG != 0 {
            tags |= STATE_TAG_USER;
        }
        let weight = if header & HEADER_WEIGHT != 0 {
            let w = sr.uncompress(&data[pos..]);
            pos += sr.compressed_size();
            w
        } else if header & HEADER_FINAL != 0 {
            sr.one()
        } else {
            Weight::Invalid
        };
        let mut state = State::with_tags(id, tags, weight);
        let width = (((header & HEADER_TARGET_WIDTH) >> HEADER_TARGET_WIDTH_SHIFT) + 1) as usize;
        let n_arcs = read_varint(data, &mut pos);
        let arcs = state.arcs_mut();
        arcs.reserve(n_arcs as usize);
        for _ in 0..n_arcs {
            let mut target = [0u8; 4];
            target[..width].copy_from_slice(&data[pos..pos + width]);
            pos += width;
            let input = unzigzag(read_varint(data, &mut pos));
            let output = if header & HEADER_OUTPUTS != 0 {
                unzigzag(read_varint(data, &mut pos))
            } else {
                input
            };
            let weight = if header & HEADER_ARC_WEIGHTS != 0 {
                let w = sr.uncompress(&data[pos..]);
                pos += sr.compressed_size();
                w
            } else {
                sr.one()
            };
            arcs.push(Arc::new(u32::from_le_bytes(target), weight, input, output));
        }
        assert_eq!(arcs.len(), n_arcs as usize, "arc count mismatch");
        state
    }
}

impl Automaton for PackedAutomaton {
    fn kind(&self) -> Type {
        self.kind
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn semiring(&self) -> ConstSemiringRef {
        self.semiring
    }

    fn initial_state_id(&self) -> StateId {
        self.initial
    }

    fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.input_alphabet.clone()
    }

    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        match self.kind {
            Type::Acceptor => self.input_alphabet.clone(),
            _ => self.output_alphabet.clone(),
        }
    }

    fn get_state(&self, s: StateId) -> Option<ConstStateRef> {
        match self.offsets.get(s as usize) {
            Some(&offset) if offset != NO_STATE => Some(Rc::new(self.decode(s, offset as usize))),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        "packed".to_string()
    }
}

/// Encodes all states reachable from the initial state into a [`PackedAutomaton`].
pub fn packed_copy(f: &dyn Automaton) -> PackedAutomaton {
    let mut packed = PackedAutomaton::new(f.kind(), f.semiring());
    packed.set_alphabets(f.input_alphabet(), f.output_alphabet());
    let initial = f.initial_state_id();
    if initial != INVALID_STATE_ID {
        let mut seen = bit_set::BitSet::new();
        let mut queue = VecDeque::from([initial]);
        seen.insert(initial as usize);
        while let Some(s) = queue.pop_front() {
            let Some(sp) = f.get_state(s) else {
                continue;
            };
            for arc in sp.iter() {
                if seen.insert(arc.target as usize) {
                    queue.push_back(arc.target);
                }
            }
            packed.set_state(&sp);
        }
        packed.set_initial_state_id(initial);
    }
    packed.properties.set(
        f.properties().known() & !(PROPERTY_CACHED | PROPERTY_STORAGE),
        f.properties().values(),
    );
    packed.properties.add(PROPERTY_STORAGE);
    tracing::debug!(
        "packed {} into {} bytes",
        f.describe(),
        packed.n_bytes()
    );
    packed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;

    #[test]
    fn varints_and_zigzag() {
        for label in [EPSILON, 0, 1, 127, 128, 300_000, LAST_LABEL_ID, ANY, ELSE] {
            let mut bytes = vec![];
            write_varint(&mut bytes, zigzag(label));
            let mut pos = 0;
            assert_eq!(unzigzag(read_varint(&bytes, &mut pos)), label);
            assert_eq!(pos, bytes.len());
        }
        assert_eq!(target_width(255), 1);
        assert_eq!(target_width(256), 2);
        assert_eq!(target_width(1 << 20), 3);
        assert_eq!(target_width(MAX_STATE_ID), 4);
    }

    #[test_log::test]
    fn three_states_four_arcs_round_trip() {
        let alphabet = fixtures::alphabet(&["a", "b", "x"]);
        let fsa = StaticAutomaton::builder(Type::Transducer, tropical())
            .with_alphabet(alphabet)
            .with_transducer_arcs([
                (0, 1, 0, 2, 0.5),
                (0, 2, 1, 1, 0.0),
                (1, 2, EPSILON, 2, 1.25),
                (1, 1, 0, 0, 3.0),
            ])
            .with_finals([(2, 0.0), (1, 2.5)])
            .build();
        let packed = packed_copy(&fsa);
        assert_eq!(packed.initial_state_id(), 0);
        assert_eq!(packed.kind(), Type::Transducer);
        for s in 0..3 {
            assert_eq!(packed.get_state(s), fsa.get_state(s), "state {s}");
        }
        assert!(packed.get_state(3).is_none());
    }

    #[test]
    fn wide_targets_and_tags() {
        let sr = log();
        let mut state = State::with_tags(7, STATE_TAG_USER, Weight::Real(0.25));
        state.new_acceptor_arc(70_000, sr.one(), 3);
        state.new_acceptor_arc(MAX_STATE_ID, Weight::Real(-1.5), ELSE);
        let mut packed = PackedAutomaton::new(Type::Acceptor, sr);
        packed.set_state(&state);
        assert_eq!(*packed.get_state(7).unwrap(), state);
        assert!(packed.get_state(0).is_none());

        let mut replaced = State::new_final(7, sr.one());
        replaced.new_acceptor_arc(0, sr.one(), EPSILON);
        packed.set_state(&replaced);
        assert_eq!(*packed.get_state(7).unwrap(), replaced);
    }

    #[test]
    fn negative_zero_is_kept() {
        let sr = tropical();
        let mut state = State::new_final(0, Weight::Real(-0.0));
        state.new_acceptor_arc(0, Weight::Real(-0.0), 1);
        let mut packed = PackedAutomaton::new(Type::Acceptor, sr);
        packed.set_state(&state);
        let decoded = packed.get_state(0).unwrap();
        let bits = |w: Weight| w.value().to_bits();
        assert_eq!(bits(decoded.weight), (-0.0f32).to_bits());
        assert_eq!(bits(decoded[0].weight), (-0.0f32).to_bits());

        let mut positive = State::new_final(1, sr.one());
        positive.new_acceptor_arc(1, sr.one(), 1);
        let before = packed.n_bytes();
        packed.set_state(&positive);
        // header, arc count, one byte target and label
        assert_eq!(packed.n_bytes() - before, 4);
        assert_eq!(bits(packed.get_state(1).unwrap()[0].weight), 0.0f32.to_bits());
    }
}
