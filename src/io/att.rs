use std::io::{BufRead, Write};
use std::rc::Rc;

use crate::alphabet::{ConstAlphabetRef, StaticAlphabet};
use crate::automaton::{Automaton, State};
use crate::error::{Error, Result};
use crate::info::for_each_reachable;
use crate::semiring::{ConstSemiringRef, Weight};
use crate::storage::StaticAutomaton;
use crate::types::*;

const EPSILON_TOKEN: &str = "eps";

fn format_label(label: LabelId, alphabet: &Option<ConstAlphabetRef>) -> String {
    match (label, alphabet) {
        (EPSILON, Some(_)) => EPSILON_TOKEN.to_string(),
        (_, Some(alphabet)) => alphabet.symbol_or_id(label),
        // epsilon becomes 0
        (_, None) => (label + 1).to_string(),
    }
}

/// Writes `f` in the AT&T text format: one line `from to input [output] [weight]` per arc and
/// one line `state [weight]` per final state. Weights equal to `one` are left out. Labels are
/// written as symbols if `f` has alphabets, otherwise shifted by one so that `0` is epsilon.
///
/// Acceptors without alphabets repeat the label on weighted arcs, a single number after the
/// label would be taken for an output label.
pub fn write_att<W: Write>(f: &dyn Automaton, out: &mut W) -> Result<()> {
    let semiring = f.semiring();
    let transducer = f.kind() == Type::Transducer;
    let input = f.input_alphabet();
    let output = f.output_alphabet();
    let mut states = Vec::new();
    for_each_reachable(f, |sp| states.push(sp.clone()));
    for sp in &states {
        if sp.is_final() {
            write!(out, "{}", sp.id())?;
            if !semiring.is_default(sp.weight) {
                write!(out, " {}", semiring.format(sp.weight))?;
            }
            writeln!(out)?;
        }
        for a in sp.iter() {
            write!(out, "{} {} {}", sp.id(), a.target, format_label(a.input, &input))?;
            let weighted = !semiring.is_default(a.weight);
            if transducer || (weighted && input.is_none()) {
                write!(out, " {}", format_label(a.output, &output))?;
            }
            if weighted {
                write!(out, " {}", semiring.format(a.weight))?;
            }
            writeln!(out)?;
        }
    }
    Ok(())
}

struct AttReader {
    semiring: ConstSemiringRef,
    fsa: StaticAutomaton,
    symbols: Option<StaticAlphabet>,
    line: usize,
}

impl AttReader {
    fn error<S: Into<String>>(&self, message: S) -> Error {
        let message = message.into();
        tracing::error!("AT&T input line {}: {message}", self.line);
        Error::Format {
            line: self.line,
            message,
        }
    }

    fn state(&mut self, token: &str) -> Result<StateId> {
        match token.parse::<StateId>() {
            Ok(s) if s <= MAX_STATE_ID => {
                if self.fsa.get_state(s).is_none() {
                    self.fsa.set_state(State::new(s));
                }
                Ok(s)
            }
            _ => Err(self.error(format!("\"{token}\" is not a state id"))),
        }
    }

    fn label(&mut self, token: &str) -> LabelId {
        match token.parse::<LabelId>() {
            Ok(n) => n - 1,
            Err(_) if token == EPSILON_TOKEN => EPSILON,
            Err(_) => self
                .symbols
                .get_or_insert_with(StaticAlphabet::new)
                .add_symbol(token),
        }
    }

    fn weight(&self, token: &str) -> Result<Weight> {
        let w = self.semiring.parse(token);
        if !w.is_valid() {
            return Err(self.error(format!("\"{token}\" is not a weight")));
        }
        Ok(w)
    }

    fn read_line(&mut self, fields: &[&str]) -> Result<StateId> {
        let from = self.state(fields[0])?;
        let one = self.semiring.one();
        match fields {
            [_] => self.fsa.state_mut(from).set_final(one),
            [_, w] => {
                let w = self.weight(w)?;
                self.fsa.state_mut(from).set_final(w);
            }
            [_, to, input, rest @ ..] => {
                let to = self.state(to)?;
                let numeric = input.parse::<LabelId>().is_ok();
                let input = self.label(input);
                let (output, weight) = match rest {
                    [] => (input, one),
                    [x] => {
                        let is_label = if numeric {
                            x.parse::<LabelId>().is_ok()
                        } else {
                            x.parse::<f64>().is_err()
                        };
                        if is_label {
                            (self.label(x), one)
                        } else {
                            (input, self.weight(x)?)
                        }
                    }
                    [output, w] => (self.label(output), self.weight(w)?),
                    _ => return Err(self.error(format!("{} fields", fields.len()))),
                };
                self.fsa.state_mut(from).new_arc(to, weight, input, output);
            }
            [] => unreachable!("empty lines are skipped"),
        }
        Ok(from)
    }
}

/// Reads an automaton in the AT&T text format. The state on the first line is the initial
/// state. Numeric labels are shifted down by one, so that `0` is epsilon; any other label is a
/// symbol of an alphabet that is built while reading and shared by input and output. The result
/// is an acceptor if every arc has equal input and output label.
pub fn read_att<R: BufRead>(input: R, semiring: ConstSemiringRef) -> Result<StaticAutomaton> {
    let mut reader = AttReader {
        semiring,
        fsa: StaticAutomaton::new(Type::Transducer, semiring),
        symbols: None,
        line: 0,
    };
    let mut initial = INVALID_STATE_ID;
    for line in input.lines() {
        let line = line?;
        reader.line += 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        let from = reader.read_line(&fields)?;
        if initial == INVALID_STATE_ID {
            initial = from;
        }
    }
    let AttReader {
        mut fsa, symbols, ..
    } = reader;
    fsa.set_initial_state_id(initial);
    let acceptor = fsa
        .states()
        .all(|sp| sp.iter().all(|a| a.input == a.output));
    fsa.set_kind(if acceptor {
        Type::Acceptor
    } else {
        Type::Transducer
    });
    if let Some(symbols) = symbols {
        let alphabet: ConstAlphabetRef = Rc::new(symbols);
        fsa.set_input_alphabet(Some(alphabet.clone()));
        fsa.set_output_alphabet(Some(alphabet));
    }
    fsa.set_description("att");
    Ok(fsa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;

    fn to_string(f: &dyn Automaton) -> String {
        let mut out = vec![];
        write_att(f, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn symbolic_acceptor() {
        let f = fixtures::linear_ab();
        let text = to_string(&f);
        assert_eq!(text, "0 1 a 1\n1 2 b 2\n2\n");
        let read = read_att(text.as_bytes(), tropical()).unwrap();
        assert_eq!(read.kind(), Type::Acceptor);
        for s in 0..3 {
            assert_eq!(read.get_state(s), f.get_state(s));
        }
        assert_eq!(read.input_alphabet().unwrap().symbol(1).as_deref(), Some("b"));
    }

    #[test_log::test]
    fn numeric_transducer() {
        let f = StaticAutomaton::builder(Type::Transducer, tropical())
            .with_transducer_arcs([(0, 1, 0, 2, 0.5), (0, 2, 1, EPSILON, 0.0), (1, 2, 3, 3, 2.0)])
            .with_finals([(2, 1.5)])
            .build();
        let text = to_string(&f);
        assert_eq!(text, "0 1 1 3 0.5\n0 2 2 0\n1 2 4 4 2\n2 1.5\n");
        let read = read_att(text.as_bytes(), tropical()).unwrap();
        assert_eq!(read.kind(), Type::Transducer);
        assert!(read.input_alphabet().is_none());
        for s in 0..3 {
            assert_eq!(read.get_state(s), f.get_state(s));
        }
    }

    #[test]
    fn weighted_numeric_acceptor_repeats_its_labels() {
        let f = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_arcs([(0, 1, 4, 2.0), (1, 2, EPSILON, 0.0)])
            .with_finals([(2, 0.0)])
            .build();
        let text = to_string(&f);
        assert_eq!(text, "0 1 5 5 2\n1 2 0\n2\n");
        let read = read_att(text.as_bytes(), tropical()).unwrap();
        assert_eq!(read.kind(), Type::Acceptor);
        assert_eq!(read.get_state(0), f.get_state(0));
    }

    #[test]
    fn initial_state_comes_first() {
        let text = "\n3 4 x\n4 3 y 0.5\n4\n";
        let read = read_att(text.as_bytes(), log()).unwrap();
        assert_eq!(read.initial_state_id(), 3);
        let state = read.get_state(4).unwrap();
        assert!(state.is_final());
        assert_eq!(state.arcs()[0].weight, Weight::Real(0.5));
        assert_eq!(read.kind(), Type::Acceptor);
    }

    #[test]
    fn malformed_lines() {
        let err = read_att("0 1 a\nx 1 b\n".as_bytes(), tropical()).unwrap_err();
        assert!(matches!(err, Error::Format { line: 2, .. }), "{err}");
        let err = read_att("0 1 a b c d\n".as_bytes(), tropical()).unwrap_err();
        assert!(matches!(err, Error::Format { line: 1, .. }));
        let err = read_att("0 zero\n".as_bytes(), tropical()).unwrap_err();
        assert!(matches!(err, Error::Format { line: 1, .. }));
    }
}
