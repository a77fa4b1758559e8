use std::io::Write;
use std::rc::Rc;

use crate::alphabet::{special_symbol, ConstAlphabetRef, StaticAlphabet};
use crate::automaton::{Automaton, State};
use crate::error::{Error, Result};
use crate::info::is_linear;
use crate::math::Set;
use crate::semiring::ConstSemiringRef;
use crate::storage::StaticAutomaton;
use crate::types::*;

fn symbol(label: LabelId, alphabet: &Option<ConstAlphabetRef>) -> String {
    match alphabet {
        Some(alphabet) => alphabet.symbol_or_id(label),
        None => label.to_string(),
    }
}

/// Writes the labels along the single path of a linear automaton as one line of symbols.
/// Epsilon and other reserved labels are skipped, transducers write `input:output` pairs.
pub fn write_linear<W: Write>(f: &dyn Automaton, out: &mut W) -> Result<()> {
    if !is_linear(f, true) {
        tracing::error!("{} is not linear", f.describe());
        return Err(Error::NotLinear);
    }
    let transducer = f.kind() == Type::Transducer;
    let input = f.input_alphabet();
    let output = f.output_alphabet();
    let mut tokens = vec![];
    let mut s = f.initial_state_id();
    let mut visited = Set::default();
    while let Some(sp) = f.get_state(s) {
        let Some(a) = sp.arcs().first() else {
            break;
        };
        if !visited.insert(s) {
            tracing::error!("{} has a cycle", f.describe());
            return Err(Error::NotLinear);
        }
        let i = (special_symbol(a.input).is_none()).then(|| symbol(a.input, &input));
        let o = (transducer && special_symbol(a.output).is_none())
            .then(|| symbol(a.output, &output));
        match (i, o) {
            (Some(i), Some(o)) => tokens.push(format!("{i}:{o}")),
            (Some(i), None) if !transducer => tokens.push(i),
            (Some(i), None) => tokens.push(format!("{i}:")),
            (None, Some(o)) => tokens.push(format!(":{o}")),
            (None, None) => {}
        }
        s = a.target;
    }
    writeln!(out, "{}", tokens.join(" "))?;
    Ok(())
}

/// Builds a linear acceptor from a line of whitespace separated symbols. Symbols are looked up in
/// `alphabet`, unknown symbols are an error; without an alphabet a new one is built from the
/// line.
pub fn read_linear(
    line: &str,
    alphabet: Option<ConstAlphabetRef>,
    semiring: ConstSemiringRef,
) -> Result<StaticAutomaton> {
    let mut built = StaticAlphabet::new();
    let mut labels = vec![];
    for token in line.split_whitespace() {
        let label = match &alphabet {
            Some(alphabet) => match alphabet.index(token) {
                INVALID_LABEL_ID => {
                    tracing::error!("unknown symbol \"{token}\"");
                    return Err(Error::Format {
                        line: 1,
                        message: format!("unknown symbol \"{token}\""),
                    });
                }
                label => label,
            },
            None => built.add_symbol(token),
        };
        labels.push(label);
    }

    let mut fsa = StaticAutomaton::new(Type::Acceptor, semiring);
    fsa.set_input_alphabet(Some(alphabet.unwrap_or_else(|| Rc::new(built))));
    let one = semiring.one();
    for (s, label) in labels.iter().enumerate() {
        let mut state = State::new(s as StateId);
        state.new_acceptor_arc(s as StateId + 1, one, *label);
        fsa.set_state(state);
    }
    fsa.set_state(State::new_final(labels.len() as StateId, one));
    fsa.set_initial_state_id(0);
    fsa.properties().set(
        PROPERTY_LINEAR | PROPERTY_ACYCLIC,
        PROPERTY_LINEAR | PROPERTY_ACYCLIC,
    );
    fsa.set_description("linear");
    Ok(fsa)
}
