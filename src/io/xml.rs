use std::io::{Read, Write};
use std::rc::Rc;

use serde::Deserialize;

use crate::alphabet::{special_index, special_symbol, Alphabet, ConstAlphabetRef, StaticAlphabet};
use crate::automaton::{Automaton, State};
use crate::error::{Error, Result};
use crate::info::for_each_reachable;
use crate::semiring::{ConstSemiringRef, SemiringType, Weight};
use crate::storage::StaticAutomaton;
use crate::types::*;

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn write_alphabet<W: Write>(tag: &str, alphabet: &dyn Alphabet, out: &mut W) -> Result<()> {
    writeln!(out, "  <{tag}>")?;
    for label in alphabet.labels() {
        if let Some(symbol) = alphabet.symbol(label) {
            writeln!(out, "    <symbol index=\"{label}\">{}</symbol>", escape(&symbol))?;
        }
    }
    if alphabet.n_disambiguators() > 0 {
        writeln!(out, "    <disambiguators>{}</disambiguators>", alphabet.n_disambiguators())?;
    }
    writeln!(out, "  </{tag}>")?;
    Ok(())
}

fn format_label(label: LabelId) -> String {
    match special_symbol(label) {
        Some(symbol) => escape(symbol),
        None => label.to_string(),
    }
}

/// Writes `f` as XML. Arcs refer to regular labels by id and to reserved labels by their symbol,
/// the alphabets list the symbols of the ids. Epsilon labels and weights equal to `one` are left
/// out.
pub fn write_xml<W: Write>(f: &dyn Automaton, out: &mut W) -> Result<()> {
    let semiring = f.semiring();
    writeln!(out, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    write!(
        out,
        "<fsa type=\"{}\" semiring=\"{}\"",
        f.kind().name(),
        semiring.name()
    )?;
    if f.initial_state_id() != INVALID_STATE_ID {
        write!(out, " initial=\"{}\"", f.initial_state_id())?;
    }
    writeln!(out, ">")?;
    writeln!(
        out,
        "  <!-- properties {:#x} of {:#x} known -->",
        f.properties().values() & f.properties().known(),
        f.properties().known()
    )?;
    if let Some(alphabet) = f.input_alphabet() {
        write_alphabet("input-alphabet", alphabet.as_ref(), out)?;
    }
    let transducer = f.kind() == Type::Transducer;
    if let (true, Some(alphabet)) = (transducer, f.output_alphabet()) {
        write_alphabet("output-alphabet", alphabet.as_ref(), out)?;
    }

    let mut states = Vec::new();
    for_each_reachable(f, |sp| states.push(sp.clone()));
    for sp in &states {
        write!(out, "  <state id=\"{}\">", sp.id())?;
        if sp.has_tags(STATE_TAG_USER) {
            write!(out, "<user/>")?;
        }
        if sp.is_final() {
            write!(out, "<final/>")?;
            if !semiring.is_default(sp.weight) {
                write!(out, "<weight>{}</weight>", semiring.format(sp.weight))?;
            }
        }
        writeln!(out)?;
        for a in sp.iter() {
            write!(out, "    <arc target=\"{}\">", a.target)?;
            if a.input != EPSILON {
                write!(out, "<in>{}</in>", format_label(a.input))?;
            }
            if transducer && a.output != EPSILON {
                write!(out, "<out>{}</out>", format_label(a.output))?;
            }
            if !semiring.is_default(a.weight) {
                write!(out, "<weight>{}</weight>", semiring.format(a.weight))?;
            }
            writeln!(out, "</arc>")?;
        }
        writeln!(out, "  </state>")?;
    }
    writeln!(out, "</fsa>")?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct XmlFsa {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    semiring: Option<String>,
    #[serde(default)]
    initial: Option<String>,
    #[serde(rename = "input-alphabet", default)]
    input_alphabet: Option<XmlAlphabet>,
    #[serde(rename = "output-alphabet", default)]
    output_alphabet: Option<XmlAlphabet>,
    #[serde(rename = "state", default)]
    states: Vec<XmlState>,
}

#[derive(Debug, Deserialize)]
struct XmlAlphabet {
    #[serde(rename = "symbol", default)]
    symbols: Vec<XmlSymbol>,
    #[serde(default)]
    disambiguators: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlSymbol {
    index: String,
    #[serde(rename = "$value", default)]
    symbol: String,
}

/// An empty element such as `<final/>`.
#[derive(Debug, Deserialize)]
struct Marker {}

#[derive(Debug, Deserialize)]
struct XmlState {
    id: String,
    #[serde(default)]
    user: Option<Marker>,
    #[serde(rename = "final", default)]
    is_final: Option<Marker>,
    #[serde(default)]
    weight: Option<String>,
    #[serde(rename = "arc", default)]
    arcs: Vec<XmlArc>,
}

#[derive(Debug, Deserialize)]
struct XmlArc {
    target: String,
    #[serde(rename = "in", default)]
    input: Option<String>,
    #[serde(rename = "out", default)]
    output: Option<String>,
    #[serde(default)]
    weight: Option<String>,
}

fn invalid(message: String) -> Error {
    tracing::error!("{message}");
    Error::Xml(message)
}

fn parse_state_id(text: &str) -> Result<StateId> {
    match text.trim().parse::<StateId>() {
        Ok(s) if s <= MAX_STATE_ID => Ok(s),
        Ok(s) => Err(invalid(format!("state id too large ({s} > {MAX_STATE_ID})"))),
        Err(_) => Err(invalid(format!("invalid state id \"{text}\""))),
    }
}

fn parse_label(text: &str) -> Result<LabelId> {
    let text = text.trim();
    if let Ok(label) = text.parse::<LabelId>() {
        return Ok(label);
    }
    special_index(text).ok_or_else(|| invalid(format!("invalid label \"{text}\"")))
}

fn parse_weight(text: Option<&str>, semiring: ConstSemiringRef) -> Result<Weight> {
    let Some(text) = text else {
        return Ok(semiring.one());
    };
    match semiring.parse(text) {
        Weight::Invalid => Err(invalid(format!("invalid weight \"{text}\""))),
        w => Ok(w),
    }
}

fn build_alphabet(xml: &XmlAlphabet) -> Result<ConstAlphabetRef> {
    let mut alphabet = StaticAlphabet::new();
    for symbol in &xml.symbols {
        let label = parse_label(&symbol.index)?;
        if !(FIRST_LABEL_ID..=LAST_LABEL_ID).contains(&label) {
            return Err(invalid(format!("label {label} of \"{}\" is reserved", symbol.symbol)));
        }
        alphabet.add_indexed_symbol(&symbol.symbol, label);
    }
    if let Some(n) = &xml.disambiguators {
        let n: u32 = n
            .trim()
            .parse()
            .map_err(|_| invalid(format!("invalid number of disambiguators \"{n}\"")))?;
        if n > 0 {
            alphabet.disambiguator(n - 1);
        }
    }
    Ok(Rc::new(alphabet))
}

/// Reads an automaton written by [`write_xml`]. Documents without a type are read as
/// transducers, documents without a known semiring use `semiring`.
pub fn read_xml<R: Read>(input: R, semiring: ConstSemiringRef) -> Result<StaticAutomaton> {
    let xml: XmlFsa = serde_xml_rs::from_reader(input).map_err(|e| invalid(e.to_string()))?;
    let kind = match xml.kind.as_deref().map(|name| (name, Type::from_name(name))) {
        Some((_, Some(kind))) if kind != Type::Unknown => kind,
        Some((name, _)) => {
            tracing::warn!("unknown type \"{name}\", reading a transducer");
            Type::Transducer
        }
        None => {
            tracing::warn!("no type given, reading a transducer");
            Type::Transducer
        }
    };
    let named = xml
        .semiring
        .as_deref()
        .and_then(SemiringType::from_name)
        .and_then(SemiringType::semiring);
    let semiring = named.unwrap_or_else(|| {
        tracing::warn!(
            "semiring {:?} not found, using {}",
            xml.semiring,
            semiring.name()
        );
        semiring
    });

    let mut fsa = StaticAutomaton::new(kind, semiring);
    match &xml.initial {
        Some(initial) => fsa.set_initial_state_id(parse_state_id(initial)?),
        None => tracing::warn!("no initial state given"),
    }
    if let Some(alphabet) = &xml.input_alphabet {
        fsa.set_input_alphabet(Some(build_alphabet(alphabet)?));
    }
    if let Some(alphabet) = &xml.output_alphabet {
        if kind == Type::Acceptor {
            tracing::warn!("ignoring the output alphabet of an acceptor");
        } else {
            fsa.set_output_alphabet(Some(build_alphabet(alphabet)?));
        }
    }

    for xml_state in &xml.states {
        let mut state = State::new(parse_state_id(&xml_state.id)?);
        if xml_state.user.is_some() {
            state.add_tags(STATE_TAG_USER);
        }
        if xml_state.is_final.is_some() {
            state.set_final(parse_weight(xml_state.weight.as_deref(), semiring)?);
        }
        for arc in &xml_state.arcs {
            let target = parse_state_id(&arc.target)?;
            let input = arc.input.as_deref().map_or(Ok(EPSILON), parse_label)?;
            let output = match (kind, arc.output.as_deref()) {
                (Type::Acceptor, Some(_)) => {
                    return Err(invalid("acceptor must not have output labels".to_string()));
                }
                (Type::Acceptor, None) => input,
                (_, output) => output.map_or(Ok(EPSILON), parse_label)?,
            };
            let weight = parse_weight(arc.weight.as_deref(), semiring)?;
            state.new_arc(target, weight, input, output);
        }
        fsa.set_state(state);
    }
    fsa.set_description("xml");
    tracing::debug!("read {} states from xml", xml.states.len());
    Ok(fsa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;

    fn to_string(f: &dyn Automaton) -> String {
        let mut out = vec![];
        write_xml(f, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn acceptor_document() {
        let xml = to_string(&fixtures::linear_ab());
        let expected = [
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
            "<fsa type=\"acceptor\" semiring=\"tropical\" initial=\"0\">",
        ];
        assert!(xml.starts_with(&expected.join("\n")), "{xml}");
        assert!(xml.contains("    <symbol index=\"1\">b</symbol>\n"));
        let arc = "    <arc target=\"1\"><in>0</in><weight>1</weight></arc>\n";
        assert!(xml.contains(&format!("  <state id=\"0\">\n{arc}")));
        assert!(xml.contains("  <state id=\"2\"><final/>\n  </state>\n"));
        assert!(!xml.contains("output-alphabet"));
        assert!(xml.ends_with("</fsa>\n"));
    }

    #[test]
    fn special_labels_and_escaping() {
        let f = StaticAutomaton::builder(Type::Transducer, log())
            .with_alphabets(
                fixtures::alphabet(&["<s>", "a&b"]),
                fixtures::alphabet(&["x"]),
            )
            .with_transducer_arcs([(0, 1, EPSILON, 0, 0.0), (1, 2, FAILURE, EPSILON, 0.5)])
            .with_finals([(2, 2.0)])
            .build();
        let xml = to_string(&f);
        assert!(xml.contains("<symbol index=\"0\">&lt;s&gt;</symbol>"));
        assert!(xml.contains("<symbol index=\"1\">a&amp;b</symbol>"));
        assert!(xml.contains("<output-alphabet>"));
        assert!(xml.contains("<arc target=\"1\"><out>0</out></arc>"));
        assert!(xml.contains("<arc target=\"2\"><in>*FAILURE*</in><weight>0.5</weight></arc>"));
        assert!(xml.contains("<state id=\"2\"><final/><weight>2</weight>"));
    }

    #[test_log::test]
    fn documents_read_back() {
        let f = StaticAutomaton::builder(Type::Transducer, log())
            .with_alphabets(
                fixtures::alphabet(&["<s>", "a&b"]),
                fixtures::alphabet(&["x", "y"]),
            )
            .with_transducer_arcs([
                (0, 1, EPSILON, 0, 0.0),
                (1, 2, FAILURE, EPSILON, 0.5),
                (1, 2, 1, 1, 1.25),
            ])
            .with_finals([(2, 2.0)])
            .build();
        let read = read_xml(to_string(&f).as_bytes(), tropical()).unwrap();
        assert_eq!(read.kind(), Type::Transducer);
        assert_eq!(read.semiring().kind(), SemiringType::Log);
        assert_eq!(read.initial_state_id(), 0);
        for s in 0..3 {
            assert_eq!(read.get_state(s), f.get_state(s), "state {s}");
        }
        let input = read.input_alphabet().unwrap();
        assert_eq!(input.symbol(0).as_deref(), Some("<s>"));
        assert_eq!(input.index("a&b"), 1);
        assert_eq!(read.output_alphabet().unwrap().index("y"), 1);
    }

    #[test]
    fn acceptor_documents_and_user_tags() {
        let mut f = fixtures::diamond();
        f.state_mut(1).add_tags(STATE_TAG_USER);
        f.input_alphabet().unwrap().disambiguator(1);
        let xml = to_string(&f);
        assert!(xml.contains("<state id=\"1\"><user/>"));
        let read = read_xml(xml.as_bytes(), log()).unwrap();
        assert_eq!(read.kind(), Type::Acceptor);
        assert_eq!(read.semiring().kind(), SemiringType::Tropical);
        assert!(read.get_state(1).unwrap().has_tags(STATE_TAG_USER));
        assert_eq!(read.input_alphabet().unwrap().n_disambiguators(), 2);
        assert_eq!(bestscore(read.into_ref()), Weight::Real(3.0));
    }

    #[test]
    fn malformed_documents() {
        let read = |xml: &str| read_xml(xml.as_bytes(), tropical());
        let acceptor_with_output = r#"<fsa type="acceptor" semiring="tropical" initial="0">
            <state id="0"><arc target="0"><in>1</in><out>2</out></arc></state>
            </fsa>"#;
        assert!(matches!(read(acceptor_with_output), Err(Error::Xml(_))));
        let bad_weight = r#"<fsa type="acceptor" semiring="tropical">
            <state id="0"><final/><weight>heavy</weight></state>
            </fsa>"#;
        assert!(matches!(read(bad_weight), Err(Error::Xml(_))));
        let bad_label = r#"<fsa type="acceptor"><state id="0">
            <arc target="0"><in>*NOPE*</in></arc></state></fsa>"#;
        assert!(matches!(read(bad_label), Err(Error::Xml(_))));
        assert!(matches!(read("<fsa"), Err(Error::Xml(_))));

        let untyped = read(r#"<fsa semiring="nonsense"><state id="3"><final/></state></fsa>"#);
        let untyped = untyped.unwrap();
        assert_eq!(untyped.kind(), Type::Transducer);
        assert_eq!(untyped.semiring().kind(), SemiringType::Tropical);
        assert_eq!(untyped.initial_state_id(), INVALID_STATE_ID);
        assert!(untyped.get_state(3).unwrap().is_final());
    }

    #[test]
    fn empty_automaton_has_no_initial_attribute() {
        let xml = to_string(&StaticAutomaton::new(Type::Acceptor, count_semiring()));
        assert!(xml.contains("<fsa type=\"acceptor\" semiring=\"count\">"));
        assert!(!xml.contains("<state"));
    }
}
