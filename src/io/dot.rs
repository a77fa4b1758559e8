use std::fmt::Display;
use std::io::Write;

use itertools::Itertools;

use crate::alphabet::{special_symbol, ConstAlphabetRef};
use crate::automaton::{state_name, Automaton, ConstAutomatonRef};
use crate::best::best;
use crate::error::Result;
use crate::info::for_each_reachable;
use crate::math::Set;
use crate::types::*;

/// What [`dot_representation`] shows besides the plain graph.
#[derive(Debug, Clone, Default)]
pub struct DotOptions {
    /// Label states with [`Automaton::dump_state`] instead of their id.
    pub detailed: bool,
    /// Arcs drawn in red, given as state and index of the arc within the state.
    pub highlighted: Set<(StateId, usize)>,
}

impl DotOptions {
    /// Labels states with their description.
    pub fn detailed(mut self) -> Self {
        self.detailed = true;
        self
    }

    /// Highlights the arcs of the best path of `f`.
    pub fn with_best_path(mut self, f: &ConstAutomatonRef) -> Self {
        let path = best(f.clone());
        let mut s = path.initial_state_id();
        let mut seen = Set::default();
        while seen.insert(s) {
            let (Some(chosen), Some(original)) = (path.get_state(s), f.get_state(s)) else {
                break;
            };
            let Some(arc) = chosen.arcs().first() else {
                break;
            };
            if let Some(index) = original.iter().position(|a| a == arc) {
                self.highlighted.insert((s, index));
            }
            s = arc.target;
        }
        self
    }
}

/// Enum that abstracts state attributes in the DOT format.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DotStateAttribute {
    /// The label of a node
    Label(String),
    /// The shape of a node
    Shape(String),
    /// The line style of a node
    Style(String),
}

impl Display for DotStateAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DotStateAttribute::Label(s) => write!(f, "label=\"{}\"", escape(s)),
            DotStateAttribute::Shape(s) => write!(f, "shape=\"{s}\""),
            DotStateAttribute::Style(s) => write!(f, "style=\"{s}\""),
        }
    }
}

/// Enum that abstracts arc attributes in the DOT format.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum DotTransitionAttribute {
    /// The label of an arc
    Label(String),
    /// The color of an arc
    Color(String),
    /// The line style of an arc
    Style(String),
}

impl Display for DotTransitionAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DotTransitionAttribute::Label(lbl) => write!(f, "label=\"{}\"", escape(lbl)),
            DotTransitionAttribute::Color(c) => write!(f, "color=\"{c}\""),
            DotTransitionAttribute::Style(s) => write!(f, "style=\"{s}\""),
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn label_text(label: LabelId, alphabet: &Option<ConstAlphabetRef>) -> String {
    match alphabet {
        Some(alphabet) => alphabet.symbol_or_id(label),
        None => special_symbol(label).map_or_else(|| label.to_string(), str::to_string),
    }
}

/// Compute the graphviz representation, for more information on the DOT format,
/// see the [graphviz documentation](https://graphviz.org/doc/info/lang.html).
/// Only states reachable from the initial state are shown, the initial state is drawn bold and
/// final states as double circles.
pub fn dot_representation(f: &dyn Automaton, options: &DotOptions) -> String {
    let semiring = f.semiring();
    let input = f.input_alphabet();
    let output = f.output_alphabet();
    let transducer = f.kind() == Type::Transducer;
    let mut states = Vec::new();
    for_each_reachable(f, |sp| states.push(sp.clone()));

    let header = [
        format!("digraph \"{}\" {{", escape(&f.describe())),
        "rankdir=LR".to_string(),
        "node [shape=circle]".to_string(),
    ];
    let nodes = states.iter().map(|sp| {
        let s = sp.id();
        let mut label = if options.detailed {
            state_name(f, s)
        } else {
            s.to_string()
        };
        let mut attributes = vec![];
        if sp.is_final() {
            if !semiring.is_default(sp.weight) {
                label = format!("{label}/{}", semiring.format(sp.weight));
            }
            attributes.push(DotStateAttribute::Shape("doublecircle".into()));
        }
        if s == f.initial_state_id() {
            attributes.push(DotStateAttribute::Style("bold".into()));
        }
        attributes.insert(0, DotStateAttribute::Label(label));
        format!("n{s} [{}]", attributes.iter().join(", "))
    });
    let arcs = states.iter().flat_map(|sp| {
        let s = sp.id();
        let input = &input;
        let output = &output;
        sp.iter()
            .enumerate()
            .map(move |(i, a)| {
                let mut label = label_text(a.input, input);
                if transducer {
                    label = format!("{label}:{}", label_text(a.output, output));
                }
                if !semiring.is_default(a.weight) {
                    label = format!("{label}/{}", semiring.format(a.weight));
                }
                let mut attributes = vec![DotTransitionAttribute::Label(label)];
                if options.highlighted.contains(&(s, i)) {
                    attributes.push(DotTransitionAttribute::Color("red".into()));
                    attributes.push(DotTransitionAttribute::Style("bold".into()));
                }
                format!("n{s} -> n{} [{}]", a.target, attributes.iter().join(", "))
            })
            .collect_vec()
    });

    header
        .into_iter()
        .chain(nodes)
        .chain(arcs)
        .chain(std::iter::once("}".to_string()))
        .join("\n")
}

/// Writes [`dot_representation`] of `f`.
pub fn write_dot<W: Write>(f: &dyn Automaton, options: &DotOptions, out: &mut W) -> Result<()> {
    writeln!(out, "{}", dot_representation(f, options))?;
    Ok(())
}

/// Renders the automaton as SVG by piping its dot representation through the `dot` binary and
/// returns the bytes of the image. This method is only available on the `graphviz` crate
/// feature.
#[cfg(feature = "graphviz")]
pub fn render(f: &dyn Automaton, options: &DotOptions) -> Result<Vec<u8>> {
    use std::io::Read;
    use std::process::{Command, Stdio};

    use crate::error::Error;

    let dot = dot_representation(f, options);
    tracing::trace!("writing dot representation\n{}", dot);

    let mut child = Command::new("dot")
        .arg("-Tsvg")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(dot.as_bytes())?;
    }

    let mut output = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        stdout.read_to_end(&mut output)?;
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(Error::Render(format!("dot process exited with status: {status}")));
    }
    Ok(output)
}

/// Attempts to render the automaton as SVG to a file with the given filename. This method is
/// only available on the `graphviz` crate feature and makes use of temporary files.
#[cfg(feature = "graphviz")]
pub fn render_to_file(
    f: &dyn Automaton,
    options: &DotOptions,
    filename: &std::path::Path,
) -> Result<()> {
    use crate::error::Error;

    tracing::trace!("Outputting dot and rendering to svg");
    let dot = dot_representation(f, options);
    let mut tempfile = tempfile::NamedTempFile::new()?;
    tempfile.write_all(dot.as_bytes())?;

    let output = std::process::Command::new("dot")
        .arg("-Tsvg")
        .arg("-o")
        .arg(filename)
        .arg(tempfile.path())
        .output()?;
    if !output.status.success() {
        return Err(Error::Render(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}
