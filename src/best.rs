//! Best path extraction: the single best path, the `n` best paths and a best-first search that
//! gets by without potentials.
//!
//! Paths are ranked by [`Semiring::compare`], the best path has the smallest weight. None of the
//! searches terminates reliably on automata with cycles of negative weight.
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;

use crate::alphabet::ConstAlphabetRef;
use crate::automaton::{Automaton, ConstAutomatonRef, ConstStateRef, Properties, State};
use crate::basic::change_semiring;
use crate::math::Map;
use crate::semiring::{tropical, ConstSemiringRef, Semiring, SemiringType, Weight};
use crate::sssp::{sssp, sssp_backward, StatePotentials};
use crate::types::*;
use crate::views::{transpose, ModifyAutomaton, SlaveAutomaton};

/// An element of a [`BestFirstQueue`].
struct Queued<T> {
    weight: Weight,
    sequence: u64,
    semiring: ConstSemiringRef,
    item: T,
}

impl<T> Ord for Queued<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // `BinaryHeap` pops the maximum
        self.semiring
            .compare(other.weight, self.weight)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl<T> PartialOrd for Queued<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Queued<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Queued<T> {}

/// A priority queue that pops the item with the best weight first and, among equal weights, the
/// one that was pushed first.
pub(crate) struct BestFirstQueue<T> {
    heap: BinaryHeap<Queued<T>>,
    semiring: ConstSemiringRef,
    sequence: u64,
}

impl<T> BestFirstQueue<T> {
    pub(crate) fn new(semiring: ConstSemiringRef) -> Self {
        Self {
            heap: BinaryHeap::new(),
            semiring,
            sequence: 0,
        }
    }

    pub(crate) fn push(&mut self, weight: Weight, item: T) {
        self.sequence += 1;
        self.heap.push(Queued {
            weight,
            sequence: self.sequence,
            semiring: self.semiring,
            item,
        });
    }

    pub(crate) fn pop(&mut self) -> Option<(Weight, T)> {
        self.heap.pop().map(|q| (q.weight, q.item))
    }
}

fn is_zero(semiring: &dyn Semiring, w: Weight) -> bool {
    semiring.compare(w, semiring.zero()).is_eq()
}

/// Weight of the best path through `f`, or rather the collection of all path weights, which is
/// the same for the tropical semiring. [`Weight::Invalid`] if `f` has no successful path.
pub fn bestscore(f: ConstAutomatonRef) -> Weight {
    let initial = f.initial_state_id();
    if initial == INVALID_STATE_ID {
        return Weight::Invalid;
    }
    let semiring = f.semiring();
    let w = sssp_backward(f)[initial];
    if is_zero(semiring, w) {
        return Weight::Invalid;
    }
    w
}

/// Keeps of every state only the arc that leads to the best completion, or nothing if finishing
/// in the state is better. Self loops are never chosen. The part of the result that is reachable
/// is the best path of `f`.
pub fn best(f: ConstAutomatonRef) -> ConstAutomatonRef {
    let potentials = sssp_backward(f.clone());
    best_with_potentials(f, potentials)
}

/// [`best`] with backward potentials computed before, e.g. by [`sssp_backward`].
pub fn best_with_potentials(
    f: ConstAutomatonRef,
    potentials: StatePotentials,
) -> ConstAutomatonRef {
    let semiring = f.semiring();
    let initial = f.initial_state_id();
    let initial = if initial != INVALID_STATE_ID && !is_zero(semiring, potentials[initial]) {
        initial
    } else {
        INVALID_STATE_ID
    };
    let description = format!("best({})", f.describe());
    let view = ModifyAutomaton::new(f, description, move |state: &mut State| {
        let s = state.id();
        let best_arc = state
            .iter()
            .filter(|a| a.target != s)
            .map(|a| (*a, semiring.extend(a.weight, potentials[a.target])))
            .filter(|(_, w)| !is_zero(semiring, *w))
            .min_by(|(_, a), (_, b)| semiring.compare(*a, *b));
        let finish = state.is_final()
            && best_arc.map_or(true, |(_, w)| semiring.compare(state.weight, w).is_lt());
        state.arcs_mut().clear();
        match best_arc {
            Some((arc, _)) if !finish => {
                state.unset_final();
                state.arcs_mut().push(arc);
            }
            _ => {}
        }
    })
    .map_base(|base: SlaveAutomaton| {
        base.with_initial(initial).with_properties(
            PROPERTY_SORTED | PROPERTY_LINEAR | PROPERTY_ACYCLIC,
            PROPERTY_SORTED | PROPERTY_LINEAR | PROPERTY_ACYCLIC,
        )
    });
    Rc::new(view)
}

/// A path through an automaton.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    /// Weight of the path, final weight included.
    pub weight: Weight,
    /// Input labels without epsilons.
    pub input: Vec<LabelId>,
    /// Output labels without epsilons.
    pub output: Vec<LabelId>,
}

type TraceId = u32;

/// The trace every search starts from.
const ROOT: TraceId = 0;

#[derive(Debug, Clone, Copy)]
struct Trace {
    input: LabelId,
    output: LabelId,
    references: u32,
    predecessor: TraceId,
}

/// Reference counted traces. Traces that are no longer referenced are recycled through a free
/// list.
#[derive(Debug)]
struct TracePool {
    traces: Vec<Trace>,
    free: Vec<TraceId>,
}

impl TracePool {
    fn new() -> Self {
        let root = Trace {
            input: INVALID_LABEL_ID,
            output: INVALID_LABEL_ID,
            references: 1,
            predecessor: ROOT,
        };
        Self {
            traces: vec![root],
            free: Vec::new(),
        }
    }

    fn extend(&mut self, predecessor: TraceId, input: LabelId, output: LabelId) -> TraceId {
        self.traces[predecessor as usize].references += 1;
        let trace = Trace {
            input,
            output,
            references: 1,
            predecessor,
        };
        match self.free.pop() {
            Some(t) => {
                self.traces[t as usize] = trace;
                t
            }
            None => {
                self.traces.push(trace);
                (self.traces.len() - 1) as TraceId
            }
        }
    }

    fn acquire(&mut self, t: TraceId) {
        self.traces[t as usize].references += 1;
    }

    fn release(&mut self, mut t: TraceId) {
        while t != ROOT {
            let trace = &mut self.traces[t as usize];
            trace.references -= 1;
            if trace.references > 0 {
                return;
            }
            self.free.push(t);
            t = trace.predecessor;
        }
    }

    fn get(&self, t: TraceId) -> &Trace {
        &self.traces[t as usize]
    }
}

/// The result of the n-best search: one trace and weight per path, best first.
struct NBestTraces {
    pool: TracePool,
    paths: Vec<(TraceId, Weight)>,
}

impl NBestTraces {
    /// Searches the transposed automaton, so that the traces, which point backwards, list the
    /// arcs of `f` in forward order. The forward potentials of `f` are exact estimates of the
    /// remaining weight.
    fn search(f: &ConstAutomatonRef, n: usize) -> Self {
        let mut result = Self {
            pool: TracePool::new(),
            paths: Vec::new(),
        };
        if n == 0 || f.initial_state_id() == INVALID_STATE_ID {
            return result;
        }
        let semiring = f.semiring();
        let potentials = match semiring.kind() {
            SemiringType::Log => sssp(change_semiring(f.clone(), tropical())),
            _ => sssp(f.clone()),
        };
        let transposed = transpose(f.clone());
        let start = transposed.initial_state_id();
        if start == INVALID_STATE_ID {
            return result;
        }
        let mut visits: Vec<usize> = Vec::new();
        let mut queue = BestFirstQueue::new(semiring);
        let priority = |weight: Weight, s: StateId| semiring.extend(weight, potentials[s]);
        queue.push(priority(semiring.one(), start), (start, semiring.one(), ROOT));
        result.pool.acquire(ROOT);
        let mut n_popped = 0usize;
        while let Some((_, (s, weight, trace))) = queue.pop() {
            n_popped += 1;
            let Some(sp) = transposed.get_state(s) else {
                result.pool.release(trace);
                continue;
            };
            if sp.is_final() {
                result.pool.acquire(trace);
                result.paths.push((trace, semiring.extend(weight, sp.weight)));
                if result.paths.len() == n {
                    result.pool.release(trace);
                    break;
                }
            }
            if visits.len() <= s as usize {
                visits.resize(s as usize + 1, 0);
            }
            visits[s as usize] += 1;
            if visits[s as usize] <= n {
                for a in sp.iter() {
                    let w = semiring.extend(weight, a.weight);
                    if is_zero(semiring, w) {
                        continue;
                    }
                    let t = result.pool.extend(trace, a.input, a.output);
                    queue.push(priority(w, a.target), (a.target, w, t));
                }
            }
            result.pool.release(trace);
        }
        tracing::debug!(
            "n-best search found {} of {n} paths after {n_popped} hypotheses",
            result.paths.len()
        );
        result
    }

    fn path(&self, k: usize) -> Path {
        let (mut t, weight) = self.paths[k];
        let mut path = Path {
            weight,
            input: Vec::new(),
            output: Vec::new(),
        };
        while t != ROOT {
            let trace = self.pool.get(t);
            if trace.input != EPSILON {
                path.input.push(trace.input);
            }
            if trace.output != EPSILON {
                path.output.push(trace.output);
            }
            t = trace.predecessor;
        }
        path
    }
}

/// The `n` best paths of an automaton as an automaton, see [`nbest`].
///
/// State 0 is the initial state with one epsilon arc per path, carrying the path weight. States
/// `1..=n` start the paths, every other state `n + 1 + t` stands for trace `t` of the search.
/// Paths that end in the same way share their states.
pub struct NBestAutomaton {
    base: SlaveAutomaton,
    traces: NBestTraces,
}

impl NBestAutomaton {
    fn trace_state(&self, t: TraceId) -> StateId {
        (self.traces.paths.len() + 1) as StateId + t
    }

    fn node(&self, s: StateId, t: TraceId) -> State {
        let one = self.semiring().one();
        if t == ROOT {
            return State::new_final(s, one);
        }
        let trace = self.traces.pool.get(t);
        let mut sp = State::new(s);
        sp.new_arc(self.trace_state(trace.predecessor), one, trace.input, trace.output);
        sp
    }

    /// Number of paths found.
    pub fn n_paths(&self) -> usize {
        self.traces.paths.len()
    }
}

impl Automaton for NBestAutomaton {
    fn kind(&self) -> Type {
        self.base.kind()
    }

    fn properties(&self) -> &Properties {
        self.base.properties()
    }

    fn semiring(&self) -> ConstSemiringRef {
        self.base.semiring()
    }

    fn initial_state_id(&self) -> StateId {
        0
    }

    fn input_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.base.input_alphabet()
    }

    fn output_alphabet(&self) -> Option<ConstAlphabetRef> {
        self.base.output_alphabet()
    }

    fn get_state(&self, s: StateId) -> Option<ConstStateRef> {
        let n = self.traces.paths.len();
        let sp = match s as usize {
            0 => {
                let mut sp = State::new(0);
                for (k, &(_, weight)) in self.traces.paths.iter().enumerate() {
                    sp.new_arc(k as StateId + 1, weight, EPSILON, EPSILON);
                }
                sp
            }
            k if k <= n => self.node(s, self.traces.paths[k - 1].0),
            k => {
                let t = (k - n - 1) as TraceId;
                if t as usize >= self.traces.pool.traces.len() {
                    return None;
                }
                self.node(s, t)
            }
        };
        Some(Rc::new(sp))
    }

    fn dump_state(&self, s: StateId, out: &mut dyn fmt::Write) -> fmt::Result {
        match s as usize {
            0 => write!(out, "start"),
            k if k <= self.n_paths() => write!(out, "path {k}"),
            k => write!(out, "trace {}", k - self.n_paths() - 1),
        }
    }

    fn describe(&self) -> String {
        self.base.describe()
    }
}

/// The `n` best paths of `f`, found by a best-first search that expands every state at most `n`
/// times. Fewer paths are returned if `f` has fewer.
pub fn nbest(f: ConstAutomatonRef, n: usize) -> Rc<NBestAutomaton> {
    let traces = NBestTraces::search(&f, n);
    let description = format!("nbest({},{n})", f.describe());
    let base = SlaveAutomaton::new(f, description).with_properties(
        PROPERTY_SORTED_BY_INPUT | PROPERTY_ACYCLIC,
        PROPERTY_SORTED_BY_INPUT | PROPERTY_ACYCLIC,
    );
    Rc::new(NBestAutomaton { base, traces })
}

/// The `n` best paths of `f`, best first.
pub fn n_best_paths(f: ConstAutomatonRef, n: usize) -> Vec<Path> {
    let traces = NBestTraces::search(&f, n);
    (0..traces.paths.len()).map(|k| traces.path(k)).collect()
}

/// Best path by a best-first search over `f` itself. Every state is expanded at most once, so
/// arc weights must not be negative. Only the states on the best path are available in the
/// result.
pub fn firstbest(f: ConstAutomatonRef) -> ConstAutomatonRef {
    let semiring = f.semiring();
    // trace: (predecessor trace, state, arc index or none for finishing)
    let mut traces: Vec<(usize, StateId, Option<usize>)> = vec![(0, INVALID_STATE_ID, None)];
    let mut closed: Map<StateId, Weight> = Map::default();
    let mut queue = BestFirstQueue::new(semiring);
    let initial = f.initial_state_id();
    let mut found = None;
    if initial != INVALID_STATE_ID {
        queue.push(semiring.one(), (initial, 0usize));
    }
    while let Some((weight, (s, trace))) = queue.pop() {
        if s & STATE_TAG_FINAL != 0 {
            found = Some(trace);
            break;
        }
        if closed.contains_key(&s) {
            continue;
        }
        closed.insert(s, weight);
        let Some(sp) = f.get_state(s) else {
            continue;
        };
        for (i, a) in sp.iter().enumerate() {
            if closed.contains_key(&a.target) {
                continue;
            }
            traces.push((trace, s, Some(i)));
            queue.push(semiring.extend(weight, a.weight), (a.target, traces.len() - 1));
        }
        if sp.is_final() {
            traces.push((trace, s, None));
            queue.push(semiring.extend(weight, sp.weight), (s | STATE_TAG_FINAL, traces.len() - 1));
        }
    }
    tracing::debug!("first-best search closed {} states", closed.len());

    let mut path: Map<StateId, Option<usize>> = Map::default();
    let mut trace = found.unwrap_or(0);
    while trace != 0 {
        let (back, s, arc) = traces[trace];
        path.insert(s, arc);
        trace = back;
    }
    let initial = if found.is_some() {
        initial
    } else {
        INVALID_STATE_ID
    };
    let description = format!("firstbest({})", f.describe());
    let view = ModifyAutomaton::new(f, description, move |state: &mut State| {
        match path.get(&state.id()) {
            Some(Some(i)) => {
                let arc = state[*i];
                state.arcs_mut().clear();
                state.arcs_mut().push(arc);
                state.unset_final();
            }
            Some(None) => state.arcs_mut().clear(),
            None => {
                state.arcs_mut().clear();
                state.unset_final();
            }
        }
    })
    .map_base(|base: SlaveAutomaton| {
        base.with_initial(initial).with_properties(
            PROPERTY_SORTED | PROPERTY_LINEAR | PROPERTY_ACYCLIC,
            PROPERTY_SORTED | PROPERTY_LINEAR | PROPERTY_ACYCLIC,
        )
    });
    Rc::new(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;
    use crate::sssp::count_paths;

    fn labels(f: &dyn Automaton) -> Vec<LabelId> {
        let mut labels = Vec::new();
        let mut s = f.initial_state_id();
        while let Some(sp) = f.get_state(s) {
            match sp.arcs().first() {
                Some(a) => {
                    if a.input != EPSILON {
                        labels.push(a.input);
                    }
                    s = a.target;
                }
                None => break,
            }
        }
        labels
    }

    #[test_log::test]
    fn best_of_a_linear_automaton() {
        let f = fixtures::linear_ab().into_ref();
        assert_eq!(bestscore(f.clone()), Weight::Real(3.0));
        let b = best(f);
        assert!(is_linear(b.as_ref(), false));
        assert_eq!(labels(b.as_ref()), vec![0, 1]);
    }

    #[test]
    fn best_path_of_the_diamond() {
        let f = fixtures::diamond().into_ref();
        assert_eq!(bestscore(f.clone()), Weight::Real(3.0));
        let b = best(f.clone());
        assert_eq!(labels(b.as_ref()), vec![0, 2]);
        assert_eq!(count(b.as_ref()).n_arcs, 2);
        let fb = firstbest(f);
        assert_eq!(labels(fb.as_ref()), vec![0, 2]);
        assert_eq!(bestscore(fb), Weight::Real(3.0));
    }

    #[test]
    fn no_path() {
        let f = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_arcs([(0, 1, 0, 1.0)])
            .build()
            .into_ref();
        assert_eq!(bestscore(f.clone()), Weight::Invalid);
        assert_eq!(best(f.clone()).initial_state_id(), INVALID_STATE_ID);
        assert_eq!(firstbest(f.clone()).initial_state_id(), INVALID_STATE_ID);
        assert!(n_best_paths(f.clone(), 3).is_empty());
        assert!(is_empty(nbest(f, 3).as_ref()));
    }

    #[test]
    fn finishing_early_beats_a_worse_continuation() {
        let f = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_arcs([(0, 1, 0, 1.0), (1, 2, 1, 5.0)])
            .with_finals([(1, 2.0), (2, 0.0)])
            .build()
            .into_ref();
        let b = best(f.clone());
        assert_eq!(labels(b.as_ref()), vec![0]);
        assert!(b.get_state(1).unwrap().is_final());
        assert_eq!(labels(firstbest(f).as_ref()), vec![0]);
    }

    #[test_log::test]
    fn n_best_paths_are_ordered() {
        let f = fixtures::diamond().into_ref();
        let paths = n_best_paths(f.clone(), 5);
        let weights: Vec<_> = paths.iter().map(|p| p.weight).collect();
        assert_eq!(weights, vec![Weight::Real(3.0), Weight::Real(5.0), Weight::Real(6.0)]);
        assert_eq!(paths[0].input, vec![0, 2]);
        assert_eq!(paths[1].input, vec![1, 2]);
        assert_eq!(paths[2].input, vec![0, 1]);
        assert_eq!(paths[0].weight, bestscore(f));
    }

    #[test]
    fn nbest_automaton() {
        let f = fixtures::diamond().into_ref();
        let nb = nbest(f.clone(), 2);
        assert_eq!(nb.n_paths(), 2);
        let start = nb.get_state(0).unwrap();
        let weights: Vec<_> = start.iter().map(|a| a.weight).collect();
        assert_eq!(weights, vec![Weight::Real(3.0), Weight::Real(5.0)]);
        assert_eq!(count_paths(nb.clone()), Weight::Count(2));
        assert_eq!(bestscore(nb.clone()), Weight::Real(3.0));
        assert!(is_acyclic(nb.as_ref(), false));
    }

    #[test]
    fn cycles_are_unrolled_at_most_n_times() {
        // a loop of weight 1 on the final state: paths a, a a, a a a, ...
        let f = StaticAutomaton::builder(Type::Acceptor, tropical())
            .with_arcs([(0, 1, 0, 1.0), (1, 1, 0, 1.0)])
            .with_finals([(1, 0.0)])
            .build()
            .into_ref();
        let paths = n_best_paths(f, 3);
        let lengths: Vec<_> = paths.iter().map(|p| p.input.len()).collect();
        assert_eq!(lengths, vec![1, 2, 3]);
        assert_eq!(paths[2].weight, Weight::Real(3.0));
    }

    #[test]
    fn trace_pool_recycles_released_traces() {
        let mut pool = TracePool::new();
        let a = pool.extend(ROOT, 1, 1);
        let b = pool.extend(a, 2, 2);
        pool.release(b);
        assert_eq!(pool.get(a).references, 1);
        pool.release(a);
        assert_eq!(pool.free.len(), 2);
        let c = pool.extend(ROOT, 3, 3);
        assert!(c == a || c == b);
        assert_eq!(pool.traces.len(), 3);
    }

    #[test]
    fn queue_pops_best_first_and_keeps_insertion_order() {
        let mut queue = BestFirstQueue::new(tropical());
        queue.push(Weight::Real(2.0), 'a');
        queue.push(Weight::Real(1.0), 'b');
        queue.push(Weight::Real(2.0), 'c');
        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|(_, c)| c).collect();
        assert_eq!(order, vec!['b', 'a', 'c']);
    }
}
