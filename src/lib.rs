//! Library for weighted finite-state automata and transducers.
//!
//! An automaton is a labeled, weighted directed graph with a single initial state and a set of
//! final states. Every automaton is interpreted over a [`semiring::Semiring`], which determines
//! how weights are combined along a path (`extend`) and across alternative paths (`collect`).
//! Arcs carry an input and an output label; for acceptors the two coincide.
//!
//! The central abstraction is the [`Automaton`] trait. It gives access to the type, semiring,
//! alphabets and initial state of an automaton and returns states on demand through
//! [`Automaton::get_state`]. Almost every algorithm in this crate consumes one or more
//! [`ConstAutomatonRef`]s and returns a new automaton whose states are only computed once they are
//! requested. This means that chains such as
//! `minimize(determinize(compose_matching(a, b)))` can be built up cheaply, the real work is done
//! when a consumer starts walking the result. To avoid recomputation, a lazy automaton can either
//! be wrapped in a [`views::cache`] or be materialized into one of the storage representations
//! ([`storage::StaticAutomaton`], [`storage::PackedAutomaton`]).
//!
//! The crate is organized as follows
//! - [`semiring`] contains the tropical, log, count and expectation semirings,
//! - [`automaton`] defines states, arcs and the automaton trait,
//! - [`storage`] and [`views`] contain materialized and lazy automata,
//! - [`rational`] combines automata by union, concatenation and closure,
//! - [`compose`], [`determinize`], [`minimize`], [`sssp`], [`best`] and [`prune`] implement the
//!   algorithms,
//! - [`io`] and [`archive`] read and write automata.
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The prelude is supposed to make using this package easier. Including everything, i.e.
/// `use wfst::prelude::*;` should be enough to use the package.
pub mod prelude {
    pub use super::{
        alphabet::{Alphabet, ConstAlphabetRef, StaticAlphabet},
        automaton::{
            Arc, Automaton, ConstAutomatonRef, ConstMappingRef, ConstStateRef, Mapping, State,
        },
        basic::{change_semiring, hypothesis, identity, normalize, partial, trim},
        best::{best, bestscore, firstbest, nbest},
        compose::{compose_matching, compose_sequencing, map_to_left, map_to_right},
        config::Config,
        determinize::determinize,
        error::{Error, Result},
        info::{count, is_acyclic, is_empty, is_linear},
        math,
        minimize::{minimize, minimize_simple},
        prune::prune_posterior,
        rational::{closure, complement, concat, fuse, kleene_closure, unite},
        semiring::{
            count_semiring, expectation, log, tropical, ConstSemiringRef, Semiring,
            SemiringType, Weight,
        },
        sssp::{sssp, sssp_backward, StatePotentials},
        storage::{packed_copy, static_copy, PackedAutomaton, StaticAutomaton},
        types::*,
        views::{cache, project_input, project_output, sort, transpose, SortType},
    };
}

/// Fundamental types: state and label ids, reserved labels, state tags and property bits.
pub mod types;

/// This module contains some definitions of mathematical objects which are used throughout the
/// crate and do not really fit to the top level.
pub mod math;

/// The error type for reportable failures.
pub mod error;

/// Tunable parameters of the lazy algorithms.
pub mod config;

/// Semirings and weights.
pub mod semiring;

/// Module that contains definitions for dealing with alphabets.
pub mod alphabet;

/// Defines the automaton interface together with states, arcs and state mappings.
pub mod automaton;
pub use automaton::{Automaton, ConstAutomatonRef};

/// Materialized automata.
pub mod storage;

/// Lazy views on top of other automata.
pub mod views;

/// Basic structural operations such as trimming and renumbering.
pub mod basic;

/// Union, concatenation, closure and complement.
pub mod rational;

/// Size statistics and structural properties that need a full traversal.
pub mod info;

/// Generic single-source shortest distance and the algorithms built on top of it.
pub mod sssp;

/// Composition of transducers.
pub mod compose;

/// Weighted determinization.
pub mod determinize;

/// Weighted minimization.
pub mod minimize;

/// Best path, n-best paths and first-best search.
pub mod best;

/// Posterior pruning.
pub mod prune;

/// Readers and writers for the binary, AT&T, XML, dot and linear formats.
pub mod io;

/// Container for several automata sharing one set of alphabets.
pub mod archive;
