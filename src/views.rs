//! Every view holds a reference to the automaton it is computed from and produces its states when
//! they are requested. Views that only edit states pointwise are built on [`ModifyAutomaton`],
//! views that only change a few of the capabilities of their upstream on [`SlaveAutomaton`].
mod base;
pub use base::{ModifyAutomaton, SlaveAutomaton};

mod cache;
pub use cache::{cache, cache_with, CacheAutomaton};

mod sort;
pub use sort::{sort, sort_arcs, SortType};

mod project;
pub use project::{invert, project_input, project_output};

mod relabel;
pub use relabel::{
    change_input_alphabet, change_output_alphabet, map_input, map_input_with, map_output,
    map_output_with,
};

mod weights;
pub use weights::{exp_weights, extend_by_fcn, extend_final, log_weights, multiply};

mod transpose;
pub use transpose::transpose;
