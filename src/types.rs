/// Dense index of a state. Only the lower [`STATE_ID_BITS`] bits carry the id, the upper bits are
/// reserved for tags (see [`STATE_TAG_FINAL`]).
pub type StateId = u32;
/// Index of a symbol in an [`crate::alphabet::Alphabet`]. Negative values and values above
/// [`LAST_LABEL_ID`] are reserved.
pub type LabelId = i32;
/// Tag bits that are stored in the upper bits of a [`StateId`].
pub type StateTag = u32;
/// A bit mask of [`PROPERTY_STORAGE`], [`PROPERTY_ACYCLIC`] and friends.
pub type Property = u32;

/// Number of bits available for state ids.
pub const STATE_ID_BITS: u32 = 30;
/// Mask selecting the id part of a tagged state id.
pub const STATE_ID_MASK: StateId = (1 << STATE_ID_BITS) - 1;
/// Mask selecting the tag part of a tagged state id.
pub const STATE_TAG_MASK: StateTag = !STATE_ID_MASK;
/// No tags set.
pub const STATE_TAG_NONE: StateTag = 0;
/// Marks a final state.
pub const STATE_TAG_FINAL: StateTag = 1 << STATE_ID_BITS;
/// Free for use by algorithms, e.g. to mark states on a best path.
pub const STATE_TAG_USER: StateTag = 1 << (STATE_ID_BITS + 1);
/// Signals the absence of a state. As initial state it denotes the empty language.
pub const INVALID_STATE_ID: StateId = STATE_ID_MASK;
/// The largest state id that can be handed out.
pub const MAX_STATE_ID: StateId = STATE_ID_MASK - 1;

/// The empty label.
pub const EPSILON: LabelId = -1;
/// The first regular label.
pub const FIRST_LABEL_ID: LabelId = 0;
/// The last regular label. Everything above is a special label that sorts behind all regular
/// labels.
pub const LAST_LABEL_ID: LabelId = i32::MAX - 4;
/// Matches any label of the other operand in a composition.
pub const ANY: LabelId = i32::MAX - 3;
/// Taken without consuming anything when the other operand has no matching arc.
pub const FAILURE: LabelId = i32::MAX - 2;
/// Matches every label that is not matched by a regular arc.
pub const ELSE: LabelId = i32::MAX - 1;
/// Signals the absence of a label.
pub const INVALID_LABEL_ID: LabelId = i32::MAX;

/// Returns true for the labels [`ANY`], [`FAILURE`] and [`ELSE`].
pub fn is_special_label(label: LabelId) -> bool {
    label > LAST_LABEL_ID && label != INVALID_LABEL_ID
}

/// Whether arcs carry one label or an input/output pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Type {
    /// Not known, e.g. for an automaton that was never initialised.
    #[default]
    Unknown = 0,
    /// Input and output labels are always identical.
    Acceptor = 1,
    /// Input and output labels may differ.
    Transducer = 2,
}

impl Type {
    /// The tag used in the binary format.
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Inverse of [`Type::tag`].
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Type::Unknown),
            1 => Some(Type::Acceptor),
            2 => Some(Type::Transducer),
            _ => None,
        }
    }

    /// The name used in the XML format.
    pub fn name(self) -> &'static str {
        match self {
            Type::Unknown => "unknown",
            Type::Acceptor => "acceptor",
            Type::Transducer => "transducer",
        }
    }

    /// Inverse of [`Type::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "unknown" => Some(Type::Unknown),
            "acceptor" => Some(Type::Acceptor),
            "transducer" => Some(Type::Transducer),
            _ => None,
        }
    }
}

/// No property.
pub const PROPERTY_NONE: Property = 0;
/// The automaton is materialized in memory.
pub const PROPERTY_STORAGE: Property = 1 << 0;
/// The automaton memoizes its states.
pub const PROPERTY_CACHED: Property = 1 << 1;
/// Every state has at most one outgoing arc.
pub const PROPERTY_LINEAR: Property = 1 << 2;
/// There is no cycle reachable from the initial state.
pub const PROPERTY_ACYCLIC: Property = 1 << 3;
/// Arcs are sorted by input label.
pub const PROPERTY_SORTED_BY_INPUT: Property = 1 << 4;
/// Arcs are sorted by output label.
pub const PROPERTY_SORTED_BY_OUTPUT: Property = 1 << 5;
/// Arcs are sorted by input and then output label.
pub const PROPERTY_SORTED_BY_INPUT_AND_OUTPUT: Property = 1 << 6;
/// Arcs are sorted by input label, output label and target.
pub const PROPERTY_SORTED_BY_ARC: Property = 1 << 7;
/// Arcs are sorted by weight.
pub const PROPERTY_SORTED_BY_WEIGHT: Property = 1 << 8;
/// All sort properties.
pub const PROPERTY_SORTED: Property = PROPERTY_SORTED_BY_INPUT
    | PROPERTY_SORTED_BY_OUTPUT
    | PROPERTY_SORTED_BY_INPUT_AND_OUTPUT
    | PROPERTY_SORTED_BY_ARC
    | PROPERTY_SORTED_BY_WEIGHT;
/// All properties.
pub const PROPERTY_ALL: Property = u32::MAX;
