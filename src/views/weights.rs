use std::rc::Rc;

use crate::automaton::{Automaton, ConstAutomatonRef, State};
use crate::semiring::Weight;
use crate::types::*;
use crate::views::ModifyAutomaton;

fn scale(weight: Weight, factor: f32) -> Weight {
    match weight {
        Weight::Real(v) if v.is_finite() => Weight::Real(v * factor),
        Weight::Pair { score, risk } if score.is_finite() => Weight::Pair {
            score: score * factor,
            risk,
        },
        other => other,
    }
}

fn map_score(weight: Weight, fcn: impl Fn(f32) -> Option<f32>) -> Weight {
    let mapped = match weight {
        Weight::Real(v) => fcn(v).map(Weight::Real),
        Weight::Pair { score, risk } => fcn(score).map(|score| Weight::Pair { score, risk }),
        other => Some(other),
    };
    mapped.unwrap_or(Weight::Invalid)
}

/// Applies `fcn` to every arc and final weight.
fn map_weights<F>(f: ConstAutomatonRef, description: String, fcn: F) -> ConstAutomatonRef
where
    F: Fn(Weight) -> Weight + 'static,
{
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            if state.is_final() {
                state.weight = fcn(state.weight);
            }
            for arc in state.arcs_mut() {
                arc.weight = fcn(arc.weight);
            }
        })
        .map_base(|base| base.without_properties(PROPERTY_SORTED_BY_WEIGHT)),
    )
}

/// Multiplies every arc and final weight by `factor`, e.g. to apply a language model scale to
/// negative log probabilities. Infinite weights and counts are left alone.
pub fn multiply(f: ConstAutomatonRef, factor: f32) -> ConstAutomatonRef {
    let description = format!("multiply({},{factor})", f.describe());
    map_weights(f, description, move |w| scale(w, factor))
}

/// Turns every negative log probability `w` into the probability `exp(-w)`; infinity becomes
/// zero. Scores of expectation weights are mapped the same way, risks and counts are kept.
///
/// The weights of the result are plain numbers for inspection or export, the semiring of `f`
/// does not apply to them.
pub fn exp_weights(f: ConstAutomatonRef) -> ConstAutomatonRef {
    let description = format!("exp({})", f.describe());
    map_weights(f, description, |w| map_score(w, |v| Some((-v).exp())))
}

/// Inverse of [`exp_weights`]: every probability `p` becomes `-log(p)`, zero becomes infinity.
/// Negative values have no logarithm and become [`Weight::Invalid`].
pub fn log_weights(f: ConstAutomatonRef) -> ConstAutomatonRef {
    let description = format!("log({})", f.describe());
    map_weights(f, description, |w| {
        map_score(w, |v| (v >= 0.0).then(|| -v.ln()))
    })
}

/// Extends the weight of every final state by `weight`.
pub fn extend_final(f: ConstAutomatonRef, weight: Weight) -> ConstAutomatonRef {
    let semiring = f.semiring();
    let description = format!("extend-final({},{})", f.describe(), semiring.format(weight));
    Rc::new(ModifyAutomaton::new(f, description, move |state: &mut State| {
        if state.is_final() {
            state.weight = semiring.extend(state.weight, weight);
        }
    }))
}

/// Replaces every arc weight `w` by `fcn(w)`. Final weights are kept.
pub fn extend_by_fcn<F>(f: ConstAutomatonRef, fcn: F) -> ConstAutomatonRef
where
    F: Fn(Weight) -> Weight + 'static,
{
    let description = format!("extend-by-fcn({})", f.describe());
    Rc::new(
        ModifyAutomaton::new(f, description, move |state: &mut State| {
            for arc in state.arcs_mut() {
                arc.weight = fcn(arc.weight);
            }
        })
        .map_base(|base| base.without_properties(PROPERTY_SORTED_BY_WEIGHT)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::prelude::*;

    #[test]
    fn multiply_scales_everything() {
        let f = multiply(fixtures::linear_ab().into_ref(), 0.5);
        assert_eq!(f.get_state(1).unwrap()[0].weight, Weight::Real(1.0));
        assert_eq!(f.get_state(2).unwrap().weight, Weight::Real(0.0));
        assert_eq!(scale(Weight::Real(f32::INFINITY), 0.0), Weight::Real(f32::INFINITY));
    }

    #[test]
    fn probabilities_and_back() {
        let f = fixtures::linear_ab().into_ref();
        let p = exp_weights(f.clone());
        assert!(p.describe().starts_with("exp("));
        let a = p.get_state(0).unwrap()[0].weight.value();
        assert!((a - (-1.0f32).exp()).abs() < 1e-6);
        assert_eq!(p.get_state(2).unwrap().weight, Weight::Real(1.0));

        let back = log_weights(p);
        for s in 0..2 {
            let w = back.get_state(s).unwrap()[0].weight;
            let expected = f.get_state(s).unwrap()[0].weight;
            assert_eq!(tropical().compare(w, expected), std::cmp::Ordering::Equal);
        }
        assert_eq!(back.get_state(2).unwrap().weight, Weight::Real(0.0));
    }

    #[test]
    fn degenerate_probabilities() {
        let f = StaticAutomaton::builder(Type::Acceptor, expectation())
            .with_arcs([(0, 1, 0, Weight::Pair { score: f32::INFINITY, risk: 2.0 })])
            .with_finals([(1, Weight::Pair { score: 0.0, risk: 1.0 })])
            .build()
            .into_ref();
        let p = exp_weights(f);
        assert_eq!(p.get_state(0).unwrap()[0].weight, Weight::Pair { score: 0.0, risk: 2.0 });
        let back = log_weights(p);
        assert_eq!(
            back.get_state(0).unwrap()[0].weight,
            Weight::Pair { score: f32::INFINITY, risk: 2.0 }
        );
        assert_eq!(back.get_state(1).unwrap().weight, Weight::Pair { score: 0.0, risk: 1.0 });

        let negative = multiply(fixtures::linear_ab().into_ref(), -1.0);
        assert_eq!(log_weights(negative).get_state(0).unwrap()[0].weight, Weight::Invalid);
        let counts = StaticAutomaton::builder(Type::Acceptor, count_semiring())
            .with_arcs([(0, 1, 0, 3u32)])
            .with_finals([(1, 1u32)])
            .build()
            .into_ref();
        assert_eq!(exp_weights(counts).get_state(0).unwrap()[0].weight, Weight::Count(3));
    }

    #[test]
    fn final_and_arc_weights() {
        let f = fixtures::linear_ab().into_ref();
        let g = extend_final(f.clone(), Weight::Real(4.0));
        assert_eq!(g.get_state(2).unwrap().weight, Weight::Real(4.0));
        assert_eq!(g.get_state(0), f.get_state(0));

        let h = extend_by_fcn(f, |w| tropical().extend(w, Weight::Real(1.0)));
        assert_eq!(h.get_state(0).unwrap()[0].weight, Weight::Real(2.0));
        assert_eq!(h.get_state(2).unwrap().weight, Weight::Real(0.0));
    }
}
