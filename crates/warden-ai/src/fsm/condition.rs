//! Logic gates combining transition conditions.

use super::StateCondition;

/// Boxed condition.
pub type BoxedCondition<M> = Box<dyn StateCondition<M>>;

/// Holds when the inner condition does not.
pub struct Not<M>(pub BoxedCondition<M>);

/// Holds when both conditions hold. Short-circuits.
pub struct And<M>(pub BoxedCondition<M>, pub BoxedCondition<M>);

/// Holds when either condition holds. Short-circuits.
pub struct Or<M>(pub BoxedCondition<M>, pub BoxedCondition<M>);

impl<M> StateCondition<M> for Not<M> {
    fn check(&self, model: &M) -> bool {
        !self.0.check(model)
    }
}

impl<M> StateCondition<M> for And<M> {
    fn check(&self, model: &M) -> bool {
        self.0.check(model) && self.1.check(model)
    }
}

impl<M> StateCondition<M> for Or<M> {
    fn check(&self, model: &M) -> bool {
        self.0.check(model) || self.1.check(model)
    }
}

/// Negates a condition.
pub fn not<M, C>(condition: C) -> Not<M>
where
    C: StateCondition<M> + 'static,
{
    Not(Box::new(condition))
}

/// Conjunction of two conditions.
pub fn and<M, A, B>(a: A, b: B) -> And<M>
where
    A: StateCondition<M> + 'static,
    B: StateCondition<M> + 'static,
{
    And(Box::new(a), Box::new(b))
}

/// Disjunction of two conditions.
pub fn or<M, A, B>(a: A, b: B) -> Or<M>
where
    A: StateCondition<M> + 'static,
    B: StateCondition<M> + 'static,
{
    Or(Box::new(a), Box::new(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn positive(n: &i32) -> bool {
        *n > 0
    }

    fn even(n: &i32) -> bool {
        n % 2 == 0
    }

    #[test]
    fn test_gates() {
        let not_positive = not(positive);
        let both = and(positive, even);
        let either = or(positive, even);

        assert!(not_positive.check(&-1));
        assert!(both.check(&2));
        assert!(!both.check(&3));
        assert!(either.check(&-2));
        assert!(!either.check(&-3));
    }

    #[test]
    fn test_and_short_circuits() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let gate = and(|_: &i32| false, move |_: &i32| {
            counter.set(counter.get() + 1);
            true
        });
        assert!(!gate.check(&0));
        assert_eq!(calls.get(), 0);
    }
}
