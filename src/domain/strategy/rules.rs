//! Ordered `(predicate, action)` rule tables.
//!
//! A table is scanned top to bottom and the first rule whose predicate holds
//! decides the outcome; later rules are not consulted even if the winning
//! rule is then suppressed as a duplicate.

use crate::domain::signal::Signal;

/// Which candle a recorded signal keeps for stop-loss placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    None,
    Current,
    Previous,
}

pub struct Rule<I> {
    pub name: &'static str,
    pub when: fn(&I) -> bool,
    /// Signal written to history.
    pub record: Signal,
    /// Signal handed to the caller.
    pub emit: Signal,
    pub reference: Reference,
}

impl<I> Rule<I> {
    pub const fn new(name: &'static str, when: fn(&I) -> bool, signal: Signal) -> Self {
        Rule {
            name,
            when,
            record: signal,
            emit: signal,
            reference: Reference::None,
        }
    }

    /// Record one signal internally, hand another to the caller.
    pub const fn recording(mut self, record: Signal) -> Self {
        self.record = record;
        self
    }

    pub const fn keep(mut self, reference: Reference) -> Self {
        self.reference = reference;
        self
    }
}

pub fn first_match<'r, I>(rules: &'r [Rule<I>], input: &I) -> Option<&'r Rule<I>> {
    rules.iter().find(|rule| (rule.when)(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positive(x: &i32) -> bool {
        *x > 0
    }

    fn large(x: &i32) -> bool {
        *x > 100
    }

    const RULES: &[Rule<i32>] = &[
        Rule::new("large", large, Signal::StrongBuy),
        Rule::new("positive", positive, Signal::ShortExit)
            .recording(Signal::UpwardsCrossover)
            .keep(Reference::Current),
    ];

    #[test]
    fn first_matching_rule_wins() {
        assert_eq!(first_match(RULES, &500).map(|r| r.name), Some("large"));
        let rule = first_match(RULES, &5).unwrap();
        assert_eq!(rule.name, "positive");
        assert_eq!(rule.record, Signal::UpwardsCrossover);
        assert_eq!(rule.emit, Signal::ShortExit);
        assert_eq!(rule.reference, Reference::Current);
        assert!(first_match(RULES, &-1).is_none());
    }
}
