//! The interceptor chain evaluator: an ordered list of rules applied to a
//! single message, per §4.3 of the design.

use crate::field::{self, Value};
use crate::message::Message;
use crate::rule::{Action, Rule};

/// The chain's final outcome for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Drop,
}

/// An ordered sequence of rules plus a default policy applied when none
/// fire.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    rules: Vec<Rule>,
    default: Option<Verdict>,
}

impl Chain {
    pub fn new(default: Verdict) -> Self {
        Self {
            rules: Vec::new(),
            default: Some(default),
        }
    }

    pub fn push(&mut self, rule: Rule) -> &mut Self {
        self.rules.push(rule);
        self
    }

    pub fn default_verdict(&self) -> Verdict {
        self.default.unwrap_or(Verdict::Accept)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// Evaluate `chain` against `message`, returning the (possibly rewritten)
/// message and the final verdict.
///
/// Implements the algorithm from §4.3:
/// 1. Walk rules in order; a rule "fires" only if its field projects a
///    value out of the message and its predicate (if any) matches that
///    value.
/// 2. `drop` aborts immediately with `Verdict::Drop`.
/// 3. Any other terminal action (`accept`, `replace`, `append`, `remove`,
///    and `log` is non-terminal) returns `Verdict::Accept` immediately.
/// 4. `transform` never terminates: it rewrites the field and evaluation
///    continues with the next rule.
/// 5. If no rule fires, the message is returned unchanged with the
///    chain's default verdict.
pub fn evaluate(chain: &Chain, mut message: Message) -> (Message, Verdict) {
    for rule in chain.rules() {
        let current = field::get(&rule.field, &message);

        if let (Some(predicate), Some(value)) = (&rule.predicate, &current) {
            if !predicate(value) {
                continue;
            }
        } else if rule.predicate.is_some() {
            // Predicate present but field absent: nothing to test against.
            continue;
        }

        match &rule.action {
            Action::Accept => {
                if current.is_some() {
                    return (message, Verdict::Accept);
                }
            }
            Action::Drop => {
                if current.is_some() {
                    return (message, Verdict::Drop);
                }
            }
            Action::Log => {
                if let Some(value) = &current {
                    log::info!("chain: {:?} = {:?}", rule.field, value);
                }
            }
            Action::Replace(value) => {
                field::set(&rule.field, &mut message, value.clone());
                return (message, Verdict::Accept);
            }
            Action::Append(value) => {
                field::append(&rule.field, &mut message, value.clone());
                return (message, Verdict::Accept);
            }
            Action::Remove => {
                if current.is_some() {
                    field::remove(&rule.field, &mut message);
                    return (message, Verdict::Accept);
                }
            }
            Action::Transform(transform) => {
                if let Some(value) = current {
                    match transform(value) {
                        Ok(new_value) => field::set(&rule.field, &mut message, new_value),
                        Err(err) => {
                            // Per the error taxonomy: a transform error is
                            // logged and treated as a no-op; evaluation
                            // continues unmodified rather than aborting.
                            log::error!("chain: transform on {:?} failed: {err}", rule.field);
                        }
                    }
                }
            }
        }
    }

    (message, chain.default_verdict())
}

/// Convenience for building chains declaratively, mirroring the builder
/// style `httpserver::serve::response::Response` uses for its own record.
#[derive(Debug, Default)]
pub struct ChainBuilder {
    chain: Chain,
}

impl ChainBuilder {
    pub fn new(default: Verdict) -> Self {
        Self {
            chain: Chain::new(default),
        }
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.chain.push(rule);
        self
    }

    pub fn build(self) -> Chain {
        self.chain
    }
}
