// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Combination of per-rule outcomes into a decision.
//!
//! | effect expression                                             | kind                |
//! |---------------------------------------------------------------|---------------------|
//! | `some(where (p.eft == allow))`                                | allow-override      |
//! | `some(where (p.eft == allow)) && !some(where (p.eft == deny))`| deny-override       |
//! | `!some(where (p.eft == deny))`                                | allow-unless-denied |
//! | `priority(p.eft) \|\| deny`                                   | priority            |
//!
//! Every kind denies when no rule matched.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AuthzError, Result};

static EFT_REFERENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"p[0-9]*[._]eft").unwrap());

/// What a single rule contributes to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
	Allow,
	Deny,
	/// The rule did not match, or its effect value is neither allow nor deny.
	Indeterminate,
}

impl RuleOutcome {
	/// Outcome of a matched rule given its `eft` field, if the policy
	/// definition has one.
	pub fn from_effect(eft: Option<&str>) -> Self {
		match eft {
			None | Some("allow") => Self::Allow,
			Some("deny") => Self::Deny,
			Some(_) => Self::Indeterminate,
		}
	}
}

/// Recognized effect expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
	AllowOverride,
	DenyOverride,
	AllowUnlessDenied,
	Priority,
}

impl EffectKind {
	/// Recognizes an effect expression, ignoring whitespace and accepting
	/// `p_eft` for `p.eft`.
	pub fn parse(text: &str) -> Result<Self> {
		let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
		let normalized = EFT_REFERENCE.replace_all(&compact, "p.eft");
		match normalized.as_ref() {
			"some(where(p.eft==allow))" => Ok(Self::AllowOverride),
			"some(where(p.eft==allow))&&!some(where(p.eft==deny))" => Ok(Self::DenyOverride),
			"!some(where(p.eft==deny))" => Ok(Self::AllowUnlessDenied),
			"priority(p.eft)||deny" => Ok(Self::Priority),
			_ => Err(AuthzError::UnsupportedEffect(text.trim().to_string())),
		}
	}

	pub fn stream(self) -> EffectStream {
		EffectStream {
			kind: self,
			index: 0,
			verdict: None,
			allowed: Vec::new(),
		}
	}

	/// Reduces a complete sequence of outcomes.
	pub fn aggregate(self, outcomes: impl IntoIterator<Item = RuleOutcome>) -> bool {
		let mut stream = self.stream();
		for outcome in outcomes {
			if stream.push(outcome) {
				break;
			}
		}
		stream.finish().allowed
	}
}

impl FromStr for EffectKind {
	type Err = AuthzError;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}

impl fmt::Display for EffectKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::AllowOverride => "allow-override",
			Self::DenyOverride => "deny-override",
			Self::AllowUnlessDenied => "allow-unless-denied",
			Self::Priority => "priority",
		})
	}
}

/// Final result of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
	pub allowed: bool,
	/// Positions, in evaluation order, of the rules that decided the outcome.
	pub deciding: Vec<usize>,
}

/// Incremental reducer fed one outcome per evaluated rule.
#[derive(Debug, Clone)]
pub struct EffectStream {
	kind: EffectKind,
	index: usize,
	verdict: Option<(bool, usize)>,
	allowed: Vec<usize>,
}

impl EffectStream {
	/// Records the outcome of the next rule. Returns `true` once the decision
	/// is fixed and no further rules need evaluating.
	pub fn push(&mut self, outcome: RuleOutcome) -> bool {
		if self.verdict.is_some() {
			return true;
		}
		let index = self.index;
		self.index += 1;

		match (self.kind, outcome) {
			(_, RuleOutcome::Indeterminate) => {}
			(EffectKind::AllowOverride, RuleOutcome::Allow) => self.verdict = Some((true, index)),
			(EffectKind::AllowOverride, RuleOutcome::Deny) => {}
			(EffectKind::DenyOverride | EffectKind::AllowUnlessDenied, RuleOutcome::Allow) => {
				self.allowed.push(index);
			}
			(EffectKind::DenyOverride | EffectKind::AllowUnlessDenied, RuleOutcome::Deny) => {
				self.verdict = Some((false, index));
			}
			(EffectKind::Priority, RuleOutcome::Allow) => self.verdict = Some((true, index)),
			(EffectKind::Priority, RuleOutcome::Deny) => self.verdict = Some((false, index)),
		}
		self.verdict.is_some()
	}

	pub fn finish(self) -> Decision {
		match self.verdict {
			Some((allowed, index)) => Decision {
				allowed,
				deciding: vec![index],
			},
			None => Decision {
				allowed: !self.allowed.is_empty(),
				deciding: self.allowed,
			},
		}
	}
}
