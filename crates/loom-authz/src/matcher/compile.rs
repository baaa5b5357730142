// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Resolution and type checking of a parsed matcher.
//!
//! Field references become indexes into the request or rule, function names
//! become role-graph keys, registered functions or builtin function pointers, and every operand is
//! checked to be a string or a boolean where the operator expects one.

use super::functions::{self, BuiltinFn, PatternCache};
use super::parser::{BinOp, Expr};
use super::{CustomFn, FunctionMap};
use crate::error::{AuthzError, Result};
use crate::model::{Assertion, Model, Section};

/// A string-valued operand.
#[derive(Debug, Clone)]
pub(crate) enum Operand {
	Literal(String),
	Request(usize),
	Policy(usize),
	Extract {
		func: fn(&PatternCache, &[&str]) -> Result<String>,
		args: Vec<Operand>,
	},
}

/// A boolean-valued node.
#[derive(Debug, Clone)]
pub(crate) enum Node {
	Const(bool),
	Not(Box<Node>),
	And(Box<Node>, Box<Node>),
	Or(Box<Node>, Box<Node>),
	StrEq {
		left: Operand,
		right: Operand,
		negate: bool,
	},
	BoolEq {
		left: Box<Node>,
		right: Box<Node>,
		negate: bool,
	},
	In {
		element: Operand,
		set: Vec<Operand>,
	},
	Role {
		key: String,
		args: Vec<Operand>,
	},
	Predicate {
		func: fn(&PatternCache, &[&str]) -> Result<bool>,
		args: Vec<Operand>,
	},
	Custom {
		func: CustomFn,
		args: Vec<Operand>,
	},
}

enum Typed {
	Bool(Node),
	Str(Operand),
}

impl Typed {
	fn kind(&self) -> &'static str {
		match self {
			Typed::Bool(_) => "boolean",
			Typed::Str(_) => "string",
		}
	}
}

/// Assertions a matcher is compiled against.
pub(crate) struct Bindings<'a> {
	pub model: &'a Model,
	pub request: &'a Assertion,
	pub policy: &'a Assertion,
	pub functions: &'a FunctionMap,
}

impl Bindings<'_> {
	pub(crate) fn compile(&self, expr: &Expr) -> Result<Node> {
		match self.typed(expr)? {
			Typed::Bool(node) => Ok(node),
			Typed::Str(_) => Err(AuthzError::Compile(
				"matcher must be a boolean expression, found a string".into(),
			)),
		}
	}

	fn typed(&self, expr: &Expr) -> Result<Typed> {
		Ok(match expr {
			Expr::Str(s) => Typed::Str(Operand::Literal(s.clone())),
			Expr::Bool(b) => Typed::Bool(Node::Const(*b)),
			Expr::Field { object, name } => Typed::Str(self.field(object, name)?),
			Expr::Ident(ident) => {
				let (object, name) = ident.split_once('_').ok_or_else(|| {
					AuthzError::Compile(format!("unknown identifier `{ident}`"))
				})?;
				Typed::Str(self.field(object, name)?)
			}
			Expr::Not(inner) => Typed::Bool(Node::Not(Box::new(self.boolean(inner, "`!`")?))),
			Expr::Binary { op, left, right } => self.binary(*op, left, right)?,
			Expr::In { element, set } => Typed::Bool(Node::In {
				element: self.string(element, "`in`")?,
				set: set
					.iter()
					.map(|item| self.string(item, "`in`"))
					.collect::<Result<_>>()?,
			}),
			Expr::Call { name, args } => self.call(name, args)?,
		})
	}

	fn binary(&self, op: BinOp, left: &Expr, right: &Expr) -> Result<Typed> {
		let node = match op {
			BinOp::And => Node::And(
				Box::new(self.boolean(left, "`&&`")?),
				Box::new(self.boolean(right, "`&&`")?),
			),
			BinOp::Or => Node::Or(
				Box::new(self.boolean(left, "`||`")?),
				Box::new(self.boolean(right, "`||`")?),
			),
			BinOp::Eq | BinOp::Ne => {
				let negate = op == BinOp::Ne;
				match (self.typed(left)?, self.typed(right)?) {
					(Typed::Str(left), Typed::Str(right)) => Node::StrEq { left, right, negate },
					(Typed::Bool(left), Typed::Bool(right)) => Node::BoolEq {
						left: Box::new(left),
						right: Box::new(right),
						negate,
					},
					(left, right) => {
						return Err(AuthzError::Compile(format!(
							"cannot compare a {} with a {}",
							left.kind(),
							right.kind()
						)));
					}
				}
			}
		};
		Ok(Typed::Bool(node))
	}

	fn call(&self, name: &str, args: &[Expr]) -> Result<Typed> {
		if let Some(role) = self
			.model
			.get(name)
			.filter(|a| a.section() == Section::Role)
		{
			if args.len() != role.arity() {
				return Err(AuthzError::RoleGraph(format!(
					"`{name}` is defined with {} placeholders but called with {} arguments",
					role.arity(),
					args.len()
				)));
			}
			return Ok(Typed::Bool(Node::Role {
				key: name.to_string(),
				args: self.strings(args, name)?,
			}));
		}

		if let Some(func) = self.functions.get(name) {
			if args.len() != 2 {
				return Err(AuthzError::Compile(format!(
					"`{name}` takes 2 arguments, got {}",
					args.len()
				)));
			}
			return Ok(Typed::Bool(Node::Custom {
				func,
				args: self.strings(args, name)?,
			}));
		}

		let builtin = functions::lookup(name)
			.ok_or_else(|| AuthzError::Compile(format!("unknown function `{name}`")))?;
		if args.len() != builtin.arity {
			return Err(AuthzError::Compile(format!(
				"`{name}` takes {} arguments, got {}",
				builtin.arity,
				args.len()
			)));
		}
		let args = self.strings(args, name)?;
		Ok(match builtin.func {
			BuiltinFn::Predicate(func) => Typed::Bool(Node::Predicate { func, args }),
			BuiltinFn::Extractor(func) => Typed::Str(Operand::Extract { func, args }),
		})
	}

	fn field(&self, object: &str, name: &str) -> Result<Operand> {
		let (assertion, operand): (&Assertion, fn(usize) -> Operand) = if object == self.request.key() {
			(self.request, Operand::Request)
		} else if object == self.policy.key() {
			(self.policy, Operand::Policy)
		} else {
			return Err(AuthzError::Compile(format!(
				"unknown identifier `{object}.{name}`"
			)));
		};
		assertion
			.token_index(name)
			.map(operand)
			.ok_or_else(|| AuthzError::Compile(format!("`{object}` has no field `{name}`")))
	}

	fn boolean(&self, expr: &Expr, context: &str) -> Result<Node> {
		match self.typed(expr)? {
			Typed::Bool(node) => Ok(node),
			Typed::Str(_) => Err(AuthzError::Compile(format!(
				"{context} expects a boolean operand, found a string"
			))),
		}
	}

	fn string(&self, expr: &Expr, context: &str) -> Result<Operand> {
		match self.typed(expr)? {
			Typed::Str(operand) => Ok(operand),
			Typed::Bool(_) => Err(AuthzError::Compile(format!(
				"{context} expects a string operand, found a boolean"
			))),
		}
	}

	fn strings(&self, args: &[Expr], function: &str) -> Result<Vec<Operand>> {
		args.iter()
			.map(|arg| self.string(arg, &format!("`{function}`")))
			.collect()
	}
}
