// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Recursive-descent parser for matcher expressions.
//!
//! ```text
//! or_expr    = and_expr ("||" and_expr)*
//! and_expr   = comparison ("&&" comparison)*
//! comparison = unary (("==" | "!=") unary | "in" "(" [unary ("," unary)*] ")")?
//! unary      = "!" unary | primary
//! primary    = string | "true" | "false" | ident ["." ident] | ident "(" args ")" | "(" or_expr ")"
//! ```

use super::lexer::{tokenize, Spanned, Token};
use crate::error::{AuthzError, Result};

/// Deepest nesting of parentheses and `!` accepted.
pub(crate) const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
	And,
	Or,
	Eq,
	Ne,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expr {
	Str(String),
	Bool(bool),
	/// Dotted reference such as `r.sub` or `p2.obj`.
	Field { object: String, name: String },
	/// Bare identifier such as `r_sub`.
	Ident(String),
	Call { name: String, args: Vec<Expr> },
	Not(Box<Expr>),
	Binary {
		op: BinOp,
		left: Box<Expr>,
		right: Box<Expr>,
	},
	In { element: Box<Expr>, set: Vec<Expr> },
}

struct Parser {
	tokens: Vec<Spanned>,
	pos: usize,
	depth: usize,
	end: usize,
}

pub(crate) fn parse(input: &str) -> Result<Expr> {
	let tokens = tokenize(input)?;
	if tokens.is_empty() {
		return Err(AuthzError::Compile("empty matcher expression".into()));
	}
	let mut parser = Parser {
		tokens,
		pos: 0,
		depth: 0,
		end: input.len(),
	};
	let expr = parser.parse_or()?;
	if let Some((token, offset)) = parser.tokens.get(parser.pos) {
		return Err(AuthzError::Compile(format!(
			"unexpected {token:?} at offset {offset}"
		)));
	}
	Ok(expr)
}

impl Parser {
	fn peek(&self) -> Option<&Token> {
		self.tokens.get(self.pos).map(|(t, _)| t)
	}

	fn advance(&mut self) -> Option<Token> {
		let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
		self.pos += 1;
		token
	}

	fn offset(&self) -> usize {
		self.tokens.get(self.pos).map_or(self.end, |(_, o)| *o)
	}

	fn expect(&mut self, expected: Token) -> Result<()> {
		let offset = self.offset();
		match self.advance() {
			Some(token) if token == expected => Ok(()),
			Some(token) => Err(AuthzError::Compile(format!(
				"expected {expected:?}, found {token:?} at offset {offset}"
			))),
			None => Err(AuthzError::Compile(format!(
				"expected {expected:?} at end of expression"
			))),
		}
	}

	fn parse_or(&mut self) -> Result<Expr> {
		let mut left = self.parse_and()?;
		while self.peek() == Some(&Token::Or) {
			self.advance();
			let right = self.parse_and()?;
			left = Expr::Binary {
				op: BinOp::Or,
				left: Box::new(left),
				right: Box::new(right),
			};
		}
		Ok(left)
	}

	fn parse_and(&mut self) -> Result<Expr> {
		let mut left = self.parse_comparison()?;
		while self.peek() == Some(&Token::And) {
			self.advance();
			let right = self.parse_comparison()?;
			left = Expr::Binary {
				op: BinOp::And,
				left: Box::new(left),
				right: Box::new(right),
			};
		}
		Ok(left)
	}

	fn parse_comparison(&mut self) -> Result<Expr> {
		let left = self.parse_unary()?;
		let op = match self.peek() {
			Some(Token::Eq) => BinOp::Eq,
			Some(Token::Ne) => BinOp::Ne,
			Some(Token::In) => {
				self.advance();
				let set = self.parse_list()?;
				return Ok(Expr::In {
					element: Box::new(left),
					set,
				});
			}
			_ => return Ok(left),
		};
		self.advance();
		let right = self.parse_unary()?;
		Ok(Expr::Binary {
			op,
			left: Box::new(left),
			right: Box::new(right),
		})
	}

	fn parse_unary(&mut self) -> Result<Expr> {
		self.depth += 1;
		if self.depth > MAX_DEPTH {
			return Err(AuthzError::Compile(format!(
				"expression nested deeper than {MAX_DEPTH} levels"
			)));
		}
		let expr = if self.peek() == Some(&Token::Not) {
			self.advance();
			self.parse_unary().map(|e| Expr::Not(Box::new(e)))
		} else {
			self.parse_primary()
		};
		self.depth -= 1;
		expr
	}

	fn parse_primary(&mut self) -> Result<Expr> {
		let offset = self.offset();
		match self.advance() {
			Some(Token::Str(s)) => Ok(Expr::Str(s)),
			Some(Token::True) => Ok(Expr::Bool(true)),
			Some(Token::False) => Ok(Expr::Bool(false)),
			Some(Token::Ident(name)) => match self.peek() {
				Some(Token::Dot) => {
					self.advance();
					let offset = self.offset();
					match self.advance() {
						Some(Token::Ident(field)) => Ok(Expr::Field {
							object: name,
							name: field,
						}),
						_ => Err(AuthzError::Compile(format!(
							"expected field name after `{name}.` at offset {offset}"
						))),
					}
				}
				Some(Token::LParen) => {
					let args = self.parse_list()?;
					Ok(Expr::Call { name, args })
				}
				_ => Ok(Expr::Ident(name)),
			},
			Some(Token::LParen) => {
				let expr = self.parse_or()?;
				self.expect(Token::RParen)?;
				Ok(expr)
			}
			Some(token) => Err(AuthzError::Compile(format!(
				"unexpected {token:?} at offset {offset}"
			))),
			None => Err(AuthzError::Compile("unexpected end of expression".into())),
		}
	}

	/// `"(" [item ("," item)*] ")"` where each item is a full expression.
	fn parse_list(&mut self) -> Result<Vec<Expr>> {
		self.expect(Token::LParen)?;
		let mut items = Vec::new();
		if self.peek() == Some(&Token::RParen) {
			self.advance();
			return Ok(items);
		}
		loop {
			items.push(self.parse_or()?);
			let offset = self.offset();
			match self.advance() {
				Some(Token::Comma) => continue,
				Some(Token::RParen) => return Ok(items),
				_ => {
					return Err(AuthzError::Compile(format!(
						"expected `,` or `)` at offset {offset}"
					)));
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn field(object: &str, name: &str) -> Expr {
		Expr::Field {
			object: object.into(),
			name: name.into(),
		}
	}

	#[test]
	fn and_binds_tighter_than_or() {
		let expr = parse("r.a == p.a || r.b == p.b && r.c == p.c").unwrap();
		let Expr::Binary { op: BinOp::Or, right, .. } = expr else {
			panic!("expected `||` at the root");
		};
		assert!(matches!(*right, Expr::Binary { op: BinOp::And, .. }));
	}

	#[test]
	fn parses_calls_and_fields() {
		let expr = parse("g(r.sub, p.sub, r_dom)").unwrap();
		assert_eq!(
			expr,
			Expr::Call {
				name: "g".into(),
				args: vec![field("r", "sub"), field("p", "sub"), Expr::Ident("r_dom".into())],
			}
		);
	}

	#[test]
	fn parses_membership() {
		let expr = parse("r.obj in ('data1', \"data2\")").unwrap();
		assert_eq!(
			expr,
			Expr::In {
				element: Box::new(field("r", "obj")),
				set: vec![Expr::Str("data1".into()), Expr::Str("data2".into())],
			}
		);
		assert!(matches!(parse("r.obj in ()").unwrap(), Expr::In { set, .. } if set.is_empty()));
	}

	#[test]
	fn not_applies_to_primary() {
		let expr = parse("!r.a == p.a").unwrap();
		assert!(matches!(expr, Expr::Binary { op: BinOp::Eq, left, .. } if matches!(*left, Expr::Not(_))));
	}

	#[test]
	fn rejects_malformed_expressions() {
		for bad in ["", "r.sub ==", "(r.sub == p.sub", "r.sub == p.sub)", "r.", "f(a b)", "r.sub p.sub"] {
			assert!(parse(bad).is_err(), "accepted `{bad}`");
		}
	}

	#[test]
	fn nesting_is_bounded() {
		let ok = format!("{}true{}", "(".repeat(MAX_DEPTH - 1), ")".repeat(MAX_DEPTH - 1));
		assert!(parse(&ok).is_ok());

		let deep = format!("{}true{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
		assert!(parse(&deep).unwrap_err().to_string().contains("nested"));

		let nots = format!("{}true", "!".repeat(MAX_DEPTH + 1));
		assert!(parse(&nots).is_err());
	}
}
