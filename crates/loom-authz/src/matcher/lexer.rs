// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::error::{AuthzError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
	Ident(String),
	Str(String),
	True,
	False,
	In,
	Dot,
	Comma,
	LParen,
	RParen,
	Eq,
	Ne,
	And,
	Or,
	Not,
}

/// A token and the byte offset where it starts.
pub(crate) type Spanned = (Token, usize);

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>> {
	let mut tokens = Vec::new();
	let mut chars = input.char_indices().peekable();

	while let Some((pos, c)) = chars.next() {
		let token = match c {
			c if c.is_whitespace() => continue,
			'.' => Token::Dot,
			',' => Token::Comma,
			'(' => Token::LParen,
			')' => Token::RParen,
			'=' if chars.next_if(|(_, c)| *c == '=').is_some() => Token::Eq,
			'!' if chars.next_if(|(_, c)| *c == '=').is_some() => Token::Ne,
			'!' => Token::Not,
			'&' if chars.next_if(|(_, c)| *c == '&').is_some() => Token::And,
			'|' if chars.next_if(|(_, c)| *c == '|').is_some() => Token::Or,
			'"' | '\'' => {
				let mut value = String::new();
				loop {
					let next = match chars.next() {
						Some((_, '\\')) => chars.next().map(|(_, escaped)| (escaped, true)),
						Some((_, other)) => Some((other, false)),
						None => None,
					};
					match next {
						Some((q, false)) if q == c => {
							tokens.push((Token::Str(value), pos));
							break;
						}
						Some((other, _)) => value.push(other),
						None => {
							return Err(AuthzError::Compile(format!(
								"unterminated string literal at offset {pos}"
							)));
						}
					}
				}
				continue;
			}
			c if c.is_ascii_alphanumeric() || c == '_' => {
				let mut word = String::from(c);
				while let Some((_, next)) = chars.next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_') {
					word.push(next);
				}
				match word.as_str() {
					"true" => Token::True,
					"false" => Token::False,
					"in" => Token::In,
					_ => Token::Ident(word),
				}
			}
			other => {
				return Err(AuthzError::Compile(format!(
					"unexpected character `{other}` at offset {pos}"
				)));
			}
		};
		tokens.push((token, pos));
	}

	Ok(tokens)
}
