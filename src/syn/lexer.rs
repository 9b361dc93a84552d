//! Tokeniser for Jet source text.
//!
//! A hand-rolled `char`-at-a-time scanner with explicit line/column
//! tracking and no external lexer-generator crate — Jet's token set is
//! small enough that a generated lexer would be overkill.

use crate::error::{Error, Position};

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
	Ident(String),
	Number(f64),
	/// A duration literal like `5m`, `30s`, `2h`, in milliseconds.
	Duration(u64),
	String(String),
	LParen,
	RParen,
	LBrace,
	RBrace,
	LBracket,
	RBracket,
	Comma,
	Dot,
	Colon,
	Semicolon,
	Arrow,
	Pipe,
	Question,
	Minus,
	Plus,
	Star,
	Slash,
	Percent,
	Bang,
	Eq,
	EqEq,
	NotEq,
	Lt,
	Lte,
	Gt,
	Gte,
	AndAnd,
	OrOr,
	Coalesce,
	Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Spanned {
	pub token: Token,
	pub position: Position,
}

pub struct Lexer<'a> {
	chars: std::iter::Peekable<std::str::CharIndices<'a>>,
	line: u32,
	column: u32,
}

impl<'a> Lexer<'a> {
	pub fn new(source: &'a str) -> Self {
		Self {
			chars: source.char_indices().peekable(),
			line: 1,
			column: 1,
		}
	}

	fn position(&self) -> Position {
		Position {
			line: self.line,
			column: self.column,
		}
	}

	fn bump(&mut self) -> Option<char> {
		let (_, c) = self.chars.next()?;
		if c == '\n' {
			self.line += 1;
			self.column = 1;
		} else {
			self.column += 1;
		}
		Some(c)
	}

	fn peek_char(&mut self) -> Option<char> {
		self.chars.peek().map(|(_, c)| *c)
	}

	fn skip_trivia(&mut self) {
		loop {
			match self.peek_char() {
				Some(c) if c.is_whitespace() => {
					self.bump();
				}
				Some('/') => {
					let mut rest = self.chars.clone();
					rest.next();
					if matches!(rest.peek(), Some((_, '/'))) {
						while !matches!(self.peek_char(), Some('\n') | None) {
							self.bump();
						}
					} else {
						return;
					}
				}
				_ => return,
			}
		}
	}

	pub fn tokenize(mut self) -> Result<Vec<Spanned>, Error> {
		let mut out = Vec::new();
		loop {
			self.skip_trivia();
			let position = self.position();
			let Some(c) = self.peek_char() else {
				out.push(Spanned {
					token: Token::Eof,
					position,
				});
				break;
			};
			let token = match c {
				'(' => {
					self.bump();
					Token::LParen
				}
				')' => {
					self.bump();
					Token::RParen
				}
				'{' => {
					self.bump();
					Token::LBrace
				}
				'}' => {
					self.bump();
					Token::RBrace
				}
				'[' => {
					self.bump();
					Token::LBracket
				}
				']' => {
					self.bump();
					Token::RBracket
				}
				',' => {
					self.bump();
					Token::Comma
				}
				';' => {
					self.bump();
					Token::Semicolon
				}
				':' => {
					self.bump();
					Token::Colon
				}
				'|' => {
					self.bump();
					if self.peek_char() == Some('|') {
						self.bump();
						Token::OrOr
					} else {
						Token::Pipe
					}
				}
				'+' => {
					self.bump();
					Token::Plus
				}
				'*' => {
					self.bump();
					Token::Star
				}
				'/' => {
					self.bump();
					Token::Slash
				}
				'%' => {
					self.bump();
					Token::Percent
				}
				'=' => {
					self.bump();
					match self.peek_char() {
						Some('=') => {
							self.bump();
							Token::EqEq
						}
						Some('>') => {
							self.bump();
							Token::Arrow
						}
						_ => Token::Eq,
					}
				}
				'!' => {
					self.bump();
					if self.peek_char() == Some('=') {
						self.bump();
						Token::NotEq
					} else {
						Token::Bang
					}
				}
				'<' => {
					self.bump();
					if self.peek_char() == Some('=') {
						self.bump();
						Token::Lte
					} else {
						Token::Lt
					}
				}
				'>' => {
					self.bump();
					if self.peek_char() == Some('=') {
						self.bump();
						Token::Gte
					} else {
						Token::Gt
					}
				}
				'&' => {
					self.bump();
					if self.peek_char() == Some('&') {
						self.bump();
						Token::AndAnd
					} else {
						return Err(Error::parse("unexpected character '&'", position));
					}
				}
				'?' => {
					self.bump();
					if self.peek_char() == Some('?') {
						self.bump();
						Token::Coalesce
					} else {
						Token::Question
					}
				}
				'-' => {
					self.bump();
					Token::Minus
				}
				'.' => {
					self.bump();
					Token::Dot
				}
				'"' | '\'' => self.lex_string(c, position)?,
				c if c.is_ascii_digit() => self.lex_number(position)?,
				c if c.is_alphabetic() || c == '_' => self.lex_ident(),
				other => return Err(Error::parse(format!("unexpected character '{other}'"), position)),
			};
			out.push(Spanned {
				token,
				position,
			});
		}
		Ok(out)
	}

	fn lex_string(&mut self, quote: char, position: Position) -> Result<Token, Error> {
		self.bump();
		let mut s = String::new();
		loop {
			match self.bump() {
				Some(c) if c == quote => break,
				Some('\\') => match self.bump() {
					Some('n') => s.push('\n'),
					Some('t') => s.push('\t'),
					Some(c) => s.push(c),
					None => return Err(Error::parse("unterminated string literal", position)),
				},
				Some(c) => s.push(c),
				None => return Err(Error::parse("unterminated string literal", position)),
			}
		}
		Ok(Token::String(s))
	}

	fn lex_number(&mut self, position: Position) -> Result<Token, Error> {
		let mut s = String::new();
		while let Some(c) = self.peek_char() {
			if c.is_ascii_digit() || c == '.' {
				s.push(c);
				self.bump();
			} else {
				break;
			}
		}
		// Duration suffix: `5m`, `30s`, `2h`.
		if let Some(unit @ ('m' | 's' | 'h')) = self.peek_char() {
			let mut lookahead = self.chars.clone();
			lookahead.next();
			if !matches!(lookahead.peek(), Some((_, c)) if c.is_alphanumeric()) {
				self.bump();
				let n: f64 = s.parse().map_err(|_| Error::parse("invalid number", position))?;
				let ms = match unit {
					'm' => n * 60_000.0,
					's' => n * 1_000.0,
					'h' => n * 3_600_000.0,
					_ => unreachable!(),
				};
				return Ok(Token::Duration(ms as u64));
			}
		}
		s.parse().map(Token::Number).map_err(|_| Error::parse("invalid number", position))
	}

	fn lex_ident(&mut self) -> Token {
		let mut s = String::new();
		while let Some(c) = self.peek_char() {
			if c.is_alphanumeric() || c == '_' {
				s.push(c);
				self.bump();
			} else {
				break;
			}
		}
		Token::Ident(s)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokenizes_pipeline_skeleton() {
		let tokens = Lexer::new("n | where x > 1").tokenize().unwrap();
		let kinds: Vec<_> = tokens.into_iter().map(|s| s.token).collect();
		assert_eq!(
			kinds,
			vec![
				Token::Ident("n".into()),
				Token::Pipe,
				Token::Ident("where".into()),
				Token::Ident("x".into()),
				Token::Gt,
				Token::Number(1.0),
				Token::Eof,
			]
		);
	}

	#[test]
	fn parses_duration_suffix() {
		let tokens = Lexer::new("ttl(5m)").tokenize().unwrap();
		assert_eq!(tokens[2].token, Token::Duration(300_000));
	}

	#[test]
	fn skips_line_comments() {
		let tokens = Lexer::new("x // comment\n+ 1").tokenize().unwrap();
		let kinds: Vec<_> = tokens.into_iter().map(|s| s.token).collect();
		assert_eq!(kinds, vec![Token::Ident("x".into()), Token::Plus, Token::Number(1.0), Token::Eof]);
	}
}
