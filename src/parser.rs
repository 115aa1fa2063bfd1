use thiserror::Error;

use crate::types::*;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Error)]
pub enum ParseError {
	#[error("empty command")]
	EmptyCommand,
	#[error("missing file name after '{}'", .0.operator())]
	MissingTarget(RedirectType),
	#[error("'<' is only allowed on the first command of a pipeline")]
	MisplacedInput,
	#[error("'{}' is only allowed on the last command of a pipeline", .0.operator())]
	MisplacedOutput(RedirectType),
	#[error("more than one {} redirection", .0.direction())]
	DuplicateRedirect(RedirectType),
}

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, PartialEq, Eq)]
pub enum Parsed<'a> {
	Empty,
	Exit,
	Pipeline(Pipeline<'a>),
}

fn redirect_type(token: &[u8]) -> Option<RedirectType> {
	match token {
		b"<" => Some(RedirectType::Input),
		b">" => Some(RedirectType::Output),
		b">>" => Some(RedirectType::Append),
		_ => None,
	}
}

fn is_operator(token: &[u8]) -> bool {
	token == b"|" || redirect_type(token).is_some()
}

struct Parser<'a> {
	input: Option<Redirect<'a>>,
	output: Option<Redirect<'a>>,
}

impl<'a> Parser<'a> {
	fn parse_command(&mut self, tokens: &[&'a [u8]], is_first: bool, is_last: bool) -> ParseResult<Command<'a>> {
		let mut argv: Vec<&'a [u8]> = Vec::with_capacity(tokens.len());
		let mut it = tokens.iter();
		while let Some(&token) = it.next() {
			let typ = match redirect_type(token) {
				Some(typ) => typ,
				None => {
					argv.push(token);
					continue;
				},
			};
			let target = match it.next() {
				Some(&t) if !is_operator(t) => t,
				_ => { return Err(ParseError::MissingTarget(typ)); },
			};
			let slot = match typ {
				RedirectType::Input if !is_first => { return Err(ParseError::MisplacedInput); },
				RedirectType::Input => &mut self.input,
				_ if !is_last => { return Err(ParseError::MisplacedOutput(typ)); },
				_ => &mut self.output,
			};
			if slot.is_some() {
				return Err(ParseError::DuplicateRedirect(typ));
			}
			*slot = Some(Redirect { target: target, typ: typ });
		}
		if argv.is_empty() {
			return Err(ParseError::EmptyCommand);
		}
		Ok(Command { argv: argv })
	}

	fn parse_pipeline(mut self, tokens: &[&'a [u8]], is_background: bool) -> ParseResult<Pipeline<'a>> {
		let segments: Vec<&[&'a [u8]]> = tokens.split(|&t| t == b"|").collect();
		let last = segments.len() - 1;
		let mut commands: Vec<Command<'a>> = Vec::with_capacity(segments.len());
		for (i, segment) in segments.into_iter().enumerate() {
			if segment.is_empty() {
				return Err(ParseError::EmptyCommand);
			}
			commands.push(self.parse_command(segment, i == 0, i == last)?);
		}
		Ok(Pipeline { commands: commands, input: self.input, output: self.output, is_background: is_background })
	}
}

/// Turns a tokenized line into a pipeline.
///
/// A trailing `&` backgrounds the whole pipeline. `exit` or `quit` as the
/// first token ends the session and any further tokens are ignored.
pub fn parse<'a>(tokens: &[&'a [u8]]) -> ParseResult<Parsed<'a>> {
	let mut tokens = tokens;
	match tokens.first() {
		None => { return Ok(Parsed::Empty); },
		Some(&b"exit") | Some(&b"quit") => { return Ok(Parsed::Exit); },
		_ => {},
	}
	let mut is_background = false;
	if let Some((&b"&", rest)) = tokens.split_last() {
		tokens = rest;
		is_background = true;
	}
	let parser = Parser { input: None, output: None };
	parser.parse_pipeline(tokens, is_background).map(Parsed::Pipeline)
}
