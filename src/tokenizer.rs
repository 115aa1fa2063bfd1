struct Tokenizer<'a> {
	line: &'a [u8],
	i: usize,
}

fn is_whitespace(c: u8) -> bool {
	match c {
		b' ' | b'\t' | b'\r' | b'\n' | 0x07 | 0x0b | 0x0c => true,
		_ => false,
	}
}

impl<'a> Tokenizer<'a> {
	fn proceed_while<F>(&mut self, f: F) where F: Fn(u8) -> bool {
		while let Some(c) = self.line.get(self.i) {
			if !f(*c) { break; }
			self.i += 1;
		}
	}

	fn skip_whitespaces(&mut self) {
		self.proceed_while(is_whitespace);
	}

	fn read_word(&mut self) -> &'a [u8] {
		let orig = self.i;
		self.proceed_while(|c| !is_whitespace(c));
		&self.line[orig .. self.i]
	}
}

impl<'a> Iterator for Tokenizer<'a> {
	type Item = &'a [u8];

	fn next(&mut self) -> Option<&'a [u8]> {
		self.skip_whitespaces();
		let word = self.read_word();
		if word.is_empty() { None } else { Some(word) }
	}
}

/// Splits a line into maximal runs of non-whitespace bytes. Nothing is
/// quoted, escaped or expanded.
pub fn tokenize(line: &[u8]) -> Vec<&[u8]> {
	Tokenizer { line: line, i: 0 }.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_on_runs_of_whitespace() {
		assert_eq!(tokenize(b"ls  -la\tfoo"), vec![&b"ls"[..], b"-la", b"foo"]);
	}

	#[test]
	fn strips_trailing_newline() {
		assert_eq!(tokenize(b"echo hi\n"), vec![&b"echo"[..], b"hi"]);
		assert_eq!(tokenize(b"echo hi\r\n"), vec![&b"echo"[..], b"hi"]);
	}

	#[test]
	fn blank_lines_have_no_tokens() {
		assert!(tokenize(b"").is_empty());
		assert!(tokenize(b"\n").is_empty());
		assert!(tokenize(b" \t\r\x07 \n").is_empty());
	}

	#[test]
	fn operators_are_only_split_on_whitespace() {
		assert_eq!(tokenize(b"a|b > c"), vec![&b"a|b"[..], b">", b"c"]);
		assert_eq!(tokenize(b"'a b'"), vec![&b"'a"[..], b"b'"]);
	}
}
