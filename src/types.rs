#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RedirectType { Input, Output, Append }

impl RedirectType {
	pub fn operator(self) -> &'static str {
		match self {
			RedirectType::Input => "<",
			RedirectType::Output => ">",
			RedirectType::Append => ">>",
		}
	}

	pub fn direction(self) -> &'static str {
		match self {
			RedirectType::Input => "input",
			_ => "output",
		}
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Redirect<'a> {
	pub target: &'a [u8],
	pub typ: RedirectType,
}

/// One stage of a pipeline. `argv[0]` is the program name.
#[derive(Debug, PartialEq, Eq)]
pub struct Command<'a> {
	pub argv: Vec<&'a [u8]>,
}

impl<'a> Command<'a> {
	pub fn name(&self) -> &'a [u8] {
		self.argv[0]
	}
}

#[derive(Debug, PartialEq, Eq)]
pub struct Pipeline<'a> {
	pub commands: Vec<Command<'a>>,
	/// Applies to the first command.
	pub input: Option<Redirect<'a>>,
	/// Applies to the last command.
	pub output: Option<Redirect<'a>>,
	pub is_background: bool,
}
