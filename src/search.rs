use std::ffi::{CString, OsStr};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::{env, fs};

const PATH_KEY: &str = "PATH";
const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Program lookup over the directories of `PATH`, in order.
pub struct SearchPath {
	dirs: Vec<PathBuf>,
}

fn is_executable(path: &Path) -> bool {
	fs::metadata(path).map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

impl SearchPath {
	pub fn new(path: &OsStr) -> SearchPath {
		SearchPath { dirs: env::split_paths(path).collect() }
	}

	pub fn from_env() -> SearchPath {
		match env::var_os(PATH_KEY) {
			Some(path) => SearchPath::new(&path),
			None => SearchPath::new(OsStr::new(DEFAULT_PATH)),
		}
	}

	/// Names containing a `/` are taken as paths and returned unchanged.
	pub fn lookup(&self, name: &[u8]) -> Option<CString> {
		if name.is_empty() {
			return None;
		}
		if name.contains(&b'/') {
			return CString::new(name).ok();
		}
		self.dirs.iter()
			.map(|dir| dir.join(OsStr::from_bytes(name)))
			.find(|candidate| is_executable(candidate))
			.and_then(|found| CString::new(found.into_os_string().into_vec()).ok())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs::File;

	fn touch(dir: &Path, name: &str, mode: u32) {
		let path = dir.join(name);
		File::create(&path).unwrap();
		fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
	}

	#[test]
	fn finds_sh() {
		let search = SearchPath::new(OsStr::new("/nonexistent:/bin:/usr/bin"));
		let found = search.lookup(b"sh").expect("sh should be on /bin or /usr/bin");
		assert!(found.to_bytes().ends_with(b"/sh"));
	}

	#[test]
	fn missing_program() {
		let search = SearchPath::new(OsStr::new("/bin:/usr/bin"));
		assert_eq!(search.lookup(b"no-such-program-for-ish"), None);
		assert_eq!(search.lookup(b""), None);
	}

	#[test]
	fn paths_are_not_searched() {
		let search = SearchPath::new(OsStr::new(""));
		assert_eq!(search.lookup(b"./run.sh"), Some(CString::new("./run.sh").unwrap()));
		assert_eq!(search.lookup(b"/no/such/tool"), Some(CString::new("/no/such/tool").unwrap()));
	}

	#[test]
	fn skips_files_that_are_not_executable() {
		let first = tempfile::tempdir().unwrap();
		let second = tempfile::tempdir().unwrap();
		touch(first.path(), "tool", 0o644);
		touch(second.path(), "tool", 0o755);
		let path = env::join_paths([first.path(), second.path()]).unwrap();
		let found = SearchPath::new(&path).lookup(b"tool").unwrap();
		assert_eq!(found.to_bytes(), second.path().join("tool").as_os_str().as_bytes());
	}

	#[test]
	fn first_match_wins() {
		let first = tempfile::tempdir().unwrap();
		let second = tempfile::tempdir().unwrap();
		touch(first.path(), "tool", 0o755);
		touch(second.path(), "tool", 0o755);
		let path = env::join_paths([first.path(), second.path()]).unwrap();
		let found = SearchPath::new(&path).lookup(b"tool").unwrap();
		assert_eq!(found.to_bytes(), first.path().join("tool").as_os_str().as_bytes());
	}
}
