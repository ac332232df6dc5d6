//! Path canonicalization used to decide whether a running process was started
//! from the supervised executable.
//!
//! Both `/` and `\` are separators so that paths reported by the OS compare
//! equal to configured paths whatever slash style either side uses. Network
//! share paths (`\\server\share\...`) keep their case; everything else is
//! compared case-insensitively.
//!
//! A leading pair of separators is read as a network share in either slash
//! style, so `//opt/srv` is one even though POSIX treats it as `/opt/srv`.
//! Callers comparing files that exist locally resolve them through the
//! filesystem first, which turns that spelling back into `/opt/srv`.

use std::fmt;
use std::path::Path;

use crate::error::PathError;

const TRIM: &[char] = &['/', '\\', ' '];
const UNC_ROOT: &str = "//";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedPath(String);

enum Root {
	Unc,
	Drive(char),
	Slash,
}

impl NormalizedPath {
	/// Normalize `path`, qualifying a relative path against the current directory.
	pub fn new(path: &str) -> Result<Self, PathError> {
		if path.trim().is_empty() {
			return Err(PathError::Blank);
		}
		if split_root(path).is_some() {
			return Self::resolve(path, None);
		}
		let cwd = std::env::current_dir().map_err(|e| PathError::Unqualified {
			path: path.to_string(),
			reason: e.to_string(),
		})?;
		Self::resolve(path, Some(&cwd.to_string_lossy()))
	}

	/// Normalize `path`, qualifying a relative path against `base`.
	pub fn relative_to(path: &str, base: &str) -> Result<Self, PathError> {
		Self::resolve(path, Some(base))
	}

	pub fn from_path(path: &Path) -> Result<Self, PathError> {
		Self::new(&path.to_string_lossy())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn is_unc(&self) -> bool {
		self.0.starts_with(UNC_ROOT)
	}

	fn resolve(path: &str, base: Option<&str>) -> Result<Self, PathError> {
		if path.trim().is_empty() {
			return Err(PathError::Blank);
		}
		let full = qualify(path, base)?;
		if full.starts_with(UNC_ROOT) {
			Ok(Self(full.trim_end_matches(TRIM).to_string()))
		} else {
			Ok(Self(full.trim_matches(TRIM).to_lowercase()))
		}
	}
}

impl fmt::Display for NormalizedPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Final component of `path`, whichever separator style it uses.
pub fn base_name(path: &str) -> Option<&str> {
	path.trim_end_matches(TRIM)
		.rsplit(is_separator)
		.next()
		.filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

fn is_separator(c: char) -> bool {
	c == '/' || c == '\\'
}

fn split_root(path: &str) -> Option<(Root, &str)> {
	let mut chars = path.chars();
	match (chars.next(), chars.next()) {
		(Some(a), Some(b)) if is_separator(a) && is_separator(b) => Some((Root::Unc, &path[2..])),
		(Some(a), _) if is_separator(a) => Some((Root::Slash, &path[1..])),
		(Some(letter), Some(':')) if letter.is_ascii_alphabetic() => {
			Some((Root::Drive(letter), &path[2..]))
		}
		_ => None,
	}
}

/// Produce the fully qualified form of `path` with `.` and `..` collapsed and
/// every separator rewritten to `/`.
fn qualify(path: &str, base: Option<&str>) -> Result<String, PathError> {
	let Some((root, rest)) = split_root(path) else {
		return match base {
			Some(base) if split_root(base).is_some() => qualify(&format!("{base}/{path}"), None),
			_ => Err(PathError::Unqualified {
				path: path.to_string(),
				reason: "no absolute base directory".to_string(),
			}),
		};
	};

	// server and share are part of a UNC root and never popped
	let floor = if matches!(root, Root::Unc) { 2 } else { 0 };
	let mut parts: Vec<&str> = Vec::new();
	for part in rest.split(is_separator) {
		match part {
			"" | "." => {}
			".." => {
				if parts.len() > floor {
					parts.pop();
				}
			}
			_ => parts.push(part),
		}
	}

	let prefix = match root {
		Root::Unc => UNC_ROOT.to_string(),
		Root::Drive(letter) => format!("{letter}:/"),
		Root::Slash => "/".to_string(),
	};
	Ok(format!("{}{}", prefix, parts.join("/")))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn norm(path: &str) -> NormalizedPath {
		NormalizedPath::new(path).unwrap()
	}

	#[test]
	fn blank_is_rejected() {
		assert_eq!(NormalizedPath::new(""), Err(PathError::Blank));
		assert_eq!(NormalizedPath::new("   "), Err(PathError::Blank));
		assert_eq!(NormalizedPath::relative_to("\t", "/opt"), Err(PathError::Blank));
	}

	#[test]
	fn local_paths_ignore_trailing_separator_slash_style_and_case() {
		let base = norm(r"C:\App\srv.exe");
		assert_eq!(base, norm(r"C:\App\srv.exe\"));
		assert_eq!(base, norm(r"C:/App\srv.exe"));
		assert_eq!(base, norm("C:/App/srv.exe"));
		assert_eq!(base, norm(r"C:\APP\SRV.EXE"));
		assert_eq!(base, norm(r"c:\app\srv.exe\"));
		assert_eq!(base.as_str(), "c:/app/srv.exe");
	}

	#[test]
	fn unix_paths_normalize_the_same_way() {
		let base = norm("/opt/Host/bin/srv");
		assert_eq!(base, norm("/opt/Host/bin/srv/"));
		assert_eq!(base, norm(r"/opt\Host\bin/srv"));
		assert_eq!(base, norm("/OPT/HOST/BIN/SRV"));
		assert_eq!(base, norm("/opt/./Host/lib/../bin/srv"));
		assert_ne!(base, norm("/opt/Host/bin/srv2"));
	}

	#[test]
	fn unc_paths_trim_trailing_whitespace_but_keep_case() {
		let share = norm(r"\\Server\Share\Host\srv.exe");
		assert!(share.is_unc());
		assert_eq!(share, norm(r"\\Server\Share\Host\srv.exe  "));
		assert_eq!(share, norm(r"\\Server\Share\Host\srv.exe\ "));
		assert_eq!(share, norm("//Server/Share/Host/srv.exe"));
		assert_ne!(share, norm(r"\\server\share\host\srv.exe"));
		assert_eq!(share.as_str(), "//Server/Share/Host/srv.exe");
	}

	#[test]
	fn doubled_leading_slash_is_a_share_as_text() {
		let doubled = norm("//opt/Srv");
		assert!(doubled.is_unc());
		assert_eq!(doubled.as_str(), "//opt/Srv");
		assert_ne!(doubled, norm("/opt/Srv"));
	}

	#[test]
	fn unc_root_survives_parent_segments() {
		assert_eq!(
			norm(r"\\Server\Share\..\..\srv.exe"),
			norm(r"\\Server\Share\srv.exe")
		);
	}

	#[test]
	fn relative_paths_are_qualified_against_base() {
		assert_eq!(
			NormalizedPath::relative_to("bin/../srv", "/opt/host").unwrap(),
			norm("/opt/host/srv")
		);
		assert_eq!(
			NormalizedPath::relative_to(r".\srv.exe", r"C:\App").unwrap(),
			norm(r"C:\App\srv.exe")
		);
		assert!(matches!(
			NormalizedPath::relative_to("srv", "relative/base"),
			Err(PathError::Unqualified { .. })
		));
	}

	#[test]
	fn base_name_accepts_both_separators() {
		assert_eq!(base_name(r"C:\App\srv.exe"), Some("srv.exe"));
		assert_eq!(base_name("/opt/host/srv/"), Some("srv"));
		assert_eq!(base_name(r"\\Server\Share\srv.exe "), Some("srv.exe"));
		assert_eq!(base_name("srv"), Some("srv"));
		assert_eq!(base_name("/"), None);
		assert_eq!(base_name("/opt/.."), None);
	}

	#[test]
	fn relative_paths_use_current_directory() {
		let cwd = std::env::current_dir().unwrap();
		assert_eq!(
			norm("some-binary"),
			NormalizedPath::from_path(&cwd.join("some-binary")).unwrap()
		);
	}
}
