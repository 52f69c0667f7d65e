//! A `Read` adapter that removes the two special comment syntaxes from a
//! template before it reaches the tokenizer.
//!
//! - Prototype-only comments `<!--/*/ ... /*/-->` lose their markers and keep
//!   their content, so the content is parsed as live markup.
//! - Parser-level comments `<!--/* ... */-->` are removed entirely, however
//!   many reads apart their markers are.
//!
//! Prototype-only markers pair up: a closer with no opener before it stays
//! in the output.
//!
//! Markers are ASCII, so scanning bytes never splits a UTF-8 sequence that
//! ends up in the output.

use std::io;
use std::io::Read;

const PROTOTYPE_OPEN: &[u8] = b"<!--/*/";
const PROTOTYPE_CLOSE: &[u8] = b"/*/-->";
const PARSER_LEVEL_OPEN: &[u8] = b"<!--/*";
const PARSER_LEVEL_CLOSE: &[u8] = b"*/-->";

const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerMatch {
	Full,
	/// The remaining input is a proper prefix of the marker.
	Partial,
	None,
}

fn match_marker(input: &[u8], marker: &[u8]) -> MarkerMatch {
	if input.starts_with(marker) {
		MarkerMatch::Full
	} else if input.len() < marker.len() && marker.starts_with(input) {
		MarkerMatch::Partial
	} else {
		MarkerMatch::None
	}
}

/// Strips prototype-only markers and parser-level comments from `R`.
///
/// Bytes that might begin a marker at the end of one underlying read are
/// held back until the next read decides them. Errors from `R` propagate
/// unchanged.
#[derive(Debug)]
pub struct CommentStrippingReader<R> {
	inner: R,
	chunk: Box<[u8]>,
	/// Filtered bytes ready to hand out.
	output: std::ops::Range<usize>,
	/// Undecided bytes that may start a marker.
	pending: std::ops::Range<usize>,
	inside_comment: bool,
	/// Between a prototype-only opener and its closer. Closers only count
	/// here and openers only count outside.
	inside_prototype: bool,
	/// The last byte discarded inside a parser-level comment.
	previous: u8,
	eof: bool,
}

impl<R: Read> CommentStrippingReader<R> {
	pub fn new(inner: R) -> Self {
		Self::with_capacity(DEFAULT_CHUNK_SIZE, inner)
	}

	pub fn with_capacity(capacity: usize, inner: R) -> Self {
		Self {
			inner,
			chunk: vec![0; capacity.max(PROTOTYPE_OPEN.len() + 1)].into_boxed_slice(),
			output: 0..0,
			pending: 0..0,
			inside_comment: false,
			inside_prototype: false,
			previous: 0,
			eof: false,
		}
	}

	/// Whether the stream currently sits inside a parser-level comment.
	pub fn inside_comment(&self) -> bool {
		self.inside_comment
	}

	pub fn into_inner(self) -> R {
		self.inner
	}

	/// Read more input and filter it, until some output exists or the
	/// underlying source is exhausted.
	fn fill(&mut self) -> io::Result<()> {
		while self.output.is_empty() {
			let carried = self.pending.len();
			if carried == 0 && self.eof {
				return Ok(());
			}

			self.chunk.copy_within(self.pending.clone(), 0);
			let mut filled = carried;
			if !self.eof {
				let read = self.inner.read(&mut self.chunk[filled..])?;
				if read == 0 {
					self.eof = true;
				}
				filled += read;
			}

			let (written, undecided) = self.filter(filled);
			self.output = 0..written;
			self.pending = undecided..filled;
		}

		Ok(())
	}

	/// Filter `chunk[..filled]` in place. Returns the length of the filtered
	/// output and the index where undecided bytes start.
	fn filter(&mut self, filled: usize) -> (usize, usize) {
		let mut write = 0;
		let mut index = 0;

		while index < filled {
			let rest = &self.chunk[index..filled];

			if self.inside_comment {
				let Some(star) = memchr::memchr(b'*', rest) else {
					self.previous = rest[rest.len() - 1];
					index = filled;
					break;
				};
				if star > 0 {
					self.previous = rest[star - 1];
					index += star;
					continue;
				}

				match match_marker(rest, PARSER_LEVEL_CLOSE) {
					// A prototype-only closer never ends a parser-level comment.
					MarkerMatch::Full if self.previous != b'/' => {
						self.inside_comment = false;
						index += PARSER_LEVEL_CLOSE.len();
					}
					MarkerMatch::Partial if !self.eof => return (write, index),
					_ => {
						self.previous = b'*';
						index += 1;
					}
				}
				continue;
			}

			let found = if self.inside_prototype {
				memchr::memchr2(b'<', b'/', rest)
			} else {
				memchr::memchr(b'<', rest)
			};
			let Some(found) = found else {
				self.chunk.copy_within(index..filled, write);
				write += filled - index;
				index = filled;
				break;
			};
			if found > 0 {
				self.chunk.copy_within(index..index + found, write);
				write += found;
				index += found;
				continue;
			}

			let marker = if rest[0] == b'<' {
				match match_marker(rest, PROTOTYPE_OPEN) {
					MarkerMatch::Full if !self.inside_prototype => {
						self.inside_prototype = true;
						Some(PROTOTYPE_OPEN.len())
					}
					MarkerMatch::Partial if !self.eof => return (write, index),
					_ if rest.starts_with(PARSER_LEVEL_OPEN) => {
						self.inside_comment = true;
						self.previous = b'*';
						index += PARSER_LEVEL_OPEN.len();
						continue;
					}
					_ => None,
				}
			} else {
				match match_marker(rest, PROTOTYPE_CLOSE) {
					MarkerMatch::Full => {
						self.inside_prototype = false;
						Some(PROTOTYPE_CLOSE.len())
					}
					MarkerMatch::Partial if !self.eof => return (write, index),
					_ => None,
				}
			};

			match marker {
				Some(length) => index += length,
				None => {
					self.chunk[write] = self.chunk[index];
					write += 1;
					index += 1;
				}
			}
		}

		(write, index)
	}
}

impl<R: Read> Read for CommentStrippingReader<R> {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if buf.is_empty() {
			return Ok(0);
		}

		self.fill()?;

		let available = &self.chunk[self.output.clone()];
		let count = available.len().min(buf.len());
		buf[..count].copy_from_slice(&available[..count]);
		self.output.start += count;

		Ok(count)
	}
}
