use std::collections::HashSet;
use std::hash::BuildHasher;
use std::hash::RandomState;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Bytes of text a repository holds by default.
pub const DEFAULT_REPOSITORY_MAX_SIZE: usize = 2_000_000;

const DEFAULT_STRIPES: usize = 16;

/// A bounded, thread-safe cache of recurring text such as element names,
/// attribute names and indentation.
///
/// Lookups and inserts lock a single stripe selected by hash, so parses on
/// different threads rarely contend. Once `max_size` bytes are cached, new
/// text is returned as a fresh allocation and nothing is evicted.
#[derive(Debug)]
pub struct TextRepository {
	stripes: Box<[RwLock<HashSet<Arc<str>>>]>,
	unremovable: HashSet<Arc<str>>,
	hasher: RandomState,
	max_size: usize,
	size: AtomicUsize,
	full: AtomicBool,
}

impl TextRepository {
	pub fn new(max_size: usize) -> Self {
		Self::with_stripes(max_size, DEFAULT_STRIPES)
	}

	pub fn with_stripes(max_size: usize, stripes: usize) -> Self {
		let stripes = (0..stripes.max(1))
			.map(|_| RwLock::new(HashSet::new()))
			.collect();

		Self {
			stripes,
			unremovable: HashSet::new(),
			hasher: RandomState::new(),
			max_size,
			size: AtomicUsize::new(0),
			full: AtomicBool::new(false),
		}
	}

	/// A repository pre-seeded with texts that are always available and do
	/// not count against `max_size`.
	pub fn with_unremovable<'t>(max_size: usize, texts: impl IntoIterator<Item = &'t str>) -> Self {
		let mut repository = Self::new(max_size);
		repository.unremovable = texts.into_iter().map(Arc::from).collect();
		repository
	}

	/// Return the shared copy of `text`, caching it when there is room.
	pub fn intern(&self, text: &str) -> Arc<str> {
		if let Some(found) = self.unremovable.get(text) {
			return Arc::clone(found);
		}

		let stripe = &self.stripes[self.stripe_index(text)];
		{
			let cached = stripe.read().unwrap_or_else(PoisonError::into_inner);
			if let Some(found) = cached.get(text) {
				return Arc::clone(found);
			}
		}

		let reserved = self
			.size
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
				current
					.checked_add(text.len())
					.filter(|next| *next <= self.max_size)
			});

		if reserved.is_err() {
			if !self.full.swap(true, Ordering::Relaxed) {
				tracing::trace!(
					max_size = self.max_size,
					"text repository is full, new text will not be cached"
				);
			}
			return Arc::from(text);
		}

		let interned: Arc<str> = Arc::from(text);
		let mut cached = stripe.write().unwrap_or_else(PoisonError::into_inner);
		if let Some(previous) = cached.replace(Arc::clone(&interned)) {
			// Another thread cached the same text first. The last writer wins.
			self.size.fetch_sub(previous.len(), Ordering::AcqRel);
		}

		interned
	}

	/// Whether `text` is currently cached.
	pub fn contains(&self, text: &str) -> bool {
		self.unremovable.contains(text)
			|| self.stripes[self.stripe_index(text)]
				.read()
				.unwrap_or_else(PoisonError::into_inner)
				.contains(text)
	}

	/// The number of cached texts, including unremovable ones.
	pub fn len(&self) -> usize {
		self.unremovable.len()
			+ self
				.stripes
				.iter()
				.map(|stripe| stripe.read().unwrap_or_else(PoisonError::into_inner).len())
				.sum::<usize>()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Bytes of removable text currently cached.
	pub fn size(&self) -> usize {
		self.size.load(Ordering::Acquire)
	}

	pub fn max_size(&self) -> usize {
		self.max_size
	}

	fn stripe_index(&self, text: &str) -> usize {
		(self.hasher.hash_one(text) as usize) % self.stripes.len()
	}
}

impl Default for TextRepository {
	fn default() -> Self {
		Self::new(DEFAULT_REPOSITORY_MAX_SIZE)
	}
}
