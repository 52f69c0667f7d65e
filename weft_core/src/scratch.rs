use std::cell::RefCell;

/// Buffers kept per thread.
const MAX_POOLED_BUFFERS: usize = 4;
/// Buffers that grew beyond this are dropped instead of pooled.
const MAX_POOLED_CAPACITY: usize = 1024 * 1024;

thread_local! {
	static POOL: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` with an empty buffer from this thread's pool.
///
/// The buffer is cleared and returned to the pool afterwards unless the pool
/// is full or the buffer outgrew [`MAX_POOLED_CAPACITY`]. Nested calls each
/// get their own buffer.
pub fn with_scratch_buffer<T>(f: impl FnOnce(&mut String) -> T) -> T {
	let mut buffer = POOL.with_borrow_mut(Vec::pop).unwrap_or_default();
	buffer.clear();

	let result = f(&mut buffer);

	if buffer.capacity() <= MAX_POOLED_CAPACITY {
		buffer.clear();
		POOL.with_borrow_mut(|pool| {
			if pool.len() < MAX_POOLED_BUFFERS {
				pool.push(buffer);
			}
		});
	}

	result
}

/// The number of buffers pooled on this thread.
pub fn pooled_buffers() -> usize {
	POOL.with_borrow(Vec::len)
}
