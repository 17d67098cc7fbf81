/// Bounds a message history to `window` entries, keeping the first message as an anchor and the
/// most recent `window - 1` messages after it.
pub fn trim_history<T>(messages: &[T], window: usize) -> Vec<T>
where
	T: Clone,
{
	if messages.len() <= window {
		return messages.to_vec();
	}
	if window == 0 {
		return Vec::new();
	}

	let tail_start = messages.len() - (window - 1);
	let mut out = Vec::with_capacity(window);

	out.push(messages[0].clone());
	out.extend_from_slice(&messages[tail_start..]);

	out
}
