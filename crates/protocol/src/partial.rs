use uuid::Uuid;

/// Separator between a parent key and the generated partial suffix.
///
/// `~` is unreserved in URLs and absent from the base64 alphabets, so a
/// derived key can never collide with a server-issued one.
pub const PARTIAL_KEY_SEPARATOR: char = '~';

/// Derives a fresh partial key for `parent`.
///
/// A parent that is itself a partial key contributes only its parent
/// segment, so repeated derivation never stacks suffixes. The suffix is a
/// v4 uuid: unique within the process and across concurrent clients.
pub fn partial_key(parent: &str) -> String {
    let parent = parent_key(parent);
    format!("{parent}{PARTIAL_KEY_SEPARATOR}{}", Uuid::new_v4().simple())
}

/// Returns `true` if `key` carries a partial suffix.
pub fn is_partial_key(key: &str) -> bool {
    key.contains(PARTIAL_KEY_SEPARATOR)
}

/// Returns the parent segment of `key` (the key itself if not partial).
pub fn parent_key(key: &str) -> &str {
    match key.find(PARTIAL_KEY_SEPARATOR) {
        Some(index) => &key[..index],
        None => key,
    }
}
