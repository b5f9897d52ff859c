// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX shm object naming: leading '/', no interior '/', and a hashed short
// form on platforms with a tight name limit.

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    data.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Longest POSIX shm name accepted by the platform, counting the leading '/'.
/// 0 disables shortening.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31; // PSHMNAMLEN

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0;

/// Map a user-facing name onto a valid POSIX shm object name.
///
/// Interior slashes are replaced with '_' (shm_open rejects them on Linux).
/// When the result exceeds `SHM_NAME_MAX` it becomes
/// `/<head>_<16 hex digits of FNV-1a>`, keeping as much of the original
/// head as fits so the object stays recognisable in `/dev/shm`.
pub fn make_shm_name(name: &str) -> String {
    let body: String = name
        .strip_prefix('/')
        .unwrap_or(name)
        .chars()
        .map(|c| if c == '/' { '_' } else { c })
        .collect();
    let full = format!("/{body}");

    if SHM_NAME_MAX == 0 || full.len() <= SHM_NAME_MAX {
        return full;
    }

    let hash = format!("{:016x}", fnv1a_64(full.as_bytes()));
    // '/' + head + '_' + hash
    let head_len = SHM_NAME_MAX.saturating_sub(2 + hash.len());
    let mut head_end = head_len.min(body.len());
    while !body.is_char_boundary(head_end) {
        head_end -= 1;
    }
    format!("/{}_{hash}", &body[..head_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_known_values() {
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn prepends_slash_once() {
        assert_eq!(make_shm_name("lock"), "/lock");
        assert_eq!(make_shm_name("/lock"), "/lock");
    }

    #[test]
    fn interior_slashes_are_flattened() {
        assert_eq!(make_shm_name("a/b/c"), "/a_b_c");
    }

    #[test]
    fn long_names_fit_the_limit() {
        let long = "x".repeat(300);
        let name = make_shm_name(&long);
        assert!(name.starts_with('/'));
        if SHM_NAME_MAX > 0 {
            assert!(name.len() <= SHM_NAME_MAX);
            assert_ne!(make_shm_name(&"y".repeat(300)), name);
        } else {
            assert_eq!(name.len(), 301);
        }
    }
}
