//! Two-pass FNV-1a fingerprint of a key seed.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;
const DIGEST_LEN: usize = 32;

fn fold(hash: u32, unit: u32) -> u32 {
    (hash ^ unit).wrapping_mul(FNV_PRIME)
}

/// 32 lowercase hex characters derived from `seed`.
///
/// `h1` folds the characters left to right, `h2` right to left; the digest is
/// `h1 ‖ h2 ‖ h1^h2 ‖ (h1<<5)^(h2>>7)`, each word as 8 hex digits.
pub fn fingerprint(seed: &str) -> String {
    let h1 = seed.chars().map(u32::from).fold(FNV_OFFSET_BASIS, fold);
    let h2 = seed.chars().rev().map(u32::from).fold(FNV_OFFSET_BASIS, fold);
    let h3 = h1 ^ h2;
    let h4 = (h1 << 5) ^ (h2 >> 7);

    let mut digest = format!("{h1:08x}{h2:08x}{h3:08x}{h4:08x}");
    digest.truncate(DIGEST_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_character_matches_reference_fnv1a() {
        assert_eq!(fingerprint("a"), "e40c292ce40c292c00000000804d3dd2");
    }

    #[test]
    fn passes_run_in_opposite_directions() {
        assert_eq!(fingerprint("ab"), "4d2505ca3c2ba6cc710ea306a4d8ee0d");
        assert_ne!(fingerprint("ab"), fingerprint("ba"));
    }

    #[test]
    fn digest_is_fixed_width_hex() {
        for seed in ["", "x", "https://example.com/watch|v.mp4|d=125|s=1920x1080"] {
            let digest = fingerprint(seed);
            assert_eq!(digest.len(), 32);
            assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }
}
