//! Hasher implementation.

/// Deterministic 32-bit string hasher used for bucketing.
pub trait Hasher {
    fn hash(&self, input: &str, seed: i32) -> i32;
}

/// The default (and only) hasher: 32-bit x86 MurmurHash3.
///
/// The output must match the server-side implementation bit for bit, otherwise the same
/// identifier would land in different slots on the server and the client.
#[derive(Debug, Default, Clone, Copy)]
pub struct Murmur3Hasher;

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;
const R1: u32 = 15;
const R2: u32 = 13;
const M: u32 = 5;
const N: u32 = 0xe654_6b64;

impl Hasher for Murmur3Hasher {
    fn hash(&self, input: &str, seed: i32) -> i32 {
        murmur3_32(input.as_bytes(), seed as u32) as i32
    }
}

fn mix_k(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(R1).wrapping_mul(C2)
}

fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut hash = seed;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        hash ^= mix_k(k);
        hash = hash.rotate_left(R2).wrapping_mul(M).wrapping_add(N);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, byte) in tail.iter().enumerate() {
            k ^= (*byte as u32) << (8 * i);
        }
        hash ^= mix_k(k);
    }

    hash ^= data.len() as u32;
    fmix(hash)
}

fn fmix(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::{Hasher, Murmur3Hasher};

    #[test]
    fn matches_reference_vectors() {
        let cases: &[(&str, i32, i32)] = &[
            ("", 0, 0),
            ("", 1, 1364076727),
            ("a", 0, 1009084850),
            ("ab", 0, -1681926305),
            ("abc", 0, -1277324294),
            ("abcd", 0, 1139631978),
            ("hello", 0, 613153351),
            ("test", 42, -335093414),
            ("test_id", 0, 1519865632),
            ("user_1", 1, -1192234414),
            ("Hello, 世界", 0, -492752405),
            (
                "The quick brown fox jumps over the lazy dog",
                0x9747b28c_u32 as i32,
                799549133,
            ),
        ];

        for &(input, seed, expected) in cases {
            assert_eq!(
                Murmur3Hasher.hash(input, seed),
                expected,
                "hash({input:?}, {seed})"
            );
        }
    }

    #[test]
    fn is_deterministic() {
        let hasher = Murmur3Hasher;
        for i in 0..100 {
            let input = format!("identifier-{i}");
            assert_eq!(hasher.hash(&input, 7), hasher.hash(&input, 7));
        }
    }
}
