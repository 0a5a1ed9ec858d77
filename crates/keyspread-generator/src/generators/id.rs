//! Natural id generators.

use rand::Rng;
use ulid::Ulid;
use uuid::Uuid;

/// Generate a random UUID v4 using the provided RNG.
pub fn generate_uuid_v4<R: Rng>(rng: &mut R) -> Uuid {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);

    bytes[6] = (bytes[6] & 0x0f) | 0x40; // Version 4
    bytes[8] = (bytes[8] & 0x3f) | 0x80; // Variant RFC 4122

    Uuid::from_bytes(bytes)
}

/// Generate a ULID for the given millisecond timestamp.
///
/// ULIDs lead with the timestamp, so ids generated close together share a
/// long common prefix. Used as the hotspot-prone natural id.
pub fn generate_ulid<R: Rng>(rng: &mut R, timestamp_ms: u64) -> Ulid {
    let random: u128 = rng.gen::<u128>() & ((1u128 << 80) - 1);
    Ulid::from_parts(timestamp_ms, random)
}
