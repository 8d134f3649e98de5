//! The 32-bit infrared laser frame codec.
//!
//! Wire layout, big-endian:
//!
//! ```text
//! [ player_id:8 | device_id:8 | hash(player_id):8 | hash(device_id):8 ]
//! ```
//!
//! Photodiode front-ends routinely deliver `0x0000` / `0xFFFF` line-idle
//! patterns; hashing each identity byte guarantees those never decode as
//! a valid `(0, 0)` or `(255, 255)` shooter.

/// Fleet-wide hash constants. Every endpoint in a deployment must agree
/// on these or no hits will ever validate.
const HASH_SEED: u8 = 0xA5;
const HASH_OFFSET: u8 = 0x3D;

/// The per-byte identity hash: `((x XOR SEED) + OFFSET) AND 0xFF`.
pub fn id_hash(x: u8) -> u8 {
    (x ^ HASH_SEED).wrapping_add(HASH_OFFSET)
}

/// Encodes a shooter identity into a laser frame.
pub fn encode(player_id: u8, device_id: u8) -> u32 {
    u32::from_be_bytes([player_id, device_id, id_hash(player_id), id_hash(device_id)])
}

/// Decodes a laser frame, returning `(player_id, device_id)` only if both
/// embedded hashes match. There is no partial accept.
pub fn decode(frame: u32) -> Option<(u8, u8)> {
    let [player_id, device_id, h_player, h_device] = frame.to_be_bytes();
    if h_player == id_hash(player_id) && h_device == id_hash(device_id) {
        Some((player_id, device_id))
    } else {
        None
    }
}
