use chrono::Utc;
use rand::Rng;

/// Produces a collision-resistant 64-bit id: current unix milliseconds times
/// 1000, plus a random 0..1000 suffix.
///
/// Monotonically increasing under normal clock behavior; two callers landing
/// in the same millisecond collide with probability 1/1000, an accepted
/// trade-off inherited from the id scheme of the stored data.
pub fn generate_id() -> i64 {
    let timestamp_ms = Utc::now().timestamp_millis();
    let random: i64 = rand::thread_rng().gen_range(0..1000);
    timestamp_ms * 1000 + random
}
