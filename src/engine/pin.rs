use rand::Rng;

/// Four-digit delivery PIN, zero-padded so the width is always 4.
pub fn generate_pin() -> String {
    let code: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("{code:04}")
}
