use uuid::Uuid;

/// Generate a seller API key: the sha256 hex digest of a fresh UUID.
pub fn generate_api_key() -> String {
    sha256::digest(Uuid::new_v4().to_string())
}

/// Round a monetary amount to cents. Totals are sums of f64 prices, so they
/// pick up float dust without this.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
