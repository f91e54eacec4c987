use bcrypt::BcryptError;

pub fn hash(password: &str, cost: u32) -> Result<String, BcryptError> {
    bcrypt::hash(password, cost)
}

/// Constant-time check of `password` against a stored bcrypt hash. A
/// malformed hash counts as a mismatch.
pub fn verify(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
