use std::time::{Instant, SystemTime, UNIX_EPOCH};

use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    rand::{
        Rng, SeedableRng, TryRngCore,
        rngs::{OsRng, StdRng},
    },
    secrecy::{ExposeSecret, Secret},
    sha2::{Digest, Sha256},
    tracing::warn,
};

use crate::{
    error::{AuthError, Result},
    types::{PkceChallenge, PkceSession},
};

/// RFC 7636 unreserved characters.
pub const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

pub const VERIFIER_LEN: usize = 128;
pub const STATE_LEN: usize = 32;

/// Seed a CSPRNG from the OS, falling back to the clock when the OS source
/// is unavailable.
fn seeded_rng() -> StdRng {
    let mut seed = [0u8; 32];
    match OsRng.try_fill_bytes(&mut seed) {
        Ok(()) => StdRng::from_seed(seed),
        Err(e) => {
            warn!(error = %e, "OS entropy unavailable, seeding PKCE generator from the clock");
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos();
            let mixed = (nanos as u64) ^ ((nanos >> 64) as u64) ^ u64::from(std::process::id());
            StdRng::seed_from_u64(mixed)
        },
    }
}

/// Random string of `len` characters drawn from [`ALPHABET`].
pub fn random_string(len: usize) -> String {
    let mut rng = seeded_rng();
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// S256 challenge for `verifier`.
///
/// Rejects verifiers outside the RFC 7636 shape (43..=128 unreserved
/// characters); the provider would refuse the exchange anyway.
pub fn challenge_for(verifier: &str) -> Result<String> {
    if !(43..=128).contains(&verifier.len()) {
        return Err(AuthError::Crypto(format!(
            "code verifier must be 43 to 128 characters, got {}",
            verifier.len()
        )));
    }
    if let Some(bad) = verifier.bytes().find(|b| !ALPHABET.contains(b)) {
        return Err(AuthError::Crypto(format!(
            "code verifier contains invalid character {:?}",
            bad as char
        )));
    }

    let digest = Sha256::digest(verifier.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

/// Generate a PKCE S256 challenge pair.
pub fn generate_pkce() -> Result<PkceChallenge> {
    let verifier = random_string(VERIFIER_LEN);
    let challenge = challenge_for(&verifier)?;
    Ok(PkceChallenge {
        verifier: Secret::new(verifier),
        challenge,
    })
}

/// Generate a random state parameter.
pub fn generate_state() -> String {
    random_string(STATE_LEN)
}

impl PkceSession {
    /// Fresh verifier, challenge and state for one login attempt.
    pub fn generate() -> Result<Self> {
        let pkce = generate_pkce()?;
        Ok(Self {
            code_verifier: pkce.verifier,
            code_challenge: pkce.challenge,
            state: generate_state(),
            created_at: Instant::now(),
        })
    }

    pub fn verifier(&self) -> &str {
        self.code_verifier.expose_secret()
    }
}
