use jigsync_core::{ClientId, SessionId, SESSION_ID_ALPHABET, SESSION_ID_LEN};
use rand::Rng;

pub fn random_client_id<R: Rng + ?Sized>(rng: &mut R) -> ClientId {
    // zero is reserved so a missing writer never looks like a real one
    ClientId::new(rng.random_range(1..=u64::MAX))
}

pub fn random_session_id<R: Rng + ?Sized>(rng: &mut R) -> SessionId {
    let alphabet_len = SESSION_ID_ALPHABET.len();
    SessionId::from_indices((0..SESSION_ID_LEN).map(|_| rng.random_range(0..alphabet_len)))
}
