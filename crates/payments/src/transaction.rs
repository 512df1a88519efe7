use chrono::Utc;
use domain::TransactionId;
use rand::Rng;

/// Generates a gateway transaction id of the form `TXN-<unix nanos>-<4 digits>`.
///
/// Collisions are possible in principle; the store rejects duplicates.
pub fn generate_transaction_id() -> TransactionId {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    TransactionId::new(format!("TXN-{nanos}-{suffix:04}"))
}
