use axum::http::{header, HeaderMap};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use macaroon::{Caveat, Format, Macaroon, MacaroonKey, Verifier};
use sha2::{Digest, Sha256};

use crate::db::repositories::ConsumedPaymentRepository;
use crate::error::{AppError, AppResult};
use crate::AppState;

pub const MACAROON_LOCATION: &str = "satring";

const CAVEAT_PREFIX: &str = "payment_hash = ";

/// Mint a macaroon bound to an invoice's payment hash: identifier and single
/// first-party caveat both carry the hash, signed under the root key. The
/// serialized token is base64-wrapped for transport.
pub fn mint_macaroon(root_key: &str, payment_hash: &str) -> AppResult<String> {
    let key = MacaroonKey::generate(root_key.as_bytes());
    let mut mac = Macaroon::create(
        Some(MACAROON_LOCATION.to_string()),
        &key,
        payment_hash.to_string().into(),
    )
    .map_err(|e| AppError::Internal(format!("macaroon mint failed: {:?}", e)))?;
    mac.add_first_party_caveat(format!("{}{}", CAVEAT_PREFIX, payment_hash).into());

    let serialized = mac
        .serialize(Format::V1)
        .map_err(|e| AppError::Internal(format!("macaroon serialize failed: {:?}", e)))?;
    Ok(BASE64.encode(serialized))
}

fn bound_payment_hash(mac: &Macaroon) -> Option<String> {
    mac.caveats().into_iter().find_map(|caveat| {
        if let Caveat::FirstParty(first_party) = caveat {
            let predicate = first_party.predicate().to_string();
            predicate.strip_prefix(CAVEAT_PREFIX).map(str::to_string)
        } else {
            None
        }
    })
}

/// Verify a presented (macaroon, preimage) pair. Returns the bound payment
/// hash on success, `None` on any failure. Pure; no I/O.
///
/// A valid preimage proves the invoice settled (the Lightning network only
/// reveals it on payment), so no backend poll happens here.
pub fn verify_l402(root_key: &str, macaroon_b64: &str, preimage_hex: &str) -> Option<String> {
    let raw = BASE64.decode(macaroon_b64).ok()?;
    let token = String::from_utf8(raw).ok()?;
    let mac = Macaroon::deserialize(token.as_str()).ok()?;

    let payment_hash = bound_payment_hash(&mac)?;

    // SHA256(preimage) must equal the caveat hash, compared in constant time.
    let preimage = hex::decode(preimage_hex).ok()?;
    let digest = hex::encode(Sha256::digest(&preimage));
    ring::constant_time::verify_slices_are_equal(digest.as_bytes(), payment_hash.as_bytes())
        .ok()?;

    let key = MacaroonKey::generate(root_key.as_bytes());
    let mut verifier = Verifier::default();
    verifier.satisfy_exact(format!("{}{}", CAVEAT_PREFIX, payment_hash).into());
    verifier.verify(&mac, &key, Default::default()).ok()?;

    Some(payment_hash)
}

/// The paywall decision for one request.
///
/// Valid credentials are consumed through the ledger: the macaroon carries no
/// TTL, so the atomic uniqueness of `payment_hash` is the entire replay
/// defense. Missing credentials produce a fresh 402 challenge.
pub async fn require_l402(
    state: &AppState,
    headers: &HeaderMap,
    amount_sats: u64,
    memo: &str,
) -> AppResult<()> {
    if state.config.test_mode() {
        return Ok(());
    }

    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    // L402 and LSAT are the same scheme under two names.
    if let Some(token) = auth
        .strip_prefix("L402 ")
        .or_else(|| auth.strip_prefix("LSAT "))
    {
        let Some((macaroon_b64, preimage_hex)) = token.split_once(':') else {
            return Err(AppError::InvalidTokenFormat);
        };
        let Some(payment_hash) =
            verify_l402(&state.config.auth.root_key, macaroon_b64, preimage_hex)
        else {
            return Err(AppError::InvalidCredentials);
        };
        if !ConsumedPaymentRepository::admit(&state.db, &payment_hash).await? {
            return Err(AppError::InvalidCredentials);
        }
        return Ok(());
    }

    let invoice = state.payments.create_invoice(amount_sats, memo).await?;
    let macaroon = mint_macaroon(&state.config.auth.root_key, &invoice.payment_hash)?;
    Err(AppError::PaymentRequired {
        macaroon,
        invoice: invoice.payment_request,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_KEY: &str = "unit-test-root-key";

    fn matching_pair(preimage: &[u8]) -> (String, String) {
        let preimage_hex = hex::encode(preimage);
        let payment_hash = hex::encode(Sha256::digest(preimage));
        (payment_hash, preimage_hex)
    }

    #[test]
    fn mint_returns_base64() {
        let mac_b64 = mint_macaroon(ROOT_KEY, &"ab".repeat(32)).unwrap();
        assert!(mac_b64.len() > 10);
        assert!(BASE64.decode(&mac_b64).is_ok());
    }

    #[test]
    fn roundtrip_with_valid_preimage() {
        let (payment_hash, preimage_hex) = matching_pair(b"secret-preimage-bytes");
        let mac_b64 = mint_macaroon(ROOT_KEY, &payment_hash).unwrap();

        assert_eq!(
            verify_l402(ROOT_KEY, &mac_b64, &preimage_hex),
            Some(payment_hash)
        );
    }

    #[test]
    fn wrong_preimage_fails() {
        let (payment_hash, _) = matching_pair(b"correct-preimage");
        let mac_b64 = mint_macaroon(ROOT_KEY, &payment_hash).unwrap();

        let wrong_hex = hex::encode(b"wrong-preimage-value");
        assert_eq!(verify_l402(ROOT_KEY, &mac_b64, &wrong_hex), None);
    }

    #[test]
    fn wrong_root_key_fails() {
        let (payment_hash, preimage_hex) = matching_pair(b"key-mismatch");
        let mac_b64 = mint_macaroon(ROOT_KEY, &payment_hash).unwrap();

        assert_eq!(verify_l402("another-key", &mac_b64, &preimage_hex), None);
    }

    #[test]
    fn garbage_macaroon_fails() {
        assert_eq!(verify_l402(ROOT_KEY, "not-a-macaroon", "aabbccdd"), None);
        assert_eq!(verify_l402(ROOT_KEY, "", ""), None);
    }

    #[test]
    fn tampered_macaroon_fails() {
        let (payment_hash, preimage_hex) = matching_pair(b"my-preimage");
        let mac_b64 = mint_macaroon(ROOT_KEY, &payment_hash).unwrap();

        // Corrupt the inner token while keeping the outer base64 valid.
        let mut inner = BASE64.decode(&mac_b64).unwrap();
        let mid = inner.len() / 2;
        inner[mid] = inner[mid].wrapping_add(1);
        let corrupted = BASE64.encode(inner);

        assert_eq!(verify_l402(ROOT_KEY, &corrupted, &preimage_hex), None);
    }

    #[test]
    fn non_hex_preimage_fails() {
        let (payment_hash, _) = matching_pair(b"hex-check");
        let mac_b64 = mint_macaroon(ROOT_KEY, &payment_hash).unwrap();

        assert_eq!(verify_l402(ROOT_KEY, &mac_b64, "zzzz"), None);
    }
}
