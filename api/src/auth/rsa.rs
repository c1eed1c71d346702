use anyhow::Context;
use base64::Engine;
use rsa::{
    pkcs1v15::{Signature, VerifyingKey},
    pkcs8::DecodePublicKey,
    sha2::Sha256,
    signature::Verifier,
    RsaPublicKey,
};

use crate::api::error::{Error, Result};

/// Parses the base64-encoded DER (SPKI) public key the campaign platform
/// distributes. Called once at startup; a bad key is fatal there.
pub fn load_rsa_public_key_from_base64(key_base64: &str) -> anyhow::Result<RsaPublicKey> {
    let der = base64::prelude::BASE64_STANDARD
        .decode(key_base64)
        .context("could not decode base64 public key")?;
    RsaPublicKey::from_public_key_der(&der).context("failed to parse DER public key")
}

/// Verifies the base64-encoded RSA-SHA256 (PKCS#1 v1.5) signature over the
/// normalized query string.
///
/// A cryptographic mismatch is `InvalidSignature`; a signature header that
/// does not even decode from base64 is the unexpected-error path, matching
/// the upstream service where that decode crashed out of the handler.
///
/// Builds a fresh `VerifyingKey` per call so concurrent verifications never
/// share verifier state.
pub fn verify(message: &str, public_key: &RsaPublicKey, signature_base64: &str) -> Result<()> {
    let signature = base64::prelude::BASE64_STANDARD
        .decode(signature_base64)
        .context("error decoding signature from base64")
        .map_err(Error::Unexpected)?;

    let signature = Signature::try_from(signature.as_slice())
        .context("error constructing signature")
        .map_err(Error::Unexpected)?;

    let verifying_key = VerifyingKey::<Sha256>::new(public_key.to_owned());

    verifying_key
        .verify(message.as_bytes(), &signature)
        .map_err(|_| Error::InvalidSignature)?;

    Ok(())
}

#[cfg(test)]
pub(crate) const TEST_RSA_PUBLIC_KEY: &str = "MIGfMA0GCSqGSIb3DQEBAQUAA4GNADCBiQKBgQCbWoXkbbwfcZnLW43Vsh1YMu1W5a4reIHvcMYqFjWJl4huA7JKZdC/O3pmEqxdSGZPkerDoN70yfFUPJwKHF+Zc30CWSHTgN+ivR1W4EwyQd48b7WfdU6NVNu2p0p9B2dvcytsdIZ+FKjDwjXplw21//9zX7xLr2rF+YeP1mp20QIDAQAB";
#[cfg(test)]
pub(crate) const TEST_RSA_PRIVATE_KEY: &str = "MIICdgIBADANBgkqhkiG9w0BAQEFAASCAmAwggJcAgEAAoGBAJtaheRtvB9xmctbjdWyHVgy7Vblrit4ge9wxioWNYmXiG4Dskpl0L87emYSrF1IZk+R6sOg3vTJ8VQ8nAocX5lzfQJZIdOA36K9HVbgTDJB3jxvtZ91To1U27anSn0HZ29zK2x0hn4UqMPCNemXDbX//3NfvEuvasX5h4/WanbRAgMBAAECgYBhrrGxyC4Zt1x0ucSdMbmx05PYp+K0ArnwzIBNxlkzgsyOIFTi4tI27DcyJ1up6/Qo5B8xkt2eHbxYsyOKV/zjjNo7afmQ/woBPgCxuErNJsdo2g0nH0k8A4Pw0FcLQL4sQocyfYsFMNhP56SY5fkgRAdAYPJ5v5RG47dLVoMGYQJBANF69BOAa/V+wubh5d5+l04zDkt/xMq7AoeHbeABpEOAEVwEfYqrH2H/BreUod8LixC6CR1KZZ9s+nnSGd9kz+sCQQC92nGk32kU09OcXtQzRn1Fi2AHvsSShQ8rwf40Buxl0IZK6sQkkSb2Eg1bA+E5KfAbzfX2YziAH/KcsdaxZ2EzAkEAwlK3tpuMCplDviBSOBrgyzcLjLgC2zmt+AGGyKVdNwzHjb/QoeFqZGLKXWRw4NL5d1PMfrJ0IPdcR8PCInyHbwJAT2CqzT1fiQa73hBD9qBNNit83iAjvgMGAcydRRFz+2nBDEe19Hf/6zhG/zvTCfx/2JA3e2mmsOMqo9szIX9QwwJAVfTewPB76mTwrTDbvBXAAXRU1WKpmrDiKHCViRO8Z6iP/KwwQxqpGiZTXr6zN8onidVjRzWJHGcWq3cCGO0v9w==";

/// Signs a request string with a base64-encoded PKCS#8 DER private key.
/// Test-side counterpart of `verify`; production never signs anything.
#[cfg(test)]
pub(crate) fn sign_request(private_key_base64: &str, request: &str) -> String {
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};
    use rsa::RsaPrivateKey;

    let der = base64::prelude::BASE64_STANDARD
        .decode(private_key_base64)
        .unwrap();
    let private_key = RsaPrivateKey::from_pkcs8_der(&der).unwrap();
    let signing_key = SigningKey::<Sha256>::new(private_key);

    let mut rng = rand::thread_rng();
    let signature = signing_key.sign_with_rng(&mut rng, request.as_bytes());
    base64::prelude::BASE64_STANDARD.encode(signature.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_static_base64_public_key() {
        load_rsa_public_key_from_base64(TEST_RSA_PUBLIC_KEY).unwrap();
    }

    #[test]
    fn rejects_garbage_base64_key() {
        assert!(load_rsa_public_key_from_base64("not base64 !!!").is_err());
    }

    #[test]
    fn sign_verify_roundtrip() {
        let public_key = load_rsa_public_key_from_base64(TEST_RSA_PUBLIC_KEY).unwrap();
        let data = "a=b&c=[\"1\",\"2\",\"3\"]&recvWindow=5000&timestamp=1499827319559";

        let signature = sign_request(TEST_RSA_PRIVATE_KEY, data);
        verify(data, &public_key, &signature).unwrap();
    }

    #[test]
    fn known_platform_signature_verifies() {
        // Reference vector produced by the campaign platform's signer.
        let signature_base64 = "VI6k2ILEFuB2ltAIYHrEeFjlxq4ZMHdoPTMLxFyHrg1ylnMpFJo2J/YStRKRdEh0Pv+beVWje0Nz+rZ6z3RzPFFwFkgEGK4XT3PGnpYnZXWvvCBHhQg0OmypNftzktUxcekbazWvF4BSTxoFlIDYBdAt5L69lUnwY7GZ9pOXGoU=";
        let data = "a=b&c=[\"1\",\"2\",\"3\"]&recvWindow=5000&timestamp=1499827319559";

        let public_key = load_rsa_public_key_from_base64(TEST_RSA_PUBLIC_KEY).unwrap();
        verify(data, &public_key, signature_base64).unwrap();
    }

    #[test]
    fn single_bit_flip_fails_cleanly() {
        let public_key = load_rsa_public_key_from_base64(TEST_RSA_PUBLIC_KEY).unwrap();
        let data = "recvWindow=5000&timestamp=1499827319559";
        let signature = sign_request(TEST_RSA_PRIVATE_KEY, data);

        let mut raw = base64::prelude::BASE64_STANDARD
            .decode(&signature)
            .unwrap();
        raw[0] ^= 0x01;
        let corrupted = base64::prelude::BASE64_STANDARD.encode(&raw);

        // mismatch, not a crash
        assert!(matches!(
            verify(data, &public_key, &corrupted),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn wrong_message_fails_cleanly() {
        let public_key = load_rsa_public_key_from_base64(TEST_RSA_PUBLIC_KEY).unwrap();
        let signature = sign_request(TEST_RSA_PRIVATE_KEY, "recvWindow=5000&timestamp=1");

        assert!(matches!(
            verify("recvWindow=5000&timestamp=2", &public_key, &signature),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn garbage_base64_signature_is_unexpected() {
        let public_key = load_rsa_public_key_from_base64(TEST_RSA_PUBLIC_KEY).unwrap();
        assert!(matches!(
            verify("a=b", &public_key, "!!! not base64 !!!"),
            Err(Error::Unexpected(_))
        ));
    }
}
