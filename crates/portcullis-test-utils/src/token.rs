//! JWT builders for tests.

use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rcgen::{generate_simple_self_signed, CertifiedKey};

/// Sign an HS256 token with no `kid` header.
pub fn hs256_token(secret: &str, claims: &serde_json::Value) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to sign HS256 token")
}

/// Sign an HS256 token carrying a `kid` header.
pub fn hs256_token_with_kid(secret: &str, kid: &str, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to sign HS256 token")
}

/// An ECDSA P-256 keypair with a self-signed certificate, for testing
/// the JWKS/x5c verification path end to end.
pub struct Es256KeyPair {
    pub kid: String,
    cert_der: Vec<u8>,
    signing_pem: String,
}

impl Es256KeyPair {
    /// Generate a fresh keypair and certificate.
    pub fn generate(kid: &str) -> Self {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["portcullis.test".to_string()])
                .expect("failed to generate test certificate");

        Self {
            kid: kid.to_string(),
            cert_der: cert.der().to_vec(),
            signing_pem: key_pair.serialize_pem(),
        }
    }

    /// Sign an ES256 token whose `kid` header selects this key.
    pub fn sign_token(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.kid.clone());
        self.sign_with_header(header, claims)
    }

    /// Sign an ES256 token with no `kid` header at all.
    pub fn sign_token_without_kid(&self, claims: &serde_json::Value) -> String {
        self.sign_with_header(Header::new(Algorithm::ES256), claims)
    }

    fn sign_with_header(&self, header: Header, claims: &serde_json::Value) -> String {
        let key = EncodingKey::from_ec_pem(self.signing_pem.as_bytes())
            .expect("generated key should parse");
        encode(&header, claims, &key).expect("failed to sign ES256 token")
    }

    /// The JWK for this key as an identity provider would serve it.
    pub fn jwk(&self) -> serde_json::Value {
        serde_json::json!({
            "kty": "EC",
            "kid": self.kid,
            "use": "sig",
            "alg": "ES256",
            "x5c": [STANDARD.encode(&self.cert_der)]
        })
    }

    /// A complete JWKS document containing only this key.
    pub fn jwks_document(&self) -> serde_json::Value {
        serde_json::json!({ "keys": [self.jwk()] })
    }

    /// A JWKS document with this key's certificate chain emptied out.
    pub fn jwks_document_without_certs(&self) -> serde_json::Value {
        serde_json::json!({
            "keys": [{
                "kty": "EC",
                "kid": self.kid,
                "use": "sig",
                "alg": "ES256",
                "x5c": []
            }]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hs256_token_has_three_segments() {
        let token = hs256_token("secret", &serde_json::json!({"sub": "k1"}));
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_hs256_kid_lands_in_header() {
        let token = hs256_token_with_kid("secret", "K1", &serde_json::json!({}));
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("K1"));
        assert_eq!(header.alg, Algorithm::HS256);
    }

    #[test]
    fn test_es256_token_and_jwks() {
        let key = Es256KeyPair::generate("K1");
        let token = key.sign_token(&serde_json::json!({"email": "a@x"}));

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::ES256);
        assert_eq!(header.kid.as_deref(), Some("K1"));

        let doc = key.jwks_document();
        assert_eq!(doc["keys"][0]["kty"], "EC");
        assert_eq!(doc["keys"][0]["kid"], "K1");
        assert!(!doc["keys"][0]["x5c"][0].as_str().unwrap().is_empty());
    }
}
