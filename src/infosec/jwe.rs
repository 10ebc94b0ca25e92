//! # JSON Web Encryption (JWE)
//!
//! JWE ([RFC7516]) specifies how encrypted content can be represented using JSON.
//! See JWA ([RFC7518]) for more on the cyptographic algorithms and identifiers
//! used.
//!
//! Supported: `ECDH-ES` direct key agreement over P-256 using Concat KDF
//! (SHA-256), with `A128GCM` or `A256GCM` content encryption. The JWE
//! Encrypted Key is therefore always empty.
//!
//! [RFC7516]: https://www.rfc-editor.org/rfc/rfc7516
//! [RFC7518]: https://www.rfc-editor.org/rfc/rfc7518

use std::fmt::{self, Display};
use std::str::FromStr;

use aes_gcm::aead::KeyInit;
use aes_gcm::{AeadInPlace, Aes128Gcm, Aes256Gcm, Nonce, Tag};
use anyhow::{anyhow, bail};
use base64ct::{Base64UrlUnpadded as Base64, Encoding};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::infosec::jwk::PublicKeyJwk;
use crate::infosec::{Decryptor, KeyPair};

/// Encrypt the serialized `plaintext` to `recipient_key`, returning a compact
/// JWE.
///
/// # Errors
///
/// Returns an error if the recipient key is not a P-256 key or the plaintext
/// cannot be serialized.
pub fn encrypt<T: Serialize>(
    plaintext: &T, recipient_key: &PublicKeyJwk, enc: EncryptionAlgorithm,
) -> anyhow::Result<String> {
    // ephemeral-static key agreement derives the CEK directly
    let ephemeral = KeyPair::generate(crate::infosec::Curve::P256);
    let z = ephemeral.diffie_hellman(recipient_key)?;

    let mut epk = ephemeral.public_jwk();
    epk.kid = None;

    let header = Header {
        alg: KeyAlgorithm::EcdhEs,
        enc,
        epk,
        kid: recipient_key.kid.clone(),
        typ: Some("JWT".into()),
        ..Header::default()
    };
    let cek = concat_kdf(&z, &header)?;

    let mut iv = [0u8; 12];
    OsRng.fill_bytes(&mut iv);

    // AAD is the encoded protected header
    let encoded_header = header.to_string();
    let mut buffer = serde_json::to_vec(plaintext)?;
    let nonce = Nonce::from_slice(&iv);
    let tag = match header.enc {
        EncryptionAlgorithm::A128Gcm => Aes128Gcm::new_from_slice(&cek)
            .map_err(|e| anyhow!("invalid key: {e}"))?
            .encrypt_in_place_detached(nonce, encoded_header.as_bytes(), &mut buffer),
        EncryptionAlgorithm::A256Gcm => Aes256Gcm::new_from_slice(&cek)
            .map_err(|e| anyhow!("invalid key: {e}"))?
            .encrypt_in_place_detached(nonce, encoded_header.as_bytes(), &mut buffer),
    }
    .map_err(|e| anyhow!("issue encrypting: {e}"))?;

    let jwe = Jwe {
        protected: header,
        encoded_header,
        encrypted_key: String::new(),
        iv: Base64::encode_string(&iv),
        ciphertext: Base64::encode_string(&buffer),
        tag: Base64::encode_string(&tag),
    };

    Ok(jwe.to_string())
}

/// Decrypt the compact JWE and deserialize the plaintext.
///
/// # Errors
///
/// Returns an error if the JWE is malformed, addressed to a different key, or
/// fails authentication.
pub async fn decrypt<T: DeserializeOwned>(
    compact_jwe: &str, decryptor: &impl Decryptor,
) -> anyhow::Result<T> {
    let jwe = Jwe::from_str(compact_jwe)?;
    let header = &jwe.protected;

    if let (Some(kid), Some(own)) = (&header.kid, &decryptor.public_key().kid) {
        if kid != own {
            bail!("JWE is addressed to key '{kid}'");
        }
    }
    if header.zip.is_some() {
        bail!("compressed JWE payloads are not supported");
    }
    if !jwe.encrypted_key.is_empty() {
        bail!("`ECDH-ES` requires an empty encrypted key");
    }

    let iv = Base64::decode_vec(&jwe.iv).map_err(|e| anyhow!("issue decoding `iv`: {e}"))?;
    let ciphertext = Base64::decode_vec(&jwe.ciphertext)
        .map_err(|e| anyhow!("issue decoding `ciphertext`: {e}"))?;
    let tag = Base64::decode_vec(&jwe.tag).map_err(|e| anyhow!("issue decoding `tag`: {e}"))?;
    if iv.len() != 12 || tag.len() != 16 {
        bail!("invalid `iv` or `tag` length");
    }

    let z = decryptor.shared_secret(&header.epk).await?;
    let cek = concat_kdf(&z, header)?;

    let aad = jwe.encoded_header.as_bytes();
    let mut buffer = ciphertext;
    let nonce = Nonce::from_slice(&iv);
    let tag = Tag::from_slice(&tag);

    match header.enc {
        EncryptionAlgorithm::A128Gcm => Aes128Gcm::new_from_slice(&cek)
            .map_err(|e| anyhow!("invalid key: {e}"))?
            .decrypt_in_place_detached(nonce, aad, &mut buffer, tag),
        EncryptionAlgorithm::A256Gcm => Aes256Gcm::new_from_slice(&cek)
            .map_err(|e| anyhow!("invalid key: {e}"))?
            .decrypt_in_place_detached(nonce, aad, &mut buffer, tag),
    }
    .map_err(|e| anyhow!("issue decrypting: {e}"))?;

    Ok(serde_json::from_slice(&buffer)?)
}

// Concat KDF (NIST SP 800-56A 5.8.1) as profiled by RFC 7518 4.6.2.
fn concat_kdf(z: &[u8], header: &Header) -> anyhow::Result<Vec<u8>> {
    let apu = header.apu.as_deref().map(Base64::decode_vec).transpose()?.unwrap_or_default();
    let apv = header.apv.as_deref().map(Base64::decode_vec).transpose()?.unwrap_or_default();
    let key_len = header.enc.key_len();

    let mut hasher = Sha256::new();
    hasher.update(1u32.to_be_bytes());
    hasher.update(z);
    hasher.update(length_prefixed(header.enc.to_string().as_bytes())?);
    hasher.update(length_prefixed(&apu)?);
    hasher.update(length_prefixed(&apv)?);
    hasher.update(u32::try_from(key_len * 8)?.to_be_bytes());

    Ok(hasher.finalize()[..key_len].to_vec())
}

fn length_prefixed(data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut out = u32::try_from(data.len())?.to_be_bytes().to_vec();
    out.extend_from_slice(data);
    Ok(out)
}

/// A JWE in compact serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Jwe {
    /// JWE protected header.
    pub protected: Header,

    /// The protected header as it appears in the compact serialization. Used
    /// as the AAD, so must not be re-serialized from `protected`.
    pub encoded_header: String,

    /// Encrypted key, as a base64Url encoded string.
    pub encrypted_key: String,

    /// Initialization vector (nonce), as a base64Url encoded string.
    pub iv: String,

    /// Ciphertext, as a base64Url encoded string.
    pub ciphertext: String,

    /// Authentication tag resulting from the encryption, as a base64Url encoded string.
    pub tag: String,
}

/// Compact Serialization
///     base64(JWE Protected Header) + '.'
///     + base64(JWE Encrypted Key) + '.'
///     + base64(JWE Initialization Vector) + '.'
///     + base64(JWE Ciphertext) + '.'
///     + base64(JWE Authentication Tag)
impl Display for Jwe {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let protected = &self.encoded_header;
        let encrypted_key = &self.encrypted_key;
        let iv = &self.iv;
        let ciphertext = &self.ciphertext;
        let tag = &self.tag;

        write!(f, "{protected}.{encrypted_key}.{iv}.{ciphertext}.{tag}")
    }
}

impl FromStr for Jwe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 5 {
            return Err(anyhow!("invalid JWE"));
        }

        Ok(Self {
            protected: Header::from_str(parts[0])?,
            encoded_header: parts[0].to_string(),
            encrypted_key: parts[1].to_string(),
            iv: parts[2].to_string(),
            ciphertext: parts[3].to_string(),
            tag: parts[4].to_string(),
        })
    }
}

/// Represents the JWE header.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Header {
    /// Identifies the algorithm used to determine the content encryption key.
    pub alg: KeyAlgorithm,

    /// The algorithm used to perform authenticated encryption on the plaintext
    /// to produce the ciphertext and the Authentication Tag.
    pub enc: EncryptionAlgorithm,

    /// The ephemeral public key created by the originator for use in key agreement
    /// algorithms.
    pub epk: PublicKeyJwk,

    /// Identifies the recipient key the JWE was encrypted to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Media type of the complete JWE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    /// Key agreement `PartyUInfo` value, base64url encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apu: Option<String>,

    /// Key agreement `PartyVInfo` value, base64url encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apv: Option<String>,

    /// Compression applied to the plaintext before encryption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

/// Serialize Header to base64 encoded string
impl Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = serde_json::to_vec(&self).map_err(|_| fmt::Error)?;
        write!(f, "{}", Base64::encode_string(&bytes))
    }
}

impl FromStr for Header {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = Base64::decode_vec(s).map_err(|e| anyhow!("issue decoding header: {e}"))?;
        serde_json::from_slice(&bytes).map_err(|e| anyhow!("issue deserializing header: {e}"))
    }
}

/// The algorithm used to determine the content encryption key.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// Elliptic Curve Diffie-Hellman Ephemeral-Static key agreement
    /// (using Concat KDF).
    #[default]
    #[serde(rename = "ECDH-ES")]
    EcdhEs,
}

/// The algorithm used to perform authenticated encryption on the plaintext to
/// produce the ciphertext and the Authentication Tag. MUST be an AEAD algorithm.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    /// AES in Galois/Counter Mode (GCM) using a 128-bit key.
    #[default]
    #[serde(rename = "A128GCM")]
    A128Gcm,

    /// AES in Galois/Counter Mode (GCM) using a 256-bit key.
    #[serde(rename = "A256GCM")]
    A256Gcm,
}

impl EncryptionAlgorithm {
    const fn key_len(self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A256Gcm => 32,
        }
    }
}

impl Display for EncryptionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A128Gcm => write!(f, "A128GCM"),
            Self::A256Gcm => write!(f, "A256GCM"),
        }
    }
}
