//! Artifact decryption
//!
//! Artifacts are produced by
//! `openssl enc -aes-256-cbc -salt -pbkdf2 -iter 100000`. That container is
//! the 8-byte magic `Salted__`, an 8-byte salt, then AES-256-CBC ciphertext
//! with PKCS#7 padding. Key and IV are the first 48 bytes of
//! PBKDF2-HMAC-SHA256(passphrase, salt).

use crate::error::{Error, Result};
use aes::Aes256;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use sha2::Sha256;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

type Aes256CbcDec = cbc::Decryptor<Aes256>;

const MAGIC: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;
const BLOCK: usize = 16;
const READ_BUF: usize = 64 * 1024;

/// PBKDF2 iteration count the artifacts are encrypted with
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Symmetric decryption of a downloaded artifact
pub trait Decryptor: Send + Sync {
    /// Decrypt `input` into `output` using `passphrase`
    fn decrypt(&self, input: &Path, output: &Path, passphrase: &str) -> Result<()>;
}

/// AES-256-CBC decryptor for the OpenSSL salted container
#[derive(Debug, Clone)]
pub struct AesCbcDecryptor {
    iterations: u32,
}

impl Default for AesCbcDecryptor {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }
}

impl AesCbcDecryptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }

    fn cipher(&self, passphrase: &str, salt: &[u8]) -> Result<Aes256CbcDec> {
        let mut key_iv = [0u8; KEY_LEN + IV_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, self.iterations, &mut key_iv);
        Aes256CbcDec::new_from_slices(&key_iv[..KEY_LEN], &key_iv[KEY_LEN..])
            .map_err(|e| Error::Decrypt(format!("invalid key material: {}", e)))
    }
}

impl Decryptor for AesCbcDecryptor {
    fn decrypt(&self, input: &Path, output: &Path, passphrase: &str) -> Result<()> {
        let mut reader = File::open(input)?;

        let mut header = [0u8; MAGIC.len() + SALT_LEN];
        reader
            .read_exact(&mut header)
            .map_err(|_| Error::Decrypt("error reading input file".to_string()))?;
        if &header[..MAGIC.len()] != MAGIC {
            return Err(Error::Decrypt("bad magic number".to_string()));
        }

        let mut cipher = self.cipher(passphrase, &header[MAGIC.len()..])?;
        let mut writer = BufWriter::new(File::create(output)?);

        // The final block is held back until EOF so its padding can be stripped
        let mut pending: Vec<u8> = Vec::with_capacity(READ_BUF + BLOCK);
        let mut buf = vec![0u8; READ_BUF];
        let mut written: u64 = 0;

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            pending.extend_from_slice(&buf[..n]);

            let ready = (pending.len().saturating_sub(1) / BLOCK) * BLOCK;
            if ready == 0 {
                continue;
            }
            for block in pending[..ready].chunks_exact_mut(BLOCK) {
                cipher.decrypt_block_mut(GenericArray::from_mut_slice(block));
            }
            writer.write_all(&pending[..ready])?;
            written += ready as u64;
            pending.drain(..ready);
        }

        if pending.len() != BLOCK {
            return Err(Error::Decrypt("wrong final block length".to_string()));
        }
        cipher.decrypt_block_mut(GenericArray::from_mut_slice(&mut pending));

        let pad = usize::from(pending[BLOCK - 1]);
        if pad == 0 || pad > BLOCK || pending[BLOCK - pad..].iter().any(|&b| usize::from(b) != pad) {
            return Err(Error::Decrypt("bad decrypt".to_string()));
        }
        writer.write_all(&pending[..BLOCK - pad])?;
        writer.flush()?;
        written += (BLOCK - pad) as u64;

        debug!("Decrypted {} plaintext bytes into {:?}", written, output);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cbc::cipher::block_padding::Pkcs7;
    use cbc::cipher::BlockEncryptMut;
    use tempfile::TempDir;

    type Aes256CbcEnc = cbc::Encryptor<Aes256>;

    pub(crate) const TEST_ITERATIONS: u32 = 1_000;

    /// Produce the salted OpenSSL container for `plaintext`
    pub(crate) fn encrypt(plaintext: &[u8], passphrase: &str, iterations: u32) -> Vec<u8> {
        let salt = [7u8; SALT_LEN];
        let mut key_iv = [0u8; KEY_LEN + IV_LEN];
        pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), &salt, iterations, &mut key_iv);
        let cipher = Aes256CbcEnc::new_from_slices(&key_iv[..KEY_LEN], &key_iv[KEY_LEN..]).unwrap();

        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&salt);
        out.extend(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext));
        out
    }

    fn roundtrip(plaintext: &[u8]) -> Vec<u8> {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.enc");
        let output = tmp.path().join("a");
        std::fs::write(&input, encrypt(plaintext, "s3cret", TEST_ITERATIONS)).unwrap();

        AesCbcDecryptor::with_iterations(TEST_ITERATIONS)
            .decrypt(&input, &output, "s3cret")
            .unwrap();
        std::fs::read(&output).unwrap()
    }

    #[test]
    fn test_decrypts_across_buffer_boundaries() {
        // Sizes around the block and read-buffer edges
        for len in [0, 1, 15, 16, 17, READ_BUF - 1, READ_BUF, READ_BUF + 1, 3 * READ_BUF + 5] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            assert_eq!(roundtrip(&plaintext), plaintext, "length {len}");
        }
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.enc");
        std::fs::write(&input, encrypt(b"index bytes", "right", TEST_ITERATIONS)).unwrap();

        let output = tmp.path().join("a");
        // A wrong key usually trips the padding check; when the garbage
        // happens to look padded, the plaintext must still differ
        match AesCbcDecryptor::with_iterations(TEST_ITERATIONS).decrypt(&input, &output, "wrong") {
            Err(err) => assert!(matches!(err, Error::Decrypt(_))),
            Ok(()) => assert_ne!(std::fs::read(&output).unwrap(), b"index bytes"),
        }
    }

    #[test]
    fn test_rejects_unsalted_input() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.enc");
        std::fs::write(&input, b"plain tarball, not encrypted at all").unwrap();

        let err = AesCbcDecryptor::new()
            .decrypt(&input, &tmp.path().join("a"), "key")
            .expect_err("no magic");
        assert!(matches!(err, Error::Decrypt(msg) if msg == "bad magic number"));
    }

    #[test]
    fn test_rejects_truncated_ciphertext() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.enc");
        let mut data = encrypt(&[1u8; 40], "key", TEST_ITERATIONS);
        data.truncate(data.len() - 3);
        std::fs::write(&input, data).unwrap();

        let err = AesCbcDecryptor::with_iterations(TEST_ITERATIONS)
            .decrypt(&input, &tmp.path().join("a"), "key")
            .expect_err("truncated");
        assert!(matches!(err, Error::Decrypt(_)));
    }

    #[test]
    fn test_default_iteration_count() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("a.enc");
        let output = tmp.path().join("a");
        std::fs::write(&input, encrypt(b"rag-index", "key", PBKDF2_ITERATIONS)).unwrap();

        AesCbcDecryptor::new().decrypt(&input, &output, "key").unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"rag-index");
    }
}
