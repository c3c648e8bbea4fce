// src/core/ssh_keys.rs

//! Generates or loads the RSA keypair the control plane injects into
//! every container it provisions and authenticates with over SSH: a
//! 1024-bit RSA key, PKCS#1 PEM on disk, OpenSSH `authorized_keys`
//! format for the public half.

use crate::core::errors::KothError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use pkcs1::EncodeRsaPrivateKey;
use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use std::path::Path;
use tracing::info;

const KEY_BITS: usize = 1024;

/// The control plane's loaded SSH identity, held in memory for the
/// lifetime of the process.
#[derive(Clone)]
pub struct SshKeys {
    pub public_key_openssh: String,
    pub private_key_path: String,
}

impl SshKeys {
    /// Generates the keypair if the private key file is absent, then
    /// reads both halves back from disk.
    pub fn load_or_generate(public_key_path: &str, private_key_path: &str) -> Result<Self, KothError> {
        if let Some(parent) = Path::new(private_key_path).parent() {
            std::fs::create_dir_all(parent)?;
        }

        if !Path::new(private_key_path).exists() {
            info!("no SSH keypair found at {private_key_path}, generating a fresh 1024-bit RSA key");
            generate_pair(public_key_path, private_key_path)?;
        }

        let public_key_openssh = std::fs::read_to_string(public_key_path)?;

        Ok(Self {
            public_key_openssh: public_key_openssh.trim().to_string(),
            private_key_path: private_key_path.to_string(),
        })
    }
}

fn generate_pair(public_key_path: &str, private_key_path: &str) -> Result<(), KothError> {
    let mut rng = OsRng;
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS)
        .map_err(|e| KothError::Internal(format!("RSA key generation failed: {e}")))?;

    let pem = private
        .to_pkcs1_pem(pkcs1::LineEnding::LF)
        .map_err(|e| KothError::Internal(format!("PKCS1 PEM encoding failed: {e}")))?;
    std::fs::write(private_key_path, pem.as_bytes())?;
    set_permissions_owner_only(private_key_path)?;

    let public = private.to_public_key();
    let authorized_keys_line = encode_openssh_public_key(&public)?;
    std::fs::write(public_key_path, format!("{authorized_keys_line}\n"))?;

    Ok(())
}

#[cfg(unix)]
fn set_permissions_owner_only(path: &str) -> Result<(), KothError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions_owner_only(_path: &str) -> Result<(), KothError> {
    Ok(())
}

/// Hand-rolls the OpenSSH `authorized_keys` wire format for an RSA
/// public key: `ssh-rsa <base64(ssh-rsa-blob)>`. The blob is a sequence
/// of length-prefixed fields: the key type string, the public exponent,
/// and the modulus.
fn encode_openssh_public_key(public: &rsa::RsaPublicKey) -> Result<String, KothError> {
    use rsa::traits::PublicKeyParts;

    let mut blob = Vec::new();
    write_ssh_string(&mut blob, b"ssh-rsa");
    write_ssh_mpint(&mut blob, &public.e().to_bytes_be());
    write_ssh_mpint(&mut blob, &public.n().to_bytes_be());

    Ok(format!("ssh-rsa {}", BASE64.encode(&blob)))
}

fn write_ssh_string(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
}

/// SSH mpints are length-prefixed big-endian integers with a leading
/// zero byte prepended whenever the high bit of the first byte is set,
/// so the value is never misread as negative.
fn write_ssh_mpint(buf: &mut Vec<u8>, bytes: &[u8]) {
    if !bytes.is_empty() && bytes[0] & 0x80 != 0 {
        let mut padded = Vec::with_capacity(bytes.len() + 1);
        padded.push(0);
        padded.extend_from_slice(bytes);
        write_ssh_string(buf, &padded);
    } else {
        write_ssh_string(buf, bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_then_load_round_trips_public_key() {
        let dir = tempfile::tempdir().unwrap();
        let pub_path = dir.path().join("id_rsa.pub");
        let priv_path = dir.path().join("id_rsa");

        let keys = SshKeys::load_or_generate(
            pub_path.to_str().unwrap(),
            priv_path.to_str().unwrap(),
        )
        .unwrap();

        assert!(keys.public_key_openssh.starts_with("ssh-rsa "));
        assert!(priv_path.exists());

        // loading again must not regenerate (the private key file already exists)
        let first_private = std::fs::read_to_string(&priv_path).unwrap();
        let keys2 = SshKeys::load_or_generate(
            pub_path.to_str().unwrap(),
            priv_path.to_str().unwrap(),
        )
        .unwrap();
        assert_eq!(keys.public_key_openssh, keys2.public_key_openssh);
        assert_eq!(first_private, std::fs::read_to_string(&priv_path).unwrap());
    }

    #[test]
    fn mpint_prepends_zero_when_high_bit_set() {
        let mut buf = Vec::new();
        write_ssh_mpint(&mut buf, &[0x80, 0x01]);
        // length(4) + 1 padding byte + 2 original bytes = 7
        assert_eq!(u32::from_be_bytes(buf[0..4].try_into().unwrap()), 3);
        assert_eq!(buf[4], 0);
    }
}
