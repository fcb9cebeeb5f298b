/// Encrypted at-rest certificate store.
/// Layout: `root/certificates/{domain_id}/{cert,privkey,chain,fullchain}.pem.enc`
/// with daily snapshots under `root/backup/{YYYY-MM-DD}/{domain_id}/`.
/// Each file is independently AES-256-GCM encrypted with a fresh random
/// 96-bit nonce prepended to the ciphertext.
use super::TlsCertificate;
use super::tls::parse_private_key_pem;
use crate::error::{Error, Result};
use aws_lc_rs::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use chrono::Utc;
use rand::RngExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// File names within one domain directory
const FILES: [&str; 4] = ["cert", "privkey", "chain", "fullchain"];

/// The four PEM blobs stored per certificate
#[derive(Debug, Clone)]
pub struct CertificatePems {
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub chain: Vec<u8>,
    pub fullchain: Vec<u8>,
}

/// Encrypted certificate store rooted at a single directory
pub struct EncryptedCertStore {
    root: PathBuf,
    key: [u8; 32],
}

impl EncryptedCertStore {
    /// Construct with a 32-byte key. The root directory is created with
    /// owner-only access on first use.
    pub fn new(root: impl AsRef<Path>, key: [u8; 32]) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            key,
        }
    }

    fn domain_dir(&self, domain_id: Uuid) -> PathBuf {
        self.root.join("certificates").join(domain_id.to_string())
    }

    fn backup_dir(&self, date: &str, domain_id: Uuid) -> PathBuf {
        self.root
            .join("backup")
            .join(date)
            .join(domain_id.to_string())
    }

    fn file_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.pem.enc", name))
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| Error::crypto("Invalid encryption key"))?;
        let key = LessSafeKey::new(unbound);

        let mut nonce_bytes = [0u8; 12];
        rand::rng().fill(&mut nonce_bytes);
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| Error::crypto("Encrypt failed"))?;

        let mut out = nonce_bytes.to_vec();
        out.extend_from_slice(&in_out);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < 12 {
            return Err(Error::crypto("Ciphertext too short"));
        }
        let (nonce_bytes, data) = ciphertext.split_at(12);

        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| Error::crypto("Invalid encryption key"))?;
        let key = LessSafeKey::new(unbound);

        let nonce = Nonce::assume_unique_for_key(nonce_bytes.try_into().unwrap());
        let mut in_out = data.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| Error::crypto("Decrypt failed"))?;

        Ok(plaintext.to_vec())
    }

    async fn create_private_dir(path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| Error::storage(format!("Failed to create cert dir: {}", e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
                .await
                .map_err(|e| Error::storage(format!("Failed to set dir permissions: {}", e)))?;
        }
        Ok(())
    }

    async fn write_encrypted(&self, path: &Path, plaintext: &[u8]) -> Result<()> {
        let encrypted = self.encrypt(plaintext)?;
        fs::write(path, &encrypted)
            .await
            .map_err(|e| Error::storage(format!("Failed to write cert file: {}", e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| Error::storage(format!("Failed to set file permissions: {}", e)))?;
        }
        Ok(())
    }

    async fn read_encrypted(&self, path: &Path) -> Result<Vec<u8>> {
        let data = fs::read(path)
            .await
            .map_err(|e| Error::storage(format!("Failed to read cert file: {}", e)))?;
        self.decrypt(&data)
    }

    /// Store all four PEMs. Atomic from the caller's view: on any failure
    /// the partial directory is removed before the error returns.
    pub async fn store(
        &self,
        domain_id: Uuid,
        cert_pem: &[u8],
        key_pem: &[u8],
        chain_pem: &[u8],
    ) -> Result<String> {
        validate_certificate_pem(cert_pem)?;
        parse_private_key_pem(key_pem)?;
        if !chain_pem.is_empty() {
            validate_certificate_pem(chain_pem)?;
        }

        let mut fullchain = cert_pem.to_vec();
        if !chain_pem.is_empty() {
            if !fullchain.ends_with(b"\n") {
                fullchain.push(b'\n');
            }
            fullchain.extend_from_slice(chain_pem);
        }

        let dir = self.domain_dir(domain_id);
        Self::create_private_dir(&dir).await?;

        let result = async {
            self.write_encrypted(&Self::file_path(&dir, "cert"), cert_pem)
                .await?;
            self.write_encrypted(&Self::file_path(&dir, "privkey"), key_pem)
                .await?;
            self.write_encrypted(&Self::file_path(&dir, "chain"), chain_pem)
                .await?;
            self.write_encrypted(&Self::file_path(&dir, "fullchain"), &fullchain)
                .await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_dir_all(&dir).await;
            return Err(e);
        }

        Ok(dir.to_string_lossy().to_string())
    }

    /// Load and parse the serveable certificate (fullchain + key)
    pub async fn load(&self, domain_id: Uuid, domain_name: &str) -> Result<TlsCertificate> {
        let dir = self.domain_dir(domain_id);
        let fullchain = self.read_encrypted(&Self::file_path(&dir, "fullchain")).await?;
        let key = self.read_encrypted(&Self::file_path(&dir, "privkey")).await?;
        TlsCertificate::from_pem(domain_name, &fullchain, &key)
    }

    /// Load the raw PEM set (revocation needs the leaf DER)
    pub async fn load_pems(&self, domain_id: Uuid) -> Result<CertificatePems> {
        let dir = self.domain_dir(domain_id);
        Ok(CertificatePems {
            cert: self.read_encrypted(&Self::file_path(&dir, "cert")).await?,
            key: self.read_encrypted(&Self::file_path(&dir, "privkey")).await?,
            chain: self.read_encrypted(&Self::file_path(&dir, "chain")).await?,
            fullchain: self
                .read_encrypted(&Self::file_path(&dir, "fullchain"))
                .await?,
        })
    }

    /// Remove the domain directory; a missing directory is success
    pub async fn delete(&self, domain_id: Uuid) -> Result<()> {
        let dir = self.domain_dir(domain_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!("Failed to delete cert dir: {}", e))),
        }
    }

    /// Snapshot the four encrypted files into the dated backup tree
    pub async fn backup(&self, domain_id: Uuid) -> Result<String> {
        let date = Utc::now().format("%Y-%m-%d").to_string();
        let src = self.domain_dir(domain_id);
        let dst = self.backup_dir(&date, domain_id);
        Self::create_private_dir(&dst).await?;

        for name in FILES {
            let from = Self::file_path(&src, name);
            let to = Self::file_path(&dst, name);
            fs::copy(&from, &to)
                .await
                .map_err(|e| Error::storage(format!("Backup copy failed for {}: {}", name, e)))?;
        }
        Ok(date)
    }

    /// Restore the four files from a dated snapshot
    pub async fn restore_from_backup(&self, domain_id: Uuid, date: &str) -> Result<()> {
        let src = self.backup_dir(date, domain_id);
        let dst = self.domain_dir(domain_id);
        if !src.exists() {
            return Err(Error::not_found(format!(
                "backup {} for domain {}",
                date, domain_id
            )));
        }
        Self::create_private_dir(&dst).await?;

        for name in FILES {
            let from = Self::file_path(&src, name);
            let to = Self::file_path(&dst, name);
            fs::copy(&from, &to)
                .await
                .map_err(|e| Error::storage(format!("Restore copy failed for {}: {}", name, e)))?;
        }
        Ok(())
    }
}

/// Reject PEM input that does not contain at least one CERTIFICATE block
pub fn validate_certificate_pem(data: &[u8]) -> Result<()> {
    let blocks =
        pem::parse_many(data).map_err(|e| Error::pem(format!("Invalid PEM input: {}", e)))?;
    if !blocks.iter().any(|b| b.tag() == "CERTIFICATE") {
        return Err(Error::pem("No CERTIFICATE block in PEM input"));
    }
    Ok(())
}
