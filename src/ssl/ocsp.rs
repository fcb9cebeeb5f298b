/// Online Certificate Status Protocol (OCSP) checking.
/// Builds the DER request from the leaf and issuer certificates, POSTs it
/// to each responder from the leaf's AIA extension, and reads the status
/// out of the DER response. Only the request/response shapes OCSP actually
/// produces are encoded and decoded here.
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sha1::{Digest, Sha1};
use std::time::Duration;
use x509_parser::prelude::*;

/// Per-request deadline for responder calls
const OCSP_TIMEOUT: Duration = Duration::from_secs(10);

/// id-ad-ocsp access method OID
const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";

/// Revocation status as reported by a responder
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum OcspStatus {
    /// The certificate is valid and not revoked
    Good,
    /// The certificate has been revoked
    Revoked {
        revoked_at: Option<DateTime<Utc>>,
        reason_code: Option<u8>,
    },
    /// The responder does not know the status of the certificate
    Unknown,
}

/// OCSP client
pub struct OcspVerifier {
    client: reqwest::Client,
}

impl OcspVerifier {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(OCSP_TIMEOUT)
            .user_agent(concat!("mailcrypt/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::transport(format!("Failed to build OCSP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Responder URLs from the leaf's Authority Information Access extension
    pub fn responder_urls(leaf_der: &[u8]) -> Result<Vec<String>> {
        let (_, x509) = parse_x509_certificate(leaf_der)
            .map_err(|e| Error::crypto(format!("Parse cert failed: {}", e)))?;

        let mut urls = Vec::new();
        for ext in x509.extensions() {
            if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
                for desc in &aia.accessdescs {
                    if desc.access_method.to_string() == OID_AD_OCSP {
                        if let GeneralName::URI(uri) = desc.access_location {
                            urls.push(uri.to_string());
                        }
                    }
                }
            }
        }
        Ok(urls)
    }

    /// Check the leaf against its AIA responders
    pub async fn check(&self, leaf_der: &[u8], issuer_der: &[u8]) -> Result<OcspStatus> {
        let urls = Self::responder_urls(leaf_der)?;
        if urls.is_empty() {
            return Err(Error::crypto(
                "No OCSP responder URL found in certificate extensions",
            ));
        }
        self.check_with_responders(&urls, leaf_der, issuer_der).await
    }

    /// Check against an explicit responder list; tries each URL until one
    /// returns HTTP 200 with a parseable response
    pub async fn check_with_responders(
        &self,
        urls: &[String],
        leaf_der: &[u8],
        issuer_der: &[u8],
    ) -> Result<OcspStatus> {
        let request = build_request(leaf_der, issuer_der)?;

        let mut last_error = Error::transport("No OCSP responders tried");
        for url in urls {
            tracing::debug!(url = %url, "Querying OCSP responder");
            let response = self
                .client
                .post(url)
                .header("Content-Type", "application/ocsp-request")
                .body(request.clone())
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().as_u16() == 200 => {
                    let body = resp
                        .bytes()
                        .await
                        .map_err(|e| Error::transport(format!("OCSP body read failed: {}", e)))?;
                    match parse_response(&body) {
                        Ok(status) => return Ok(status),
                        Err(e) => {
                            tracing::warn!(url = %url, error = %e, "Unparseable OCSP response");
                            last_error = e;
                        }
                    }
                }
                Ok(resp) => {
                    last_error = Error::transport(format!(
                        "OCSP responder {} returned HTTP {}",
                        url,
                        resp.status()
                    ));
                }
                Err(e) => {
                    last_error = Error::transport(format!("OCSP POST to {} failed: {}", url, e));
                }
            }
        }
        Err(last_error)
    }
}

// --- DER encoding -----------------------------------------------------------

fn der_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else {
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .into_iter()
            .skip_while(|b| *b == 0)
            .collect();
        let mut out = vec![0x80 | bytes.len() as u8];
        out.extend(bytes);
        out
    }
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(der_len(content.len()));
    out.extend_from_slice(content);
    out
}

fn der_sequence(parts: &[Vec<u8>]) -> Vec<u8> {
    der_tlv(0x30, &parts.concat())
}

/// Build the DER-encoded OCSPRequest for one certificate.
/// CertID uses SHA-1 hashes of the issuer name and key per RFC 6960.
pub fn build_request(leaf_der: &[u8], issuer_der: &[u8]) -> Result<Vec<u8>> {
    let (_, leaf) = parse_x509_certificate(leaf_der)
        .map_err(|e| Error::crypto(format!("Parse leaf failed: {}", e)))?;
    let (_, issuer) = parse_x509_certificate(issuer_der)
        .map_err(|e| Error::crypto(format!("Parse issuer failed: {}", e)))?;

    let name_hash = Sha1::digest(issuer.subject().as_raw());
    let key_hash = Sha1::digest(&issuer.public_key().subject_public_key.data);

    // AlgorithmIdentifier: { sha1 (1.3.14.3.2.26), NULL }
    let alg_id = der_sequence(&[
        vec![0x06, 0x05, 0x2b, 0x0e, 0x03, 0x02, 0x1a],
        vec![0x05, 0x00],
    ]);

    let cert_id = der_sequence(&[
        alg_id,
        der_tlv(0x04, &name_hash),
        der_tlv(0x04, &key_hash),
        der_tlv(0x02, leaf.raw_serial()),
    ]);

    let single_request = der_sequence(&[cert_id]);
    let request_list = der_sequence(&[single_request]);
    let tbs_request = der_sequence(&[request_list]);
    Ok(der_sequence(&[tbs_request]))
}

// --- DER decoding -----------------------------------------------------------

struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> bool {
        self.pos < self.data.len()
    }

    fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn read_tlv(&mut self) -> Result<(u8, &'a [u8])> {
        let err = || Error::crypto("Truncated DER structure");
        let tag = *self.data.get(self.pos).ok_or_else(err)?;
        self.pos += 1;

        let first = *self.data.get(self.pos).ok_or_else(err)?;
        self.pos += 1;
        let len = if first < 0x80 {
            first as usize
        } else {
            let count = (first & 0x7f) as usize;
            if count == 0 || count > 4 {
                return Err(Error::crypto("Unsupported DER length encoding"));
            }
            let mut len = 0usize;
            for _ in 0..count {
                let byte = *self.data.get(self.pos).ok_or_else(err)?;
                self.pos += 1;
                len = (len << 8) | byte as usize;
            }
            len
        };

        let end = self.pos.checked_add(len).ok_or_else(err)?;
        if end > self.data.len() {
            return Err(err());
        }
        let content = &self.data[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8]> {
        let (tag, content) = self.read_tlv()?;
        if tag != expected {
            return Err(Error::crypto(format!(
                "Unexpected DER tag {:#04x}, wanted {:#04x}",
                tag, expected
            )));
        }
        Ok(content)
    }
}

fn parse_generalized_time(content: &[u8]) -> Option<DateTime<Utc>> {
    let s = std::str::from_utf8(content).ok()?;
    let naive = NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%SZ").ok()?;
    Some(naive.and_utc())
}

/// Parse an OCSPResponse down to the first SingleResponse's certStatus
pub fn parse_response(der: &[u8]) -> Result<OcspStatus> {
    let mut outer = DerReader::new(der);
    let mut response = DerReader::new(outer.expect(0x30)?);

    // responseStatus ENUMERATED
    let status = response.expect(0x0a)?;
    if status != [0u8] {
        return Err(Error::crypto(format!(
            "OCSP responder refused the request (status {:?})",
            status.first()
        )));
    }

    // responseBytes [0] EXPLICIT { SEQUENCE { responseType OID, response OCTET STRING } }
    let mut response_bytes = DerReader::new(response.expect(0xa0)?);
    let mut inner = DerReader::new(response_bytes.expect(0x30)?);
    let _response_type_oid = inner.expect(0x06)?;
    let basic_der = inner.expect(0x04)?;

    // BasicOCSPResponse ::= SEQUENCE { tbsResponseData, sigAlg, signature, certs? }
    let mut basic = DerReader::new(DerReader::new(basic_der).expect(0x30)?);
    let mut tbs = DerReader::new(basic.expect(0x30)?);

    // version [0] EXPLICIT, optional
    if tbs.peek_tag() == Some(0xa0) {
        tbs.read_tlv()?;
    }
    // responderID CHOICE: byName [1] or byKey [2]
    match tbs.peek_tag() {
        Some(0xa1) | Some(0xa2) => {
            tbs.read_tlv()?;
        }
        _ => return Err(Error::crypto("Missing OCSP responder ID")),
    }
    // producedAt GeneralizedTime
    tbs.expect(0x18)?;

    // responses SEQUENCE OF SingleResponse; we sent one CertID
    let mut responses = DerReader::new(tbs.expect(0x30)?);
    let mut single = DerReader::new(responses.expect(0x30)?);

    // certID
    single.expect(0x30)?;

    // certStatus CHOICE
    let (tag, content) = single.read_tlv()?;
    match tag {
        0x80 => Ok(OcspStatus::Good),
        0xa1 => {
            let mut revoked = DerReader::new(content);
            let revoked_at = parse_generalized_time(revoked.expect(0x18)?);
            let reason_code = if revoked.remaining() {
                // revocationReason [0] EXPLICIT ENUMERATED
                let reason = DerReader::new(revoked.expect(0xa0)?).expect(0x0a)?;
                reason.first().copied()
            } else {
                None
            };
            Ok(OcspStatus::Revoked {
                revoked_at,
                reason_code,
            })
        }
        0x82 => Ok(OcspStatus::Unknown),
        other => Err(Error::crypto(format!(
            "Unknown OCSP certStatus tag {:#04x}",
            other
        ))),
    }
}
