//! A loopback HTTP/1.1 origin server good enough to drive the client's
//! HEAD/ranged-GET path, plus a synthetic signed DWL package builder.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rsa::pss::SigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use zerocopy::AsBytes;

use dwl_core::crypto::Crc32;
use dwl_core::wire::{Prolog, UpdateType, HEADER_SIZE};

/// A keypair plus a fully-assembled package signed with the private half.
pub struct SignedPackage {
    pub bytes: Vec<u8>,
    pub binary: Vec<u8>,
    pub public_key_der: Vec<u8>,
}

/// Builds a well-formed DWL envelope around `binary`, RSA-PSS/SHA-1 signed
/// with a freshly generated key. Mirrors the covered-region layout the
/// parser expects: PROLOG..PADDING feeds CRC-32 and SHA-1, SIGNATURE does
/// not.
pub fn build_signed_package(binary: &[u8]) -> SignedPackage {
    let comment = b"integration-test";
    let padding = b"pad-pad-";

    let mut rng = rand::rngs::OsRng;
    let private_key = RsaPrivateKey::new(&mut rng, 1024).expect("rsa keygen");
    let public_key = RsaPublicKey::from(&private_key);

    let header = [0u8; HEADER_SIZE];
    let mut crc = Crc32::new();
    let prolog = Prolog::new(
        0,
        comment.len() as u32,
        binary.len() as u32,
        padding.len() as u32,
        (private_key.size()) as u32,
        UpdateType::Firmware,
    );
    let mut prolog_bytes = prolog.as_bytes().to_vec();
    crc.update(&prolog_bytes);
    crc.update(&header);
    crc.update(comment);
    crc.update(binary);
    crc.update(padding);
    let final_crc = crc.checksum();
    prolog_bytes[8..12].copy_from_slice(&final_crc.to_le_bytes());

    let mut covered = Vec::new();
    covered.extend_from_slice(&prolog_bytes);
    covered.extend_from_slice(&header);
    covered.extend_from_slice(comment);
    covered.extend_from_slice(binary);
    covered.extend_from_slice(padding);

    let signing_key = SigningKey::<Sha1>::new(private_key);
    let signature = signing_key.sign_with_rng(&mut rng, &covered);
    let signature_bytes = signature.to_vec();

    let mut full = covered;
    full.extend_from_slice(&signature_bytes);

    SignedPackage {
        bytes: full,
        binary: binary.to_vec(),
        public_key_der: rsa::pkcs8::EncodePublicKey::to_public_key_der(&public_key)
            .expect("encode public key")
            .as_bytes()
            .to_vec(),
    }
}

/// Minimal single-threaded-per-connection HTTP origin: answers `HEAD` with
/// `Content-Length`, and `GET` with either a 206 ranged response or (when
/// `honour_range` is false) a plain 200 carrying the whole body regardless
/// of the `Range` header, to exercise the realign path. When `stall_after`
/// is `Some(n)`, the body for a fresh (offset-0) GET is split into two
/// writes with a pause between them so a test can set the suspend/abort
/// flag mid-transfer.
pub struct MockOrigin {
    pub port: u16,
}

impl MockOrigin {
    pub fn spawn(package: Vec<u8>, honour_range: bool, stall_after: Option<usize>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock origin");
        let port = listener.local_addr().unwrap().port();
        let package = Arc::new(package);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                let package = package.clone();
                thread::spawn(move || handle_conn(stream, &package, honour_range, stall_after));
            }
        });

        // Give the listener a moment to start accepting.
        thread::sleep(Duration::from_millis(20));
        Self { port }
    }
}

fn handle_conn(mut stream: TcpStream, package: &[u8], honour_range: bool, stall_after: Option<usize>) {
    let mut buf = Vec::new();
    let mut scratch = [0u8; 4096];
    loop {
        let n = stream.read(&mut scratch).unwrap_or(0);
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&scratch[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    let request = String::from_utf8_lossy(&buf);
    let mut lines = request.lines();
    let request_line = lines.next().unwrap_or("");
    let method = request_line.split_whitespace().next().unwrap_or("");

    let mut offset: Option<u64> = None;
    for line in lines {
        if let Some(rest) = line
            .strip_prefix("Range: bytes=")
            .or_else(|| line.strip_prefix("range: bytes="))
        {
            offset = rest.split_once('-').and_then(|(s, _)| s.parse().ok());
        }
    }

    if method == "HEAD" {
        let resp = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", package.len());
        let _ = stream.write_all(resp.as_bytes());
        return;
    }

    if method != "GET" {
        let _ = stream.write_all(b"HTTP/1.1 501 Not Implemented\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let effective_offset = if honour_range { offset.unwrap_or(0) } else { 0 };
    let body = &package[effective_offset as usize..];

    if honour_range && offset.is_some() {
        let header = format!(
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes {}-{}/{}\r\nContent-Length: {}\r\n\r\n",
            effective_offset,
            package.len().saturating_sub(1),
            package.len(),
            body.len()
        );
        let _ = stream.write_all(header.as_bytes());
    } else {
        let header = format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n", body.len());
        let _ = stream.write_all(header.as_bytes());
    }

    match stall_after.filter(|_| offset.unwrap_or(0) == 0) {
        Some(split) if split < body.len() => {
            let _ = stream.write_all(&body[..split]);
            let _ = stream.flush();
            thread::sleep(Duration::from_millis(150));
            let _ = stream.write_all(&body[split..]);
        }
        _ => {
            let _ = stream.write_all(body);
        }
    }
}
