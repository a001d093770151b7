//! Payload resolution. A payload spec turns into bytes either once at
//! sequence setup (the static fast path) or once per send, written into
//! the lane's scratch buffer.

use crate::config::PayloadSpec;
use crate::error::{Error, Result};

use rand::Rng;
use rand_core::RngCore;

/// Decode whitespace-separated two-digit hex tokens ("de ad be ef").
pub fn hex_tokens_to_bytes(s: &str) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for token in s.split_whitespace() {
        if token.len() != 2 {
            return Err(Error::InvalidHex(token.to_string()));
        }
        let b =
            u8::from_str_radix(token, 16).map_err(|_| Error::InvalidHex(token.to_string()))?;
        out.push(b);
    }
    Ok(out)
}

/// Whether this spec can produce different bytes between sends. Exact
/// payloads never change; a static spec with a fixed length is generated
/// once at setup instead.
pub fn is_dynamic(spec: &PayloadSpec) -> bool {
    spec.exact.is_empty() && spec.max_len > 0 && !(spec.is_static && spec.min_len == spec.max_len)
}

fn read_exact(spec: &PayloadSpec) -> Result<Vec<u8>> {
    if spec.is_file {
        let data = std::fs::read(&spec.exact).map_err(|e| Error::PayloadIo {
            path: spec.exact.clone(),
            source: e,
        })?;
        if spec.is_string {
            Ok(data)
        } else {
            hex_tokens_to_bytes(&String::from_utf8_lossy(&data))
        }
    } else if spec.is_string {
        Ok(spec.exact.as_bytes().to_vec())
    } else {
        hex_tokens_to_bytes(&spec.exact)
    }
}

/// Resolve one payload spec for this send, reusing `out`. File-backed
/// payloads are re-read on every call so the file can change mid-run.
pub fn resolve_into(
    spec: &PayloadSpec,
    rng: &mut impl RngCore,
    out: &mut Vec<u8>,
) -> Result<()> {
    out.clear();
    if !spec.exact.is_empty() {
        out.extend_from_slice(&read_exact(spec)?);
        return Ok(());
    }
    let len = if spec.max_len > spec.min_len {
        rng.gen_range(spec.min_len..=spec.max_len) as usize
    } else {
        spec.min_len as usize
    };
    out.resize(len, 0);
    rng.fill_bytes(&mut out[..]);
    Ok(())
}

/// Resolve the payload once before any lane spawns, when the sequence has
/// a single spec that never changes between sends. Returns `None` when
/// per-send resolution is required instead.
pub fn precompute_static(specs: &[PayloadSpec], rng: &mut impl RngCore) -> Result<Option<Vec<u8>>> {
    if specs.len() != 1 {
        return Ok(None);
    }
    let spec = &specs[0];
    if !spec.exact.is_empty() {
        return read_exact(spec).map(Some);
    }
    if spec.is_static && spec.min_len == spec.max_len && spec.max_len > 0 {
        let mut data = vec![0u8; spec.min_len as usize];
        rng.fill_bytes(&mut data);
        return Ok(Some(data));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::SeedableRng;
    use rand_pcg::Pcg32;
    use std::io::Write;

    fn spec() -> PayloadSpec {
        PayloadSpec::default()
    }

    #[test]
    fn test_hex_tokens() {
        assert_eq!(
            hex_tokens_to_bytes("de ad be ef").unwrap(),
            vec![0xde, 0xad, 0xbe, 0xef]
        );
        assert_eq!(hex_tokens_to_bytes("00\n1f\t2a").unwrap(), vec![0, 0x1f, 0x2a]);
        assert_eq!(hex_tokens_to_bytes("").unwrap(), Vec::<u8>::new());
        assert!(hex_tokens_to_bytes("d e").is_err());
        assert!(hex_tokens_to_bytes("dead").is_err());
        assert!(hex_tokens_to_bytes("zz").is_err());
    }

    #[test]
    fn test_exact_string() {
        let mut p = spec();
        p.exact = "hello".to_string();
        p.is_string = true;
        let mut rng = Pcg32::seed_from_u64(0);
        let mut out = Vec::new();
        resolve_into(&p, &mut rng, &mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_exact_hex() {
        let mut p = spec();
        p.exact = "01 02 ff".to_string();
        let mut rng = Pcg32::seed_from_u64(0);
        let mut out = Vec::new();
        resolve_into(&p, &mut rng, &mut out).unwrap();
        assert_eq!(out, vec![1, 2, 0xff]);
    }

    #[test]
    fn test_exact_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"0a 0b").unwrap();

        let mut p = spec();
        p.exact = path.to_str().unwrap().to_string();
        p.is_file = true;
        let mut rng = Pcg32::seed_from_u64(0);
        let mut out = Vec::new();
        resolve_into(&p, &mut rng, &mut out).unwrap();
        assert_eq!(out, vec![0x0a, 0x0b]);

        // same file taken as a raw string
        p.is_string = true;
        resolve_into(&p, &mut rng, &mut out).unwrap();
        assert_eq!(out, b"0a 0b");
    }

    #[test]
    fn test_missing_file() {
        let mut p = spec();
        p.exact = "/nonexistent/payload.txt".to_string();
        p.is_file = true;
        let mut rng = Pcg32::seed_from_u64(0);
        let mut out = Vec::new();
        assert!(matches!(
            resolve_into(&p, &mut rng, &mut out),
            Err(Error::PayloadIo { .. })
        ));
    }

    #[test]
    fn test_random_lengths() {
        let mut p = spec();
        p.min_len = 4;
        p.max_len = 4;
        let mut rng = Pcg32::seed_from_u64(5);
        let mut out = Vec::new();
        resolve_into(&p, &mut rng, &mut out).unwrap();
        assert_eq!(out.len(), 4);

        p.max_len = 32;
        for _ in 0..50 {
            resolve_into(&p, &mut rng, &mut out).unwrap();
            assert!(out.len() >= 4 && out.len() <= 32, "length {}", out.len());
        }
    }

    #[test]
    fn test_is_dynamic() {
        let mut p = spec();
        assert!(!is_dynamic(&p)); // zero max length, nothing to draw

        p.max_len = 10;
        assert!(is_dynamic(&p));

        p.is_static = true;
        assert!(is_dynamic(&p)); // length still varies

        p.min_len = 10;
        assert!(!is_dynamic(&p)); // static fixed length, precomputed

        p.exact = "aa".to_string();
        p.is_static = false;
        assert!(!is_dynamic(&p));
    }

    #[test]
    fn test_precompute() {
        let mut rng = Pcg32::seed_from_u64(9);

        // exact hex resolves at setup
        let mut p = spec();
        p.exact = "aa bb".to_string();
        assert_eq!(
            precompute_static(&[p], &mut rng).unwrap(),
            Some(vec![0xaa, 0xbb])
        );

        // static fixed-size random payload resolves at setup
        let mut p = spec();
        p.min_len = 8;
        p.max_len = 8;
        p.is_static = true;
        let data = precompute_static(&[p], &mut rng).unwrap().unwrap();
        assert_eq!(data.len(), 8);

        // dynamic payloads resolve per send
        let mut p = spec();
        p.min_len = 1;
        p.max_len = 8;
        assert_eq!(precompute_static(&[p], &mut rng).unwrap(), None);

        // multiple payloads alternate, so no precompute
        let mut a = spec();
        a.exact = "aa".to_string();
        let b = a.clone();
        assert_eq!(precompute_static(&[a, b], &mut rng).unwrap(), None);

        // a bad static payload is a configuration error
        let mut p = spec();
        p.exact = "xx yy".to_string();
        assert!(precompute_static(&[p], &mut rng).is_err());
    }
}
