/*
 * SPDX-FileCopyrightText: 2025 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::{Path, PathBuf},
};

use num_bigint_dig::BigUint;
use rand::RngCore;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read system randomness")]
    Random(#[source] rand::Error),
    #[error("Failed to write file: {0:?}")]
    WriteFile(PathBuf, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Bit length of the NIST P-521 group order.
pub const EC521_BITS: usize = 521;

/// Order of the NIST P-521 base point in big-endian byte order.
const EC521_ORDER: [u8; 66] = [
    0x01, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xfa, 0x51, 0x86, 0x87, 0x83, 0xbf, 0x2f, 0x96, 0x6b, 0x7f, 0xcc, 0x01,
    0x48, 0xf7, 0x09, 0xa5, 0xd0, 0x3b, 0xb5, 0xc9, 0xb8, 0x89, 0x9c, 0x47, 0xae, 0xbb, 0x6f,
    0xb7, 0x1e, 0x91, 0x38, 0x64, 0x09,
];

pub fn ec521_order() -> BigUint {
    BigUint::from_bytes_be(&EC521_ORDER)
}

/// Read `bits` bits of randomness as a big-endian integer. Whole bytes are read
/// and the excess low-order bits are shifted out.
fn random_bits(rng: &mut (impl RngCore + ?Sized), bits: usize) -> Result<BigUint> {
    let mut buf = vec![0u8; bits.div_ceil(8)];
    rng.try_fill_bytes(&mut buf).map_err(Error::Random)?;

    Ok(BigUint::from_bytes_be(&buf) >> (buf.len() * 8 - bits))
}

/// Generate a P-521 private scalar by rejection sampling until the random value
/// is below the group order.
pub fn generate_ec521_private_key(rng: &mut (impl RngCore + ?Sized)) -> Result<BigUint> {
    let order = ec521_order();

    loop {
        let candidate = random_bits(rng, EC521_BITS)?;
        if candidate < order {
            return Ok(candidate);
        }

        trace!("Rejected value outside of group order");
    }
}

/// Write the private scalar as a decimal integer. The file is only readable by
/// the current user.
pub fn write_ec521_private_key_file(path: &Path, key: &BigUint) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    options.create(true);
    options.truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut writer = options
        .open(path)
        .map_err(|e| Error::WriteFile(path.to_owned(), e))?;

    writeln!(writer, "{key}").map_err(|e| Error::WriteFile(path.to_owned(), e))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use rand::rngs::OsRng;

    use super::*;

    /// Returns one scripted buffer per fill request.
    struct ScriptedRng(VecDeque<Vec<u8>>);

    impl RngCore for ScriptedRng {
        fn next_u32(&mut self) -> u32 {
            unimplemented!()
        }

        fn next_u64(&mut self) -> u64 {
            unimplemented!()
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            let data = self.0.pop_front().unwrap();
            dest.copy_from_slice(&data);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn order_matches_curve() {
        let order = ec521_order();

        assert_eq!(order.bits(), EC521_BITS);
        assert_eq!(
            order.to_string(),
            "6864797660130609714981900799081393217269435300143305409394463459185543183397655394245057746333217197532963996371363321113864768612440380340372808892707005449",
        );
    }

    #[test]
    fn rejects_values_above_order() {
        // All ones is above the order. The second value shifts down to 1.
        let mut second = vec![0u8; 66];
        second[65] = 0x80;
        let mut rng = ScriptedRng(VecDeque::from([vec![0xff; 66], second]));

        let key = generate_ec521_private_key(&mut rng).unwrap();
        assert_eq!(key, BigUint::from(1u32));
        assert!(rng.0.is_empty());
    }

    #[test]
    fn accepts_value_just_below_order() {
        let below = ec521_order() - BigUint::from(1u32);
        let mut bytes = (below.clone() << 7).to_bytes_be();
        while bytes.len() < 66 {
            bytes.insert(0, 0);
        }
        let mut rng = ScriptedRng(VecDeque::from([bytes]));

        assert_eq!(generate_ec521_private_key(&mut rng).unwrap(), below);
    }

    #[test]
    fn os_rng_is_below_order() {
        let key = generate_ec521_private_key(&mut OsRng).unwrap();
        assert!(key < ec521_order());
    }

    #[test]
    fn key_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("priv-key.txt");
        let key = BigUint::from(123456789u64);

        write_ec521_private_key_file(&path, &key).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "123456789\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
