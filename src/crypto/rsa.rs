// dkim-parse – extraction and verification of DKIM signatures
// Copyright © 2022–2023 David Bürgin <dbuergin@gluet.ch>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.

use crate::crypto::{HashAlgorithm, VerificationError};
use rsa::{
    pkcs1::DecodeRsaPublicKey, pkcs8::DecodePublicKey, traits::PublicKeyParts, Pkcs1v15Sign,
    RsaPublicKey,
};
#[cfg(feature = "pre-rfc8301")]
use sha1::Sha1;
use sha2::Sha256;

pub fn rsa_public_key_size(public_key: &RsaPublicKey) -> usize {
    public_key.size() * 8
}

pub fn read_rsa_public_key(key_data: &[u8]) -> Result<RsaPublicKey, VerificationError> {
    let public_key = RsaPublicKey::from_public_key_der(key_data)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(key_data))
        .map_err(|_| VerificationError::InvalidKey)?;

    if rsa_public_key_size(&public_key) < super::MIN_RSA_KEY_BITS {
        return Err(VerificationError::InsufficientKeySize);
    }

    Ok(public_key)
}

pub fn verify_rsa(
    hash_alg: HashAlgorithm,
    public_key: &RsaPublicKey,
    data_hash: &[u8],
    signature_data: &[u8],
) -> Result<(), VerificationError> {
    let scheme = match hash_alg {
        HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
        #[cfg(feature = "pre-rfc8301")]
        HashAlgorithm::Sha1 => Pkcs1v15Sign::new::<Sha1>(),
    };

    public_key
        .verify(scheme, data_hash, signature_data)
        .map_err(|_| VerificationError::VerificationFailure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64ct::{Base64, Encoding};

    const RSA2048_SPKI: &str = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAwYDo2X3xKGSqXBLS5KSTCM7G1baHr8hW94tQcCLOl0gMBfzUGTZ+u3dSWTLkCpbBzNsuXHUJEYNE8o51WbgC0FnEZRjozME7Whh/qJ+HrrVwKsmEEj+hEE4+HSR3lWVFPTIeZ5trSEAwOf0iHHPR8lSxsTfVDSXDIymoDy5PVcfCIqxRxsa1PxELCOuf5lJ+Oxn5AHYtrbnLm4TsAsU8tD9/stKehZ5GV7sg6UyxB7s8uINboIqt+LOhxtjYJeJVUuMuc+KBggql+MXQzmH6Iwx2uHPujRVHcwoq/+hFNm4ZSj7425SGy3HJftxoS3g2RUX991RBOecKU1DuI0u0MQIDAQAB";
    const RSA2048_PKCS1: &str = "MIIBCgKCAQEAwYDo2X3xKGSqXBLS5KSTCM7G1baHr8hW94tQcCLOl0gMBfzUGTZ+u3dSWTLkCpbBzNsuXHUJEYNE8o51WbgC0FnEZRjozME7Whh/qJ+HrrVwKsmEEj+hEE4+HSR3lWVFPTIeZ5trSEAwOf0iHHPR8lSxsTfVDSXDIymoDy5PVcfCIqxRxsa1PxELCOuf5lJ+Oxn5AHYtrbnLm4TsAsU8tD9/stKehZ5GV7sg6UyxB7s8uINboIqt+LOhxtjYJeJVUuMuc+KBggql+MXQzmH6Iwx2uHPujRVHcwoq/+hFNm4ZSj7425SGy3HJftxoS3g2RUX991RBOecKU1DuI0u0MQIDAQAB";

    // SHA-256 of "hello", signed with the private key of the key above
    const HASH: &str = "LPJNul+wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ=";
    const SIGNATURE: &str = "qHvxjCUGGZiwjZZ0UNArhyb0PsSrKXDVGtYYwx+wBhTXOQhowPZISavWwDrYaSfxeXNuY78T3r17hOcQILW+K51/OQi15c/OYak0ta99Wtof7148F5c0LKnf5mWlekyJ0RT3OuLPKt/zHM9fN7nJN1Nm4iqcg7sT0CJNcSO2FSowWIpZ/DnmOO3W8qS3c8B8S6ZLgje6eMndJ8zi44lNz3LBnV3v4V9HLhky6heYFCdLwpm3owuAIJ9ExZGuUyDulO+nY3R4J0GalwzH7/04OhP5r66uNFKac0+BXppToYriP6LIGXC0OS9jIXO5l0CmHdihldBnjQRwLtGub+4P7A==";

    #[test]
    fn read_rsa_public_key_both_formats() {
        let spki = read_rsa_public_key(&Base64::decode_vec(RSA2048_SPKI).unwrap()).unwrap();
        let pkcs1 = read_rsa_public_key(&Base64::decode_vec(RSA2048_PKCS1).unwrap()).unwrap();

        assert_eq!(spki, pkcs1);
        assert_eq!(rsa_public_key_size(&spki), 2048);

        assert_eq!(read_rsa_public_key(b"garbage"), Err(VerificationError::InvalidKey));
    }

    #[test]
    fn verify_rsa_ok() {
        let key = read_rsa_public_key(&Base64::decode_vec(RSA2048_SPKI).unwrap()).unwrap();
        let hash = Base64::decode_vec(HASH).unwrap();
        let signature = Base64::decode_vec(SIGNATURE).unwrap();

        assert_eq!(verify_rsa(HashAlgorithm::Sha256, &key, &hash, &signature), Ok(()));

        let mut tampered = hash.clone();
        tampered[0] ^= 1;
        assert_eq!(
            verify_rsa(HashAlgorithm::Sha256, &key, &tampered, &signature),
            Err(VerificationError::VerificationFailure)
        );
    }
}
