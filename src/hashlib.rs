// passwd is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// passwd is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with passwd.  If not, see <http://www.gnu.org/licenses/>.

use crate::{PasswdError, PasswdResult};

use std::fmt::Display;

use base64::{engine::general_purpose, Engine as _};
use log::{debug, warn};
use md4::Md4;
use md5::Md5;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 4;
const APR1_MAGIC: &str = "$apr1$";
const ITOA64: &[u8] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Password encoding schemes understood by the drivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    Plain,
    Crypt,
    CryptDes,
    CryptMd5,
    CryptSha256,
    CryptSha512,
    CryptBlowfish,
    Md5Hex,
    Md5Base64,
    #[serde(alias = "sha1")]
    Sha,
    Ssha,
    #[serde(alias = "sha256")]
    Ssha256,
    Smd5,
    Aprmd5,
    NtHash,
    /// Active Directory `unicodePwd`, the quoted password as UTF-16LE
    Msad,
}

impl Scheme {
    pub const ALL: [Scheme; 16] = [
        Self::Plain,
        Self::Crypt,
        Self::CryptDes,
        Self::CryptMd5,
        Self::CryptSha256,
        Self::CryptSha512,
        Self::CryptBlowfish,
        Self::Md5Hex,
        Self::Md5Base64,
        Self::Sha,
        Self::Ssha,
        Self::Ssha256,
        Self::Smd5,
        Self::Aprmd5,
        Self::NtHash,
        Self::Msad,
    ];

    /// Returns the prefix used when the encryption is shown, if the scheme has one
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            Self::Crypt
            | Self::CryptDes
            | Self::CryptMd5
            | Self::CryptSha256
            | Self::CryptSha512
            | Self::CryptBlowfish => Some("{crypt}"),
            Self::Md5Hex | Self::Md5Base64 => Some("{MD5}"),
            Self::Sha => Some("{SHA}"),
            Self::Ssha => Some("{SSHA}"),
            Self::Ssha256 => Some("{SSHA256}"),
            Self::Smd5 => Some("{SMD5}"),
            Self::Plain | Self::Aprmd5 | Self::NtHash | Self::Msad => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Crypt => "crypt",
            Self::CryptDes => "crypt-des",
            Self::CryptMd5 => "crypt-md5",
            Self::CryptSha256 => "crypt-sha256",
            Self::CryptSha512 => "crypt-sha512",
            Self::CryptBlowfish => "crypt-blowfish",
            Self::Md5Hex => "md5-hex",
            Self::Md5Base64 => "md5-base64",
            Self::Sha => "sha",
            Self::Ssha => "ssha",
            Self::Ssha256 => "ssha256",
            Self::Smd5 => "smd5",
            Self::Aprmd5 => "aprmd5",
            Self::NtHash => "nt-hash",
            Self::Msad => "msad",
        }
    }

    fn is_crypt(&self) -> bool {
        matches!(
            self,
            Self::Crypt
                | Self::CryptDes
                | Self::CryptMd5
                | Self::CryptSha256
                | Self::CryptSha512
                | Self::CryptBlowfish
        )
    }

    /// Digest length of the salted schemes, the salt follows the digest
    fn salted_digest_len(&self) -> Option<usize> {
        match self {
            Self::Ssha => Some(20),
            Self::Ssha256 => Some(32),
            Self::Smd5 => Some(16),
            _ => None,
        }
    }
}

impl Default for Scheme {
    fn default() -> Self {
        Self::Md5Hex
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Scheme {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.to_lowercase();
        match value.as_str() {
            "sha1" => return Ok(Self::Sha),
            "sha256" => return Ok(Self::Ssha256),
            _ => (),
        }
        Self::ALL
            .iter()
            .find(|scheme| scheme.as_str() == value)
            .copied()
            .ok_or("unknown encryption scheme")
    }
}

/// Encoding of the passwords stored by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Encryption {
    pub scheme: Scheme,
    /// Prefix encoded passwords with their scheme, e.g. `{SSHA}`
    pub show_encryption: bool,
}

impl Encryption {
    pub fn new(scheme: Scheme, show_encryption: bool) -> Self {
        Self {
            scheme,
            show_encryption,
        }
    }

    fn with_prefix(&self, encoded: String) -> String {
        match (self.show_encryption, self.scheme.prefix()) {
            (true, Some(prefix)) => format!("{prefix}{encoded}"),
            _ => encoded,
        }
    }
}

fn random_salt(len: usize) -> Vec<u8> {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .collect()
}

fn salted<D: Digest>(password: &[u8], salt: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(password);
    hasher.update(salt);
    let hash_bytes = hasher.finalize();
    let salted_hash = [hash_bytes.as_slice(), salt].concat();
    general_purpose::STANDARD.encode(salted_hash)
}

fn unsalted_base64<D: Digest>(password: &[u8]) -> String {
    general_purpose::STANDARD.encode(D::digest(password))
}

/// Returns the NT hash (MD4 over UTF-16LE) of the password, as uppercase hex
pub fn nt_hash(password: &str) -> String {
    let utf16: Vec<u8> = password
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect();
    hex::encode_upper(Md4::digest(utf16))
}

/// Returns the password in double quotes, encoded as UTF-16LE
///
/// This is the raw value Active Directory accepts in `unicodePwd`.
pub fn msad_password(password: &str) -> Vec<u8> {
    format!("\"{password}\"")
        .encode_utf16()
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn to64(mut value: u32, count: usize, out: &mut String) {
    for _ in 0..count {
        out.push(ITOA64[(value & 0x3f) as usize] as char);
        value >>= 6;
    }
}

/// Apache flavoured MD5-crypt (`$apr1$salt$hash`)
pub fn apr_md5(password: &str, salt: &str) -> String {
    let password = password.as_bytes();
    let salt = &salt.as_bytes()[..salt.len().min(8)];

    let mut alternate = Md5::new();
    alternate.update(password);
    alternate.update(salt);
    alternate.update(password);
    let alternate = alternate.finalize();

    let mut context = Md5::new();
    context.update(password);
    context.update(APR1_MAGIC.as_bytes());
    context.update(salt);

    let mut remaining = password.len();
    while remaining > 0 {
        let take = remaining.min(16);
        context.update(&alternate[..take]);
        remaining -= take;
    }

    let mut i = password.len();
    while i > 0 {
        if i & 1 == 1 {
            context.update([0u8]);
        } else {
            context.update(&password[..1]);
        }
        i >>= 1;
    }

    let mut digest = context.finalize();
    for round in 0..1000 {
        let mut ctx = Md5::new();
        if round & 1 == 1 {
            ctx.update(password);
        } else {
            ctx.update(digest);
        }
        if round % 3 != 0 {
            ctx.update(salt);
        }
        if round % 7 != 0 {
            ctx.update(password);
        }
        if round & 1 == 1 {
            ctx.update(digest);
        } else {
            ctx.update(password);
        }
        digest = ctx.finalize();
    }

    let mut encoded = String::with_capacity(22);
    for (a, b, c) in [(0, 6, 12), (1, 7, 13), (2, 8, 14), (3, 9, 15), (4, 10, 5)] {
        let value =
            ((digest[a] as u32) << 16) | ((digest[b] as u32) << 8) | (digest[c] as u32);
        to64(value, 4, &mut encoded);
    }
    to64(digest[11] as u32, 2, &mut encoded);

    format!(
        "{APR1_MAGIC}{}${encoded}",
        String::from_utf8_lossy(salt)
    )
}

fn crypt_error<E: Display>(scheme: &Scheme, err: E) -> PasswdError {
    PasswdError::Config(format!("{scheme}: unable to encrypt password: {err}"))
}

/// Returns the password encoded with the scheme given, using a fresh salt
pub fn encrypt_password(plaintext: &str, encryption: &Encryption) -> PasswdResult<String> {
    let password = plaintext.as_bytes();
    let encoded = match encryption.scheme {
        Scheme::Plain => plaintext.to_string(),
        Scheme::Crypt | Scheme::CryptDes => pwhash::unix_crypt::hash(plaintext)
            .map_err(|err| crypt_error(&encryption.scheme, err))?,
        Scheme::CryptMd5 => pwhash::md5_crypt::hash(plaintext)
            .map_err(|err| crypt_error(&encryption.scheme, err))?,
        Scheme::CryptSha256 => pwhash::sha256_crypt::hash(plaintext)
            .map_err(|err| crypt_error(&encryption.scheme, err))?,
        Scheme::CryptSha512 => pwhash::sha512_crypt::hash(plaintext)
            .map_err(|err| crypt_error(&encryption.scheme, err))?,
        Scheme::CryptBlowfish => pwhash::bcrypt::hash(plaintext)
            .map_err(|err| crypt_error(&encryption.scheme, err))?,
        Scheme::Md5Hex => hex::encode(Md5::digest(password)),
        Scheme::Md5Base64 => unsalted_base64::<Md5>(password),
        Scheme::Sha => unsalted_base64::<Sha1>(password),
        Scheme::Ssha => salted::<Sha1>(password, &random_salt(SALT_LEN)),
        Scheme::Ssha256 => salted::<Sha256>(password, &random_salt(SALT_LEN)),
        Scheme::Smd5 => salted::<Md5>(password, &random_salt(SALT_LEN)),
        Scheme::Aprmd5 => {
            let salt: String = (0..8)
                .map(|_| ITOA64[rand::thread_rng().gen_range(0..64)] as char)
                .collect();
            apr_md5(plaintext, &salt)
        }
        Scheme::NtHash => nt_hash(plaintext),
        Scheme::Msad => general_purpose::STANDARD.encode(msad_password(plaintext)),
    };
    Ok(encryption.with_prefix(encoded))
}

/// Strips a leading `{SCHEME}` tag, compared case-insensitively
fn strip_prefix<'a>(encoded: &'a str, scheme: &Scheme) -> &'a str {
    match scheme.prefix() {
        Some(prefix)
            if encoded.len() >= prefix.len()
                && encoded.is_char_boundary(prefix.len())
                && encoded[..prefix.len()].eq_ignore_ascii_case(prefix) =>
        {
            &encoded[prefix.len()..]
        }
        _ => encoded,
    }
}

fn matches(encoded: &str, plaintext: &str, scheme: &Scheme) -> bool {
    let password = plaintext.as_bytes();
    match scheme {
        Scheme::Plain => encoded == plaintext,
        scheme if scheme.is_crypt() => pwhash::unix::verify(plaintext, encoded),
        Scheme::Md5Hex => encoded.eq_ignore_ascii_case(&hex::encode(Md5::digest(password))),
        Scheme::Md5Base64 => encoded == unsalted_base64::<Md5>(password),
        Scheme::Sha => encoded == unsalted_base64::<Sha1>(password),
        Scheme::Ssha | Scheme::Ssha256 | Scheme::Smd5 => {
            let decoded = match general_purpose::STANDARD.decode(encoded) {
                Ok(decoded) => decoded,
                Err(_) => {
                    warn!("base64: unable to decode stored {scheme} password");
                    return false;
                }
            };
            let digest_len = scheme.salted_digest_len().unwrap_or_default();
            if decoded.len() <= digest_len {
                return false;
            }
            let salt = &decoded[digest_len..];
            let recomputed = match scheme {
                Scheme::Ssha => salted::<Sha1>(password, salt),
                Scheme::Ssha256 => salted::<Sha256>(password, salt),
                _ => salted::<Md5>(password, salt),
            };
            encoded == recomputed
        }
        Scheme::Aprmd5 => match encoded
            .strip_prefix(APR1_MAGIC)
            .and_then(|rest| rest.split('$').next())
        {
            Some(salt) => encoded == apr_md5(plaintext, salt),
            None => false,
        },
        Scheme::NtHash => encoded.eq_ignore_ascii_case(&nt_hash(plaintext)),
        Scheme::Msad => encoded == general_purpose::STANDARD.encode(msad_password(plaintext)),
        _ => false,
    }
}

/// Verifies a plaintext password against the encoded password stored by a backend
///
/// The salt is taken from the stored value. A mismatch yields [`PasswdError::BadOldPassword`].
pub fn compare_passwords(
    encoded: &str,
    plaintext: &str,
    encryption: &Encryption,
) -> PasswdResult<()> {
    let stored = strip_prefix(encoded, &encryption.scheme);
    match matches(stored, plaintext, &encryption.scheme) {
        true => Ok(()),
        false => {
            debug!("stored {} password does not match", encryption.scheme);
            Err(PasswdError::BadOldPassword)
        }
    }
}
