//! Password obfuscation at rest (§4.2).
//!
//! XOR the password against the repeating, 64-byte-capped concatenation of
//! the source `nickname` and `server`, then hex-encode. Empty passwords and
//! those longer than 64 characters are stored in clear; on read, an
//! `epassword` attribute supersedes a plaintext `password` attribute.

const MAX_KEY: usize = 64;

fn key_stream(nickname: &str, server: &str) -> Vec<u8> {
    let seed: Vec<u8> = nickname.bytes().chain(server.bytes()).collect();
    if seed.is_empty() {
        return vec![0u8; MAX_KEY];
    }
    (0..MAX_KEY).map(|i| seed[i % seed.len()]).collect()
}

/// Returns `(value, obfuscated)`. When the password is empty or longer than
/// 64 characters the value is the plaintext itself and `obfuscated=false`,
/// i.e. it belongs in the `password` XML attribute; otherwise it is
/// hex-encoded XOR ciphertext for the `epassword` attribute.
pub fn obfuscate(password: &str, nickname: &str, server: &str) -> (String, bool) {
    if password.is_empty() || password.len() > MAX_KEY {
        return (password.to_string(), false);
    }
    let key = key_stream(nickname, server);
    let mut hex = String::with_capacity(password.len() * 2);
    for (i, b) in password.bytes().enumerate() {
        hex.push_str(&format!("{:02x}", b ^ key[i]));
    }
    (hex, true)
}

/// Reverses [`obfuscate`]. Malformed hex (odd length or non-hex digits)
/// yields `None`; the caller should treat that as an unreadable source and
/// fail configuration load rather than silently using an empty password.
pub fn deobfuscate(epassword: &str, nickname: &str, server: &str) -> Option<String> {
    if epassword.len() % 2 != 0 {
        return None;
    }
    let key = key_stream(nickname, server);
    let mut bytes = Vec::with_capacity(epassword.len() / 2);
    for (i, chunk) in epassword.as_bytes().chunks(2).enumerate() {
        let hex_pair = std::str::from_utf8(chunk).ok()?;
        let b = u8::from_str_radix(hex_pair, 16).ok()?;
        bytes.push(b ^ key[i]);
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let (enc, obfuscated) = obfuscate("hunter2", "p4-src", "p4server:1666");
        assert!(obfuscated);
        let dec = deobfuscate(&enc, "p4-src", "p4server:1666").unwrap();
        assert_eq!(dec, "hunter2");
    }

    #[test]
    fn empty_password_stays_clear() {
        let (enc, obfuscated) = obfuscate("", "nick", "server");
        assert_eq!(enc, "");
        assert!(!obfuscated);
    }

    #[test]
    fn overlong_password_stays_clear() {
        let long = "x".repeat(65);
        let (enc, obfuscated) = obfuscate(&long, "nick", "server");
        assert_eq!(enc, long);
        assert!(!obfuscated);
    }
}
