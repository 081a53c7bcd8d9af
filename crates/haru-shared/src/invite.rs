use rand::Rng;

use crate::constants::INVITE_CODE_ALPHABET;

/// A short uppercase alphanumeric code. The only way to join a group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InviteCode(String);

impl InviteCode {
    /// Draw a fresh random code of `len` characters.
    pub fn generate(len: usize) -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..len)
            .map(|_| INVITE_CODE_ALPHABET[rng.gen_range(0..INVITE_CODE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Normalise user input: trim, uppercase, then validate the alphabet.
    pub fn parse(input: &str) -> Result<Self, InviteError> {
        let code = input.trim().to_ascii_uppercase();
        if code.is_empty() {
            return Err(InviteError::Empty);
        }
        if !code.bytes().all(|b| INVITE_CODE_ALPHABET.contains(&b)) {
            return Err(InviteError::InvalidFormat);
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InviteCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InviteError {
    #[error("Invite code is empty")]
    Empty,

    #[error("Invalid invite code format")]
    InvalidFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_code_has_requested_length_and_alphabet() {
        let code = InviteCode::generate(6);
        assert_eq!(code.as_str().len(), 6);
        assert!(code.as_str().bytes().all(|b| INVITE_CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn generated_code_parses_back() {
        let code = InviteCode::generate(8);
        assert_eq!(InviteCode::parse(code.as_str()).unwrap(), code);
    }

    #[test]
    fn parse_normalises_user_input() {
        let code = InviteCode::parse("  ab12cd \n").unwrap();
        assert_eq!(code.as_str(), "AB12CD");
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(InviteCode::parse("   "), Err(InviteError::Empty));
        assert_eq!(InviteCode::parse("AB-12"), Err(InviteError::InvalidFormat));
        assert_eq!(InviteCode::parse("초대코드"), Err(InviteError::InvalidFormat));
    }
}
