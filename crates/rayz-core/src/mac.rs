use std::fmt;
use std::str::FromStr;

/// A six-byte radio address identifying a peer endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mac(pub [u8; 6]);

impl Mac {
    /// The all-ones broadcast address.
    pub const BROADCAST: Mac = Mac([0xFF; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacParseError(pub String);

impl fmt::Display for MacParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid MAC address: {}", self.0)
    }
}

impl std::error::Error for MacParseError {}

impl FromStr for Mac {
    type Err = MacParseError;

    /// Parses `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = if s.contains(':') {
            s.split(':').collect()
        } else {
            s.split('-').collect()
        };
        if parts.len() != 6 {
            return Err(MacParseError(s.to_string()));
        }
        let mut out = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            out[i] =
                u8::from_str_radix(part.trim(), 16).map_err(|_| MacParseError(s.to_string()))?;
        }
        Ok(Mac(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_colon_separated() {
        let mac: Mac = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(mac, Mac([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]));
    }

    #[test]
    fn parse_dash_separated() {
        let mac: Mac = "01-02-03-04-05-06".parse().unwrap();
        assert_eq!(mac, Mac([1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn parse_tolerates_whitespace() {
        let mac: Mac = "  0a:0b:0c:0d:0e:0f ".parse().unwrap();
        assert_eq!(mac, Mac([0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F]));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Mac>().is_err());
        assert!("aa:bb:cc".parse::<Mac>().is_err());
        assert!("zz:bb:cc:dd:ee:ff".parse::<Mac>().is_err());
    }

    #[test]
    fn display_roundtrip() {
        let mac = Mac([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
        let shown = mac.to_string();
        assert_eq!(shown, "de:ad:be:ef:00:01");
        assert_eq!(shown.parse::<Mac>().unwrap(), mac);
    }

    #[test]
    fn broadcast_detection() {
        assert!(Mac::BROADCAST.is_broadcast());
        assert!(!Mac([0; 6]).is_broadcast());
    }
}
